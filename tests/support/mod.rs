// tests/support/mod.rs
#![allow(dead_code)]

use once_cell::sync::Lazy;
use papertrail_core::{EntitySchema, FieldMap, Model, SqlStore, TrackingContext};
use serde_json::{Value, json};

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
});

pub struct TestStore {
    pub store: SqlStore,
    pub users: Model,
    pub contacts: Model,
    pub user_id: i64,
}

/// Fresh in-memory store with an unbound `users` principal model, a
/// `contacts` target model, and one principal row.
pub async fn setup() -> TestStore {
    Lazy::force(&TRACING);

    let store = SqlStore::connect("sqlite::memory:").await.expect("connect");
    let users = store
        .define(EntitySchema::new("users", ["name"]).unwrap())
        .await
        .expect("define users");
    let contacts = store
        .define(EntitySchema::new("contacts", ["name", "email", "parameters"]).unwrap())
        .await
        .expect("define contacts");

    let user = users
        .create(&fields(json!({"name": "test_user"})), &TrackingContext::anonymous())
        .await
        .expect("create principal");

    TestStore {
        store,
        users,
        contacts,
        user_id: user.id,
    }
}

pub fn fields(value: Value) -> FieldMap {
    value.as_object().cloned().expect("fixture must be an object")
}

pub fn contact_fixture() -> FieldMap {
    fields(json!({
        "name": "test_target",
        "email": "test@target.com",
        "parameters": [{"age": 25, "height": 159}, {"age": 26, "height": 161}],
    }))
}

pub fn ctx(user_id: i64) -> TrackingContext {
    TrackingContext::for_user(user_id)
}
