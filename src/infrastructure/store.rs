// src/infrastructure/store.rs
//! The reference entity store: schema-driven SQLite tables with typed
//! lifecycle hook points. Every mutating or reading operation takes an
//! explicit tracking context and fires the handlers installed on its hook
//! points, on the same connection the operation runs on.

use crate::application::ports::hooks::{HookPoint, LifecycleEvent, LifecycleHandler};
use crate::application::ports::store::RowLoader;
use crate::application::ports::time::Clock;
use crate::domain::context::TrackingContext;
use crate::domain::errors::{TrackerError, TrackerResult};
use crate::domain::schema::{EntitySchema, FieldMap, Filter, StoredRow};
use crate::infrastructure::database;
use crate::infrastructure::sql::{decode_value, encode_value, map_error, quote_ident};
use crate::infrastructure::time::SystemClock;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Handlers per hook point. Installed once at binding time, read on every
/// operation; the handler list is cloned out so no lock is held across an
/// await point.
#[derive(Default)]
pub(crate) struct HookRegistry {
    handlers: RwLock<HashMap<HookPoint, Vec<Arc<dyn LifecycleHandler>>>>,
}

impl HookRegistry {
    fn install(&self, point: HookPoint, handler: Arc<dyn LifecycleHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(point)
            .or_default()
            .push(handler);
    }

    fn handlers_for(&self, point: HookPoint) -> Vec<Arc<dyn LifecycleHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&point)
            .cloned()
            .unwrap_or_default()
    }
}

/// A pool of schema-driven tables plus the model registry hook handlers are
/// installed through.
#[derive(Clone)]
pub struct SqlStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    models: Arc<RwLock<HashMap<String, Model>>>,
}

impl SqlStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            models: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn connect(database_url: &str) -> TrackerResult<Self> {
        let pool = database::init_pool(database_url).await.map_err(map_error)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Creates the entity's table and returns a cloneable handle to it.
    pub async fn define(&self, schema: EntitySchema) -> TrackerResult<Model> {
        if self.model(schema.name()).is_some() {
            return Err(TrackerError::configuration(format!(
                "model {} is already defined",
                schema.name()
            )));
        }

        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT",
            quote_ident(schema.name())
        );
        for field in schema.fields() {
            ddl.push_str(&format!(", {} TEXT", quote_ident(field)));
        }
        ddl.push_str(", \"created_at\" TEXT NOT NULL, \"updated_at\" TEXT NOT NULL)");

        // DDL first; a failed statement must not leave a registered model
        // with no backing table.
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(map_error)?;
        let model = self.register(Arc::new(schema))?;

        tracing::debug!(table = model.name(), "defined entity table");
        Ok(model)
    }

    /// Resolves a previously defined model by name.
    pub fn model(&self, name: &str) -> Option<Model> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registers a handle for a table created elsewhere (the log table DDL
    /// is owned by the binding).
    pub(crate) fn register(&self, schema: Arc<EntitySchema>) -> TrackerResult<Model> {
        let mut models = self
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if models.contains_key(schema.name()) {
            return Err(TrackerError::configuration(format!(
                "model {} is already defined",
                schema.name()
            )));
        }

        let model = Model {
            pool: self.pool.clone(),
            schema,
            hooks: Arc::new(HookRegistry::default()),
            clock: Arc::clone(&self.clock),
        };
        models.insert(model.name().to_owned(), model.clone());
        Ok(model)
    }
}

/// Handle onto one table. Clones share the hook registry, so handlers
/// installed through any handle fire for operations through every handle.
#[derive(Clone)]
pub struct Model {
    pool: SqlitePool,
    schema: Arc<EntitySchema>,
    hooks: Arc<HookRegistry>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl Model {
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn install_hook(&self, point: HookPoint, handler: Arc<dyn LifecycleHandler>) {
        self.hooks.install(point, handler);
    }

    async fn fire(
        &self,
        conn: &mut SqliteConnection,
        event: LifecycleEvent<'_>,
        ctx: &TrackingContext,
    ) -> TrackerResult<()> {
        for handler in self.hooks.handlers_for(event.point()) {
            handler.handle(&mut *conn, event, ctx).await?;
        }
        Ok(())
    }

    /// All declared fields, absent ones as null.
    fn full_row(&self, values: &FieldMap) -> FieldMap {
        let mut fields = FieldMap::new();
        for field in self.schema.fields() {
            fields.insert(
                field.clone(),
                values.get(field).cloned().unwrap_or(Value::Null),
            );
        }
        fields
    }

    /// Only the declared fields actually present in the payload.
    fn payload_fields(&self, payload: &FieldMap) -> FieldMap {
        let mut fields = FieldMap::new();
        for field in self.schema.fields() {
            if let Some(value) = payload.get(field) {
                fields.insert(field.clone(), value.clone());
            }
        }
        fields
    }

    fn select_list(&self) -> String {
        let mut columns = vec![quote_ident("id")];
        columns.extend(self.schema.fields().iter().map(|f| quote_ident(f)));
        columns.join(", ")
    }

    /// Filters may only name declared fields or the id column; anything
    /// else never reaches a statement.
    fn check_filter(&self, filter: &Filter) -> TrackerResult<()> {
        for (field, _) in filter.conditions() {
            if field != "id" && !self.schema.fields().iter().any(|f| f == field) {
                return Err(TrackerError::configuration(format!(
                    "unknown filter field {field} on {}",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    fn where_clause(filter: &Filter) -> String {
        if filter.is_empty() {
            String::new()
        } else {
            let conditions: Vec<String> = filter
                .conditions()
                .iter()
                .map(|(field, _)| format!("{} = ?", quote_ident(field)))
                .collect();
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }

    fn row_from_sqlite(&self, row: &SqliteRow) -> TrackerResult<StoredRow> {
        let id: i64 = row.try_get("id").map_err(map_error)?;
        let mut fields = FieldMap::new();
        for field in self.schema.fields() {
            // Unchecked: typed columns the store did not write (the log
            // table's INTEGER references) decode through their text
            // representation instead of failing the whole load.
            let raw: Option<String> = row.try_get_unchecked(field.as_str()).map_err(map_error)?;
            fields.insert(field.clone(), decode_value(raw));
        }
        Ok(StoredRow { id, fields })
    }

    /// Hook-free row load, shared by `find` and by handlers doing their
    /// pre-write read.
    pub(crate) async fn load_matching_on(
        &self,
        conn: &mut SqliteConnection,
        filter: &Filter,
    ) -> TrackerResult<Vec<StoredRow>> {
        self.check_filter(filter)?;
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY \"id\"",
            self.select_list(),
            quote_ident(self.name()),
            Self::where_clause(filter)
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in filter.conditions() {
            query = query.bind(encode_value(value));
        }
        let rows = query.fetch_all(&mut *conn).await.map_err(map_error)?;
        rows.iter().map(|r| self.row_from_sqlite(r)).collect()
    }

    async fn load_by_id_on(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
    ) -> TrackerResult<Option<StoredRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE \"id\" = ?",
            self.select_list(),
            quote_ident(self.name())
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_error)?;
        row.map(|r| self.row_from_sqlite(&r)).transpose()
    }

    // -- create ----------------------------------------------------------

    pub async fn create(
        &self,
        values: &FieldMap,
        ctx: &TrackingContext,
    ) -> TrackerResult<StoredRow> {
        let mut conn = self.pool.acquire().await.map_err(map_error)?;
        self.create_on(&mut conn, values, ctx).await
    }

    pub async fn create_in_tx(
        &self,
        conn: &mut SqliteConnection,
        values: &FieldMap,
        ctx: &TrackingContext,
    ) -> TrackerResult<StoredRow> {
        self.create_on(conn, values, ctx).await
    }

    async fn create_on(
        &self,
        conn: &mut SqliteConnection,
        values: &FieldMap,
        ctx: &TrackingContext,
    ) -> TrackerResult<StoredRow> {
        let fields = self.full_row(values);
        self.fire(&mut *conn, LifecycleEvent::BeforeCreate { values: &fields }, ctx)
            .await?;

        let now = self.clock.now();
        let mut columns: Vec<String> =
            self.schema.fields().iter().map(|f| quote_ident(f)).collect();
        columns.push(quote_ident("created_at"));
        columns.push(quote_ident("updated_at"));
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING \"id\"",
            quote_ident(self.name()),
            columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for field in self.schema.fields() {
            query = query.bind(encode_value(fields.get(field.as_str()).unwrap_or(&Value::Null)));
        }
        query = query.bind(now).bind(now);
        let id = query.fetch_one(&mut *conn).await.map_err(map_error)?;

        let row = StoredRow { id, fields };
        self.fire(&mut *conn, LifecycleEvent::AfterCreate { row: &row }, ctx)
            .await?;
        Ok(row)
    }

    pub async fn bulk_create(
        &self,
        values: &[FieldMap],
        ctx: &TrackingContext,
    ) -> TrackerResult<Vec<StoredRow>> {
        let mut conn = self.pool.acquire().await.map_err(map_error)?;
        self.bulk_create_on(&mut conn, values, ctx).await
    }

    pub async fn bulk_create_in_tx(
        &self,
        conn: &mut SqliteConnection,
        values: &[FieldMap],
        ctx: &TrackingContext,
    ) -> TrackerResult<Vec<StoredRow>> {
        self.bulk_create_on(conn, values, ctx).await
    }

    async fn bulk_create_on(
        &self,
        conn: &mut SqliteConnection,
        values: &[FieldMap],
        ctx: &TrackingContext,
    ) -> TrackerResult<Vec<StoredRow>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let projected: Vec<FieldMap> = values.iter().map(|v| self.full_row(v)).collect();
        self.fire(
            &mut *conn,
            LifecycleEvent::BeforeBulkCreate { values: &projected },
            ctx,
        )
        .await?;

        let now = self.clock.now();
        let mut columns: Vec<String> =
            self.schema.fields().iter().map(|f| quote_ident(f)).collect();
        columns.push(quote_ident("created_at"));
        columns.push(quote_ident("updated_at"));

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            quote_ident(self.name()),
            columns.join(", ")
        ));
        builder.push_values(projected.iter(), |mut b, row| {
            for field in self.schema.fields() {
                b.push_bind(encode_value(row.get(field.as_str()).unwrap_or(&Value::Null)));
            }
            b.push_bind(now);
            b.push_bind(now);
        });
        builder.push(" RETURNING \"id\"");

        let ids: Vec<i64> = builder
            .build_query_scalar()
            .fetch_all(&mut *conn)
            .await
            .map_err(map_error)?;

        let rows: Vec<StoredRow> = ids
            .into_iter()
            .zip(projected)
            .map(|(id, fields)| StoredRow { id, fields })
            .collect();
        self.fire(&mut *conn, LifecycleEvent::AfterBulkCreate { rows: &rows }, ctx)
            .await?;
        Ok(rows)
    }

    // -- update ----------------------------------------------------------

    /// Updates one row by id. A row that no longer exists is a quiet no-op,
    /// not an error.
    pub async fn update(
        &self,
        id: i64,
        payload: &FieldMap,
        ctx: &TrackingContext,
    ) -> TrackerResult<Option<StoredRow>> {
        let mut conn = self.pool.acquire().await.map_err(map_error)?;
        self.update_on(&mut conn, id, payload, ctx).await
    }

    pub async fn update_in_tx(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        payload: &FieldMap,
        ctx: &TrackingContext,
    ) -> TrackerResult<Option<StoredRow>> {
        self.update_on(conn, id, payload, ctx).await
    }

    async fn update_on(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        payload: &FieldMap,
        ctx: &TrackingContext,
    ) -> TrackerResult<Option<StoredRow>> {
        let Some(previous) = self.load_by_id_on(&mut *conn, id).await? else {
            return Ok(None);
        };

        let changes = self.payload_fields(payload);
        let mut current = previous.fields.clone();
        for (field, value) in &changes {
            current.insert(field.clone(), value.clone());
        }

        self.fire(
            &mut *conn,
            LifecycleEvent::BeforeUpdate {
                previous: &previous,
                current: &current,
            },
            ctx,
        )
        .await?;

        let now = self.clock.now();
        let mut assignments: Vec<String> = changes
            .keys()
            .map(|field| format!("{} = ?", quote_ident(field)))
            .collect();
        assignments.push(format!("{} = ?", quote_ident("updated_at")));
        let sql = format!(
            "UPDATE {} SET {} WHERE \"id\" = ?",
            quote_ident(self.name()),
            assignments.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for value in changes.values() {
            query = query.bind(encode_value(value));
        }
        query = query.bind(now).bind(id);
        query.execute(&mut *conn).await.map_err(map_error)?;

        Ok(Some(StoredRow { id, fields: current }))
    }

    /// Updates every row matching the filter with one statement; returns
    /// the affected count.
    pub async fn bulk_update(
        &self,
        filter: &Filter,
        payload: &FieldMap,
        ctx: &TrackingContext,
    ) -> TrackerResult<u64> {
        let mut conn = self.pool.acquire().await.map_err(map_error)?;
        self.bulk_update_on(&mut conn, filter, payload, ctx).await
    }

    pub async fn bulk_update_in_tx(
        &self,
        conn: &mut SqliteConnection,
        filter: &Filter,
        payload: &FieldMap,
        ctx: &TrackingContext,
    ) -> TrackerResult<u64> {
        self.bulk_update_on(conn, filter, payload, ctx).await
    }

    async fn bulk_update_on(
        &self,
        conn: &mut SqliteConnection,
        filter: &Filter,
        payload: &FieldMap,
        ctx: &TrackingContext,
    ) -> TrackerResult<u64> {
        self.check_filter(filter)?;
        let changes = self.payload_fields(payload);
        // Nothing to write means nothing to record either.
        if changes.is_empty() {
            return Ok(0);
        }

        // Handlers read the pre-image here, before the statement below.
        self.fire(
            &mut *conn,
            LifecycleEvent::BeforeBulkUpdate {
                filter,
                payload: &changes,
            },
            ctx,
        )
        .await?;

        let now = self.clock.now();
        let mut assignments: Vec<String> = changes
            .keys()
            .map(|field| format!("{} = ?", quote_ident(field)))
            .collect();
        assignments.push(format!("{} = ?", quote_ident("updated_at")));
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote_ident(self.name()),
            assignments.join(", "),
            Self::where_clause(filter)
        );

        let mut query = sqlx::query(&sql);
        for value in changes.values() {
            query = query.bind(encode_value(value));
        }
        query = query.bind(now);
        for (_, value) in filter.conditions() {
            query = query.bind(encode_value(value));
        }
        let result = query.execute(&mut *conn).await.map_err(map_error)?;
        Ok(result.rows_affected())
    }

    // -- delete ----------------------------------------------------------

    /// Deletes one row by id; `false` when it was already gone.
    pub async fn delete(&self, id: i64, ctx: &TrackingContext) -> TrackerResult<bool> {
        let mut conn = self.pool.acquire().await.map_err(map_error)?;
        self.delete_on(&mut conn, id, ctx).await
    }

    pub async fn delete_in_tx(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        ctx: &TrackingContext,
    ) -> TrackerResult<bool> {
        self.delete_on(conn, id, ctx).await
    }

    async fn delete_on(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        ctx: &TrackingContext,
    ) -> TrackerResult<bool> {
        let Some(row) = self.load_by_id_on(&mut *conn, id).await? else {
            return Ok(false);
        };

        self.fire(&mut *conn, LifecycleEvent::BeforeDelete { row: &row }, ctx)
            .await?;

        let sql = format!("DELETE FROM {} WHERE \"id\" = ?", quote_ident(self.name()));
        sqlx::query(&sql)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(map_error)?;
        Ok(true)
    }

    pub async fn bulk_delete(&self, filter: &Filter, ctx: &TrackingContext) -> TrackerResult<u64> {
        let mut conn = self.pool.acquire().await.map_err(map_error)?;
        self.bulk_delete_on(&mut conn, filter, ctx).await
    }

    pub async fn bulk_delete_in_tx(
        &self,
        conn: &mut SqliteConnection,
        filter: &Filter,
        ctx: &TrackingContext,
    ) -> TrackerResult<u64> {
        self.bulk_delete_on(conn, filter, ctx).await
    }

    async fn bulk_delete_on(
        &self,
        conn: &mut SqliteConnection,
        filter: &Filter,
        ctx: &TrackingContext,
    ) -> TrackerResult<u64> {
        self.check_filter(filter)?;
        self.fire(&mut *conn, LifecycleEvent::BeforeBulkDelete { filter }, ctx)
            .await?;

        let sql = format!(
            "DELETE FROM {}{}",
            quote_ident(self.name()),
            Self::where_clause(filter)
        );
        let mut query = sqlx::query(&sql);
        for (_, value) in filter.conditions() {
            query = query.bind(encode_value(value));
        }
        let result = query.execute(&mut *conn).await.map_err(map_error)?;
        Ok(result.rows_affected())
    }

    // -- find ------------------------------------------------------------

    pub async fn find(
        &self,
        filter: &Filter,
        ctx: &TrackingContext,
    ) -> TrackerResult<Vec<StoredRow>> {
        let mut conn = self.pool.acquire().await.map_err(map_error)?;
        self.find_on(&mut conn, filter, ctx).await
    }

    pub async fn find_in_tx(
        &self,
        conn: &mut SqliteConnection,
        filter: &Filter,
        ctx: &TrackingContext,
    ) -> TrackerResult<Vec<StoredRow>> {
        self.find_on(conn, filter, ctx).await
    }

    async fn find_on(
        &self,
        conn: &mut SqliteConnection,
        filter: &Filter,
        ctx: &TrackingContext,
    ) -> TrackerResult<Vec<StoredRow>> {
        let rows = self.load_matching_on(&mut *conn, filter).await?;
        self.fire(&mut *conn, LifecycleEvent::AfterFind { rows: &rows }, ctx)
            .await?;
        Ok(rows)
    }

    pub async fn find_by_id(
        &self,
        id: i64,
        ctx: &TrackingContext,
    ) -> TrackerResult<Option<StoredRow>> {
        let mut conn = self.pool.acquire().await.map_err(map_error)?;
        self.find_by_id_on(&mut conn, id, ctx).await
    }

    pub async fn find_by_id_in_tx(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        ctx: &TrackingContext,
    ) -> TrackerResult<Option<StoredRow>> {
        self.find_by_id_on(conn, id, ctx).await
    }

    async fn find_by_id_on(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        ctx: &TrackingContext,
    ) -> TrackerResult<Option<StoredRow>> {
        let Some(row) = self.load_by_id_on(&mut *conn, id).await? else {
            return Ok(None);
        };
        self.fire(
            &mut *conn,
            LifecycleEvent::AfterFind {
                rows: std::slice::from_ref(&row),
            },
            ctx,
        )
        .await?;
        Ok(Some(row))
    }
}

#[async_trait]
impl RowLoader for Model {
    fn schema(&self) -> &EntitySchema {
        self.schema()
    }

    async fn load_matching(
        &self,
        conn: &mut SqliteConnection,
        filter: &Filter,
    ) -> TrackerResult<Vec<StoredRow>> {
        self.load_matching_on(conn, filter).await
    }
}
