// src/infrastructure/mod.rs
pub mod database;
pub mod log_store;
pub mod sql;
pub mod store;
pub mod time;

pub use log_store::LogHandle;
pub use store::{Model, SqlStore};
