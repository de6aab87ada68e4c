// src/application/ports/mod.rs
pub mod hooks;
pub mod store;
pub mod time;
