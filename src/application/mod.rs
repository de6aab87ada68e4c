// src/application/mod.rs
pub mod binding;
pub mod diff;
pub mod policy;
pub mod ports;
pub mod record;
pub mod tracker;

pub use binding::bind;
