//! Persistence for templates and their flat section rows.
//!
//! Query functions are generic over [`sqlx::PgExecutor`] so the same call
//! works against the pool or inside a caller-owned transaction.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
