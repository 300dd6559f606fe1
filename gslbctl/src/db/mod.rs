//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL (or a distributed SQL
//! engine speaking its protocol).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers)
//! └──────┬──────┘
//!        │  TransactionExecutor (plain or retrying)
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries, lifecycle transitions, cascade)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - requests and responses)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database request/response structures
//! - [`errors`]: Database-specific error types
//! - [`transaction`]: Running units of work with or without retries
//!
//! # Migrations
//!
//! Database migrations are managed by SQLx and located in the `migrations/` directory.
//! The [`crate::migrator`] function provides access to the migrator:
//!
//! ```ignore
//! gslbctl::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
pub mod transaction;
