//! # shiftline-db: Database Layer for Shiftline
//!
//! SQLite persistence for shifts, cashboxes, orders, couriers and the
//! catalog mirror, using sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shiftline Data Flow                              │
//! │                                                                         │
//! │  Engine operation (create_order, assign, settle, close_shift)          │
//! │       │  opens ONE transaction per operation                           │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  shiftline-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ShiftRepo     │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo     │    │ 001_initial  │  │   │
//! │  │   │ begin() → tx  │    │ CounterRepo   │    │   _schema    │  │   │
//! │  │   │               │    │ CourierRepo   │    │              │  │   │
//! │  │   │               │    │ CatalogRepo   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shiftline_db::{Database, DbConfig, ShiftRepository};
//!
//! let db = Database::new(DbConfig::new("shiftline.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! let shift = ShiftRepository::ensure_open(&mut tx, "tenant", "branch", "user").await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::counter::{CounterRepository, CounterScope};
pub use repository::courier::CourierRepository;
pub use repository::order::{OrderFilter, OrderRepository};
pub use repository::shift::ShiftRepository;
