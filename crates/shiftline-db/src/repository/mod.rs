//! # Repository Module
//!
//! Data access for every persisted entity.
//!
//! ## Two Calling Styles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Reads outside a transaction:                                          │
//! │      db.orders().list_for_shift(&shift_id).await?                       │
//! │          └── repository holds a pool clone, acquires per call          │
//! │                                                                         │
//! │  Writes inside the engine's transaction:                               │
//! │      let mut tx = db.begin().await?;                                   │
//! │      CounterRepository::next_value(&mut tx, &scope).await?;             │
//! │      OrderRepository::insert(&mut tx, &order).await?;                   │
//! │      tx.commit().await?;                                               │
//! │          └── associated fns take `&mut SqliteConnection`               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod counter;
pub mod courier;
pub mod order;
pub mod shift;

use sqlx::{QueryBuilder, Sqlite};

/// Appends `(?, ?, ...)` binding every id.
pub(crate) fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");
}
