// ABOUTME: Database management for the commerce core
// ABOUTME: Owns the SQLite pool, schema migrations and the shared live-row predicate
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Database Management
//!
//! This module provides database functionality for the commerce server core:
//! the connection pool, schema migrations, and the per-resource managers for
//! categories, products, product options, images and orders.

pub mod categories;
pub mod images;
pub mod orders;
pub mod product_options;
pub mod products;
pub mod transactions;

use crate::errors::{AppError, AppResult};
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::str::FromStr;

/// SQL predicate selecting live (not soft-deleted) rows.
///
/// Soft-deletable tables carry a `deleted_at` tombstone; every live read path
/// must filter through this single fragment rather than re-spelling it.
pub(crate) const LIVE: &str = "deleted_at IS NULL";

/// Database manager for the commerce schema
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or a
    /// migration fails.
    pub async fn new(database_url: &str) -> AppResult<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };

        let pool = SqlitePool::connect(&connection_options).await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails.
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_categories().await?;
        self.migrate_products().await?;
        self.migrate_product_options().await?;
        self.migrate_images().await?;
        self.migrate_orders().await?;

        Ok(())
    }
}

/// Parse a decimal stored as TEXT, naming the column on failure
pub(crate) fn parse_decimal(raw: &str, column: &str) -> AppResult<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| AppError::database(format!("Invalid decimal in column {column}: {e}")))
}

/// Parse an optional decimal TEXT column
pub(crate) fn parse_decimal_opt(raw: Option<&str>, column: &str) -> AppResult<Option<Decimal>> {
    raw.map(|value| parse_decimal(value, column)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) async fn create_test_db() -> AppResult<Database> {
        // In-memory database - each connection gets its own isolated instance
        Database::new("sqlite::memory:").await
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_migrations_are_idempotent() {
        let db = create_test_db().await.unwrap();
        assert!(db.migrate().await.is_ok());
    }
}
