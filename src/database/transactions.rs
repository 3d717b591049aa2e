// ABOUTME: Transaction management with an RAII guard for multi-row mutations
// ABOUTME: Guarantees automatic rollback on drop when commit was not reached
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Transaction management with RAII guards
//!
//! `TransactionGuard` wraps a `SQLx` transaction and ensures database
//! transactions are properly handled:
//! - Automatic rollback on drop if not explicitly committed
//! - Type-safe commit that consumes the guard
//!
//! ## Example Usage
//!
//! ```text
//! let tx = pool.begin().await?;
//! let mut guard = TransactionGuard::new(tx);
//!
//! sqlx::query("INSERT INTO products ...").execute(guard.executor()?).await?;
//! sqlx::query("INSERT INTO product_options ...").execute(guard.executor()?).await?;
//!
//! // Explicit commit - if this line isn't reached, the transaction rolls back
//! guard.commit().await?;
//! ```

use sqlx::{Database, Transaction};
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};

/// RAII guard for database transactions ensuring automatic rollback on drop
pub struct TransactionGuard<'c, DB: Database> {
    transaction: Option<Transaction<'c, DB>>,
    committed: bool,
}

impl<'c, DB: Database> TransactionGuard<'c, DB> {
    /// Create a new transaction guard from an existing `SQLx` transaction
    #[must_use]
    pub fn new(transaction: Transaction<'c, DB>) -> Self {
        debug!("TransactionGuard created - transaction will auto-rollback if not committed");
        Self {
            transaction: Some(transaction),
            committed: false,
        }
    }

    /// Commit the transaction and consume the guard
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction was already consumed or the
    /// database commit operation fails.
    pub async fn commit(mut self) -> AppResult<()> {
        match self.transaction.take() {
            Some(tx) => {
                tx.commit()
                    .await
                    .map_err(|e| AppError::database(format!("Transaction commit failed: {e}")))?;
                self.committed = true;
                debug!("TransactionGuard committed successfully");
                Ok(())
            }
            None => Err(AppError::internal(
                "Transaction already consumed - cannot commit",
            )),
        }
    }

    /// Explicitly rollback the transaction and consume the guard
    ///
    /// While dropping the guard without committing will also rollback, this
    /// method allows explicit rollback with error handling.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback operation fails.
    pub async fn rollback(mut self) -> AppResult<()> {
        match self.transaction.take() {
            Some(tx) => {
                tx.rollback()
                    .await
                    .map_err(|e| AppError::database(format!("Transaction rollback failed: {e}")))?;
                debug!("TransactionGuard rolled back explicitly");
                Ok(())
            }
            None => Err(AppError::internal(
                "Transaction already consumed - cannot rollback",
            )),
        }
    }

    /// Check if the transaction has been committed
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }

    /// Get a mutable reference to the underlying connection for executing queries
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction has already been committed or
    /// rolled back - a programming error where the guard is used after being
    /// consumed.
    pub fn executor(&mut self) -> AppResult<&mut <DB as Database>::Connection> {
        self.transaction.as_deref_mut().ok_or_else(|| {
            AppError::internal("Transaction already consumed - guard used after commit/rollback")
        })
    }
}

impl<DB: Database> Drop for TransactionGuard<'_, DB> {
    fn drop(&mut self) {
        if self.transaction.is_some() && !self.committed {
            // SQLx rolls the transaction back when it is dropped; log it for
            // observability
            warn!(
                "TransactionGuard dropped without commit - transaction will be rolled back automatically"
            );
        }
    }
}

/// Type alias for `SQLite` transaction guard
pub type SqliteTransactionGuard<'c> = TransactionGuard<'c, sqlx::Sqlite>;
