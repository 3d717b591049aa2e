// ABOUTME: Main library entry point for the commerce administration and storefront core
// ABOUTME: Exposes catalog, option reconciliation, pricing and order managers over SQLite
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Atelier Commerce
//!
//! The transactional core of an e-commerce administration and storefront API:
//! products with configurable purchase options, categories, images, pricing
//! and orders over a relational store.
//!
//! The centrepiece is the option reconciliation subsystem: a product owns an
//! ordered set of options (radio, dropdown, number, checkbox), each with
//! child values carrying price modifiers. A product write may carry a full
//! target option list, and the persisted set is synchronized to match -
//! insert new, overwrite existing, soft-delete missing, restore reappearing -
//! inside one atomic transaction with the product row write itself.
//!
//! HTTP routing, request decoding, session authentication and file storage
//! are collaborators layered on top; this crate exposes the managers they
//! call.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use atelier_commerce::database::Database;
//! use atelier_commerce::database::products::ProductsManager;
//! use atelier_commerce::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let db = Database::new("sqlite:./data/commerce.db").await?;
//!     let products = ProductsManager::new(db.pool().clone());
//!
//!     let listing = products.list(&Default::default()).await?;
//!     println!("{} products", listing.len());
//!
//!     Ok(())
//! }
//! ```

/// Environment-only configuration management
pub mod config;

/// Database pool, migrations and per-resource managers
pub mod database;

/// Unified error handling system with standard error codes and HTTP statuses
pub mod errors;

/// Logging configuration and structured output
pub mod logging;

/// Price resolution for products and order lines
pub mod pricing;

/// Utility functions and helpers
pub mod utils;
