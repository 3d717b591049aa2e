// ABOUTME: Environment-only configuration for the commerce server core
// ABOUTME: Reads DATABASE_URL and logging settings with sensible defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Configuration management. Environment-only: there are no config files, every
//! knob is an environment variable with a default that works for development.

use crate::errors::{AppError, AppResult};
use std::env;

/// Default SQLite database location for development
const DEFAULT_DATABASE_URL: &str = "sqlite:./data/commerce.db";

/// Server configuration resolved from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Database connection string (`sqlite:` URLs)
    pub database_url: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is set but empty or uses a scheme
    /// other than `sqlite:`.
    pub fn from_env() -> AppResult<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into());

        if database_url.is_empty() {
            return Err(AppError::config("DATABASE_URL must not be empty"));
        }
        if !database_url.starts_with("sqlite:") {
            return Err(AppError::config(format!(
                "Unsupported DATABASE_URL scheme: {database_url}"
            )));
        }

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".into());

        Ok(Self {
            database_url,
            log_level,
        })
    }
}
