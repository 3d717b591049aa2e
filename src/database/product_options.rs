// ABOUTME: Database operations for configurable product options and their values
// ABOUTME: Implements the full-sync reconciler plus the dedicated single-option endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Configurable product options.
//!
//! A product owns an ordered set of options (radio, dropdown, number,
//! checkbox), each with child values carrying price modifiers. A product
//! write may carry a full target option list; the reconciler makes the
//! persisted set match it - insert new, full-overwrite existing, soft-delete
//! missing, restore reappearing - on the caller's transaction so the whole
//! mutation commits or rolls back as one unit.

use crate::database::transactions::TransactionGuard;
use crate::database::{parse_decimal, parse_decimal_opt, Database, LIVE};
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

impl Database {
    /// Create the product option tables
    pub(super) async fn migrate_product_options(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS product_options (
                id TEXT PRIMARY KEY,
                product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                type TEXT NOT NULL CHECK (type IN ('radio', 'dropdown', 'number', 'checkbox')),
                is_required INTEGER NOT NULL DEFAULT 0,
                min_value INTEGER,
                max_value INTEGER,
                price_per_unit TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                deleted_at DATETIME
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS product_option_values (
                id TEXT PRIMARY KEY,
                product_option_id TEXT NOT NULL REFERENCES product_options(id) ON DELETE CASCADE,
                label TEXT NOT NULL,
                value TEXT NOT NULL,
                price_modifier TEXT NOT NULL DEFAULT '0',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                deleted_at DATETIME
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_product_options_product ON product_options(product_id)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_option_values_option ON product_option_values(product_option_id)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

/// How an option's values are selected and priced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Single choice rendered as radio buttons
    Radio,
    /// Single choice rendered as a dropdown
    Dropdown,
    /// Free quantity priced per unit within optional bounds
    Number,
    /// Multiple choices, each adding its modifier
    Checkbox,
}

impl OptionType {
    /// Convert to database string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Radio => "radio",
            Self::Dropdown => "dropdown",
            Self::Number => "number",
            Self::Checkbox => "checkbox",
        }
    }

    /// Parse from database string representation
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown type string
    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "radio" => Ok(Self::Radio),
            "dropdown" => Ok(Self::Dropdown),
            "number" => Ok(Self::Number),
            "checkbox" => Ok(Self::Checkbox),
            other => Err(AppError::database(format!("Unknown option type: {other}"))),
        }
    }

    /// Whether this type carries predefined values (radio/dropdown/checkbox)
    #[must_use]
    pub const fn has_values(&self) -> bool {
        !matches!(self, Self::Number)
    }
}

/// One configurable dimension of a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductOption {
    /// Unique identifier
    pub id: Uuid,
    /// Owning product
    pub product_id: Uuid,
    /// Display name (e.g. Size, Flower Count)
    pub name: String,
    /// Selection/pricing behaviour
    #[serde(rename = "type")]
    pub option_type: OptionType,
    /// Whether an order must select this option
    pub is_required: bool,
    /// Lower quantity bound, meaningful for `number` only
    pub min_value: Option<i64>,
    /// Upper quantity bound, meaningful for `number` only
    pub max_value: Option<i64>,
    /// Price per unit of quantity, meaningful for `number` only
    pub price_per_unit: Option<Decimal>,
    /// Live child values; always empty for `number` options
    pub values: Vec<OptionValue>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Soft-delete tombstone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One selectable choice under an option
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionValue {
    /// Unique identifier
    pub id: Uuid,
    /// Owning option
    pub product_option_id: Uuid,
    /// Display text
    pub label: String,
    /// Underlying token, defaults to the label
    pub value: String,
    /// Additive price modifier applied when selected
    pub price_modifier: Decimal,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Soft-delete tombstone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Target state for one option in a full-sync payload.
///
/// An `id` refers to an existing row to overwrite-and-restore; without one a
/// new row is created. Scalar fields are a full overwrite per option - absent
/// optional fields become null, not "unchanged".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSpec {
    /// Existing option identity, if any
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Display name
    pub name: String,
    /// Selection/pricing behaviour
    #[serde(rename = "type")]
    pub option_type: OptionType,
    /// Whether an order must select this option
    #[serde(default)]
    pub is_required: bool,
    /// Lower quantity bound for `number` options
    #[serde(default)]
    pub min_value: Option<i64>,
    /// Upper quantity bound for `number` options
    #[serde(default)]
    pub max_value: Option<i64>,
    /// Price per unit for `number` options
    #[serde(default)]
    pub price_per_unit: Option<Decimal>,
    /// Target child values
    #[serde(default)]
    pub values: Vec<ValueSpec>,
}

/// Target state for one value in a full-sync payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSpec {
    /// Existing value identity, if any
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Display text
    pub label: String,
    /// Underlying token; defaults to the label when absent
    #[serde(default)]
    pub value: Option<String>,
    /// Additive price modifier; defaults to zero when absent
    #[serde(default)]
    pub price_modifier: Option<Decimal>,
}

impl OptionSpec {
    /// Validate spec fields before any write
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty names, negative bounds or
    /// negative prices.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::missing_field("options.name"));
        }
        if self.min_value.is_some_and(|v| v < 0) || self.max_value.is_some_and(|v| v < 0) {
            return Err(AppError::invalid_input(
                "Option bounds must not be negative",
            ));
        }
        if self.price_per_unit.is_some_and(|p| p < Decimal::ZERO) {
            return Err(AppError::invalid_input(
                "Option price_per_unit must not be negative",
            ));
        }
        for value in &self.values {
            value.validate()?;
        }
        Ok(())
    }
}

impl ValueSpec {
    /// Validate spec fields before any write
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty label or negative modifier.
    pub fn validate(&self) -> AppResult<()> {
        if self.label.trim().is_empty() {
            return Err(AppError::missing_field("values.label"));
        }
        if self.price_modifier.is_some_and(|p| p < Decimal::ZERO) {
            return Err(AppError::invalid_input(
                "Value price_modifier must not be negative",
            ));
        }
        Ok(())
    }
}

// ─── Reconciler ──────────────────────────────────────────────────────────

/// Synchronize a product's persisted options to a target list.
///
/// Runs on the caller's transaction connection; nothing is durable until the
/// enclosing transaction commits. Options currently live but absent from the
/// target id set are soft-deleted (values first - values must not outlive
/// their parent as live rows). Specs carrying an id restore-and-overwrite the
/// addressed row; specs without create new rows. Each option's values are
/// reconciled recursively with the same algorithm.
///
/// # Errors
///
/// Returns `ResourceNotFound` for an id that resolves to no row at all,
/// `OwnershipViolation` for an id owned by a different product, or a
/// database error. Either failure aborts the whole sync.
pub(crate) async fn sync_options(
    conn: &mut SqliteConnection,
    product_id: Uuid,
    specs: &[OptionSpec],
) -> AppResult<()> {
    let incoming: HashSet<Uuid> = specs.iter().filter_map(|spec| spec.id).collect();
    let now = Utc::now();

    let query = format!("SELECT id FROM product_options WHERE product_id = $1 AND {LIVE}");
    let live_ids: Vec<String> = sqlx::query_scalar(&query)
        .bind(product_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::database(format!("Failed to load product options: {e}")))?;

    for raw_id in live_ids {
        let option_id = Uuid::parse_str(&raw_id)
            .map_err(|e| AppError::database(format!("Invalid option id: {e}")))?;
        if !incoming.contains(&option_id) {
            soft_delete_option(conn, option_id, now).await?;
        }
    }

    for spec in specs {
        let option_id = match spec.id {
            Some(id) => {
                let owner = fetch_option_owner_any(conn, id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Product option"))?;
                if owner != product_id {
                    return Err(AppError::ownership(format!(
                        "Option {id} belongs to a different product"
                    )));
                }
                restore_and_overwrite_option(conn, id, spec, now).await?;
                id
            }
            None => insert_option(conn, product_id, spec, now).await?,
        };

        sync_option_values(conn, option_id, &spec.values).await?;
    }

    Ok(())
}

/// Synchronize an option's persisted values to a target list.
///
/// Same shape as [`sync_options`] one level down: soft-delete values missing
/// from the target id set, restore-and-overwrite addressed rows, insert the
/// rest. `value` defaults to `label` and `price_modifier` to zero.
///
/// # Errors
///
/// Returns `ResourceNotFound` / `OwnershipViolation` on bad ids, or a
/// database error.
pub(crate) async fn sync_option_values(
    conn: &mut SqliteConnection,
    option_id: Uuid,
    specs: &[ValueSpec],
) -> AppResult<()> {
    let incoming: HashSet<Uuid> = specs.iter().filter_map(|spec| spec.id).collect();
    let now = Utc::now();

    let query =
        format!("SELECT id FROM product_option_values WHERE product_option_id = $1 AND {LIVE}");
    let live_ids: Vec<String> = sqlx::query_scalar(&query)
        .bind(option_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::database(format!("Failed to load option values: {e}")))?;

    for raw_id in live_ids {
        let value_id = Uuid::parse_str(&raw_id)
            .map_err(|e| AppError::database(format!("Invalid value id: {e}")))?;
        if !incoming.contains(&value_id) {
            sqlx::query(
                "UPDATE product_option_values SET deleted_at = $2, updated_at = $2 WHERE id = $1",
            )
            .bind(value_id.to_string())
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::database(format!("Failed to soft-delete value: {e}")))?;
        }
    }

    for spec in specs {
        match spec.id {
            Some(id) => {
                let owner = fetch_value_owner_any(conn, id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Option value"))?;
                if owner != option_id {
                    return Err(AppError::ownership(format!(
                        "Value {id} belongs to a different option"
                    )));
                }
                sqlx::query(
                    r"
                    UPDATE product_option_values SET
                        label = $2, value = $3, price_modifier = $4,
                        deleted_at = NULL, updated_at = $5
                    WHERE id = $1
                    ",
                )
                .bind(id.to_string())
                .bind(&spec.label)
                .bind(spec.value.as_deref().unwrap_or(&spec.label))
                .bind(spec.price_modifier.unwrap_or(Decimal::ZERO).to_string())
                .bind(now)
                .execute(&mut *conn)
                .await
                .map_err(|e| AppError::database(format!("Failed to update value: {e}")))?;
            }
            None => {
                insert_value(conn, option_id, spec, now).await?;
            }
        }
    }

    Ok(())
}

/// Soft-delete an option, cascading to its live values first
async fn soft_delete_option(
    conn: &mut SqliteConnection,
    option_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let query = format!(
        "UPDATE product_option_values SET deleted_at = $2, updated_at = $2
         WHERE product_option_id = $1 AND {LIVE}"
    );
    sqlx::query(&query)
        .bind(option_id.to_string())
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database(format!("Failed to soft-delete option values: {e}")))?;

    sqlx::query("UPDATE product_options SET deleted_at = $2, updated_at = $2 WHERE id = $1")
        .bind(option_id.to_string())
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database(format!("Failed to soft-delete option: {e}")))?;

    Ok(())
}

/// Overwrite every scalar field of an option from a spec and clear its tombstone
async fn restore_and_overwrite_option(
    conn: &mut SqliteConnection,
    option_id: Uuid,
    spec: &OptionSpec,
    now: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        r"
        UPDATE product_options SET
            name = $2, type = $3, is_required = $4, min_value = $5,
            max_value = $6, price_per_unit = $7, deleted_at = NULL, updated_at = $8
        WHERE id = $1
        ",
    )
    .bind(option_id.to_string())
    .bind(&spec.name)
    .bind(spec.option_type.as_str())
    .bind(spec.is_required)
    .bind(spec.min_value)
    .bind(spec.max_value)
    .bind(spec.price_per_unit.map(|p| p.to_string()))
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::database(format!("Failed to update option: {e}")))?;

    Ok(())
}

/// Insert a new option row from a spec, returning its id
pub(crate) async fn insert_option(
    conn: &mut SqliteConnection,
    product_id: Uuid,
    spec: &OptionSpec,
    now: DateTime<Utc>,
) -> AppResult<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r"
        INSERT INTO product_options (
            id, product_id, name, type, is_required, min_value, max_value,
            price_per_unit, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
        ",
    )
    .bind(id.to_string())
    .bind(product_id.to_string())
    .bind(&spec.name)
    .bind(spec.option_type.as_str())
    .bind(spec.is_required)
    .bind(spec.min_value)
    .bind(spec.max_value)
    .bind(spec.price_per_unit.map(|p| p.to_string()))
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::database(format!("Failed to create option: {e}")))?;

    Ok(id)
}

/// Insert a new value row from a spec, returning its id
pub(crate) async fn insert_value(
    conn: &mut SqliteConnection,
    option_id: Uuid,
    spec: &ValueSpec,
    now: DateTime<Utc>,
) -> AppResult<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r"
        INSERT INTO product_option_values (
            id, product_option_id, label, value, price_modifier, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $6)
        ",
    )
    .bind(id.to_string())
    .bind(option_id.to_string())
    .bind(&spec.label)
    .bind(spec.value.as_deref().unwrap_or(&spec.label))
    .bind(spec.price_modifier.unwrap_or(Decimal::ZERO).to_string())
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::database(format!("Failed to create option value: {e}")))?;

    Ok(id)
}

/// Look up an option's owning product, including soft-deleted rows
async fn fetch_option_owner_any(
    conn: &mut SqliteConnection,
    option_id: Uuid,
) -> AppResult<Option<Uuid>> {
    let raw: Option<String> =
        sqlx::query_scalar("SELECT product_id FROM product_options WHERE id = $1")
            .bind(option_id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| AppError::database(format!("Failed to look up option: {e}")))?;

    raw.map(|p| {
        Uuid::parse_str(&p).map_err(|e| AppError::database(format!("Invalid product id: {e}")))
    })
    .transpose()
}

/// Look up a value's owning option, including soft-deleted rows
async fn fetch_value_owner_any(
    conn: &mut SqliteConnection,
    value_id: Uuid,
) -> AppResult<Option<Uuid>> {
    let raw: Option<String> =
        sqlx::query_scalar("SELECT product_option_id FROM product_option_values WHERE id = $1")
            .bind(value_id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| AppError::database(format!("Failed to look up option value: {e}")))?;

    raw.map(|p| {
        Uuid::parse_str(&p).map_err(|e| AppError::database(format!("Invalid option id: {e}")))
    })
    .transpose()
}

/// Fetch a product's live options with their live values, in persisted
/// insertion order. `number` options present an empty values list regardless
/// of stored rows.
pub(crate) async fn fetch_live_options(
    conn: &mut SqliteConnection,
    product_id: Uuid,
) -> AppResult<Vec<ProductOption>> {
    let query = format!(
        r"
        SELECT id, product_id, name, type, is_required, min_value, max_value,
               price_per_unit, created_at, updated_at, deleted_at
        FROM product_options
        WHERE product_id = $1 AND {LIVE}
        ORDER BY created_at ASC, id ASC
        "
    );
    let rows = sqlx::query(&query)
        .bind(product_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::database(format!("Failed to load product options: {e}")))?;

    let mut options = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut option = row_to_option(row)?;
        if option.option_type.has_values() {
            option.values = fetch_live_values(conn, option.id).await?;
        }
        options.push(option);
    }

    Ok(options)
}

/// Fetch an option's live values in persisted insertion order
pub(crate) async fn fetch_live_values(
    conn: &mut SqliteConnection,
    option_id: Uuid,
) -> AppResult<Vec<OptionValue>> {
    let query = format!(
        r"
        SELECT id, product_option_id, label, value, price_modifier, created_at, updated_at, deleted_at
        FROM product_option_values
        WHERE product_option_id = $1 AND {LIVE}
        ORDER BY created_at ASC, id ASC
        "
    );
    let rows = sqlx::query(&query)
        .bind(option_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::database(format!("Failed to load option values: {e}")))?;

    rows.iter().map(row_to_value).collect()
}

/// Convert a database row to a [`ProductOption`] with an empty values list
fn row_to_option(row: &SqliteRow) -> AppResult<ProductOption> {
    let id: String = row.get("id");
    let product_id: String = row.get("product_id");
    let option_type: String = row.get("type");
    let price_per_unit: Option<String> = row.get("price_per_unit");

    Ok(ProductOption {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::database(format!("Invalid option id: {e}")))?,
        product_id: Uuid::parse_str(&product_id)
            .map_err(|e| AppError::database(format!("Invalid product id: {e}")))?,
        name: row.get("name"),
        option_type: OptionType::parse(&option_type)?,
        is_required: row.get("is_required"),
        min_value: row.get("min_value"),
        max_value: row.get("max_value"),
        price_per_unit: parse_decimal_opt(price_per_unit.as_deref(), "price_per_unit")?,
        values: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    })
}

/// Convert a database row to an [`OptionValue`]
fn row_to_value(row: &SqliteRow) -> AppResult<OptionValue> {
    let id: String = row.get("id");
    let option_id: String = row.get("product_option_id");
    let price_modifier: String = row.get("price_modifier");

    Ok(OptionValue {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::database(format!("Invalid value id: {e}")))?,
        product_option_id: Uuid::parse_str(&option_id)
            .map_err(|e| AppError::database(format!("Invalid option id: {e}")))?,
        label: row.get("label"),
        value: row.get("value"),
        price_modifier: parse_decimal(&price_modifier, "price_modifier")?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    })
}

// ─── Single-option endpoints ─────────────────────────────────────────────

/// Request to create one option under a product
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOptionRequest {
    /// Display name
    pub name: String,
    /// Selection/pricing behaviour
    #[serde(rename = "type")]
    pub option_type: OptionType,
    /// Whether an order must select this option
    #[serde(default)]
    pub is_required: bool,
    /// Lower quantity bound for `number` options
    #[serde(default)]
    pub min_value: Option<i64>,
    /// Upper quantity bound for `number` options
    #[serde(default)]
    pub max_value: Option<i64>,
    /// Price per unit for `number` options
    #[serde(default)]
    pub price_per_unit: Option<Decimal>,
    /// Initial values; ids are not accepted here, every row is new
    #[serde(default)]
    pub values: Vec<ValueSpec>,
}

/// Partial patch for one option. `None` fields are left unchanged - contrast
/// with the reconciler's full-overwrite-per-option semantics. A present
/// `values` key (even null) runs value reconciliation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOptionRequest {
    /// New display name
    #[serde(default)]
    pub name: Option<String>,
    /// New type
    #[serde(default, rename = "type")]
    pub option_type: Option<OptionType>,
    /// New required flag
    #[serde(default)]
    pub is_required: Option<bool>,
    /// New lower bound
    #[serde(default)]
    pub min_value: Option<i64>,
    /// New upper bound
    #[serde(default)]
    pub max_value: Option<i64>,
    /// New price per unit
    #[serde(default)]
    pub price_per_unit: Option<Decimal>,
    /// Target values when present; null means delete all
    #[serde(default, deserialize_with = "crate::utils::double_option")]
    pub values: Option<Option<Vec<ValueSpec>>>,
}

/// Option database operations manager for the dedicated per-option endpoints.
///
/// Each operation is its own small atomic unit, independent of any
/// product-level full sync (concurrent full-syncs are not reconciled against
/// these calls).
pub struct OptionsManager {
    pool: SqlitePool,
}

impl OptionsManager {
    /// Create a new options manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List a product's live options with values
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the product is missing or soft-deleted,
    /// or a database error.
    pub async fn list(&self, product_id: Uuid) -> AppResult<Vec<ProductOption>> {
        self.ensure_product_exists(product_id).await?;

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::database(format!("Failed to acquire connection: {e}")))?;
        fetch_live_options(&mut conn, product_id).await
    }

    /// Create one option (with initial values) under a product
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for a missing product, a validation error
    /// for bad fields, or a database error.
    pub async fn create(
        &self,
        product_id: Uuid,
        request: &CreateOptionRequest,
    ) -> AppResult<ProductOption> {
        self.ensure_product_exists(product_id).await?;

        let spec = OptionSpec {
            id: None,
            name: request.name.clone(),
            option_type: request.option_type,
            is_required: request.is_required,
            min_value: request.min_value,
            max_value: request.max_value,
            price_per_unit: request.price_per_unit,
            // ids are not accepted on creation - strip them so every row is new
            values: request
                .values
                .iter()
                .map(|v| ValueSpec {
                    id: None,
                    ..v.clone()
                })
                .collect(),
        };
        spec.validate()?;

        let now = Utc::now();
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;
        let mut guard = TransactionGuard::new(tx);

        let option_id = insert_option(guard.executor()?, product_id, &spec, now).await?;
        for value_spec in &spec.values {
            insert_value(guard.executor()?, option_id, value_spec, now).await?;
        }

        guard.commit().await?;

        self.get(product_id, option_id).await
    }

    /// Get one live option owned by a product, with its live values
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if no live option matches, or
    /// `OwnershipViolation` when the option exists under another product.
    pub async fn get(&self, product_id: Uuid, option_id: Uuid) -> AppResult<ProductOption> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::database(format!("Failed to acquire connection: {e}")))?;

        let query = format!(
            r"
            SELECT id, product_id, name, type, is_required, min_value, max_value,
                   price_per_unit, created_at, updated_at, deleted_at
            FROM product_options
            WHERE id = $1 AND {LIVE}
            "
        );
        let row = sqlx::query(&query)
            .bind(option_id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| AppError::database(format!("Failed to get option: {e}")))?
            .ok_or_else(|| AppError::not_found("Product option"))?;

        let mut option = row_to_option(&row)?;
        if option.product_id != product_id {
            return Err(AppError::ownership(format!(
                "Option {option_id} belongs to a different product"
            )));
        }
        if option.option_type.has_values() {
            option.values = fetch_live_values(&mut conn, option.id).await?;
        }

        Ok(option)
    }

    /// Patch one option, optionally reconciling its values
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` / `OwnershipViolation` for a bad target, a
    /// validation error for bad fields, or a database error.
    pub async fn update(
        &self,
        product_id: Uuid,
        option_id: Uuid,
        request: &UpdateOptionRequest,
    ) -> AppResult<ProductOption> {
        let current = self.get(product_id, option_id).await?;

        let merged = OptionSpec {
            id: Some(option_id),
            name: request.name.clone().unwrap_or(current.name),
            option_type: request.option_type.unwrap_or(current.option_type),
            is_required: request.is_required.unwrap_or(current.is_required),
            min_value: request.min_value.or(current.min_value),
            max_value: request.max_value.or(current.max_value),
            price_per_unit: request.price_per_unit.or(current.price_per_unit),
            values: Vec::new(),
        };
        merged.validate()?;
        if let Some(values) = request.values.as_ref().and_then(Option::as_ref) {
            for value in values {
                value.validate()?;
            }
        }

        let now = Utc::now();
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;
        let mut guard = TransactionGuard::new(tx);

        restore_and_overwrite_option(guard.executor()?, option_id, &merged, now).await?;

        if let Some(values) = &request.values {
            let target = values.clone().unwrap_or_default();
            sync_option_values(guard.executor()?, option_id, &target).await?;
        }

        guard.commit().await?;

        self.get(product_id, option_id).await
    }

    /// Hard-delete one option together with all of its values, tombstoned or
    /// not - the cascade is total
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` / `OwnershipViolation` for a bad target, or
    /// a database error.
    pub async fn delete(&self, product_id: Uuid, option_id: Uuid) -> AppResult<()> {
        self.get(product_id, option_id).await?;

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;
        let mut guard = TransactionGuard::new(tx);

        sqlx::query("DELETE FROM product_option_values WHERE product_option_id = $1")
            .bind(option_id.to_string())
            .execute(guard.executor()?)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete option values: {e}")))?;

        sqlx::query("DELETE FROM product_options WHERE id = $1")
            .bind(option_id.to_string())
            .execute(guard.executor()?)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete option: {e}")))?;

        guard.commit().await?;

        Ok(())
    }

    /// Verify the product exists and is live
    async fn ensure_product_exists(&self, product_id: Uuid) -> AppResult<()> {
        let query = format!("SELECT COUNT(*) FROM products WHERE id = $1 AND {LIVE}");
        let count: i64 = sqlx::query_scalar(&query)
            .bind(product_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to check product: {e}")))?;

        if count == 0 {
            return Err(AppError::not_found("Product"));
        }
        Ok(())
    }
}
