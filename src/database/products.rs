// ABOUTME: Database operations for products and the transactional product mutation boundary
// ABOUTME: Create/update/duplicate span the product row and the option reconciler in one transaction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Products.
//!
//! The mutation boundary wraps product create/update/duplicate plus the full
//! option reconciliation in one atomic transaction, so a partial failure can
//! never leave options and the parent product inconsistent. Scalar updates
//! are a partial patch; the option list, when present, is a full sync - the
//! asymmetry is deliberate and load-bearing.

use crate::database::categories::CategorySummary;
use crate::database::images::{fetch_images, ProductImage};
use crate::database::product_options::{
    fetch_live_options, insert_option, insert_value, sync_options, OptionSpec, ProductOption,
    ValueSpec,
};
use crate::database::transactions::TransactionGuard;
use crate::database::{parse_decimal, parse_decimal_opt, Database, LIVE};
use crate::errors::{AppError, AppResult, ErrorCode};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

impl Database {
    /// Create the products table
    pub(super) async fn migrate_products(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                category_id TEXT NOT NULL REFERENCES categories(id),
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                description TEXT,
                price TEXT NOT NULL,
                sale_price TEXT,
                stock INTEGER NOT NULL DEFAULT 0,
                sku TEXT,
                status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('active', 'draft', 'archived')),
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                deleted_at DATETIME
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_status ON products(status)")
            .execute(self.pool())
            .await?;

        Ok(())
    }
}

/// Product lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    /// Visible on the storefront
    Active,
    /// Work in progress, admin-only
    #[default]
    Draft,
    /// Retired from sale but kept for history
    Archived,
}

impl ProductStatus {
    /// Convert to database string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Draft => "draft",
            Self::Archived => "archived",
        }
    }

    /// Parse from database string representation
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown status string
    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "active" => Ok(Self::Active),
            "draft" => Ok(Self::Draft),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::database(format!("Unknown product status: {other}"))),
        }
    }
}

/// A product row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier
    pub id: Uuid,
    /// Owning category
    pub category_id: Uuid,
    /// Display name
    pub name: String,
    /// URL slug derived from the name plus a random suffix
    pub slug: String,
    /// Optional long description
    pub description: Option<String>,
    /// List price
    pub price: Decimal,
    /// Sale price overriding the list price when set
    pub sale_price: Option<Decimal>,
    /// Simple stock counter
    pub stock: i64,
    /// Stock keeping unit, unique among live products
    pub sku: Option<String>,
    /// Lifecycle status
    pub status: ProductStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Soft-delete tombstone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    /// The price actually charged absent option modifiers
    #[must_use]
    pub fn final_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }
}

/// Product with relations for detail and listing responses
#[derive(Debug, Clone, Serialize)]
pub struct ProductWithRelations {
    /// The product row
    #[serde(flatten)]
    pub product: Product,
    /// Owning category summary
    pub category: Option<CategorySummary>,
    /// Images, primary first
    pub images: Vec<ProductImage>,
    /// Live options with values; loaded for detail views only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ProductOption>,
    /// Number of order line items referencing this product
    pub sales_count: i64,
}

/// Request to create a new product
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductRequest {
    /// Display name
    pub name: String,
    /// Optional long description
    #[serde(default)]
    pub description: Option<String>,
    /// List price
    pub price: Decimal,
    /// Sale price overriding the list price
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    /// Stock keeping unit
    #[serde(default)]
    pub sku: Option<String>,
    /// Initial stock counter
    pub stock: i64,
    /// Owning category
    pub category_id: Uuid,
    /// Lifecycle status
    pub status: ProductStatus,
    /// Configurable options; ids are ignored, every row is new on a fresh
    /// product
    #[serde(default)]
    pub options: Vec<OptionSpec>,
}

/// Request to update an existing product.
///
/// Scalar fields are a partial patch: `None` leaves the field unchanged.
/// Double-`Option` fields distinguish "absent" from "set to null". The
/// `options` field is the tri-state full-sync payload: absent leaves options
/// untouched; present (null or a list, possibly empty) runs the reconciler
/// with that target - null and the empty list both mean "delete all".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProductRequest {
    /// New display name
    #[serde(default)]
    pub name: Option<String>,
    /// New description; explicit null clears it
    #[serde(default, deserialize_with = "crate::utils::double_option")]
    pub description: Option<Option<String>>,
    /// New list price
    #[serde(default)]
    pub price: Option<Decimal>,
    /// New sale price; explicit null clears it
    #[serde(default, deserialize_with = "crate::utils::double_option")]
    pub sale_price: Option<Option<Decimal>>,
    /// New stock keeping unit
    #[serde(default)]
    pub sku: Option<String>,
    /// New stock counter
    #[serde(default)]
    pub stock: Option<i64>,
    /// New owning category
    #[serde(default)]
    pub category_id: Option<Uuid>,
    /// New lifecycle status
    #[serde(default)]
    pub status: Option<ProductStatus>,
    /// Full-sync option payload when present
    #[serde(default, deserialize_with = "crate::utils::double_option")]
    pub options: Option<Option<Vec<OptionSpec>>>,
}

impl CreateProductRequest {
    /// Validate the request before any write
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty names, negative prices or stock,
    /// or invalid option specs.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::missing_field("name"));
        }
        if self.price < Decimal::ZERO {
            return Err(AppError::invalid_input("price must not be negative"));
        }
        if self.sale_price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(AppError::invalid_input("sale_price must not be negative"));
        }
        if self.stock < 0 {
            return Err(AppError::invalid_input("stock must not be negative"));
        }
        for option in &self.options {
            option.validate()?;
        }
        Ok(())
    }
}

impl UpdateProductRequest {
    /// Validate the request before any write
    ///
    /// # Errors
    ///
    /// Returns a validation error for present-but-invalid fields.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::missing_field("name"));
        }
        if self.price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(AppError::invalid_input("price must not be negative"));
        }
        if self
            .sale_price
            .flatten()
            .is_some_and(|p| p < Decimal::ZERO)
        {
            return Err(AppError::invalid_input("sale_price must not be negative"));
        }
        if self.stock.is_some_and(|s| s < 0) {
            return Err(AppError::invalid_input("stock must not be negative"));
        }
        if let Some(Some(options)) = &self.options {
            for option in options {
                option.validate()?;
            }
        }
        Ok(())
    }
}

/// Admin listing filter
#[derive(Debug, Clone, Default)]
pub struct ProductListFilter {
    /// Match against name or sku
    pub search: Option<String>,
    /// Filter by category name
    pub category: Option<String>,
    /// Filter by lifecycle status
    pub status: Option<ProductStatus>,
}

/// Storefront sort orders
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductSort {
    /// Cheapest first
    PriceLow,
    /// Most expensive first
    PriceHigh,
    /// Alphabetical
    Name,
    /// Most recent first
    #[default]
    Newest,
}

/// Storefront listing filter - active products only
#[derive(Debug, Clone, Default)]
pub struct StorefrontFilter {
    /// Filter by category
    pub category_id: Option<Uuid>,
    /// Match against the product name
    pub search: Option<String>,
    /// Sort order
    pub sort: ProductSort,
}

/// Product database operations manager - the transactional mutation boundary
pub struct ProductsManager {
    pool: SqlitePool,
}

impl ProductsManager {
    /// Create a new products manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a product, reconciling any supplied options in the same
    /// transaction
    ///
    /// # Errors
    ///
    /// Returns a validation error before any write, or a database error that
    /// rolled back the whole transaction.
    pub async fn create(&self, request: &CreateProductRequest) -> AppResult<ProductWithRelations> {
        request.validate()?;
        self.ensure_category_exists(request.category_id).await?;
        if let Some(sku) = &request.sku {
            self.ensure_sku_free(sku, None).await?;
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let slug = format!("{}-{}", slugify(&request.name), random_suffix(6));

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;
        let mut guard = TransactionGuard::new(tx);

        sqlx::query(
            r"
            INSERT INTO products (
                id, category_id, name, slug, description, price, sale_price,
                stock, sku, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            ",
        )
        .bind(id.to_string())
        .bind(request.category_id.to_string())
        .bind(&request.name)
        .bind(&slug)
        .bind(&request.description)
        .bind(request.price.to_string())
        .bind(request.sale_price.map(|p| p.to_string()))
        .bind(request.stock)
        .bind(&request.sku)
        .bind(request.status.as_str())
        .bind(now)
        .execute(guard.executor()?)
        .await
        .map_err(|e| AppError::database(format!("Failed to create product: {e}")))?;

        if !request.options.is_empty() {
            // Every spec option is new relative to a fresh product - ids in
            // the payload are not honoured here
            let specs: Vec<OptionSpec> = request
                .options
                .iter()
                .map(|spec| OptionSpec {
                    id: None,
                    values: spec
                        .values
                        .iter()
                        .map(|v| ValueSpec {
                            id: None,
                            ..v.clone()
                        })
                        .collect(),
                    ..spec.clone()
                })
                .collect();
            sync_options(guard.executor()?, id, &specs).await?;
        }

        guard.commit().await?;

        tracing::info!(product_id = %id, "Product created");
        self.get(id).await
    }

    /// Update a product. Scalars are a partial patch; a present `options`
    /// key runs the full option sync in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for a missing product, validation errors
    /// before any write, ownership errors from the reconciler, or a database
    /// error - all of which roll back the whole transaction.
    pub async fn update(
        &self,
        product_id: Uuid,
        request: &UpdateProductRequest,
    ) -> AppResult<ProductWithRelations> {
        request.validate()?;

        let mut product = self
            .get_row(product_id)
            .await?
            .ok_or_else(|| AppError::not_found("Product"))?;

        if let Some(category_id) = request.category_id {
            self.ensure_category_exists(category_id).await?;
            product.category_id = category_id;
        }
        if let Some(sku) = &request.sku {
            self.ensure_sku_free(sku, Some(product_id)).await?;
            product.sku = Some(sku.clone());
        }
        if let Some(name) = &request.name {
            product.name.clone_from(name);
        }
        if let Some(description) = &request.description {
            product.description.clone_from(description);
        }
        if let Some(price) = request.price {
            product.price = price;
        }
        if let Some(sale_price) = request.sale_price {
            product.sale_price = sale_price;
        }
        if let Some(stock) = request.stock {
            product.stock = stock;
        }
        if let Some(status) = request.status {
            product.status = status;
        }
        product.updated_at = Utc::now();

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;
        let mut guard = TransactionGuard::new(tx);

        sqlx::query(
            r"
            UPDATE products SET
                category_id = $2, name = $3, description = $4, price = $5,
                sale_price = $6, stock = $7, sku = $8, status = $9, updated_at = $10
            WHERE id = $1
            ",
        )
        .bind(product_id.to_string())
        .bind(product.category_id.to_string())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.to_string())
        .bind(product.sale_price.map(|p| p.to_string()))
        .bind(product.stock)
        .bind(&product.sku)
        .bind(product.status.as_str())
        .bind(product.updated_at)
        .execute(guard.executor()?)
        .await
        .map_err(|e| AppError::database(format!("Failed to update product: {e}")))?;

        // Absent key leaves options untouched; a present key - even null or
        // an empty list - is a full sync against that target
        if let Some(options) = &request.options {
            let target = options.clone().unwrap_or_default();
            sync_options(guard.executor()?, product_id, &target).await?;
        }

        guard.commit().await?;

        tracing::info!(product_id = %product_id, "Product updated");
        self.get(product_id).await
    }

    /// Duplicate a product with its live options and values as brand-new rows
    ///
    /// The copy gets a fresh slug, a suffixed sku, zero stock and draft
    /// status.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for a missing product or a database error.
    pub async fn duplicate(&self, product_id: Uuid) -> AppResult<ProductWithRelations> {
        let source = self
            .get_row(product_id)
            .await?
            .ok_or_else(|| AppError::not_found("Product"))?;

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::database(format!("Failed to acquire connection: {e}")))?;
        let options = fetch_live_options(&mut conn, product_id).await?;
        drop(conn);

        let now = Utc::now();
        let copy_id = Uuid::new_v4();
        let slug = format!("{}-copy-{}", slugify(&source.name), random_suffix(6));
        let sku = source
            .sku
            .as_ref()
            .map(|sku| format!("{sku}-{}", random_suffix(4)));

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;
        let mut guard = TransactionGuard::new(tx);

        sqlx::query(
            r"
            INSERT INTO products (
                id, category_id, name, slug, description, price, sale_price,
                stock, sku, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, 'draft', $9, $9)
            ",
        )
        .bind(copy_id.to_string())
        .bind(source.category_id.to_string())
        .bind(format!("{} (Copy)", source.name))
        .bind(&slug)
        .bind(&source.description)
        .bind(source.price.to_string())
        .bind(source.sale_price.map(|p| p.to_string()))
        .bind(&sku)
        .bind(now)
        .execute(guard.executor()?)
        .await
        .map_err(|e| AppError::database(format!("Failed to duplicate product: {e}")))?;

        for option in &options {
            let option_spec = OptionSpec {
                id: None,
                name: option.name.clone(),
                option_type: option.option_type,
                is_required: option.is_required,
                min_value: option.min_value,
                max_value: option.max_value,
                price_per_unit: option.price_per_unit,
                values: Vec::new(),
            };
            let new_option_id = insert_option(guard.executor()?, copy_id, &option_spec, now).await?;
            for value in &option.values {
                let value_spec = ValueSpec {
                    id: None,
                    label: value.label.clone(),
                    value: Some(value.value.clone()),
                    price_modifier: Some(value.price_modifier),
                };
                insert_value(guard.executor()?, new_option_id, &value_spec, now).await?;
            }
        }

        guard.commit().await?;

        tracing::info!(source = %product_id, copy = %copy_id, "Product duplicated");
        self.get(copy_id).await
    }

    /// Soft-delete a product
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if no live product matches, or a database
    /// error.
    pub async fn delete(&self, product_id: Uuid) -> AppResult<()> {
        let query =
            format!("UPDATE products SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND {LIVE}");
        let result = sqlx::query(&query)
            .bind(product_id.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete product: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Product"));
        }
        Ok(())
    }

    /// Hard-delete a product together with its options, values and images.
    ///
    /// Refused while order line items still reference the product - order
    /// history must keep its targets addressable.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for a missing product, `ResourceLocked`
    /// while line items reference it, or a database error.
    pub async fn purge(&self, product_id: Uuid) -> AppResult<()> {
        if self.get_row_any(product_id).await?.is_none() {
            return Err(AppError::not_found("Product"));
        }

        let referencing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE product_id = $1")
                .bind(product_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to count order items: {e}")))?;
        if referencing > 0 {
            return Err(AppError::locked(
                "Cannot hard-delete a product referenced by order items",
            ));
        }

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;
        let mut guard = TransactionGuard::new(tx);

        sqlx::query(
            r"
            DELETE FROM product_option_values WHERE product_option_id IN (
                SELECT id FROM product_options WHERE product_id = $1
            )
            ",
        )
        .bind(product_id.to_string())
        .execute(guard.executor()?)
        .await
        .map_err(|e| AppError::database(format!("Failed to purge option values: {e}")))?;

        sqlx::query("DELETE FROM product_options WHERE product_id = $1")
            .bind(product_id.to_string())
            .execute(guard.executor()?)
            .await
            .map_err(|e| AppError::database(format!("Failed to purge options: {e}")))?;

        sqlx::query("DELETE FROM product_images WHERE product_id = $1")
            .bind(product_id.to_string())
            .execute(guard.executor()?)
            .await
            .map_err(|e| AppError::database(format!("Failed to purge images: {e}")))?;

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id.to_string())
            .execute(guard.executor()?)
            .await
            .map_err(|e| AppError::database(format!("Failed to purge product: {e}")))?;

        guard.commit().await?;
        Ok(())
    }

    /// Get a live product with full relations (admin detail view)
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if no live product matches, or a database
    /// error.
    pub async fn get(&self, product_id: Uuid) -> AppResult<ProductWithRelations> {
        let product = self
            .get_row(product_id)
            .await?
            .ok_or_else(|| AppError::not_found("Product"))?;
        self.with_relations(product, true).await
    }

    /// Admin listing with search, category and status filters, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn list(&self, filter: &ProductListFilter) -> AppResult<Vec<ProductWithRelations>> {
        let status_filter = filter.status.map_or(String::new(), |status| {
            format!("AND p.status = '{}'", status.as_str())
        });
        let category_filter = filter
            .category
            .as_ref()
            .map_or(String::new(), |_| "AND c.name = $2".to_owned());

        let query = format!(
            r"
            SELECT p.id, p.category_id, p.name, p.slug, p.description, p.price, p.sale_price,
                   p.stock, p.sku, p.status, p.created_at, p.updated_at, p.deleted_at
            FROM products p
            JOIN categories c ON c.id = p.category_id
            WHERE p.{LIVE}
              AND (p.name LIKE $1 OR COALESCE(p.sku, '') LIKE $1)
              {category_filter}
              {status_filter}
            ORDER BY p.created_at DESC
            "
        );

        let pattern = format!("%{}%", filter.search.as_deref().unwrap_or_default());
        let mut q = sqlx::query(&query).bind(&pattern);
        if let Some(category) = &filter.category {
            q = q.bind(category);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list products: {e}")))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let product = row_to_product(row)?;
            out.push(self.with_relations(product, false).await?);
        }
        Ok(out)
    }

    /// Storefront listing: active products only
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn storefront_list(
        &self,
        filter: &StorefrontFilter,
    ) -> AppResult<Vec<ProductWithRelations>> {
        let category_filter = filter
            .category_id
            .map_or(String::new(), |_| "AND p.category_id = $2".to_owned());
        let order_by = match filter.sort {
            ProductSort::PriceLow => "CAST(p.price AS REAL) ASC",
            ProductSort::PriceHigh => "CAST(p.price AS REAL) DESC",
            ProductSort::Name => "p.name ASC",
            ProductSort::Newest => "p.created_at DESC",
        };

        let query = format!(
            r"
            SELECT p.id, p.category_id, p.name, p.slug, p.description, p.price, p.sale_price,
                   p.stock, p.sku, p.status, p.created_at, p.updated_at, p.deleted_at
            FROM products p
            WHERE p.{LIVE} AND p.status = 'active'
              AND p.name LIKE $1
              {category_filter}
            ORDER BY {order_by}
            "
        );

        let pattern = format!("%{}%", filter.search.as_deref().unwrap_or_default());
        let mut q = sqlx::query(&query).bind(&pattern);
        if let Some(category_id) = filter.category_id {
            q = q.bind(category_id.to_string());
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list products: {e}")))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let product = row_to_product(row)?;
            out.push(self.with_relations(product, false).await?);
        }
        Ok(out)
    }

    /// Storefront detail: an active product with its options
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` unless a live, active product matches.
    pub async fn storefront_get(&self, product_id: Uuid) -> AppResult<ProductWithRelations> {
        let product = self
            .get_row(product_id)
            .await?
            .filter(|p| p.status == ProductStatus::Active)
            .ok_or_else(|| AppError::not_found("Product"))?;
        self.with_relations(product, true).await
    }

    /// Load a live product row by id
    async fn get_row(&self, product_id: Uuid) -> AppResult<Option<Product>> {
        let query = format!(
            r"
            SELECT id, category_id, name, slug, description, price, sale_price,
                   stock, sku, status, created_at, updated_at, deleted_at
            FROM products WHERE id = $1 AND {LIVE}
            "
        );
        let row = sqlx::query(&query)
            .bind(product_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get product: {e}")))?;

        row.map(|r| row_to_product(&r)).transpose()
    }

    /// Load a product row by id including soft-deleted rows
    async fn get_row_any(&self, product_id: Uuid) -> AppResult<Option<Product>> {
        let row = sqlx::query(
            r"
            SELECT id, category_id, name, slug, description, price, sale_price,
                   stock, sku, status, created_at, updated_at, deleted_at
            FROM products WHERE id = $1
            ",
        )
        .bind(product_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get product: {e}")))?;

        row.map(|r| row_to_product(&r)).transpose()
    }

    /// Assemble a response with fresh relations
    async fn with_relations(
        &self,
        product: Product,
        detailed: bool,
    ) -> AppResult<ProductWithRelations> {
        let category = sqlx::query("SELECT id, name, slug FROM categories WHERE id = $1")
            .bind(product.category_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to load category: {e}")))?
            .map(|row| {
                let id: String = row.get("id");
                Ok::<_, AppError>(CategorySummary {
                    id: Uuid::parse_str(&id)
                        .map_err(|e| AppError::database(format!("Invalid category id: {e}")))?,
                    name: row.get("name"),
                    slug: row.get("slug"),
                })
            })
            .transpose()?;

        let sales_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE product_id = $1")
                .bind(product.id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to count sales: {e}")))?;

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::database(format!("Failed to acquire connection: {e}")))?;
        let images = fetch_images(&mut conn, product.id).await?;
        let options = if detailed {
            fetch_live_options(&mut conn, product.id).await?
        } else {
            Vec::new()
        };

        Ok(ProductWithRelations {
            product,
            category,
            images,
            options,
            sales_count,
        })
    }

    /// Verify a category exists
    async fn ensure_category_exists(&self, category_id: Uuid) -> AppResult<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE id = $1")
            .bind(category_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to check category: {e}")))?;
        if count == 0 {
            return Err(AppError::invalid_input(format!(
                "Category {category_id} does not exist"
            )));
        }
        Ok(())
    }

    /// Verify a sku is unused among live products, optionally excluding one id
    async fn ensure_sku_free(&self, sku: &str, exclude: Option<Uuid>) -> AppResult<()> {
        let query = match exclude {
            Some(_) => format!(
                "SELECT COUNT(*) FROM products WHERE sku = $1 AND {LIVE} AND id != $2"
            ),
            None => format!("SELECT COUNT(*) FROM products WHERE sku = $1 AND {LIVE}"),
        };
        let mut q = sqlx::query_scalar(&query).bind(sku);
        if let Some(id) = exclude {
            q = q.bind(id.to_string());
        }
        let count: i64 = q
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to check sku: {e}")))?;

        if count > 0 {
            return Err(AppError::new(
                ErrorCode::ResourceAlreadyExists,
                format!("SKU '{sku}' is already in use"),
            ));
        }
        Ok(())
    }
}

/// Convert a database row to a [`Product`]
pub(crate) fn row_to_product(row: &SqliteRow) -> AppResult<Product> {
    let id: String = row.get("id");
    let category_id: String = row.get("category_id");
    let price: String = row.get("price");
    let sale_price: Option<String> = row.get("sale_price");
    let status: String = row.get("status");

    Ok(Product {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::database(format!("Invalid product id: {e}")))?,
        category_id: Uuid::parse_str(&category_id)
            .map_err(|e| AppError::database(format!("Invalid category id: {e}")))?,
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        price: parse_decimal(&price, "price")?,
        sale_price: parse_decimal_opt(sale_price.as_deref(), "sale_price")?,
        stock: row.get("stock"),
        sku: row.get("sku"),
        status: ProductStatus::parse(&status)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    })
}

/// Derive a URL slug from a display name
#[must_use]
pub(crate) fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Random lowercase alphanumeric suffix for slugs, duplicated skus and order
/// numbers
pub(crate) fn random_suffix(len: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            char::from(CHARSET[idx])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Granny Square Blanket"), "granny-square-blanket");
        assert_eq!(slugify("  Mocha -- Bear!  "), "mocha-bear");
        assert_eq!(slugify("Café au Lait"), "caf-au-lait");
    }

    #[test]
    fn test_random_suffix_length_and_charset() {
        let suffix = random_suffix(6);
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_final_price_prefers_sale_price() {
        let mut product = sample_product();
        assert_eq!(product.final_price(), Decimal::new(10_000, 2));
        product.sale_price = Some(Decimal::new(8_000, 2));
        assert_eq!(product.final_price(), Decimal::new(8_000, 2));
    }

    fn sample_product() -> Product {
        Product {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            name: "Sample".into(),
            slug: "sample".into(),
            description: None,
            price: Decimal::new(10_000, 2),
            sale_price: None,
            stock: 1,
            sku: None,
            status: ProductStatus::Draft,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }
}
