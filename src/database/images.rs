// ABOUTME: Database operations for product image metadata
// ABOUTME: Handles attach/remove with primary-image promotion; file storage is a collaborator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::database::{Database, LIVE};
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

impl Database {
    /// Create the product images table
    pub(super) async fn migrate_images(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS product_images (
                id TEXT PRIMARY KEY,
                product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                image_url TEXT NOT NULL,
                is_primary INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_product_images_product ON product_images(product_id)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

/// One stored image reference for a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductImage {
    /// Unique identifier
    pub id: Uuid,
    /// Owning product
    pub product_id: Uuid,
    /// Public URL of the stored file
    pub image_url: String,
    /// Whether this image leads product listings
    pub is_primary: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Product image database operations manager.
///
/// Deals in URLs only - the upload itself (bytes, mime checks, disk layout)
/// is the storage collaborator's job.
pub struct ImagesManager {
    pool: SqlitePool,
}

impl ImagesManager {
    /// Create a new images manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Attach an image to a product. The first image becomes primary.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for a missing product or a database error.
    pub async fn attach(&self, product_id: Uuid, image_url: &str) -> AppResult<ProductImage> {
        if image_url.trim().is_empty() {
            return Err(AppError::missing_field("image_url"));
        }

        let query = format!("SELECT COUNT(*) FROM products WHERE id = $1 AND {LIVE}");
        let product_count: i64 = sqlx::query_scalar(&query)
            .bind(product_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to check product: {e}")))?;
        if product_count == 0 {
            return Err(AppError::not_found("Product"));
        }

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM product_images WHERE product_id = $1")
                .bind(product_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to count images: {e}")))?;
        let is_primary = existing == 0;

        let now = Utc::now();
        let id = Uuid::new_v4();

        sqlx::query(
            r"
            INSERT INTO product_images (id, product_id, image_url, is_primary, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ",
        )
        .bind(id.to_string())
        .bind(product_id.to_string())
        .bind(image_url)
        .bind(is_primary)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to attach image: {e}")))?;

        Ok(ProductImage {
            id,
            product_id,
            image_url: image_url.to_owned(),
            is_primary,
            created_at: now,
            updated_at: now,
        })
    }

    /// Remove an image. When the primary image is removed, the oldest
    /// remaining image (if any) is promoted.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` when no image matches the product/image
    /// pair, or a database error.
    pub async fn remove(&self, product_id: Uuid, image_id: Uuid) -> AppResult<()> {
        let row = sqlx::query(
            "SELECT is_primary FROM product_images WHERE id = $1 AND product_id = $2",
        )
        .bind(image_id.to_string())
        .bind(product_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get image: {e}")))?
        .ok_or_else(|| AppError::not_found("Product image"))?;

        let was_primary: bool = row.get("is_primary");

        sqlx::query("DELETE FROM product_images WHERE id = $1")
            .bind(image_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to remove image: {e}")))?;

        if was_primary {
            sqlx::query(
                r"
                UPDATE product_images SET is_primary = 1, updated_at = $2
                WHERE id = (
                    SELECT id FROM product_images WHERE product_id = $1
                    ORDER BY created_at ASC, id ASC LIMIT 1
                )
                ",
            )
            .bind(product_id.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to promote image: {e}")))?;
        }

        Ok(())
    }

    /// List a product's images, primary first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn list(&self, product_id: Uuid) -> AppResult<Vec<ProductImage>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::database(format!("Failed to acquire connection: {e}")))?;
        fetch_images(&mut conn, product_id).await
    }
}

/// Fetch a product's images, primary first then oldest first
pub(crate) async fn fetch_images(
    conn: &mut SqliteConnection,
    product_id: Uuid,
) -> AppResult<Vec<ProductImage>> {
    let rows = sqlx::query(
        r"
        SELECT id, product_id, image_url, is_primary, created_at, updated_at
        FROM product_images
        WHERE product_id = $1
        ORDER BY is_primary DESC, created_at ASC, id ASC
        ",
    )
    .bind(product_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::database(format!("Failed to load images: {e}")))?;

    rows.iter().map(row_to_image).collect()
}

fn row_to_image(row: &SqliteRow) -> AppResult<ProductImage> {
    let id: String = row.get("id");
    let product_id: String = row.get("product_id");

    Ok(ProductImage {
        id: Uuid::parse_str(&id).map_err(|e| AppError::database(format!("Invalid image id: {e}")))?,
        product_id: Uuid::parse_str(&product_id)
            .map_err(|e| AppError::database(format!("Invalid product id: {e}")))?,
        image_url: row.get("image_url"),
        is_primary: row.get("is_primary"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
