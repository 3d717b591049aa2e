// ABOUTME: Database operations for product categories
// ABOUTME: Handles category CRUD, the product-reference deletion guard and the storefront tree
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::database::products::slugify;
use crate::database::{Database, LIVE};
use crate::errors::{AppError, AppResult, ErrorCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

impl Database {
    /// Create the categories table
    pub(super) async fn migrate_categories(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                description TEXT,
                parent_id TEXT REFERENCES categories(id) ON DELETE SET NULL,
                status INTEGER NOT NULL DEFAULT 1,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id)")
            .execute(self.pool())
            .await?;

        Ok(())
    }
}

/// A product category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// URL slug derived from the name
    pub slug: String,
    /// Optional description
    pub description: Option<String>,
    /// Parent category for nested trees
    pub parent_id: Option<Uuid>,
    /// Whether the category is visible on the storefront
    pub status: bool,
    /// Manual ordering weight
    pub sort_order: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Compact category reference embedded in product responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    /// Category identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// URL slug
    pub slug: String,
}

/// Category with its live product count, for admin listings
#[derive(Debug, Clone, Serialize)]
pub struct CategoryListItem {
    /// The category data
    #[serde(flatten)]
    pub category: Category,
    /// Number of live products in the category
    pub products_count: i64,
}

/// Active top-level category with its active children, for the storefront
#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    /// Category identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// URL slug
    pub slug: String,
    /// Number of active products in the category
    pub products_count: i64,
    /// Active child categories
    pub children: Vec<CategorySummary>,
}

/// Request to create a new category
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryRequest {
    /// Display name (unique among categories)
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Optional parent category
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Visibility flag, defaults to visible
    #[serde(default = "default_status")]
    pub status: bool,
    /// Manual ordering weight
    #[serde(default)]
    pub sort_order: i64,
}

const fn default_status() -> bool {
    true
}

/// Request to update an existing category. `None` fields are left unchanged;
/// double-`Option` fields distinguish "absent" from "set to null".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryRequest {
    /// New name (slug is re-derived)
    #[serde(default)]
    pub name: Option<String>,
    /// New description; explicit null clears it
    #[serde(default, deserialize_with = "crate::utils::double_option")]
    pub description: Option<Option<String>>,
    /// New parent; explicit null detaches the category
    #[serde(default, deserialize_with = "crate::utils::double_option")]
    pub parent_id: Option<Option<Uuid>>,
    /// New visibility flag
    #[serde(default)]
    pub status: Option<bool>,
    /// New ordering weight
    #[serde(default)]
    pub sort_order: Option<i64>,
}

/// Category database operations manager
pub struct CategoriesManager {
    pool: SqlitePool,
}

impl CategoriesManager {
    /// Create a new categories manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new category
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or already taken, the parent
    /// does not exist, or the database operation fails.
    pub async fn create(&self, request: &CreateCategoryRequest) -> AppResult<Category> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::missing_field("name"));
        }
        if self.name_taken(name, None).await? {
            return Err(AppError::new(
                ErrorCode::ResourceAlreadyExists,
                format!("Category '{name}' already exists"),
            ));
        }
        if let Some(parent_id) = request.parent_id {
            if self.get(parent_id).await?.is_none() {
                return Err(AppError::invalid_input(format!(
                    "Parent category {parent_id} does not exist"
                )));
            }
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let slug = slugify(name);

        sqlx::query(
            r"
            INSERT INTO categories (id, name, slug, description, parent_id, status, sort_order, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(&slug)
        .bind(&request.description)
        .bind(request.parent_id.map(|p| p.to_string()))
        .bind(request.status)
        .bind(request.sort_order)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create category: {e}")))?;

        Ok(Category {
            id,
            name: name.to_owned(),
            slug,
            description: request.description.clone(),
            parent_id: request.parent_id,
            status: request.status,
            sort_order: request.sort_order,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a category by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get(&self, category_id: Uuid) -> AppResult<Option<Category>> {
        let row = sqlx::query(
            r"
            SELECT id, name, slug, description, parent_id, status, sort_order, created_at, updated_at
            FROM categories WHERE id = $1
            ",
        )
        .bind(category_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get category: {e}")))?;

        row.map(|r| row_to_category(&r)).transpose()
    }

    /// List categories for the admin panel with live product counts
    ///
    /// An optional name search and status filter mirror the admin listing
    /// query parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn list(
        &self,
        search: Option<&str>,
        status: Option<bool>,
    ) -> AppResult<Vec<CategoryListItem>> {
        // LIKE '%%' matches every name, so the search filter can stay in the
        // query unconditionally
        let status_filter = status.map_or(String::new(), |s| {
            format!("AND c.status = {}", i64::from(s))
        });

        let query = format!(
            r"
            SELECT c.id, c.name, c.slug, c.description, c.parent_id, c.status, c.sort_order,
                   c.created_at, c.updated_at,
                   (SELECT COUNT(*) FROM products p WHERE p.category_id = c.id AND p.{LIVE}) AS products_count
            FROM categories c
            WHERE c.name LIKE $1 {status_filter}
            ORDER BY c.created_at DESC
            "
        );

        let pattern = format!("%{}%", search.unwrap_or_default());
        let rows = sqlx::query(&query)
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list categories: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok(CategoryListItem {
                    category: row_to_category(row)?,
                    products_count: row.get("products_count"),
                })
            })
            .collect()
    }

    /// Update a category. Renaming re-derives the slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the category does not exist, the new name is
    /// taken, or the database operation fails.
    pub async fn update(
        &self,
        category_id: Uuid,
        request: &UpdateCategoryRequest,
    ) -> AppResult<Category> {
        let mut category = self
            .get(category_id)
            .await?
            .ok_or_else(|| AppError::not_found("Category"))?;

        if let Some(name) = &request.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::missing_field("name"));
            }
            if self.name_taken(name, Some(category_id)).await? {
                return Err(AppError::new(
                    ErrorCode::ResourceAlreadyExists,
                    format!("Category '{name}' already exists"),
                ));
            }
            category.name = name.to_owned();
            category.slug = slugify(name);
        }
        if let Some(description) = &request.description {
            category.description.clone_from(description);
        }
        if let Some(parent_id) = request.parent_id {
            if let Some(parent) = parent_id {
                if parent == category_id {
                    return Err(AppError::invalid_input("A category cannot be its own parent"));
                }
                if self.get(parent).await?.is_none() {
                    return Err(AppError::invalid_input(format!(
                        "Parent category {parent} does not exist"
                    )));
                }
            }
            category.parent_id = parent_id;
        }
        if let Some(status) = request.status {
            category.status = status;
        }
        if let Some(sort_order) = request.sort_order {
            category.sort_order = sort_order;
        }

        category.updated_at = Utc::now();

        sqlx::query(
            r"
            UPDATE categories SET
                name = $2, slug = $3, description = $4, parent_id = $5,
                status = $6, sort_order = $7, updated_at = $8
            WHERE id = $1
            ",
        )
        .bind(category_id.to_string())
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(category.parent_id.map(|p| p.to_string()))
        .bind(category.status)
        .bind(category.sort_order)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update category: {e}")))?;

        Ok(category)
    }

    /// Delete a category. Refused while live products still reference it -
    /// products must be reassigned first.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the category does not exist,
    /// `ResourceLocked` if live products remain in it, or a database error.
    pub async fn delete(&self, category_id: Uuid) -> AppResult<()> {
        if self.get(category_id).await?.is_none() {
            return Err(AppError::not_found("Category"));
        }

        let query = format!(
            "SELECT COUNT(*) FROM products WHERE category_id = $1 AND {LIVE}"
        );
        let product_count: i64 = sqlx::query_scalar(&query)
            .bind(category_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count category products: {e}")))?;

        if product_count > 0 {
            return Err(AppError::locked(
                "Cannot delete category with existing products. Reassign products first.",
            ));
        }

        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete category: {e}")))?;

        Ok(())
    }

    /// Storefront category tree: active top-level categories with their
    /// active children and active product counts
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn storefront_tree(&self) -> AppResult<Vec<CategoryNode>> {
        let query = format!(
            r"
            SELECT c.id, c.name, c.slug, c.description, c.parent_id, c.status, c.sort_order,
                   c.created_at, c.updated_at,
                   (SELECT COUNT(*) FROM products p
                    WHERE p.category_id = c.id AND p.status = 'active' AND p.{LIVE}) AS products_count
            FROM categories c
            WHERE c.status = 1 AND c.parent_id IS NULL
            ORDER BY c.sort_order ASC, c.name ASC
            "
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to load category tree: {e}")))?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            let category = row_to_category(row)?;
            let children = sqlx::query(
                r"
                SELECT id, name, slug FROM categories
                WHERE parent_id = $1 AND status = 1
                ORDER BY sort_order ASC, name ASC
                ",
            )
            .bind(category.id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to load child categories: {e}")))?
            .iter()
            .map(row_to_category_summary)
            .collect::<AppResult<Vec<_>>>()?;

            nodes.push(CategoryNode {
                id: category.id,
                name: category.name,
                slug: category.slug,
                products_count: row.get("products_count"),
                children,
            });
        }

        Ok(nodes)
    }

    /// Check whether a category name is already in use, optionally excluding one id
    async fn name_taken(&self, name: &str, exclude: Option<Uuid>) -> AppResult<bool> {
        let count: i64 = match exclude {
            Some(id) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE name = $1 AND id != $2")
                    .bind(name)
                    .bind(id.to_string())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE name = $1")
                    .bind(name)
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|e| AppError::database(format!("Failed to check category name: {e}")))?;

        Ok(count > 0)
    }
}

/// Convert a database row to a [`Category`]
fn row_to_category(row: &SqliteRow) -> AppResult<Category> {
    let id: String = row.get("id");
    let parent_id: Option<String> = row.get("parent_id");

    Ok(Category {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::database(format!("Invalid category id: {e}")))?,
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        parent_id: parent_id
            .map(|p| Uuid::parse_str(&p))
            .transpose()
            .map_err(|e| AppError::database(format!("Invalid parent id: {e}")))?,
        status: row.get("status"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_category_summary(row: &SqliteRow) -> AppResult<CategorySummary> {
    let id: String = row.get("id");
    Ok(CategorySummary {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::database(format!("Invalid category id: {e}")))?,
        name: row.get("name"),
        slug: row.get("slug"),
    })
}
