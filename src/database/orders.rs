// ABOUTME: Database operations for orders and order line items
// ABOUTME: Order placement prices each line through the resolver inside one transaction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::database::product_options::fetch_live_options;
use crate::database::products::{random_suffix, row_to_product, ProductStatus};
use crate::database::transactions::TransactionGuard;
use crate::database::{parse_decimal, Database, LIVE};
use crate::errors::{AppError, AppResult};
use crate::pricing::{line_item_price, Selection};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

impl Database {
    /// Create the order tables
    pub(super) async fn migrate_orders(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                order_number TEXT UNIQUE NOT NULL,
                customer_name TEXT NOT NULL,
                customer_email TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                order_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (order_status IN ('pending', 'confirmed', 'processing', 'shipped', 'delivered', 'cancelled')),
                payment_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (payment_status IN ('pending', 'paid', 'failed', 'refunded')),
                shipping_address TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS order_items (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                product_id TEXT NOT NULL REFERENCES products(id),
                quantity INTEGER NOT NULL,
                unit_price TEXT NOT NULL,
                selections TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id)")
            .execute(self.pool())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_order_items_product ON order_items(product_id)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

/// Order fulfilment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed, not yet confirmed
    #[default]
    Pending,
    /// Confirmed by the shop
    Confirmed,
    /// Being made
    Processing,
    /// Handed to the carrier
    Shipped,
    /// Received by the customer
    Delivered,
    /// Cancelled before fulfilment
    Cancelled,
}

impl OrderStatus {
    /// Convert to database string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from database string representation
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown status string
    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(AppError::database(format!("Unknown order status: {other}"))),
        }
    }
}

/// Payment state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Awaiting payment
    #[default]
    Pending,
    /// Paid in full
    Paid,
    /// Payment attempt failed
    Failed,
    /// Refunded after payment
    Refunded,
}

impl PaymentStatus {
    /// Convert to database string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Parse from database string representation
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown status string
    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(AppError::database(format!(
                "Unknown payment status: {other}"
            ))),
        }
    }
}

/// An order row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier
    pub id: Uuid,
    /// Human-facing order reference
    pub order_number: String,
    /// Customer display name
    pub customer_name: String,
    /// Customer contact email
    pub customer_email: String,
    /// Sum of line subtotals at placement time
    pub total_amount: Decimal,
    /// Fulfilment status
    pub order_status: OrderStatus,
    /// Payment state
    pub payment_status: PaymentStatus,
    /// Free-form shipping address
    pub shipping_address: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// One line of an order, snapshotting the price and selections at placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    /// Unique identifier
    pub id: Uuid,
    /// Owning order
    pub order_id: Uuid,
    /// Ordered product
    pub product_id: Uuid,
    /// Units ordered
    pub quantity: i64,
    /// Resolved per-unit price including option contributions
    pub unit_price: Decimal,
    /// The option selections that produced `unit_price`
    pub selections: Vec<Selection>,
}

impl OrderItem {
    /// Line subtotal: unit price times quantity
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Order with its line items for detail responses
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    /// The order row
    #[serde(flatten)]
    pub order: Order,
    /// Line items
    pub items: Vec<OrderItem>,
}

/// One requested line in a placement request
#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineRequest {
    /// Product to order
    pub product_id: Uuid,
    /// Units to order
    pub quantity: i64,
    /// Option selections for this line
    #[serde(default)]
    pub selections: Vec<Selection>,
}

/// Request to place an order
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    /// Customer display name
    pub customer_name: String,
    /// Customer contact email
    pub customer_email: String,
    /// Free-form shipping address
    #[serde(default)]
    pub shipping_address: Option<String>,
    /// Requested lines
    pub items: Vec<OrderLineRequest>,
}

/// Patch for an order's status fields
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrderRequest {
    /// New fulfilment status
    #[serde(default)]
    pub order_status: Option<OrderStatus>,
    /// New payment state
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
}

/// Listing filter for the admin order views
#[derive(Debug, Clone, Default)]
pub struct OrderListFilter {
    /// Match against order number, customer name or email
    pub search: Option<String>,
    /// Filter by fulfilment status
    pub order_status: Option<OrderStatus>,
    /// Filter by payment state
    pub payment_status: Option<PaymentStatus>,
}

/// Order database operations manager
pub struct OrdersManager {
    pool: SqlitePool,
}

impl OrdersManager {
    /// Create a new orders manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Place an order.
    ///
    /// Each line's unit price is resolved through the price resolver against
    /// the product's live options; selections are snapshotted onto the line.
    /// Stock is decremented with a floor of zero. The whole placement is one
    /// transaction - a rejected selection on the last line unwinds every
    /// earlier write.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty or malformed request,
    /// `ResourceNotFound` for a missing product, `InvalidInput` for an
    /// inactive one, `SelectionRejected` from the price resolver, or a
    /// database error.
    pub async fn place(&self, request: &PlaceOrderRequest) -> AppResult<OrderWithItems> {
        if request.customer_name.trim().is_empty() {
            return Err(AppError::missing_field("customer_name"));
        }
        if request.customer_email.trim().is_empty() {
            return Err(AppError::missing_field("customer_email"));
        }
        if request.items.is_empty() {
            return Err(AppError::invalid_input("Order must contain at least one item"));
        }
        if request.items.iter().any(|item| item.quantity < 1) {
            return Err(AppError::invalid_input("Item quantity must be at least 1"));
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = format!("ORD-{}", random_suffix(10).to_uppercase());

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;
        let mut guard = TransactionGuard::new(tx);

        let mut total = Decimal::ZERO;
        let mut items = Vec::with_capacity(request.items.len());

        for line in &request.items {
            let unit_price = price_line(guard.executor()?, line).await?;

            sqlx::query("UPDATE products SET stock = MAX(stock - $2, 0), updated_at = $3 WHERE id = $1")
                .bind(line.product_id.to_string())
                .bind(line.quantity)
                .bind(now)
                .execute(guard.executor()?)
                .await
                .map_err(|e| AppError::database(format!("Failed to decrement stock: {e}")))?;

            let item = OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price,
                selections: line.selections.clone(),
            };
            total += item.subtotal();
            items.push(item);
        }

        sqlx::query(
            r"
            INSERT INTO orders (
                id, order_number, customer_name, customer_email, total_amount,
                order_status, payment_status, shipping_address, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, 'pending', 'pending', $6, $7, $7)
            ",
        )
        .bind(order_id.to_string())
        .bind(&order_number)
        .bind(request.customer_name.trim())
        .bind(request.customer_email.trim())
        .bind(total.to_string())
        .bind(&request.shipping_address)
        .bind(now)
        .execute(guard.executor()?)
        .await
        .map_err(|e| AppError::database(format!("Failed to create order: {e}")))?;

        for item in &items {
            sqlx::query(
                r"
                INSERT INTO order_items (id, order_id, product_id, quantity, unit_price, selections, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(item.id.to_string())
            .bind(order_id.to_string())
            .bind(item.product_id.to_string())
            .bind(item.quantity)
            .bind(item.unit_price.to_string())
            .bind(serde_json::to_string(&item.selections)?)
            .bind(now)
            .execute(guard.executor()?)
            .await
            .map_err(|e| AppError::database(format!("Failed to create order item: {e}")))?;
        }

        guard.commit().await?;

        tracing::info!(order = %order_number, total = %total, "Order placed");
        self.get(order_id).await
    }

    /// Get an order with its items
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for a missing order or a database error.
    pub async fn get(&self, order_id: Uuid) -> AppResult<OrderWithItems> {
        let row = sqlx::query(
            r"
            SELECT id, order_number, customer_name, customer_email, total_amount,
                   order_status, payment_status, shipping_address, created_at, updated_at
            FROM orders WHERE id = $1
            ",
        )
        .bind(order_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get order: {e}")))?
        .ok_or_else(|| AppError::not_found("Order"))?;

        let order = row_to_order(&row)?;

        let item_rows = sqlx::query(
            r"
            SELECT id, order_id, product_id, quantity, unit_price, selections
            FROM order_items WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(order_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to load order items: {e}")))?;

        let items = item_rows
            .iter()
            .map(row_to_order_item)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(OrderWithItems { order, items })
    }

    /// Admin listing with status filters and search, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn list(&self, filter: &OrderListFilter) -> AppResult<Vec<Order>> {
        let order_status_filter = filter.order_status.map_or(String::new(), |status| {
            format!("AND order_status = '{}'", status.as_str())
        });
        let payment_status_filter = filter.payment_status.map_or(String::new(), |status| {
            format!("AND payment_status = '{}'", status.as_str())
        });

        let query = format!(
            r"
            SELECT id, order_number, customer_name, customer_email, total_amount,
                   order_status, payment_status, shipping_address, created_at, updated_at
            FROM orders
            WHERE (order_number LIKE $1 OR customer_name LIKE $1 OR customer_email LIKE $1)
              {order_status_filter}
              {payment_status_filter}
            ORDER BY created_at DESC
            "
        );

        let pattern = format!("%{}%", filter.search.as_deref().unwrap_or_default());
        let rows = sqlx::query(&query)
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list orders: {e}")))?;

        rows.iter().map(row_to_order).collect()
    }

    /// Patch an order's status fields
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for a missing order or a database error.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        request: &UpdateOrderRequest,
    ) -> AppResult<OrderWithItems> {
        let current = self.get(order_id).await?;

        let order_status = request.order_status.unwrap_or(current.order.order_status);
        let payment_status = request
            .payment_status
            .unwrap_or(current.order.payment_status);

        sqlx::query(
            "UPDATE orders SET order_status = $2, payment_status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(order_id.to_string())
        .bind(order_status.as_str())
        .bind(payment_status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update order: {e}")))?;

        self.get(order_id).await
    }

    /// Delete an order together with its items
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for a missing order or a database error.
    pub async fn delete(&self, order_id: Uuid) -> AppResult<()> {
        self.get(order_id).await?;

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;
        let mut guard = TransactionGuard::new(tx);

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id.to_string())
            .execute(guard.executor()?)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete order items: {e}")))?;

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.to_string())
            .execute(guard.executor()?)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete order: {e}")))?;

        guard.commit().await?;
        Ok(())
    }
}

/// Resolve one line's unit price inside the placement transaction
async fn price_line(conn: &mut SqliteConnection, line: &OrderLineRequest) -> AppResult<Decimal> {
    let query = format!(
        r"
        SELECT id, category_id, name, slug, description, price, sale_price,
               stock, sku, status, created_at, updated_at, deleted_at
        FROM products WHERE id = $1 AND {LIVE}
        "
    );
    let row = sqlx::query(&query)
        .bind(line.product_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::database(format!("Failed to load product: {e}")))?
        .ok_or_else(|| AppError::not_found("Product"))?;

    let product = row_to_product(&row)?;
    if product.status != ProductStatus::Active {
        return Err(AppError::invalid_input(format!(
            "Product '{}' is not available for ordering",
            product.name
        )));
    }

    let options = fetch_live_options(conn, product.id).await?;
    line_item_price(&product, &options, &line.selections)
}

/// Convert a database row to an [`Order`]
fn row_to_order(row: &SqliteRow) -> AppResult<Order> {
    let id: String = row.get("id");
    let total_amount: String = row.get("total_amount");
    let order_status: String = row.get("order_status");
    let payment_status: String = row.get("payment_status");

    Ok(Order {
        id: Uuid::parse_str(&id).map_err(|e| AppError::database(format!("Invalid order id: {e}")))?,
        order_number: row.get("order_number"),
        customer_name: row.get("customer_name"),
        customer_email: row.get("customer_email"),
        total_amount: parse_decimal(&total_amount, "total_amount")?,
        order_status: OrderStatus::parse(&order_status)?,
        payment_status: PaymentStatus::parse(&payment_status)?,
        shipping_address: row.get("shipping_address"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Convert a database row to an [`OrderItem`]
fn row_to_order_item(row: &SqliteRow) -> AppResult<OrderItem> {
    let id: String = row.get("id");
    let order_id: String = row.get("order_id");
    let product_id: String = row.get("product_id");
    let unit_price: String = row.get("unit_price");
    let selections: String = row.get("selections");

    Ok(OrderItem {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::database(format!("Invalid order item id: {e}")))?,
        order_id: Uuid::parse_str(&order_id)
            .map_err(|e| AppError::database(format!("Invalid order id: {e}")))?,
        product_id: Uuid::parse_str(&product_id)
            .map_err(|e| AppError::database(format!("Invalid product id: {e}")))?,
        quantity: row.get("quantity"),
        unit_price: parse_decimal(&unit_price, "unit_price")?,
        selections: serde_json::from_str(&selections)?,
    })
}
