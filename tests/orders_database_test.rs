// ABOUTME: Integration tests for order placement and administration
// ABOUTME: Covers resolver-priced lines, atomic rollback, stock decrement and status patching
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(missing_docs, clippy::unwrap_used)]

use atelier_commerce::database::categories::{CategoriesManager, CreateCategoryRequest};
use atelier_commerce::database::orders::{
    OrderLineRequest, OrderListFilter, OrderStatus, OrdersManager, PaymentStatus,
    PlaceOrderRequest, UpdateOrderRequest,
};
use atelier_commerce::database::product_options::{OptionSpec, OptionType, ValueSpec};
use atelier_commerce::database::products::{
    CreateProductRequest, ProductStatus, ProductsManager, ProductWithRelations,
};
use atelier_commerce::database::Database;
use atelier_commerce::errors::ErrorCode;
use atelier_commerce::pricing::Selection;
use rust_decimal::Decimal;
use uuid::Uuid;

async fn create_test_db() -> Database {
    Database::new("sqlite::memory:").await.unwrap()
}

/// An active product priced at 50 with one number option
/// (price_per_unit=5, bounds 1..=10)
async fn create_priced_product(db: &Database) -> ProductWithRelations {
    let category_id = CategoriesManager::new(db.pool().clone())
        .create(&CreateCategoryRequest {
            name: format!("Bouquets {}", Uuid::new_v4()),
            description: None,
            parent_id: None,
            status: true,
            sort_order: 0,
        })
        .await
        .unwrap()
        .id;

    ProductsManager::new(db.pool().clone())
        .create(&CreateProductRequest {
            name: "Crochet Bouquet".into(),
            description: None,
            price: Decimal::from(50),
            sale_price: None,
            sku: None,
            stock: 5,
            category_id,
            status: ProductStatus::Active,
            options: vec![OptionSpec {
                id: None,
                name: "Flower Count".into(),
                option_type: OptionType::Number,
                is_required: false,
                min_value: Some(1),
                max_value: Some(10),
                price_per_unit: Some(Decimal::from(5)),
                values: Vec::new(),
            }],
        })
        .await
        .unwrap()
}

fn order_request(product_id: Uuid, quantity: i64, selections: Vec<Selection>) -> PlaceOrderRequest {
    PlaceOrderRequest {
        customer_name: "Ada".into(),
        customer_email: "ada@example.test".into(),
        shipping_address: Some("1 Loop Lane".into()),
        items: vec![OrderLineRequest {
            product_id,
            quantity,
            selections,
        }],
    }
}

#[tokio::test]
async fn test_place_order_prices_number_option() {
    let db = create_test_db().await;
    let product = create_priced_product(&db).await;
    let option_id = product.options[0].id;
    let orders = OrdersManager::new(db.pool().clone());

    let placed = orders
        .place(&order_request(
            product.product.id,
            2,
            vec![Selection {
                option_id,
                value_id: None,
                quantity: Some(3),
            }],
        ))
        .await
        .unwrap();

    // 50 + 5 x 3 = 65 per unit, two units
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].unit_price, Decimal::from(65));
    assert_eq!(placed.order.total_amount, Decimal::from(130));
    assert_eq!(placed.order.order_status, OrderStatus::Pending);
    assert!(placed.order.order_number.starts_with("ORD-"));

    // stock decremented by the ordered quantity
    let product_after = ProductsManager::new(db.pool().clone())
        .get(product.product.id)
        .await
        .unwrap();
    assert_eq!(product_after.product.stock, 3);
    assert_eq!(product_after.sales_count, 1);
}

#[tokio::test]
async fn test_rejected_selection_rolls_back_whole_order() {
    let db = create_test_db().await;
    let product = create_priced_product(&db).await;
    let option_id = product.options[0].id;
    let orders = OrdersManager::new(db.pool().clone());

    // quantity 15 exceeds the option's max of 10
    let err = orders
        .place(&order_request(
            product.product.id,
            1,
            vec![Selection {
                option_id,
                value_id: None,
                quantity: Some(15),
            }],
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SelectionRejected);

    // nothing was persisted - no order rows and the stock is untouched
    let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(order_count, 0);

    let product_after = ProductsManager::new(db.pool().clone())
        .get(product.product.id)
        .await
        .unwrap();
    assert_eq!(product_after.product.stock, 5);
}

#[tokio::test]
async fn test_required_choice_option_must_be_selected() {
    let db = create_test_db().await;
    let category_id = CategoriesManager::new(db.pool().clone())
        .create(&CreateCategoryRequest {
            name: "Plushies".into(),
            description: None,
            parent_id: None,
            status: true,
            sort_order: 0,
        })
        .await
        .unwrap()
        .id;
    let products = ProductsManager::new(db.pool().clone());

    let product = products
        .create(&CreateProductRequest {
            name: "Bear".into(),
            description: None,
            price: Decimal::from(40),
            sale_price: Some(Decimal::from(35)),
            sku: None,
            stock: 2,
            category_id,
            status: ProductStatus::Active,
            options: vec![OptionSpec {
                id: None,
                name: "Size".into(),
                option_type: OptionType::Radio,
                is_required: true,
                min_value: None,
                max_value: None,
                price_per_unit: None,
                values: vec![ValueSpec {
                    id: None,
                    label: "Large".into(),
                    value: None,
                    price_modifier: Some(Decimal::from(8)),
                }],
            }],
        })
        .await
        .unwrap();

    let orders = OrdersManager::new(db.pool().clone());
    let err = orders
        .place(&order_request(product.product.id, 1, Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SelectionRejected);

    // selecting the value prices off the sale price: 35 + 8
    let placed = orders
        .place(&order_request(
            product.product.id,
            1,
            vec![Selection {
                option_id: product.options[0].id,
                value_id: Some(product.options[0].values[0].id),
                quantity: None,
            }],
        ))
        .await
        .unwrap();
    assert_eq!(placed.order.total_amount, Decimal::from(43));
}

#[tokio::test]
async fn test_inactive_product_cannot_be_ordered() {
    let db = create_test_db().await;
    let product = create_priced_product(&db).await;
    let products = ProductsManager::new(db.pool().clone());
    let orders = OrdersManager::new(db.pool().clone());

    products
        .update(
            product.product.id,
            &atelier_commerce::database::products::UpdateProductRequest {
                status: Some(ProductStatus::Archived),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = orders
        .place(&order_request(product.product.id, 1, Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn test_stock_never_goes_negative() {
    let db = create_test_db().await;
    let product = create_priced_product(&db).await;
    let orders = OrdersManager::new(db.pool().clone());

    orders
        .place(&order_request(product.product.id, 9, Vec::new()))
        .await
        .unwrap();

    let product_after = ProductsManager::new(db.pool().clone())
        .get(product.product.id)
        .await
        .unwrap();
    assert_eq!(product_after.product.stock, 0);
}

#[tokio::test]
async fn test_order_status_patch() {
    let db = create_test_db().await;
    let product = create_priced_product(&db).await;
    let orders = OrdersManager::new(db.pool().clone());

    let placed = orders
        .place(&order_request(product.product.id, 1, Vec::new()))
        .await
        .unwrap();

    let updated = orders
        .update_status(
            placed.order.id,
            &UpdateOrderRequest {
                order_status: Some(OrderStatus::Shipped),
                payment_status: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.order.order_status, OrderStatus::Shipped);
    // untouched field keeps its value
    assert_eq!(updated.order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_order_listing_filters() {
    let db = create_test_db().await;
    let product = create_priced_product(&db).await;
    let orders = OrdersManager::new(db.pool().clone());

    let placed = orders
        .place(&order_request(product.product.id, 1, Vec::new()))
        .await
        .unwrap();
    orders
        .place(&PlaceOrderRequest {
            customer_name: "Grace".into(),
            customer_email: "grace@example.test".into(),
            shipping_address: None,
            items: vec![OrderLineRequest {
                product_id: product.product.id,
                quantity: 1,
                selections: Vec::new(),
            }],
        })
        .await
        .unwrap();

    let by_customer = orders
        .list(&OrderListFilter {
            search: Some("grace".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_customer.len(), 1);
    assert_eq!(by_customer[0].customer_name, "Grace");

    let by_number = orders
        .list(&OrderListFilter {
            search: Some(placed.order.order_number.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_number.len(), 1);

    orders
        .update_status(
            placed.order.id,
            &UpdateOrderRequest {
                order_status: Some(OrderStatus::Delivered),
                payment_status: Some(PaymentStatus::Paid),
            },
        )
        .await
        .unwrap();
    let paid = orders
        .list(&OrderListFilter {
            payment_status: Some(PaymentStatus::Paid),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(paid.len(), 1);
}

#[tokio::test]
async fn test_delete_order_removes_items() {
    let db = create_test_db().await;
    let product = create_priced_product(&db).await;
    let orders = OrdersManager::new(db.pool().clone());

    let placed = orders
        .place(&order_request(product.product.id, 1, Vec::new()))
        .await
        .unwrap();
    orders.delete(placed.order.id).await.unwrap();

    let err = orders.get(placed.order.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE order_id = $1")
        .bind(placed.order.id.to_string())
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn test_selection_snapshot_round_trips() {
    let db = create_test_db().await;
    let product = create_priced_product(&db).await;
    let option_id = product.options[0].id;
    let orders = OrdersManager::new(db.pool().clone());

    let placed = orders
        .place(&order_request(
            product.product.id,
            1,
            vec![Selection {
                option_id,
                value_id: None,
                quantity: Some(4),
            }],
        ))
        .await
        .unwrap();

    let fetched = orders.get(placed.order.id).await.unwrap();
    assert_eq!(fetched.items[0].selections.len(), 1);
    assert_eq!(fetched.items[0].selections[0].option_id, option_id);
    assert_eq!(fetched.items[0].selections[0].quantity, Some(4));
}
