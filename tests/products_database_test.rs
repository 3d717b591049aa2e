// ABOUTME: Integration tests for product, category, image and single-option operations
// ABOUTME: Covers partial-patch semantics, deletion guards and storefront reads
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(missing_docs, clippy::unwrap_used)]

use atelier_commerce::database::categories::{
    CategoriesManager, CreateCategoryRequest, UpdateCategoryRequest,
};
use atelier_commerce::database::images::ImagesManager;
use atelier_commerce::database::product_options::{
    CreateOptionRequest, OptionType, OptionsManager, UpdateOptionRequest, ValueSpec,
};
use atelier_commerce::database::products::{
    CreateProductRequest, ProductListFilter, ProductStatus, ProductSort, ProductsManager,
    StorefrontFilter, UpdateProductRequest,
};
use atelier_commerce::database::Database;
use atelier_commerce::errors::ErrorCode;
use rust_decimal::Decimal;
use uuid::Uuid;

async fn create_test_db() -> Database {
    Database::new("sqlite::memory:").await.unwrap()
}

async fn create_test_category(db: &Database, name: &str) -> Uuid {
    CategoriesManager::new(db.pool().clone())
        .create(&CreateCategoryRequest {
            name: name.into(),
            description: None,
            parent_id: None,
            status: true,
            sort_order: 0,
        })
        .await
        .unwrap()
        .id
}

fn basic_product(category_id: Uuid, name: &str, price: i64) -> CreateProductRequest {
    CreateProductRequest {
        name: name.into(),
        description: None,
        price: Decimal::from(price),
        sale_price: None,
        sku: None,
        stock: 3,
        category_id,
        status: ProductStatus::Active,
        options: Vec::new(),
    }
}

#[tokio::test]
async fn test_create_product_derives_slug() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());

    let created = products
        .create(&basic_product(category_id, "Mocha the Bear", 45))
        .await
        .unwrap();

    assert!(created.product.slug.starts_with("mocha-the-bear-"));
    assert_eq!(created.product.status, ProductStatus::Active);
    assert_eq!(created.category.as_ref().unwrap().name, "Plushies");
}

#[tokio::test]
async fn test_sku_must_be_unique_among_live_products() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());

    let mut request = basic_product(category_id, "Bear", 45);
    request.sku = Some("BEAR-01".into());
    let first = products.create(&request).await.unwrap();

    let mut duplicate_request = basic_product(category_id, "Other Bear", 50);
    duplicate_request.sku = Some("BEAR-01".into());
    let err = products.create(&duplicate_request).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceAlreadyExists);

    // a soft-deleted product releases its sku
    products.delete(first.product.id).await.unwrap();
    assert!(products.create(&duplicate_request).await.is_ok());
}

#[tokio::test]
async fn test_update_is_a_partial_patch() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());

    let mut request = basic_product(category_id, "Bear", 45);
    request.description = Some("Soft".into());
    request.sale_price = Some(Decimal::from(40));
    let created = products.create(&request).await.unwrap();

    // only the price changes; description and sale_price stay
    let updated = products
        .update(
            created.product.id,
            &UpdateProductRequest {
                price: Some(Decimal::from(55)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.product.price, Decimal::from(55));
    assert_eq!(updated.product.description.as_deref(), Some("Soft"));
    assert_eq!(updated.product.sale_price, Some(Decimal::from(40)));

    // explicit null clears the sale price
    let cleared = products
        .update(
            created.product.id,
            &UpdateProductRequest {
                sale_price: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.product.sale_price, None);
    assert_eq!(cleared.product.final_price(), Decimal::from(55));
}

#[tokio::test]
async fn test_soft_deleted_product_disappears_from_reads() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());

    let created = products
        .create(&basic_product(category_id, "Bear", 45))
        .await
        .unwrap();
    products.delete(created.product.id).await.unwrap();

    let err = products.get(created.product.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    let listing = products.list(&ProductListFilter::default()).await.unwrap();
    assert!(listing.is_empty());

    // deleting twice is a not-found, not a silent success
    let err = products.delete(created.product.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn test_admin_listing_filters() {
    let db = create_test_db().await;
    let plushies = create_test_category(&db, "Plushies").await;
    let blankets = create_test_category(&db, "Blankets").await;
    let products = ProductsManager::new(db.pool().clone());

    let mut bear = basic_product(plushies, "Mocha the Bear", 45);
    bear.sku = Some("BEAR-01".into());
    products.create(&bear).await.unwrap();

    let mut blanket = basic_product(blankets, "Granny Square Blanket", 120);
    blanket.status = ProductStatus::Draft;
    products.create(&blanket).await.unwrap();

    let by_sku = products
        .list(&ProductListFilter {
            search: Some("BEAR".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_sku.len(), 1);
    assert_eq!(by_sku[0].product.name, "Mocha the Bear");

    let by_category = products
        .list(&ProductListFilter {
            category: Some("Blankets".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_category.len(), 1);

    let drafts = products
        .list(&ProductListFilter {
            status: Some(ProductStatus::Draft),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].product.name, "Granny Square Blanket");
}

#[tokio::test]
async fn test_storefront_shows_active_products_only() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());

    let active = products
        .create(&basic_product(category_id, "Bear", 45))
        .await
        .unwrap();
    let mut draft = basic_product(category_id, "Unfinished Bear", 45);
    draft.status = ProductStatus::Draft;
    let draft = products.create(&draft).await.unwrap();

    let listing = products
        .storefront_list(&StorefrontFilter::default())
        .await
        .unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].product.id, active.product.id);

    let err = products.storefront_get(draft.product.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn test_storefront_price_sort() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());

    products
        .create(&basic_product(category_id, "Expensive", 90))
        .await
        .unwrap();
    products
        .create(&basic_product(category_id, "Cheap", 10))
        .await
        .unwrap();

    let low_first = products
        .storefront_list(&StorefrontFilter {
            sort: ProductSort::PriceLow,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(low_first[0].product.name, "Cheap");
    assert_eq!(low_first[1].product.name, "Expensive");
}

#[tokio::test]
async fn test_category_delete_guard() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let categories = CategoriesManager::new(db.pool().clone());
    let products = ProductsManager::new(db.pool().clone());

    let created = products
        .create(&basic_product(category_id, "Bear", 45))
        .await
        .unwrap();

    let err = categories.delete(category_id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceLocked);

    // a soft-deleted product no longer blocks category deletion
    products.delete(created.product.id).await.unwrap();
    assert!(categories.delete(category_id).await.is_ok());
}

#[tokio::test]
async fn test_category_rename_rederives_slug() {
    let db = create_test_db().await;
    let categories = CategoriesManager::new(db.pool().clone());
    let category = categories
        .create(&CreateCategoryRequest {
            name: "Wall Hangings".into(),
            description: None,
            parent_id: None,
            status: true,
            sort_order: 0,
        })
        .await
        .unwrap();
    assert_eq!(category.slug, "wall-hangings");

    let renamed = categories
        .update(
            category.id,
            &UpdateCategoryRequest {
                name: Some("Tapestries".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.slug, "tapestries");
}

#[tokio::test]
async fn test_image_primary_promotion() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());
    let images = ImagesManager::new(db.pool().clone());

    let product = products
        .create(&basic_product(category_id, "Bear", 45))
        .await
        .unwrap()
        .product;

    let first = images
        .attach(product.id, "https://cdn.example.test/bear-1.webp")
        .await
        .unwrap();
    let second = images
        .attach(product.id, "https://cdn.example.test/bear-2.webp")
        .await
        .unwrap();
    assert!(first.is_primary);
    assert!(!second.is_primary);

    images.remove(product.id, first.id).await.unwrap();

    let remaining = images.list(product.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.id);
    assert!(remaining[0].is_primary);
}

#[tokio::test]
async fn test_image_removal_checks_ownership() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());
    let images = ImagesManager::new(db.pool().clone());

    let bear = products
        .create(&basic_product(category_id, "Bear", 45))
        .await
        .unwrap()
        .product;
    let fox = products
        .create(&basic_product(category_id, "Fox", 45))
        .await
        .unwrap()
        .product;

    let image = images
        .attach(bear.id, "https://cdn.example.test/bear.webp")
        .await
        .unwrap();

    let err = images.remove(fox.id, image.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn test_single_option_endpoints() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());
    let options = OptionsManager::new(db.pool().clone());

    let product = products
        .create(&basic_product(category_id, "Bear", 45))
        .await
        .unwrap()
        .product;

    let option = options
        .create(
            product.id,
            &CreateOptionRequest {
                name: "Scarf Color".into(),
                option_type: OptionType::Dropdown,
                is_required: false,
                min_value: None,
                max_value: None,
                price_per_unit: None,
                values: vec![ValueSpec {
                    id: None,
                    label: "Red".into(),
                    value: None,
                    price_modifier: None,
                }],
            },
        )
        .await
        .unwrap();
    assert_eq!(option.values.len(), 1);

    // partial patch: only the name changes, values survive untouched
    let patched = options
        .update(
            product.id,
            option.id,
            &UpdateOptionRequest {
                name: Some("Hat Color".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.name, "Hat Color");
    assert_eq!(patched.values.len(), 1);

    // hard delete removes the option and its values entirely
    options.delete(product.id, option.id).await.unwrap();
    assert!(options.list(product.id).await.unwrap().is_empty());

    let orphans: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM product_option_values WHERE product_option_id = $1",
    )
    .bind(option.id.to_string())
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn test_single_option_update_rejects_foreign_product() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());
    let options = OptionsManager::new(db.pool().clone());

    let bear = products
        .create(&basic_product(category_id, "Bear", 45))
        .await
        .unwrap()
        .product;
    let fox = products
        .create(&basic_product(category_id, "Fox", 45))
        .await
        .unwrap()
        .product;

    let option = options
        .create(
            bear.id,
            &CreateOptionRequest {
                name: "Scarf Color".into(),
                option_type: OptionType::Radio,
                is_required: false,
                min_value: None,
                max_value: None,
                price_per_unit: None,
                values: Vec::new(),
            },
        )
        .await
        .unwrap();

    let err = options
        .update(fox.id, option.id, &UpdateOptionRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::OwnershipViolation);
}

#[tokio::test]
async fn test_purge_is_guarded_by_order_items() {
    let db = create_test_db().await;
    let category_id = create_test_category(&db, "Plushies").await;
    let products = ProductsManager::new(db.pool().clone());

    let product = products
        .create(&basic_product(category_id, "Bear", 45))
        .await
        .unwrap()
        .product;

    let orders = atelier_commerce::database::orders::OrdersManager::new(db.pool().clone());
    orders
        .place(&atelier_commerce::database::orders::PlaceOrderRequest {
            customer_name: "Ada".into(),
            customer_email: "ada@example.test".into(),
            shipping_address: None,
            items: vec![atelier_commerce::database::orders::OrderLineRequest {
                product_id: product.id,
                quantity: 1,
                selections: Vec::new(),
            }],
        })
        .await
        .unwrap();

    let err = products.purge(product.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceLocked);

    // without referencing line items the purge removes every dependent row
    let unreferenced = products
        .create(&basic_product(category_id, "Fox", 45))
        .await
        .unwrap()
        .product;
    products.purge(unreferenced.id).await.unwrap();
    let gone: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE id = $1")
        .bind(unreferenced.id.to_string())
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(gone, 0);
}
