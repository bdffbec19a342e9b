mod common;

use chrono::{Duration, Utc};
use dfix_kart_api::{
    dto::{
        admin::InventoryAdjustRequest,
        flash_sales::{CreateFlashSaleRequest, FlashSaleItemRequest},
        reviews::{CreateReviewRequest, UpdateReviewStatusRequest},
        wishlist::AddWishlistRequest,
    },
    error::AppError,
    middleware::auth::AuthUser,
    permissions::ROLE_USER,
    pricing::PriceSource,
    routes::params::ProductQuery,
    services::{
        category_service, flash_sale_service, inventory_service, product_service, review_service,
        wishlist_service,
    },
    state::AppState,
};
use uuid::Uuid;

// Listing, flash pricing, wishlist, reviews and stock adjustment against one catalog.
#[tokio::test]
async fn storefront_catalog_flow() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin = common::create_super_admin(&state).await?;
    let shopper = common::create_user(&state, ROLE_USER).await?;
    let category = common::create_category(&state, &admin).await?;

    let display =
        common::create_product(&state, &admin, category.id, 1000, Some(900), 10, 1).await?;
    common::create_product(&state, &admin, category.id, 400, None, 3, 1).await?;
    common::create_product(&state, &admin, category.id, 250, None, 50, 1).await?;

    let categories = category_service::list_public(&state).await?.data.expect("categories");
    let listed = categories
        .items
        .iter()
        .find(|c| c.id == category.id)
        .expect("new category is public");
    assert_eq!(listed.slug, category.slug);
    assert_eq!(listed.name, category.name);

    let page = product_service::list_products(
        &state,
        ProductQuery {
            category: Some(category.slug.clone()),
            limit: Some(2),
            ..Default::default()
        },
    )
    .await?;
    let meta = page.meta.expect("meta");
    assert_eq!(meta.total, Some(3));
    assert_eq!(meta.pages, Some(2));
    assert_eq!(page.data.expect("products").items.len(), 2);

    let nowhere = product_service::list_products(
        &state,
        ProductQuery {
            category: Some(common::unique("no-such-category")),
            ..Default::default()
        },
    )
    .await?;
    assert!(nowhere.data.expect("products").items.is_empty());

    // Sale price applies until a flash sale starts running.
    let detail = product_service::get_product_detail(&state, &display.slug)
        .await?
        .data
        .expect("detail");
    assert_eq!(detail.product.pricing.price, 900);
    assert_eq!(detail.product.pricing.source, PriceSource::Sale);

    let now = Utc::now();
    let sale = flash_sale_service::create_flash_sale(
        &state,
        &admin,
        CreateFlashSaleRequest {
            name: common::unique("Midnight Deals"),
            description: None,
            start_time: now - Duration::hours(1),
            end_time: now + Duration::hours(1),
            is_active: Some(true),
        },
    )
    .await?
    .data
    .expect("flash sale");

    let too_expensive = flash_sale_service::add_item(
        &state,
        &admin,
        sale.id,
        FlashSaleItemRequest { product_id: display.id, flash_sale_price: 1500 },
    )
    .await;
    assert!(matches!(too_expensive, Err(AppError::BadRequest(_))));

    flash_sale_service::add_item(
        &state,
        &admin,
        sale.id,
        FlashSaleItemRequest { product_id: display.id, flash_sale_price: 700 },
    )
    .await?;
    let again = flash_sale_service::add_item(
        &state,
        &admin,
        sale.id,
        FlashSaleItemRequest { product_id: display.id, flash_sale_price: 650 },
    )
    .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let detail = product_service::get_product_detail(&state, &display.slug)
        .await?
        .data
        .expect("detail");
    assert_eq!(detail.product.pricing.price, 700);
    assert_eq!(detail.product.pricing.original_price, 1000);
    assert_eq!(detail.product.pricing.discount_percentage, 30);
    assert_eq!(detail.product.pricing.source, PriceSource::FlashSale);

    let active = flash_sale_service::list_active(&state).await?.data.expect("active sales");
    let running = active
        .items
        .iter()
        .find(|entry| entry.sale.id == sale.id)
        .expect("running sale is listed");
    assert_eq!(running.products.len(), 1);
    assert_eq!(running.products[0].flash_sale_price, 700);

    // Wishlist adds are idempotent and a remove restores the earlier list.
    let other = common::create_product(&state, &admin, category.id, 120, None, 4, 1).await?;
    wishlist_service::add_to_wishlist(&state, &shopper, AddWishlistRequest { product_id: other.id })
        .await?;
    let before = wishlisted_ids(&state, &shopper).await?;
    assert_eq!(before, vec![other.id]);

    for _ in 0..2 {
        wishlist_service::add_to_wishlist(
            &state,
            &shopper,
            AddWishlistRequest { product_id: display.id },
        )
        .await?;
    }
    let wishlist = wishlist_service::list_wishlist(&state, &shopper).await?.data.expect("wishlist");
    assert_eq!(wishlist.items.len(), 2);
    let listed = wishlist
        .items
        .iter()
        .find(|card| card.product.id == display.id)
        .expect("display is wishlisted");
    assert_eq!(listed.pricing.price, 700);

    wishlist_service::remove_from_wishlist(&state, &shopper, display.id).await?;
    assert_eq!(wishlisted_ids(&state, &shopper).await?, before);
    let gone = wishlist_service::remove_from_wishlist(&state, &shopper, display.id).await;
    assert!(matches!(gone, Err(AppError::NotFound)));

    let out_of_range = review_service::create_review(
        &state,
        &shopper,
        CreateReviewRequest { product_id: display.id, rating: 6, title: None, comment: None },
    )
    .await;
    assert!(matches!(out_of_range, Err(AppError::BadRequest(_))));

    let review = review_service::create_review(
        &state,
        &shopper,
        CreateReviewRequest {
            product_id: display.id,
            rating: 4,
            title: Some("Bright panel".into()),
            comment: None,
        },
    )
    .await?
    .data
    .expect("review");
    assert_eq!(review.status, "pending");
    let duplicate = review_service::create_review(
        &state,
        &shopper,
        CreateReviewRequest { product_id: display.id, rating: 5, title: None, comment: None },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    // Pending reviews do not count toward the rating.
    let summary = review_service::rating_summary(&state.pool, display.id).await?;
    assert_eq!(summary.count, 0);
    review_service::update_review_status(
        &state,
        &admin,
        review.id,
        UpdateReviewStatusRequest { status: "approved".into() },
    )
    .await?;
    let summary = review_service::rating_summary(&state.pool, display.id).await?;
    assert_eq!(summary.count, 1);
    assert_eq!(summary.average, 4.0);

    let overdraw = inventory_service::adjust_inventory(
        &state,
        &admin,
        display.id,
        InventoryAdjustRequest { delta: -11, variant_id: None },
    )
    .await;
    assert!(matches!(overdraw, Err(AppError::BadRequest(_))));

    let restocked = inventory_service::adjust_inventory(
        &state,
        &admin,
        display.id,
        InventoryAdjustRequest { delta: 5, variant_id: None },
    )
    .await?
    .data
    .expect("adjustment");
    assert_eq!(restocked["stock"], 15);

    let not_allowed = inventory_service::adjust_inventory(
        &state,
        &shopper,
        display.id,
        InventoryAdjustRequest { delta: 5, variant_id: None },
    )
    .await;
    assert!(matches!(not_allowed, Err(AppError::Forbidden)));

    Ok(())
}

async fn wishlisted_ids(state: &AppState, user: &AuthUser) -> anyhow::Result<Vec<Uuid>> {
    let list = wishlist_service::list_wishlist(state, user).await?.data.expect("wishlist");
    let mut ids: Vec<Uuid> = list.items.iter().map(|card| card.product.id).collect();
    ids.sort();
    Ok(ids)
}
