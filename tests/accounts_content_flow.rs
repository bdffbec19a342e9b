mod common;

use chrono::{Duration, Utc};
use dfix_kart_api::{
    dto::{
        auth::RegisterRequest,
        blog::{CreateBlogPostRequest, UpdateBlogPostRequest},
        cart::AddToCartRequest,
        flash_sales::{CreateFlashSaleRequest, FlashSaleItemRequest, UpdateFlashSaleRequest},
        wishlist::AddWishlistRequest,
    },
    error::AppError,
    permissions::ROLE_USER,
    pricing::PriceSource,
    routes::params::{Pagination, ProductQuery},
    services::{
        address_service, auth_service, blog_service, cart_service, category_service,
        flash_sale_service, product_service, referral_service, wishlist_service,
    },
    state::AppState,
};
use uuid::Uuid;

fn signup(referral_code: Option<String>) -> RegisterRequest {
    RegisterRequest {
        name: common::unique("Referred"),
        email: format!("{}@example.com", common::unique("signup")),
        password: "secret123".into(),
        phone: None,
        referral_code,
    }
}

#[tokio::test]
async fn referral_code_links_new_accounts() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let referrer = common::create_user(&state, ROLE_USER).await?;
    let code = auth_service::build_referral_code(referrer.user_id);

    let joined = auth_service::register_user(&state, signup(Some(code.to_lowercase())))
        .await?
        .data
        .expect("user");

    let summary = referral_service::my_referrals(&state, &referrer)
        .await?
        .data
        .expect("referrals");
    assert_eq!(summary.referral_code, code);
    assert_eq!(summary.total_referrals, 1);
    assert_eq!(summary.referred.len(), 1);
    assert_eq!(summary.referred[0].name, joined.name);

    let unknown = auth_service::register_user(&state, signup(Some("DFKNOBODY".into()))).await;
    assert!(matches!(unknown, Err(AppError::BadRequest(_))));
    assert_eq!(referral_service::referral_count(&state.pool, referrer.user_id).await?, 1);

    Ok(())
}

#[tokio::test]
async fn exactly_one_default_address() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let user = common::create_user(&state, ROLE_USER).await?;
    let home = common::create_address(&state, &user, "1 Home Lane", None).await?;
    let office = common::create_address(&state, &user, "2 Office Park", None).await?;
    let depot = common::create_address(&state, &user, "3 Depot Road", None).await?;
    assert!(home.is_default);
    assert!(!office.is_default);
    assert_eq!(defaults(&state, &user).await?, vec![home.id]);

    address_service::set_default_address(&state, &user, office.id).await?;
    assert_eq!(defaults(&state, &user).await?, vec![office.id]);

    let flagged = common::create_address(&state, &user, "4 Flag Street", Some(true)).await?;
    assert_eq!(defaults(&state, &user).await?, vec![flagged.id]);

    // Deleting the default hands it to the newest remaining address.
    address_service::delete_address(&state, &user, flagged.id).await?;
    assert_eq!(defaults(&state, &user).await?, vec![depot.id]);

    address_service::delete_address(&state, &user, home.id).await?;
    assert_eq!(defaults(&state, &user).await?, vec![depot.id]);

    let stranger = common::create_user(&state, ROLE_USER).await?;
    let foreign = address_service::set_default_address(&state, &stranger, depot.id).await;
    assert!(matches!(foreign, Err(AppError::NotFound)));

    Ok(())
}

async fn defaults(
    state: &AppState,
    user: &dfix_kart_api::middleware::auth::AuthUser,
) -> anyhow::Result<Vec<Uuid>> {
    let list = address_service::list_addresses(state, user).await?.data.expect("addresses");
    Ok(list.items.iter().filter(|a| a.is_default).map(|a| a.id).collect())
}

#[tokio::test]
async fn category_with_products_cannot_be_deleted() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin = common::create_super_admin(&state).await?;
    let used = common::create_category(&state, &admin).await?;
    common::create_product(&state, &admin, used.id, 150, None, 2, 1).await?;

    let blocked = category_service::delete_category(&state, &admin, used.id).await;
    assert!(matches!(blocked, Err(AppError::BadRequest(_))));

    let empty = common::create_category(&state, &admin).await?;
    category_service::delete_category(&state, &admin, empty.id).await?;
    let again = category_service::delete_category(&state, &admin, empty.id).await;
    assert!(matches!(again, Err(AppError::NotFound)));

    Ok(())
}

#[tokio::test]
async fn blog_publish_time_is_set_once() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin = common::create_super_admin(&state).await?;
    let draft = blog_service::create_post(
        &state,
        &admin,
        CreateBlogPostRequest {
            title: common::unique("Replacing a cracked screen"),
            slug: None,
            excerpt: None,
            content: "Heat the edges first.".into(),
            cover_image: None,
            status: None,
        },
    )
    .await?
    .data
    .expect("post");
    assert_eq!(draft.status, "draft");
    assert!(draft.published_at.is_none());
    let hidden = blog_service::get_published(&state, &draft.slug).await;
    assert!(matches!(hidden, Err(AppError::NotFound)));

    let published = update_post(&state, &admin, draft.id, UpdateBlogPostRequest {
        status: Some("published".into()),
        ..Default::default()
    })
    .await?;
    let first_published = published.published_at.expect("publish time");
    let public = blog_service::get_published(&state, &draft.slug).await?.data.expect("post");
    assert_eq!(public.id, draft.id);

    let retitled = update_post(&state, &admin, draft.id, UpdateBlogPostRequest {
        title: Some("Replacing a cracked screen, revised".into()),
        ..Default::default()
    })
    .await?;
    assert_eq!(retitled.published_at, Some(first_published));

    let unpublished = update_post(&state, &admin, draft.id, UpdateBlogPostRequest {
        status: Some("draft".into()),
        ..Default::default()
    })
    .await?;
    assert_eq!(unpublished.status, "draft");
    assert_eq!(unpublished.published_at, Some(first_published));

    let republished = update_post(&state, &admin, draft.id, UpdateBlogPostRequest {
        status: Some("published".into()),
        ..Default::default()
    })
    .await?;
    assert_eq!(republished.published_at, Some(first_published));

    let listed = blog_service::list_published(&state, Pagination::default())
        .await?
        .data
        .expect("posts");
    assert!(listed.items.iter().any(|post| post.id == draft.id));

    Ok(())
}

async fn update_post(
    state: &AppState,
    admin: &dfix_kart_api::middleware::auth::AuthUser,
    id: Uuid,
    payload: UpdateBlogPostRequest,
) -> anyhow::Result<dfix_kart_api::models::BlogPost> {
    let resp = blog_service::update_post(state, admin, id, payload).await?;
    Ok(resp.data.expect("post"))
}

#[tokio::test]
async fn inactive_flash_sale_keeps_the_sale_price() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin = common::create_super_admin(&state).await?;
    let category = common::create_category(&state, &admin).await?;
    let product =
        common::create_product(&state, &admin, category.id, 1000, Some(900), 5, 1).await?;

    let now = Utc::now();
    let sale = flash_sale_service::create_flash_sale(
        &state,
        &admin,
        CreateFlashSaleRequest {
            name: common::unique("Paused Deals"),
            description: None,
            start_time: now - Duration::hours(1),
            end_time: now + Duration::hours(1),
            is_active: Some(false),
        },
    )
    .await?
    .data
    .expect("flash sale");
    flash_sale_service::add_item(
        &state,
        &admin,
        sale.id,
        FlashSaleItemRequest { product_id: product.id, flash_sale_price: 500 },
    )
    .await?;

    let card = listed_card(&state, &category.slug, product.id).await?;
    assert_eq!(card.pricing.price, 900);
    assert_eq!(card.pricing.source, PriceSource::Sale);

    let active = flash_sale_service::list_active(&state).await?.data.expect("sales");
    assert!(active.items.iter().all(|entry| entry.sale.id != sale.id));

    flash_sale_service::update_flash_sale(
        &state,
        &admin,
        sale.id,
        UpdateFlashSaleRequest { is_active: Some(true), ..Default::default() },
    )
    .await?;
    let card = listed_card(&state, &category.slug, product.id).await?;
    assert_eq!(card.pricing.price, 500);
    assert_eq!(card.pricing.source, PriceSource::FlashSale);

    Ok(())
}

async fn listed_card(
    state: &AppState,
    category_slug: &str,
    product_id: Uuid,
) -> anyhow::Result<dfix_kart_api::models::ProductCard> {
    let page = product_service::list_products(
        state,
        ProductQuery { category: Some(category_slug.to_string()), ..Default::default() },
    )
    .await?;
    let card = page
        .data
        .expect("products")
        .items
        .into_iter()
        .find(|card| card.product.id == product_id)
        .expect("product is listed");
    Ok(card)
}

// Simultaneous adds of the same line end up as one row and never surface a 500.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_adds_collapse_to_one_row() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin = common::create_super_admin(&state).await?;
    let shopper = common::create_user(&state, ROLE_USER).await?;
    let category = common::create_category(&state, &admin).await?;
    let product = common::create_product(&state, &admin, category.id, 200, None, 50, 1).await?;

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let state = state.clone();
        let shopper = shopper.clone();
        let product_id = product.id;
        tasks.push(tokio::spawn(async move {
            cart_service::add_to_cart(
                &state,
                &shopper,
                AddToCartRequest { product_id, variant_id: None, quantity: 2 },
            )
            .await?;
            wishlist_service::add_to_wishlist(&state, &shopper, AddWishlistRequest { product_id })
                .await?;
            Ok::<_, AppError>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    let cart = cart_service::get_cart(&state, &shopper).await?.data.expect("cart");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.item_count, 2);
    let wishlist = wishlist_service::list_wishlist(&state, &shopper).await?.data.expect("wishlist");
    assert_eq!(wishlist.items.len(), 1);

    // Racing default-address writes either win or get a 409; one default survives.
    let mut tasks = Vec::new();
    for n in 0..6 {
        let state = state.clone();
        let shopper = shopper.clone();
        tasks.push(tokio::spawn(async move {
            let line1 = format!("{n} Race Course Road");
            address_service::create_address(
                &state,
                &shopper,
                common::address_request(&line1, Some(true)),
            )
            .await
        }));
    }
    for task in tasks {
        match task.await? {
            Ok(_) | Err(AppError::Conflict(_)) => {}
            Err(other) => return Err(other.into()),
        }
    }
    assert_eq!(defaults(&state, &shopper).await?.len(), 1);

    Ok(())
}
