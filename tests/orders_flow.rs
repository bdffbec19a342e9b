mod common;

use dfix_kart_api::{
    dto::{
        addresses::AddressRequest,
        cart::AddToCartRequest,
        orders::{CheckoutRequest, ConfirmPaymentRequest, UpdateOrderStatusRequest},
        products::CreateVariantRequest,
        returns::{CreateReturnRequest, UpdateReturnRequest},
    },
    entity::{ProductVariants, Products},
    error::AppError,
    permissions::ROLE_USER,
    routes::params::OrderListQuery,
    services::{address_service, cart_service, order_service, product_service, return_service},
    state::AppState,
};
use sea_orm::EntityTrait;
use uuid::Uuid;

// Cart -> checkout -> payment -> fulfilment -> return, then a second order that is cancelled.
#[tokio::test]
async fn checkout_payment_fulfilment_and_return_flow() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin = common::create_super_admin(&state).await?;
    let customer = common::create_user(&state, ROLE_USER).await?;
    let category = common::create_category(&state, &admin).await?;

    // 1000 list, 900 sale, must buy two at a time.
    let part = common::create_product(&state, &admin, category.id, 1000, Some(900), 10, 2).await?;
    let battery = common::create_product(&state, &admin, category.id, 700, None, 20, 1).await?;
    let variant = product_service::create_variant(
        &state,
        &admin,
        battery.id,
        CreateVariantRequest {
            sku: None,
            name: "Pro".into(),
            price: 500,
            sale_price: None,
            stock: 5,
            moq: None,
            is_active: Some(true),
        },
    )
    .await?
    .data
    .expect("variant");

    let address = address_service::create_address(
        &state,
        &customer,
        AddressRequest {
            full_name: "Asha Rao".into(),
            phone: "9876543210".into(),
            line1: "12 MG Road".into(),
            line2: None,
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            postal_code: "560001".into(),
            country: None,
            is_default: None,
        },
    )
    .await?
    .data
    .expect("address");
    assert!(address.is_default, "first address becomes the default");

    let below_moq = cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest { product_id: part.id, variant_id: None, quantity: 1 },
    )
    .await;
    assert!(matches!(below_moq, Err(AppError::BadRequest(_))));

    cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest { product_id: part.id, variant_id: None, quantity: 2 },
    )
    .await?;
    cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest { product_id: battery.id, variant_id: Some(variant.id), quantity: 1 },
    )
    .await?;

    let cart = cart_service::get_cart(&state, &customer).await?.data.expect("cart");
    assert_eq!(cart.item_count, 3);
    assert_eq!(cart.subtotal, 2 * 1000 + 500);
    assert_eq!(cart.total, 2 * 900 + 500);
    assert_eq!(cart.discount_total, 200);

    let placed = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest { address_id: address.id, payment_method: "online".into(), notes: None },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(placed.order.total_amount, 2300);
    assert_eq!(placed.order.status, "pending");
    assert_eq!(placed.order.payment_status, "unpaid");
    assert_eq!(placed.items.len(), 2);
    assert!(placed.order.order_number.starts_with("DFK-"));

    assert_eq!(stock_of(&state, part.id).await?, 8);
    assert_eq!(variant_stock_of(&state, variant.id).await?, 4);
    // Variant lines leave the parent product's stock alone.
    assert_eq!(stock_of(&state, battery.id).await?, 20);

    let cart = cart_service::get_cart(&state, &customer).await?.data.expect("cart");
    assert!(cart.items.is_empty(), "checkout clears the cart");

    let paid = order_service::confirm_payment(
        &state,
        &customer,
        placed.order.id,
        ConfirmPaymentRequest { payment_reference: "UTR-001".into() },
    )
    .await?
    .data
    .expect("paid order");
    assert_eq!(paid.order.payment_status, "paid");
    assert_eq!(paid.order.status, "processing");

    let twice = order_service::confirm_payment(
        &state,
        &customer,
        placed.order.id,
        ConfirmPaymentRequest { payment_reference: "UTR-002".into() },
    )
    .await;
    assert!(matches!(twice, Err(AppError::BadRequest(_))));

    let forbidden = order_service::update_order_status(
        &state,
        &customer,
        placed.order.id,
        UpdateOrderStatusRequest { status: "shipped".into() },
    )
    .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    set_status(&state, &admin, placed.order.id, "shipped").await?;
    let backwards = order_service::update_order_status(
        &state,
        &admin,
        placed.order.id,
        UpdateOrderStatusRequest { status: "pending".into() },
    )
    .await;
    assert!(matches!(backwards, Err(AppError::BadRequest(_))));
    set_status(&state, &admin, placed.order.id, "delivered").await?;

    let part_line = placed
        .items
        .iter()
        .find(|item| item.product_id == part.id)
        .expect("part line");
    let requested = return_service::create_return(
        &state,
        &customer,
        CreateReturnRequest {
            order_id: placed.order.id,
            order_item_id: part_line.id,
            quantity: 1,
            reason: "Cracked on arrival".into(),
            details: None,
        },
    )
    .await?
    .data
    .expect("return");
    assert_eq!(requested.status, "requested");

    let too_many = return_service::create_return(
        &state,
        &customer,
        CreateReturnRequest {
            order_id: placed.order.id,
            order_item_id: part_line.id,
            quantity: 2,
            reason: "Changed my mind".into(),
            details: None,
        },
    )
    .await;
    assert!(matches!(too_many, Err(AppError::BadRequest(_))));

    for status in ["approved", "received"] {
        move_return(&state, &admin, requested.id, status).await?;
    }
    let refunded = move_return(&state, &admin, requested.id, "refunded").await?;
    assert_eq!(refunded.refund_amount, Some(900));
    assert_eq!(stock_of(&state, part.id).await?, 9);

    // Second order, cancelled by the customer before shipping.
    cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest { product_id: part.id, variant_id: None, quantity: 2 },
    )
    .await?;
    let second = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest {
            address_id: address.id,
            payment_method: "cod".into(),
            notes: Some("Ring twice".into()),
        },
    )
    .await?
    .data
    .expect("second order");
    assert_eq!(stock_of(&state, part.id).await?, 7);

    let cancelled = order_service::cancel_order(&state, &customer, second.order.id)
        .await?
        .data
        .expect("cancelled order");
    assert_eq!(cancelled.order.status, "cancelled");
    assert_eq!(stock_of(&state, part.id).await?, 9);

    let listed = order_service::list_orders(
        &state,
        &customer,
        OrderListQuery { page: Some(1), limit: Some(1), ..Default::default() },
    )
    .await?;
    let meta = listed.meta.expect("meta");
    assert_eq!(meta.total, Some(2));
    assert_eq!(meta.pages, Some(2));
    assert_eq!(listed.data.expect("orders").items.len(), 1);

    let stranger = common::create_user(&state, ROLE_USER).await?;
    let hidden = order_service::get_order(&state, &stranger, placed.order.id).await;
    assert!(matches!(hidden, Err(AppError::NotFound)));

    Ok(())
}

async fn set_status(
    state: &AppState,
    admin: &dfix_kart_api::middleware::auth::AuthUser,
    order_id: Uuid,
    status: &str,
) -> anyhow::Result<()> {
    let updated = order_service::update_order_status(
        state,
        admin,
        order_id,
        UpdateOrderStatusRequest { status: status.into() },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(updated.status, status);
    Ok(())
}

async fn move_return(
    state: &AppState,
    admin: &dfix_kart_api::middleware::auth::AuthUser,
    id: Uuid,
    status: &str,
) -> anyhow::Result<dfix_kart_api::models::ReturnRequest> {
    let updated = return_service::update_return(
        state,
        admin,
        id,
        UpdateReturnRequest { status: status.into(), admin_note: None },
    )
    .await?
    .data
    .expect("return");
    assert_eq!(updated.status, status);
    Ok(updated)
}

async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(product_id).one(&state.orm).await?.expect("product");
    Ok(product.stock)
}

async fn variant_stock_of(
    state: &AppState,
    variant_id: Uuid,
) -> anyhow::Result<i32> {
    let variant = ProductVariants::find_by_id(variant_id).one(&state.orm).await?.expect("variant");
    Ok(variant.stock)
}

// Checkout of a variant line, then the variant is removed before the order is cancelled.
#[tokio::test]
async fn cancel_after_variant_removal_restocks_the_variant() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin = common::create_super_admin(&state).await?;
    let customer = common::create_user(&state, ROLE_USER).await?;
    let category = common::create_category(&state, &admin).await?;
    let address = common::create_address(&state, &customer, "4 Residency Road", None).await?;

    let charger = common::create_product(&state, &admin, category.id, 700, None, 20, 1).await?;
    let variant = product_service::create_variant(
        &state,
        &admin,
        charger.id,
        CreateVariantRequest {
            sku: None,
            name: "65W".into(),
            price: 900,
            sale_price: None,
            stock: 5,
            moq: None,
            is_active: Some(true),
        },
    )
    .await?
    .data
    .expect("variant");

    cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest { product_id: charger.id, variant_id: Some(variant.id), quantity: 3 },
    )
    .await?;
    let order = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest { address_id: address.id, payment_method: "cod".into(), notes: None },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(variant_stock_of(&state, variant.id).await?, 2);

    product_service::delete_variant(&state, &admin, charger.id, variant.id).await?;
    let detail = product_service::get_product_detail(&state, &charger.slug)
        .await?
        .data
        .expect("detail");
    assert!(detail.variants.is_empty(), "removed variants are hidden");

    order_service::cancel_order(&state, &customer, order.order.id).await?;
    assert_eq!(variant_stock_of(&state, variant.id).await?, 5);
    assert_eq!(stock_of(&state, charger.id).await?, 20);

    Ok(())
}

// Many full-quantity return requests for one line race each other; only one may win.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_returns_never_exceed_purchased_quantity() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let admin = common::create_super_admin(&state).await?;
    let customer = common::create_user(&state, ROLE_USER).await?;
    let category = common::create_category(&state, &admin).await?;
    let address = common::create_address(&state, &customer, "9 Brigade Road", None).await?;
    let screen = common::create_product(&state, &admin, category.id, 300, None, 10, 1).await?;

    cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest { product_id: screen.id, variant_id: None, quantity: 3 },
    )
    .await?;
    let placed = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest { address_id: address.id, payment_method: "cod".into(), notes: None },
    )
    .await?
    .data
    .expect("order");
    for status in ["processing", "shipped", "delivered"] {
        set_status(&state, &admin, placed.order.id, status).await?;
    }

    let order_id = placed.order.id;
    let order_item_id = placed.items[0].id;
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let state = state.clone();
        let customer = customer.clone();
        tasks.push(tokio::spawn(async move {
            return_service::create_return(
                &state,
                &customer,
                CreateReturnRequest {
                    order_id,
                    order_item_id,
                    quantity: 3,
                    reason: "Dead pixels".into(),
                    details: None,
                },
            )
            .await
        }));
    }

    let mut accepted = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => accepted += 1,
            Err(AppError::BadRequest(_)) => {}
            Err(other) => return Err(other.into()),
        }
    }
    assert_eq!(accepted, 1);

    Ok(())
}
