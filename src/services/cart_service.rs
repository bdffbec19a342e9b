use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
    entity::{
        cart_items::{
            ActiveModel as CartActive, Column as CartCol, Entity as CartItems,
            Model as CartItemModel,
        },
        product_variants::{Column as VariantCol, Entity as ProductVariants, Model as VariantModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult, is_unique_violation},
    middleware::auth::AuthUser,
    models::{CartItem, ProductVariant},
    response::{ApiResponse, Meta},
    services::catalog,
    state::AppState,
};

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let view = build_cart_view(state, user.user_id).await?;
    Ok(ApiResponse::success("Cart", view, Some(Meta::empty())))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    let (product, variant) = load_purchasable(state, payload.product_id, payload.variant_id).await?;
    check_line(&product, variant.as_ref(), payload.quantity)?;

    let existing = find_line(state, user.user_id, payload.product_id, payload.variant_id).await?;
    let item = match existing {
        Some(item) => set_quantity(state, item, payload.quantity).await?,
        None => {
            let inserted = CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(payload.product_id),
                variant_id: Set(payload.variant_id),
                quantity: Set(payload.quantity),
                created_at: NotSet,
            }
            .insert(&state.orm)
            .await;
            match inserted {
                Ok(item) => item,
                // A concurrent add created the line first; overwrite its quantity instead.
                Err(err) if is_unique_violation(&err) => {
                    let item =
                        find_line(state, user.user_id, payload.product_id, payload.variant_id)
                            .await?
                            .ok_or(AppError::OrmError(err))?;
                    set_quantity(state, item, payload.quantity).await?
                }
                Err(err) => return Err(err.into()),
            }
        }
    };

    tracing::debug!(
        user_id = %user.user_id,
        product_id = %item.product_id,
        quantity = item.quantity,
        "cart updated"
    );
    Ok(ApiResponse::success("Added to cart", CartItem::from(item), Some(Meta::empty())))
}

async fn find_line(
    state: &AppState,
    user_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
) -> AppResult<Option<CartItemModel>> {
    let variant_filter = match variant_id {
        Some(variant_id) => CartCol::VariantId.eq(variant_id),
        None => CartCol::VariantId.is_null(),
    };
    let line = CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user_id))
                .add(CartCol::ProductId.eq(product_id))
                .add(variant_filter),
        )
        .one(&state.orm)
        .await?;
    Ok(line)
}

async fn set_quantity(
    state: &AppState,
    item: CartItemModel,
    quantity: i32,
) -> AppResult<CartItemModel> {
    let mut active: CartActive = item.into();
    active.quantity = Set(quantity);
    Ok(active.update(&state.orm).await?)
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    let item = CartItems::find_by_id(id)
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let (product, variant) = load_purchasable(state, item.product_id, item.variant_id).await?;
    check_line(&product, variant.as_ref(), payload.quantity)?;

    let item = set_quantity(state, item, payload.quantity).await?;

    Ok(ApiResponse::success("Cart updated", CartItem::from(item), Some(Meta::empty())))
}

pub async fn remove_cart_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::Id.eq(id))
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(ApiResponse::success("Removed", serde_json::json!({}), Some(Meta::empty())))
}

pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;
    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({ "removed": result.rows_affected }),
        Some(Meta::empty()),
    ))
}

async fn load_purchasable(
    state: &AppState,
    product_id: Uuid,
    variant_id: Option<Uuid>,
) -> AppResult<(ProductModel, Option<VariantModel>)> {
    let product = Products::find_by_id(product_id)
        .filter(ProdCol::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let variant = match variant_id {
        Some(variant_id) => Some(
            ProductVariants::find_by_id(variant_id)
                .filter(VariantCol::ProductId.eq(product_id))
                .filter(VariantCol::IsActive.eq(true))
                .one(&state.orm)
                .await?
                .ok_or_else(|| AppError::BadRequest("variant not found for product".into()))?,
        ),
        None => None,
    };
    Ok((product, variant))
}

fn check_line(
    product: &ProductModel,
    variant: Option<&VariantModel>,
    quantity: i32,
) -> AppResult<()> {
    match variant {
        Some(v) => catalog::check_quantity(
            quantity,
            v.moq,
            v.stock,
            &format!("{} ({})", product.name, v.name),
        ),
        None => catalog::check_quantity(quantity, product.moq, product.stock, &product.name),
    }
}

async fn build_cart_view(state: &AppState, user_id: Uuid) -> AppResult<CartView> {
    let items = CartItems::find()
        .filter(CartCol::UserId.eq(user_id))
        .order_by_asc(CartCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let variant_ids: Vec<Uuid> = items.iter().filter_map(|i| i.variant_id).collect();

    let products: HashMap<Uuid, ProductModel> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        Products::find()
            .filter(ProdCol::Id.is_in(product_ids.clone()))
            .all(&state.orm)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };
    let variants: HashMap<Uuid, VariantModel> = if variant_ids.is_empty() {
        HashMap::new()
    } else {
        ProductVariants::find()
            .filter(VariantCol::Id.is_in(variant_ids))
            .all(&state.orm)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect()
    };

    let now = Utc::now();
    let offers = catalog::running_flash_offers(&state.orm, &product_ids, now).await?;

    let mut lines = Vec::with_capacity(items.len());
    let (mut subtotal, mut total, mut item_count) = (0i64, 0i64, 0i64);
    for item in items {
        let Some(product) = products.get(&item.product_id) else {
            continue;
        };
        let variant = item.variant_id.and_then(|id| variants.get(&id));
        let pricing = catalog::line_quote(product, variant, &offers, now);
        let quantity = i64::from(item.quantity);
        let line_total = pricing.price * quantity;

        subtotal += pricing.original_price * quantity;
        total += line_total;
        item_count += quantity;

        lines.push(CartLine {
            id: item.id,
            product: catalog::product_view(&state.config, product.clone()),
            variant: variant.cloned().map(ProductVariant::from),
            quantity: item.quantity,
            pricing,
            line_total,
        });
    }

    Ok(CartView {
        items: lines,
        item_count,
        subtotal,
        discount_total: subtotal - total,
        total,
    })
}
