use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    dto::wishlist::{AddWishlistRequest, WishlistProductList},
    entity::{
        products::{Column as ProdCol, Entity as Products},
        wishlist_items::{ActiveModel, Column, Entity as WishlistItems},
    },
    error::{AppError, AppResult, is_unique_violation},
    middleware::auth::AuthUser,
    models::WishlistItem,
    response::{ApiResponse, Meta},
    services::catalog,
    state::AppState,
};

pub async fn list_wishlist(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<WishlistProductList>> {
    let product_ids: Vec<Uuid> = WishlistItems::find()
        .filter(Column::UserId.eq(user.user_id))
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|item| item.product_id)
        .collect();

    if product_ids.is_empty() {
        return Ok(ApiResponse::success(
            "Wishlist",
            WishlistProductList { items: Vec::new() },
            Some(Meta::empty()),
        ));
    }

    let mut products = Products::find()
        .filter(ProdCol::Id.is_in(product_ids.clone()))
        .filter(ProdCol::IsActive.eq(true))
        .all(&state.orm)
        .await?;
    // keep most-recently-saved first
    products.sort_by_key(|p| product_ids.iter().position(|id| *id == p.id));

    let items = catalog::product_cards(&state.orm, &state.config, products).await?;
    Ok(ApiResponse::success("Wishlist", WishlistProductList { items }, Some(Meta::empty())))
}

/// Saving a product twice returns the existing entry.
pub async fn add_to_wishlist(
    state: &AppState,
    user: &AuthUser,
    payload: AddWishlistRequest,
) -> AppResult<ApiResponse<WishlistItem>> {
    let product = Products::find_by_id(payload.product_id)
        .filter(ProdCol::IsActive.eq(true))
        .one(&state.orm)
        .await?;
    if product.is_none() {
        return Err(AppError::NotFound);
    }

    let existing = WishlistItems::find()
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::ProductId.eq(payload.product_id))
        .one(&state.orm)
        .await?;
    if let Some(item) = existing {
        return Ok(ApiResponse::success(
            "Already in wishlist",
            WishlistItem::from(item),
            Some(Meta::empty()),
        ));
    }

    let inserted = ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(payload.product_id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await;
    let item = match inserted {
        Ok(item) => item,
        Err(err) if is_unique_violation(&err) => {
            let item = WishlistItems::find()
                .filter(Column::UserId.eq(user.user_id))
                .filter(Column::ProductId.eq(payload.product_id))
                .one(&state.orm)
                .await?
                .ok_or(AppError::OrmError(err))?;
            return Ok(ApiResponse::success(
                "Already in wishlist",
                WishlistItem::from(item),
                Some(Meta::empty()),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    Ok(ApiResponse::success("Added to wishlist", WishlistItem::from(item), Some(Meta::empty())))
}

pub async fn remove_from_wishlist(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = WishlistItems::delete_many()
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(ApiResponse::success("Removed from wishlist", serde_json::json!({}), Some(Meta::empty())))
}
