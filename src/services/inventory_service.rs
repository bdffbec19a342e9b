use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::{Expr, LockType};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit,
    dto::{admin::InventoryAdjustRequest, products::AdminProductList},
    entity::{
        product_variants::{
            ActiveModel as VariantActive, Column as VariantCol, Entity as ProductVariants,
        },
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_permission},
    response::{ApiResponse, Meta},
    routes::params::LowStockQuery,
    services::catalog,
    state::AppState,
};

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<AdminProductList>> {
    ensure_permission(user, "inventory", "read")?;
    let threshold = query
        .threshold
        .unwrap_or(state.config.low_stock_threshold)
        .max(0);
    let (page, limit, offset) = query.pagination().normalize();

    let finder = Products::find()
        .filter(ProdCol::IsActive.eq(true))
        .filter(ProdCol::Stock.lte(threshold))
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|model| catalog::product_view(&state.config, model))
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", AdminProductList { items }, Some(meta)))
}

/// Applies a signed stock delta to a product, or to one of its variants, under a row lock.
pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_permission(user, "inventory", "update")?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let new_stock = match payload.variant_id {
        Some(variant_id) => {
            let variant = ProductVariants::find_by_id(variant_id)
                .filter(VariantCol::ProductId.eq(product_id))
                .lock(LockType::Update)
                .one(&txn)
                .await?
                .ok_or(AppError::NotFound)?;
            let new_stock = apply_delta(variant.stock, payload.delta)?;
            let mut active: VariantActive = variant.into();
            active.stock = Set(new_stock);
            active.update(&txn).await?;
            new_stock
        }
        None => {
            let product = Products::find_by_id(product_id)
                .lock(LockType::Update)
                .one(&txn)
                .await?
                .ok_or(AppError::NotFound)?;
            let new_stock = apply_delta(product.stock, payload.delta)?;
            let mut active: ProductActive = product.into();
            active.stock = Set(new_stock);
            active.updated_at = Set(chrono::Utc::now().into());
            active.update(&txn).await?;
            new_stock
        }
    };
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "inventory_adjust",
        "products",
        json!({
            "product_id": product_id,
            "variant_id": payload.variant_id,
            "delta": payload.delta,
            "stock": new_stock,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        json!({
            "product_id": product_id,
            "variant_id": payload.variant_id,
            "stock": new_stock,
        }),
        Some(Meta::empty()),
    ))
}

/// Shifts stock for an order or return line. Variant lines move the variant's stock.
pub async fn shift_stock<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    delta: i32,
) -> AppResult<()> {
    match variant_id {
        Some(variant_id) => {
            ProductVariants::update_many()
                .col_expr(VariantCol::Stock, Expr::col(VariantCol::Stock).add(delta))
                .filter(VariantCol::Id.eq(variant_id))
                .exec(db)
                .await?;
        }
        None => {
            Products::update_many()
                .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(delta))
                .filter(ProdCol::Id.eq(product_id))
                .exec(db)
                .await?;
        }
    }
    Ok(())
}

fn apply_delta(stock: i32, delta: i32) -> AppResult<i32> {
    match stock.checked_add(delta) {
        Some(next) if next >= 0 => Ok(next),
        _ => Err(AppError::BadRequest("stock cannot be negative".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::apply_delta;

    #[test]
    fn delta_cannot_drive_stock_negative() {
        assert_eq!(apply_delta(5, 3).unwrap(), 8);
        assert_eq!(apply_delta(5, -5).unwrap(), 0);
        assert!(apply_delta(5, -6).is_err());
        assert!(apply_delta(i32::MAX, 1).is_err());
    }
}
