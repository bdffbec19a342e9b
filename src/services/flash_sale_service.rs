use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::flash_sales::{
        CreateFlashSaleRequest, FlashSaleItemRequest, FlashSaleList, FlashSaleProduct,
        FlashSaleWithProducts, UpdateFlashSaleRequest,
    },
    entity::{
        flash_sale_items::{ActiveModel as ItemActive, Column as ItemCol, Entity as FlashSaleItems},
        flash_sales::{ActiveModel, Column, Entity as FlashSales, Model as FlashSaleModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult, conflict_on_unique},
    middleware::auth::{AuthUser, ensure_permission},
    models::{FlashSale, FlashSaleItem},
    pricing::FlashOffer,
    response::{ApiResponse, Meta},
    services::catalog,
    state::AppState,
};

pub fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<()> {
    if end <= start {
        return Err(AppError::BadRequest("end_time must be after start_time".into()));
    }
    Ok(())
}

pub async fn list_active(state: &AppState) -> AppResult<ApiResponse<FlashSaleList>> {
    let now = Utc::now();
    let sales = FlashSales::find()
        .filter(Column::IsActive.eq(true))
        .filter(Column::StartTime.lte(now))
        .filter(Column::EndTime.gt(now))
        .order_by_asc(Column::EndTime)
        .all(&state.orm)
        .await?;
    let items = with_products(state, sales, false, now).await?;
    Ok(ApiResponse::success("Flash sales", FlashSaleList { items }, Some(Meta::empty())))
}

pub async fn list_admin(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<FlashSaleList>> {
    ensure_permission(user, "flash_sales", "read")?;
    let sales = FlashSales::find()
        .order_by_desc(Column::StartTime)
        .all(&state.orm)
        .await?;
    let items = with_products(state, sales, true, Utc::now()).await?;
    Ok(ApiResponse::success("Flash sales", FlashSaleList { items }, Some(Meta::empty())))
}

/// Each product is priced against the sale it is listed under.
async fn with_products(
    state: &AppState,
    sales: Vec<FlashSaleModel>,
    include_inactive_products: bool,
    now: DateTime<Utc>,
) -> AppResult<Vec<FlashSaleWithProducts>> {
    if sales.is_empty() {
        return Ok(Vec::new());
    }
    let sale_ids: Vec<Uuid> = sales.iter().map(|s| s.id).collect();
    let rows = FlashSaleItems::find()
        .find_also_related(Products)
        .filter(ItemCol::FlashSaleId.is_in(sale_ids))
        .order_by_asc(ItemCol::FlashSalePrice)
        .all(&state.orm)
        .await?;

    let mut by_sale: HashMap<Uuid, Vec<FlashSaleProduct>> = HashMap::new();
    let windows: HashMap<Uuid, &FlashSaleModel> = sales.iter().map(|s| (s.id, s)).collect();
    for (item, product) in rows {
        let Some(product) = product else { continue };
        if !include_inactive_products && !product.is_active {
            continue;
        }
        let Some(sale) = windows.get(&item.flash_sale_id) else { continue };
        let offer = FlashOffer {
            flash_sale_price: item.flash_sale_price,
            is_active: sale.is_active,
            start_time: sale.start_time.with_timezone(&Utc),
            end_time: sale.end_time.with_timezone(&Utc),
        };
        let card = catalog::product_card(&state.config, product, Some(&offer), now);
        by_sale.entry(item.flash_sale_id).or_default().push(FlashSaleProduct {
            product: card,
            flash_sale_price: item.flash_sale_price,
        });
    }

    Ok(sales
        .into_iter()
        .map(|sale| {
            let products = by_sale.remove(&sale.id).unwrap_or_default();
            FlashSaleWithProducts {
                sale: FlashSale::from(sale),
                products,
            }
        })
        .collect())
}

pub async fn create_flash_sale(
    state: &AppState,
    user: &AuthUser,
    payload: CreateFlashSaleRequest,
) -> AppResult<ApiResponse<FlashSale>> {
    ensure_permission(user, "flash_sales", "create")?;
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    validate_window(payload.start_time, payload.end_time)?;

    let sale = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        description: Set(payload.description),
        start_time: Set(payload.start_time.into()),
        end_time: Set(payload.end_time.into()),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        user.user_id,
        "flash_sale_create",
        "flash_sales",
        serde_json::json!({ "flash_sale_id": sale.id }),
    )
    .await;

    Ok(ApiResponse::success("Flash sale created", FlashSale::from(sale), Some(Meta::empty())))
}

pub async fn update_flash_sale(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateFlashSaleRequest,
) -> AppResult<ApiResponse<FlashSale>> {
    ensure_permission(user, "flash_sales", "update")?;
    let existing = FlashSales::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let start = payload
        .start_time
        .unwrap_or_else(|| existing.start_time.with_timezone(&Utc));
    let end = payload
        .end_time
        .unwrap_or_else(|| existing.end_time.with_timezone(&Utc));
    validate_window(start, end)?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.start_time = Set(start.into());
    active.end_time = Set(end.into());
    let sale = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        user.user_id,
        "flash_sale_update",
        "flash_sales",
        serde_json::json!({ "flash_sale_id": sale.id }),
    )
    .await;

    Ok(ApiResponse::success("Updated", FlashSale::from(sale), Some(Meta::empty())))
}

pub async fn delete_flash_sale(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_permission(user, "flash_sales", "delete")?;
    let txn = state.orm.begin().await?;
    FlashSaleItems::delete_many()
        .filter(ItemCol::FlashSaleId.eq(id))
        .exec(&txn)
        .await?;
    let result = FlashSales::delete_by_id(id).exec(&txn).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "flash_sale_delete",
        "flash_sales",
        serde_json::json!({ "flash_sale_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}

pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    sale_id: Uuid,
    payload: FlashSaleItemRequest,
) -> AppResult<ApiResponse<FlashSaleItem>> {
    ensure_permission(user, "flash_sales", "update")?;
    if payload.flash_sale_price < 0 {
        return Err(AppError::BadRequest("flash_sale_price must not be negative".into()));
    }
    if FlashSales::find_by_id(sale_id).one(&state.orm).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let product = Products::find_by_id(payload.product_id)
        .filter(ProdCol::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("product not found".into()))?;
    if payload.flash_sale_price > product.price {
        return Err(AppError::BadRequest("flash_sale_price must not exceed price".into()));
    }

    let item = ItemActive {
        id: Set(Uuid::new_v4()),
        flash_sale_id: Set(sale_id),
        product_id: Set(payload.product_id),
        flash_sale_price: Set(payload.flash_sale_price),
    }
    .insert(&state.orm)
    .await
    .map_err(|err| conflict_on_unique(err, "Product is already in this flash sale"))?;

    audit::record(
        &state.pool,
        user.user_id,
        "flash_sale_item_add",
        "flash_sales",
        serde_json::json!({ "flash_sale_id": sale_id, "product_id": item.product_id }),
    )
    .await;

    Ok(ApiResponse::success("Product added", FlashSaleItem::from(item), Some(Meta::empty())))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    sale_id: Uuid,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_permission(user, "flash_sales", "update")?;
    let result = FlashSaleItems::delete_many()
        .filter(ItemCol::FlashSaleId.eq(sale_id))
        .filter(ItemCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(ApiResponse::success("Product removed", serde_json::json!({}), Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::validate_window;

    #[test]
    fn window_must_move_forward() {
        let start = Utc::now();
        assert!(validate_window(start, start + Duration::hours(2)).is_ok());
        assert!(validate_window(start, start).is_err());
        assert!(validate_window(start, start - Duration::minutes(1)).is_err());
    }
}
