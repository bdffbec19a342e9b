use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit,
    dto::returns::{CreateReturnRequest, ReturnList, UpdateReturnRequest},
    entity::{
        order_items::Entity as OrderItems,
        return_requests::{ActiveModel, Column, Entity as ReturnRequests},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_permission},
    models::ReturnRequest,
    response::{ApiResponse, Meta},
    routes::params::StatusQuery,
    services::{inventory_service, order_service},
    state::AppState,
};

pub const RETURN_REQUESTED: &str = "requested";
pub const RETURN_APPROVED: &str = "approved";
pub const RETURN_REJECTED: &str = "rejected";
pub const RETURN_RECEIVED: &str = "received";
pub const RETURN_REFUNDED: &str = "refunded";

pub fn can_transition(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        (RETURN_REQUESTED, RETURN_APPROVED)
            | (RETURN_REQUESTED, RETURN_REJECTED)
            | (RETURN_APPROVED, RETURN_RECEIVED)
            | (RETURN_RECEIVED, RETURN_REFUNDED)
    )
}

pub async fn create_return(
    state: &AppState,
    user: &AuthUser,
    payload: CreateReturnRequest,
) -> AppResult<ApiResponse<ReturnRequest>> {
    let reason = payload.reason.trim().to_string();
    if reason.is_empty() {
        return Err(AppError::BadRequest("reason is required".into()));
    }
    if payload.quantity < 1 {
        return Err(AppError::BadRequest("quantity must be at least 1".into()));
    }

    let txn = state.orm.begin().await?;
    let (order, item) = order_service::find_owned_item(
        &txn,
        user.user_id,
        payload.order_id,
        payload.order_item_id,
    )
    .await?;
    if order.status != order_service::STATUS_DELIVERED {
        return Err(AppError::BadRequest("only delivered orders can be returned".into()));
    }

    let already_returned: i32 = ReturnRequests::find()
        .filter(Column::OrderItemId.eq(item.id))
        .filter(Column::Status.ne(RETURN_REJECTED))
        .all(&txn)
        .await?
        .iter()
        .map(|r| r.quantity)
        .sum();
    let returnable = item.quantity - already_returned;
    if payload.quantity > returnable {
        return Err(AppError::BadRequest(format!(
            "only {returnable} unit(s) of this item can be returned"
        )));
    }

    let request = ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        order_id: Set(order.id),
        order_item_id: Set(item.id),
        quantity: Set(payload.quantity),
        reason: Set(reason),
        details: Set(payload.details.filter(|d| !d.trim().is_empty())),
        status: Set(RETURN_REQUESTED.into()),
        admin_note: Set(None),
        refund_amount: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "return_request",
        "returns",
        serde_json::json!({ "return_id": request.id, "order_id": request.order_id }),
    )
    .await;

    Ok(ApiResponse::success("Return requested", ReturnRequest::from(request), Some(Meta::empty())))
}

pub async fn list_my_returns(
    state: &AppState,
    user: &AuthUser,
    query: StatusQuery,
) -> AppResult<ApiResponse<ReturnList>> {
    paged_returns(state, Some(user.user_id), query).await
}

pub async fn list_admin_returns(
    state: &AppState,
    user: &AuthUser,
    query: StatusQuery,
) -> AppResult<ApiResponse<ReturnList>> {
    ensure_permission(user, "returns", "read")?;
    paged_returns(state, None, query).await
}

async fn paged_returns(
    state: &AppState,
    owner: Option<Uuid>,
    query: StatusQuery,
) -> AppResult<ApiResponse<ReturnList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut finder = ReturnRequests::find();
    if let Some(user_id) = owner {
        finder = finder.filter(Column::UserId.eq(user_id));
    }
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        finder = finder.filter(Column::Status.eq(status.clone()));
    }
    let finder = finder.order_by_desc(Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ReturnRequest::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Returns", ReturnList { items }, Some(meta)))
}

/// Owners see their own requests; staff with `returns:read` see any.
pub async fn get_return(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<ReturnRequest>> {
    let request = ReturnRequests::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if request.user_id != user.user_id && !user.can("returns", "read") {
        return Err(AppError::NotFound);
    }
    Ok(ApiResponse::success("Return", ReturnRequest::from(request), Some(Meta::empty())))
}

pub async fn update_return(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateReturnRequest,
) -> AppResult<ApiResponse<ReturnRequest>> {
    ensure_permission(user, "returns", "update")?;
    let target = payload.status.trim().to_lowercase();

    let txn = state.orm.begin().await?;
    let existing = ReturnRequests::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if !can_transition(&existing.status, &target) {
        return Err(AppError::BadRequest(format!(
            "cannot move return from {} to {}",
            existing.status, target
        )));
    }

    let mut refund_amount = None;
    if target == RETURN_REFUNDED {
        let item = OrderItems::find_by_id(existing.order_item_id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;
        refund_amount = Some(item.unit_price * i64::from(existing.quantity));
        inventory_service::shift_stock(&txn, item.product_id, item.variant_id, existing.quantity)
            .await?;
    }

    let mut active: ActiveModel = existing.into();
    active.status = Set(target);
    if let Some(note) = payload.admin_note.filter(|n| !n.trim().is_empty()) {
        active.admin_note = Set(Some(note));
    }
    if refund_amount.is_some() {
        active.refund_amount = Set(refund_amount);
    }
    active.updated_at = Set(Utc::now().into());
    let request = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "return_update",
        "returns",
        serde_json::json!({
            "return_id": request.id,
            "status": request.status,
            "refund_amount": request.refund_amount,
        }),
    )
    .await;

    Ok(ApiResponse::success("Return updated", ReturnRequest::from(request), Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::can_transition;

    #[test]
    fn return_transitions() {
        assert!(can_transition("requested", "approved"));
        assert!(can_transition("requested", "rejected"));
        assert!(can_transition("approved", "received"));
        assert!(can_transition("received", "refunded"));

        assert!(!can_transition("requested", "refunded"));
        assert!(!can_transition("rejected", "approved"));
        assert!(!can_transition("refunded", "requested"));
        assert!(!can_transition("approved", "bogus"));
    }
}
