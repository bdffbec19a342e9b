use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    dto::admin::{DashboardStats, UpdateUserRequest, UserList},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_permission, ensure_super_admin},
    models::User,
    permissions::{ROLE_SUPER_ADMIN, is_valid_permission, is_valid_role},
    response::{ApiResponse, Meta},
    routes::params::UserListQuery,
    state::AppState,
};

pub async fn dashboard(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<DashboardStats>> {
    ensure_permission(user, "dashboard", "read")?;
    let stats: DashboardStats = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS total_users,
            (SELECT COUNT(*) FROM products WHERE is_active) AS total_products,
            (SELECT COUNT(*) FROM orders) AS total_orders,
            (SELECT COUNT(*) FROM orders WHERE status = 'pending') AS pending_orders,
            (SELECT COALESCE(SUM(total_amount), 0)::int8 FROM orders WHERE payment_status = 'paid') AS revenue,
            (SELECT COUNT(*) FROM products WHERE is_active AND stock <= $1) AS low_stock_products,
            (SELECT COUNT(*) FROM return_requests WHERE status = 'requested') AS pending_returns,
            (SELECT COUNT(*) FROM reviews WHERE status = 'pending') AS pending_reviews
        "#,
    )
    .bind(state.config.low_stock_threshold)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success("Dashboard", stats, Some(Meta::empty())))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    query: UserListQuery,
) -> AppResult<ApiResponse<UserList>> {
    ensure_permission(user, "users", "read")?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(role) = query.role.as_ref().filter(|r| !r.is_empty()) {
        condition = condition.add(UserCol::Role.eq(role.clone()));
    }
    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(UserCol::Email).ilike(pattern.clone()))
                .add(Expr::col(UserCol::Name).ilike(pattern)),
        );
    }

    let finder = Users::find()
        .filter(condition)
        .order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

pub async fn get_user(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<User>> {
    ensure_permission(user, "users", "read")?;
    let found = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("User", User::from(found), Some(Meta::empty())))
}

/// Role and permission changes are reserved for super admins.
pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_permission(user, "users", "update")?;
    if payload.role.is_some() || payload.permissions.is_some() {
        ensure_super_admin(user)?;
    }

    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if existing.role == ROLE_SUPER_ADMIN && user.role != ROLE_SUPER_ADMIN {
        return Err(AppError::Forbidden);
    }
    if id == user.user_id && payload.is_active == Some(false) {
        return Err(AppError::BadRequest("you cannot deactivate yourself".into()));
    }

    let mut active: UserActive = existing.into();
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    if let Some(role) = payload.role.as_deref() {
        if !is_valid_role(role) {
            return Err(AppError::BadRequest(format!("unknown role {role}")));
        }
        active.role = Set(role.to_string());
    }
    if let Some(permissions) = payload.permissions.as_ref() {
        if let Some(bad) = permissions.iter().find(|p| !is_valid_permission(p)) {
            return Err(AppError::BadRequest(format!("invalid permission {bad}")));
        }
        active.permissions = Set(serde_json::json!(permissions));
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        user.user_id,
        "user_update",
        "users",
        serde_json::json!({
            "user_id": updated.id,
            "is_active": payload.is_active,
            "role": payload.role,
            "permissions": payload.permissions,
        }),
    )
    .await;

    Ok(ApiResponse::success("User updated", User::from(updated), Some(Meta::empty())))
}
