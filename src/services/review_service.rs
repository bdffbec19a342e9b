use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    db::DbPool,
    dto::{
        products::RatingSummary,
        reviews::{
            CreateReviewRequest, ProductReviews, PublicReview, ReviewList,
            UpdateReviewStatusRequest,
        },
    },
    entity::{
        products::{Column as ProdCol, Entity as Products},
        reviews::{ActiveModel, Column, Entity as Reviews},
        users::Entity as Users,
    },
    error::{AppError, AppResult, conflict_on_unique},
    middleware::auth::{AuthUser, ensure_permission},
    models::Review,
    response::{ApiResponse, Meta},
    routes::params::{Pagination, StatusQuery},
    state::AppState,
};

pub const REVIEW_PENDING: &str = "pending";
pub const REVIEW_APPROVED: &str = "approved";
pub const REVIEW_REJECTED: &str = "rejected";

const REVIEW_STATUSES: [&str; 3] = [REVIEW_PENDING, REVIEW_APPROVED, REVIEW_REJECTED];

/// Average and count over approved reviews only.
pub async fn rating_summary(pool: &DbPool, product_id: Uuid) -> AppResult<RatingSummary> {
    let (average, count): (f64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(AVG(rating)::float8, 0), COUNT(*)
        FROM reviews
        WHERE product_id = $1 AND status = 'approved'
        "#,
    )
    .bind(product_id)
    .fetch_one(pool)
    .await?;

    Ok(RatingSummary {
        average: (average * 10.0).round() / 10.0,
        count,
    })
}

pub async fn list_product_reviews(
    state: &AppState,
    slug: &str,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductReviews>> {
    let product = Products::find()
        .filter(ProdCol::Slug.eq(slug))
        .filter(ProdCol::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Reviews::find()
        .filter(Column::ProductId.eq(product.id))
        .filter(Column::Status.eq(REVIEW_APPROVED))
        .order_by_desc(Column::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .find_also_related(Users)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(review, author)| PublicReview {
            review: Review::from(review),
            author_name: author.map(|u| u.name).unwrap_or_default(),
        })
        .collect();

    let summary = rating_summary(&state.pool, product.id).await?;
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Reviews", ProductReviews { items, summary }, Some(meta)))
}

pub async fn create_review(
    state: &AppState,
    user: &AuthUser,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".into()));
    }
    let product = Products::find_by_id(payload.product_id)
        .filter(ProdCol::IsActive.eq(true))
        .one(&state.orm)
        .await?;
    if product.is_none() {
        return Err(AppError::NotFound);
    }

    let duplicate = Reviews::find()
        .filter(
            Condition::all()
                .add(Column::UserId.eq(user.user_id))
                .add(Column::ProductId.eq(payload.product_id)),
        )
        .one(&state.orm)
        .await?;
    if duplicate.is_some() {
        return Err(AppError::Conflict("You have already reviewed this product".into()));
    }

    let review = ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(payload.product_id),
        user_id: Set(user.user_id),
        rating: Set(payload.rating),
        title: Set(payload.title.filter(|t| !t.trim().is_empty())),
        comment: Set(payload.comment.filter(|c| !c.trim().is_empty())),
        status: Set(REVIEW_PENDING.into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| conflict_on_unique(err, "You have already reviewed this product"))?;

    Ok(ApiResponse::success("Review submitted", Review::from(review), Some(Meta::empty())))
}

pub async fn delete_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Reviews::delete_many()
        .filter(Column::Id.eq(id))
        .filter(Column::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}

pub async fn list_admin_reviews(
    state: &AppState,
    user: &AuthUser,
    query: StatusQuery,
) -> AppResult<ApiResponse<ReviewList>> {
    ensure_permission(user, "reviews", "read")?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut finder = Reviews::find();
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
        .map(Review::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Reviews", ReviewList { items }, Some(meta)))
}

pub async fn update_review_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateReviewStatusRequest,
) -> AppResult<ApiResponse<Review>> {
    ensure_permission(user, "reviews", "update")?;
    let status = payload.status.trim().to_lowercase();
    if !REVIEW_STATUSES.contains(&status.as_str()) {
        return Err(AppError::BadRequest("Invalid review status".into()));
    }

    let existing = Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let mut active: ActiveModel = existing.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now().into());
    let review = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        user.user_id,
        "review_moderate",
        "reviews",
        serde_json::json!({ "review_id": review.id, "status": review.status }),
    )
    .await;

    Ok(ApiResponse::success("Review updated", Review::from(review), Some(Meta::empty())))
}
