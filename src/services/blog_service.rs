use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::blog::{BlogPostList, CreateBlogPostRequest, UpdateBlogPostRequest},
    entity::blog_posts::{ActiveModel, Column, Entity as BlogPosts, Model as BlogPostModel},
    error::{AppError, AppResult, conflict_on_unique},
    middleware::auth::{AuthUser, ensure_permission},
    models::BlogPost,
    response::{ApiResponse, Meta},
    routes::params::{Pagination, StatusQuery},
    slug::resolve_slug,
    state::AppState,
};

pub const POST_DRAFT: &str = "draft";
pub const POST_PUBLISHED: &str = "published";

fn parse_status(status: Option<&str>) -> AppResult<Option<&'static str>> {
    match status.map(|s| s.trim().to_lowercase()) {
        None => Ok(None),
        Some(s) if s == POST_DRAFT => Ok(Some(POST_DRAFT)),
        Some(s) if s == POST_PUBLISHED => Ok(Some(POST_PUBLISHED)),
        Some(_) => Err(AppError::BadRequest("status must be draft or published".into())),
    }
}

/// The first publication timestamp sticks across later edits and unpublishing.
pub fn published_at_for(
    current: Option<DateTime<FixedOffset>>,
    status: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<FixedOffset>> {
    match current {
        Some(at) => Some(at),
        None if status == POST_PUBLISHED => Some(now.into()),
        None => None,
    }
}

pub async fn list_published(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<BlogPostList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = BlogPosts::find()
        .filter(Column::Status.eq(POST_PUBLISHED))
        .order_by_desc(Column::PublishedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|model| post_view(state, model))
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Posts", BlogPostList { items }, Some(meta)))
}

pub async fn get_published(state: &AppState, slug: &str) -> AppResult<ApiResponse<BlogPost>> {
    let post = BlogPosts::find()
        .filter(Column::Slug.eq(slug))
        .filter(Column::Status.eq(POST_PUBLISHED))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Post", post_view(state, post), None))
}

pub async fn list_admin(
    state: &AppState,
    user: &AuthUser,
    query: StatusQuery,
) -> AppResult<ApiResponse<BlogPostList>> {
    ensure_permission(user, "blog", "read")?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut finder = BlogPosts::find();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        finder = finder.filter(Column::Status.eq(status.clone()));
    }
    let finder = finder.order_by_desc(Column::UpdatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|model| post_view(state, model))
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Posts", BlogPostList { items }, Some(meta)))
}

pub async fn create_post(
    state: &AppState,
    user: &AuthUser,
    payload: CreateBlogPostRequest,
) -> AppResult<ApiResponse<BlogPost>> {
    ensure_permission(user, "blog", "create")?;
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::BadRequest("title is required".into()));
    }
    if payload.content.trim().is_empty() {
        return Err(AppError::BadRequest("content is required".into()));
    }
    let status = parse_status(payload.status.as_deref())?.unwrap_or(POST_DRAFT);
    let slug = resolve_slug(payload.slug.as_deref(), &title)?;

    let post = ActiveModel {
        id: Set(Uuid::new_v4()),
        author_id: Set(Some(user.user_id)),
        title: Set(title),
        slug: Set(slug),
        excerpt: Set(payload.excerpt),
        content: Set(payload.content),
        cover_image: Set(payload.cover_image),
        status: Set(status.to_string()),
        published_at: Set(published_at_for(None, status, Utc::now())),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| conflict_on_unique(err, "Post slug already exists"))?;

    audit::record(
        &state.pool,
        user.user_id,
        "blog_create",
        "blog",
        serde_json::json!({ "post_id": post.id, "status": post.status }),
    )
    .await;

    Ok(ApiResponse::success("Post created", post_view(state, post), Some(Meta::empty())))
}

pub async fn update_post(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateBlogPostRequest,
) -> AppResult<ApiResponse<BlogPost>> {
    ensure_permission(user, "blog", "update")?;
    let existing = BlogPosts::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let status = parse_status(payload.status.as_deref())?
        .map(str::to_string)
        .unwrap_or_else(|| existing.status.clone());
    let published_at = published_at_for(existing.published_at, &status, Utc::now());

    let mut active: ActiveModel = existing.into();
    if let Some(title) = payload.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::BadRequest("title must not be empty".into()));
        }
        active.title = Set(title);
    }
    if let Some(slug) = payload.slug {
        active.slug = Set(resolve_slug(Some(&slug), "")?);
    }
    if let Some(excerpt) = payload.excerpt {
        active.excerpt = Set(Some(excerpt));
    }
    if let Some(content) = payload.content {
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("content must not be empty".into()));
        }
        active.content = Set(content);
    }
    if let Some(cover_image) = payload.cover_image {
        active.cover_image = Set(Some(cover_image));
    }
    active.status = Set(status);
    active.published_at = Set(published_at);
    active.updated_at = Set(Utc::now().into());

    let post = active
        .update(&state.orm)
        .await
        .map_err(|err| conflict_on_unique(err, "Post slug already exists"))?;

    audit::record(
        &state.pool,
        user.user_id,
        "blog_update",
        "blog",
        serde_json::json!({ "post_id": post.id, "status": post.status }),
    )
    .await;

    Ok(ApiResponse::success("Updated", post_view(state, post), Some(Meta::empty())))
}

pub async fn delete_post(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_permission(user, "blog", "delete")?;
    let result = BlogPosts::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        user.user_id,
        "blog_delete",
        "blog",
        serde_json::json!({ "post_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}

fn post_view(state: &AppState, model: BlogPostModel) -> BlogPost {
    let mut post = BlogPost::from(model);
    post.cover_image = post.cover_image.map(|path| state.config.asset_url(&path));
    post
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    #[test]
    fn publish_timestamp_is_set_once() {
        let now = Utc::now();
        assert!(published_at_for(None, POST_DRAFT, now).is_none());

        let first = published_at_for(None, POST_PUBLISHED, now).unwrap();
        let later = now + Duration::days(3);
        assert_eq!(published_at_for(Some(first), POST_PUBLISHED, later), Some(first));
        assert_eq!(published_at_for(Some(first), POST_DRAFT, later), Some(first));
    }

    #[test]
    fn status_parsing() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some(" Published ")).unwrap(), Some(POST_PUBLISHED));
        assert!(parse_status(Some("archived")).is_err());
    }
}
