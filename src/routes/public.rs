//! Storefront endpoints that need no token.

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    routing::get,
};

use crate::{
    dto::{
        blog::BlogPostList,
        categories::CategoryList,
        flash_sales::FlashSaleList,
        products::{ProductDetail, ProductList},
        reviews::ProductReviews,
    },
    error::AppResult,
    models::{BlogPost, Category},
    response::ApiResponse,
    routes::params::{Pagination, ProductQuery},
    services::{blog_service, category_service, flash_sale_service, product_service, review_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/categories/{slug}", get(get_category))
        .route("/products", get(list_products))
        .route("/products/{slug}", get(get_product))
        .route("/products/{slug}/reviews", get(list_product_reviews))
        .route("/flash-sales/active", get(active_flash_sales))
        .route("/blog", get(list_posts))
        .route("/blog/{slug}", get(get_post))
}

#[utoipa::path(
    get,
    path = "/api/public/categories",
    responses(
        (status = 200, description = "Active categories", body = ApiResponse<CategoryList>)
    ),
    tag = "Catalog"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<CategoryList>>> {
    let resp = category_service::list_public(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/public/categories/{slug}",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 200, description = "Category", body = ApiResponse<Category>),
        (status = 404, description = "Not Found")
    ),
    tag = "Catalog"
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<ApiResponse<Category>>> {
    let resp = category_service::get_by_slug(&state, &slug).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/public/products",
    params(ProductQuery),
    responses(
        (status = 200, description = "Priced product cards", body = ApiResponse<ProductList>),
        (status = 400, description = "Invalid query")
    ),
    tag = "Catalog"
)]
pub async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let Query(query) = query?;
    let resp = product_service::list_products(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/public/products/{slug}",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Product with variants, category and rating", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Not Found")
    ),
    tag = "Catalog"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<ApiResponse<ProductDetail>>> {
    let resp = product_service::get_product_detail(&state, &slug).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/public/products/{slug}/reviews",
    params(("slug" = String, Path, description = "Product slug"), Pagination),
    responses(
        (status = 200, description = "Approved reviews with rating summary", body = ApiResponse<ProductReviews>),
        (status = 404, description = "Not Found")
    ),
    tag = "Reviews"
)]
pub async fn list_product_reviews(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    query: Result<Query<Pagination>, QueryRejection>,
) -> AppResult<Json<ApiResponse<ProductReviews>>> {
    let Query(pagination) = query?;
    let resp = review_service::list_product_reviews(&state, &slug, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/public/flash-sales/active",
    responses(
        (status = 200, description = "Running flash sales with priced products", body = ApiResponse<FlashSaleList>)
    ),
    tag = "Flash Sales"
)]
pub async fn active_flash_sales(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<FlashSaleList>>> {
    let resp = flash_sale_service::list_active(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/public/blog",
    params(Pagination),
    responses(
        (status = 200, description = "Published posts", body = ApiResponse<BlogPostList>)
    ),
    tag = "Blog"
)]
pub async fn list_posts(
    State(state): State<AppState>,
    query: Result<Query<Pagination>, QueryRejection>,
) -> AppResult<Json<ApiResponse<BlogPostList>>> {
    let Query(pagination) = query?;
    let resp = blog_service::list_published(&state, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/public/blog/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Published post", body = ApiResponse<BlogPost>),
        (status = 404, description = "Not Found")
    ),
    tag = "Blog"
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<ApiResponse<BlogPost>>> {
    let resp = blog_service::get_published(&state, &slug).await?;
    Ok(Json(resp))
}
