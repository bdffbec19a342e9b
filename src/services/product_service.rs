use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{
        AdminProductList, CreateProductRequest, CreateVariantRequest, ProductDetail, ProductList,
        UpdateProductRequest, UpdateVariantRequest, VariantCard,
    },
    entity::{
        categories::{Column as CategoryCol, Entity as Categories},
        product_variants::{
            ActiveModel as VariantActive, Column as VariantCol, Entity as ProductVariants,
        },
        products::{ActiveModel, Column, Entity as Products},
    },
    error::{AppError, AppResult, conflict_on_unique},
    middleware::auth::{AuthUser, ensure_permission},
    models::{Category, Product, ProductVariant},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    services::{catalog, review_service},
    slug::resolve_slug,
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let Some(finder) = filtered_finder(state, &query, false).await? else {
        return Ok(ApiResponse::success(
            "Products",
            ProductList { items: Vec::new() },
            Some(Meta::new(page, limit, 0)),
        ));
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let models = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let items = catalog::product_cards(&state.orm, &state.config, models).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn list_admin_products(
    state: &AppState,
    user: &AuthUser,
    query: ProductQuery,
) -> AppResult<ApiResponse<AdminProductList>> {
    ensure_permission(user, "products", "read")?;
    let (page, limit, offset) = query.pagination().normalize();
    let include_inactive = query.include_inactive.unwrap_or(true);
    let Some(finder) = filtered_finder(state, &query, include_inactive).await? else {
        return Ok(ApiResponse::success(
            "Products",
            AdminProductList { items: Vec::new() },
            Some(Meta::new(page, limit, 0)),
        ));
    };

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
    Ok(ApiResponse::success("Products", AdminProductList { items }, Some(meta)))
}

/// `None` when the category filter names a category that does not exist.
async fn filtered_finder(
    state: &AppState,
    query: &ProductQuery,
    include_inactive: bool,
) -> AppResult<Option<Select<Products>>> {
    let mut condition = Condition::all();
    if !include_inactive {
        condition = condition.add(Column::IsActive.eq(true));
    }

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(slug) = query.category.as_ref().filter(|s| !s.is_empty()) {
        let category = Categories::find()
            .filter(CategoryCol::Slug.eq(slug.as_str()))
            .one(&state.orm)
            .await?;
        match category {
            Some(c) => condition = condition.add(Column::CategoryId.eq(c.id)),
            None => return Ok(None),
        }
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }
    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }
    if let Some(featured) = query.featured {
        condition = condition.add(Column::IsFeatured.eq(featured));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let finder = Products::find().filter(condition);
    let finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };
    Ok(Some(finder.order_by_asc(Column::Id)))
}

pub async fn get_product_detail(
    state: &AppState,
    slug: &str,
) -> AppResult<ApiResponse<ProductDetail>> {
    let product = Products::find()
        .filter(Column::Slug.eq(slug))
        .filter(Column::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let category = match product.category_id {
        Some(category_id) => Categories::find_by_id(category_id)
            .one(&state.orm)
            .await?
            .map(Category::from),
        None => None,
    };

    let now = Utc::now();
    let variants: Vec<VariantCard> = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(product.id))
        .filter(VariantCol::IsActive.eq(true))
        .order_by_asc(VariantCol::Price)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|variant| catalog::variant_card(variant, now))
        .collect();

    let rating = review_service::rating_summary(&state.pool, product.id).await?;
    let offers = catalog::running_flash_offers(&state.orm, &[product.id], now).await?;
    let offer = offers.get(&product.id);
    let card = catalog::product_card(&state.config, product, offer, now);

    Ok(ApiResponse::success(
        "Product",
        ProductDetail {
            product: card,
            category,
            variants,
            rating,
        },
        None,
    ))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_permission(user, "products", "create")?;
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    let moq = payload.moq.unwrap_or(1);
    validate_stock_fields(payload.price, payload.sale_price, payload.stock, moq)?;
    let slug = resolve_slug(payload.slug.as_deref(), &name)?;
    if let Some(category_id) = payload.category_id {
        ensure_category(state, category_id).await?;
    }

    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(payload.category_id),
        name: Set(name),
        slug: Set(slug),
        sku: Set(payload.sku.filter(|s| !s.trim().is_empty())),
        description: Set(payload.description),
        price: Set(payload.price),
        sale_price: Set(payload.sale_price),
        stock: Set(payload.stock),
        moq: Set(moq),
        images: Set(serde_json::json!(payload.images)),
        is_active: Set(payload.is_active.unwrap_or(true)),
        is_featured: Set(payload.is_featured.unwrap_or(false)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| conflict_on_unique(err, "Product slug or SKU already exists"))?;

    audit::record(
        &state.pool,
        user.user_id,
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        catalog::product_view(&state.config, product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_permission(user, "products", "update")?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let price = payload.price.unwrap_or(existing.price);
    let sale_price = if payload.clear_sale_price {
        None
    } else {
        payload.sale_price.or(existing.sale_price)
    };
    let stock = payload.stock.unwrap_or(existing.stock);
    let moq = payload.moq.unwrap_or(existing.moq);
    validate_stock_fields(price, sale_price, stock, moq)?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        active.name = Set(name);
    }
    if let Some(slug) = payload.slug {
        active.slug = Set(resolve_slug(Some(&slug), "")?);
    }
    if let Some(category_id) = payload.category_id {
        ensure_category(state, category_id).await?;
        active.category_id = Set(Some(category_id));
    }
    if let Some(sku) = payload.sku {
        active.sku = Set(Some(sku).filter(|s| !s.trim().is_empty()));
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(images) = payload.images {
        active.images = Set(serde_json::json!(images));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    if let Some(is_featured) = payload.is_featured {
        active.is_featured = Set(is_featured);
    }
    active.price = Set(price);
    active.sale_price = Set(sale_price);
    active.stock = Set(stock);
    active.moq = Set(moq);
    active.updated_at = Set(Utc::now().into());

    let product = active
        .update(&state.orm)
        .await
        .map_err(|err| conflict_on_unique(err, "Product slug or SKU already exists"))?;

    audit::record(
        &state.pool,
        user.user_id,
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        catalog::product_view(&state.config, product),
        Some(Meta::empty()),
    ))
}

/// Products referenced by orders cannot be removed, so deletion hides them.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_permission(user, "products", "delete")?;
    let result = Products::update_many()
        .col_expr(Column::IsActive, Expr::value(false))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        user.user_id,
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}

pub async fn list_variants(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<Vec<ProductVariant>>> {
    ensure_permission(user, "products", "read")?;
    let variants = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(product_id))
        .order_by_asc(VariantCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ProductVariant::from)
        .collect();
    Ok(ApiResponse::success("Variants", variants, Some(Meta::empty())))
}

pub async fn create_variant(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: CreateVariantRequest,
) -> AppResult<ApiResponse<ProductVariant>> {
    ensure_permission(user, "products", "update")?;
    let product = Products::find_by_id(product_id).one(&state.orm).await?;
    if product.is_none() {
        return Err(AppError::NotFound);
    }
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    let moq = payload.moq.unwrap_or(1);
    validate_stock_fields(payload.price, payload.sale_price, payload.stock, moq)?;

    let variant = VariantActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        sku: Set(payload.sku.filter(|s| !s.trim().is_empty())),
        name: Set(name),
        price: Set(payload.price),
        sale_price: Set(payload.sale_price),
        stock: Set(payload.stock),
        moq: Set(moq),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| conflict_on_unique(err, "Variant SKU already exists"))?;

    audit::record(
        &state.pool,
        user.user_id,
        "variant_create",
        "product_variants",
        serde_json::json!({ "product_id": product_id, "variant_id": variant.id }),
    )
    .await;

    Ok(ApiResponse::success("Variant created", ProductVariant::from(variant), Some(Meta::empty())))
}

pub async fn update_variant(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    variant_id: Uuid,
    payload: UpdateVariantRequest,
) -> AppResult<ApiResponse<ProductVariant>> {
    ensure_permission(user, "products", "update")?;
    let existing = ProductVariants::find_by_id(variant_id)
        .filter(VariantCol::ProductId.eq(product_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let price = payload.price.unwrap_or(existing.price);
    let sale_price = if payload.clear_sale_price {
        None
    } else {
        payload.sale_price.or(existing.sale_price)
    };
    let stock = payload.stock.unwrap_or(existing.stock);
    let moq = payload.moq.unwrap_or(existing.moq);
    validate_stock_fields(price, sale_price, stock, moq)?;

    let mut active: VariantActive = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        active.name = Set(name);
    }
    if let Some(sku) = payload.sku {
        active.sku = Set(Some(sku).filter(|s| !s.trim().is_empty()));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.price = Set(price);
    active.sale_price = Set(sale_price);
    active.stock = Set(stock);
    active.moq = Set(moq);

    let variant = active
        .update(&state.orm)
        .await
        .map_err(|err| conflict_on_unique(err, "Variant SKU already exists"))?;

    audit::record(
        &state.pool,
        user.user_id,
        "variant_update",
        "product_variants",
        serde_json::json!({ "product_id": product_id, "variant_id": variant.id }),
    )
    .await;

    Ok(ApiResponse::success("Updated", ProductVariant::from(variant), Some(Meta::empty())))
}

pub async fn delete_variant(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    variant_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_permission(user, "products", "delete")?;
    // Soft delete; past order lines keep pointing at the variant for restocks.
    let result = ProductVariants::update_many()
        .col_expr(VariantCol::IsActive, Expr::value(false))
        .filter(VariantCol::Id.eq(variant_id))
        .filter(VariantCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        user.user_id,
        "variant_delete",
        "product_variants",
        serde_json::json!({ "product_id": product_id, "variant_id": variant_id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}

async fn ensure_category(state: &AppState, id: Uuid) -> AppResult<()> {
    let found = Categories::find_by_id(id).one(&state.orm).await?;
    if found.is_none() {
        return Err(AppError::BadRequest("category not found".into()));
    }
    Ok(())
}

pub fn validate_stock_fields(
    price: i64,
    sale_price: Option<i64>,
    stock: i32,
    moq: i32,
) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if let Some(sale) = sale_price {
        if sale < 0 {
            return Err(AppError::BadRequest("sale_price must not be negative".into()));
        }
        if sale >= price {
            return Err(AppError::BadRequest("sale_price must be lower than price".into()));
        }
    }
    if stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    if moq < 1 {
        return Err(AppError::BadRequest("moq must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_stock_fields;

    #[test]
    fn stock_field_rules() {
        assert!(validate_stock_fields(1_000, Some(900), 10, 1).is_ok());
        assert!(validate_stock_fields(1_000, None, 0, 5).is_ok());
        assert!(validate_stock_fields(-1, None, 0, 1).is_err());
        assert!(validate_stock_fields(1_000, Some(1_000), 0, 1).is_err());
        assert!(validate_stock_fields(1_000, Some(-5), 0, 1).is_err());
        assert!(validate_stock_fields(1_000, None, -1, 1).is_err());
        assert!(validate_stock_fields(1_000, None, 1, 0).is_err());
    }
}
