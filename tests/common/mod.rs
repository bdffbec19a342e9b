#![allow(dead_code)]

use dfix_kart_api::{
    config::AppConfig,
    db::{create_orm_conn, pool_from_orm, run_migrations},
    dto::{
        addresses::AddressRequest, auth::RegisterRequest, categories::CreateCategoryRequest,
        products::CreateProductRequest,
    },
    entity::users::{ActiveModel as UserActive, Entity as Users},
    middleware::auth::AuthUser,
    models::{Address, Category, Product},
    permissions::{ROLE_SUPER_ADMIN, ROLE_USER},
    services::{address_service, auth_service, category_service, product_service},
    state::AppState,
};
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};
use uuid::Uuid;

/// `None` when no database is configured; callers skip in that case.
pub async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(None);
        }
    };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;
    let pool = pool_from_orm(&orm);
    Ok(Some(AppState::new(pool, orm, AppConfig::for_tests(database_url))))
}

/// Short random suffix so repeated runs never collide on unique columns.
pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..8])
}

pub async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let email = format!("{}@example.com", unique("user"));
    let created = auth_service::register_user(
        state,
        RegisterRequest {
            name: "Flow Tester".into(),
            email,
            password: "secret123".into(),
            phone: None,
            referral_code: None,
        },
    )
    .await?;
    let user = created.data.expect("registered user");

    if role != ROLE_USER {
        let model = Users::find_by_id(user.id)
            .one(&state.orm)
            .await?
            .expect("user row");
        let mut active: UserActive = model.into_active_model();
        active.role = Set(role.to_string());
        active.update(&state.orm).await?;
    }

    Ok(AuthUser {
        user_id: user.id,
        role: role.to_string(),
        permissions: Vec::new(),
    })
}

pub async fn create_super_admin(state: &AppState) -> anyhow::Result<AuthUser> {
    create_user(state, ROLE_SUPER_ADMIN).await
}

pub async fn create_category(state: &AppState, admin: &AuthUser) -> anyhow::Result<Category> {
    let name = unique("Spares");
    let resp = category_service::create_category(
        state,
        admin,
        CreateCategoryRequest {
            name,
            slug: None,
            description: None,
            image_url: None,
            parent_id: None,
            is_active: Some(true),
            sort_order: None,
        },
    )
    .await?;
    Ok(resp.data.expect("category"))
}

pub fn product_request(
    category_id: Uuid,
    price: i64,
    sale_price: Option<i64>,
    stock: i32,
    moq: i32,
) -> CreateProductRequest {
    CreateProductRequest {
        category_id: Some(category_id),
        name: unique("Part"),
        slug: None,
        sku: None,
        description: Some("integration fixture".into()),
        price,
        sale_price,
        stock,
        moq: Some(moq),
        images: vec!["/img/part.png".into()],
        is_active: Some(true),
        is_featured: Some(false),
    }
}

pub async fn create_product(
    state: &AppState,
    admin: &AuthUser,
    category_id: Uuid,
    price: i64,
    sale_price: Option<i64>,
    stock: i32,
    moq: i32,
) -> anyhow::Result<Product> {
    let resp = product_service::create_product(
        state,
        admin,
        product_request(category_id, price, sale_price, stock, moq),
    )
    .await?;
    Ok(resp.data.expect("product"))
}

pub fn address_request(line1: &str, is_default: Option<bool>) -> AddressRequest {
    AddressRequest {
        full_name: "Asha Rao".into(),
        phone: "9876543210".into(),
        line1: line1.into(),
        line2: None,
        city: "Bengaluru".into(),
        state: "Karnataka".into(),
        postal_code: "560001".into(),
        country: None,
        is_default,
    }
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    line1: &str,
    is_default: Option<bool>,
) -> anyhow::Result<Address> {
    let resp =
        address_service::create_address(state, user, address_request(line1, is_default)).await?;
    Ok(resp.data.expect("address"))
}
