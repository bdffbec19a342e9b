use chrono::{Duration, Utc};
use dfix_kart_api::{
    config::AppConfig,
    db::{create_orm_conn, pool_from_orm, run_migrations},
    permissions::{ROLE_ADMIN, ROLE_SUPER_ADMIN, ROLE_USER},
    services::auth_service::{build_referral_code, hash_password},
};
use serde_json::json;
use uuid::Uuid;

struct SeedProduct {
    category: &'static str,
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    price: i64,
    sale_price: Option<i64>,
    stock: i32,
    moq: i32,
    featured: bool,
}

const CATEGORIES: [(&str, &str, &str); 3] = [
    ("Phone Spares", "phone-spares", "Displays, batteries and flex cables"),
    ("Tools", "tools", "Screwdrivers, openers and soldering kits"),
    ("Accessories", "accessories", "Chargers, cases and cables"),
];

const PRODUCTS: [SeedProduct; 4] = [
    SeedProduct {
        category: "phone-spares",
        name: "OLED Display Assembly",
        slug: "oled-display-assembly",
        description: "Replacement display with frame",
        price: 459_900,
        sale_price: Some(399_900),
        stock: 40,
        moq: 1,
        featured: true,
    },
    SeedProduct {
        category: "phone-spares",
        name: "Li-ion Battery 4000mAh",
        slug: "li-ion-battery-4000mah",
        description: "High capacity replacement battery",
        price: 129_900,
        sale_price: None,
        stock: 120,
        moq: 2,
        featured: false,
    },
    SeedProduct {
        category: "tools",
        name: "Precision Screwdriver Kit",
        slug: "precision-screwdriver-kit",
        description: "38 bits with magnetic driver",
        price: 89_900,
        sale_price: Some(74_900),
        stock: 60,
        moq: 1,
        featured: true,
    },
    SeedProduct {
        category: "accessories",
        name: "USB-C Fast Charger",
        slug: "usb-c-fast-charger",
        description: "25W wall charger",
        price: 99_900,
        sale_price: None,
        stock: 3,
        moq: 1,
        featured: false,
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    let pool = pool_from_orm(&orm);

    let super_admin_id =
        ensure_user(
            &pool,
            "Super Admin",
            "superadmin@dfixkart.in",
            "superadmin123",
            ROLE_SUPER_ADMIN,
            &[],
        )
        .await?;
    let admin_id = ensure_user(
        &pool,
        "Store Admin",
        "admin@dfixkart.in",
        "admin123",
        ROLE_ADMIN,
        &["products:*", "orders:*", "inventory:*", "reviews:update", "reviews:read"],
    )
    .await?;
    let user_id =
        ensure_user(&pool, "Demo Customer", "user@dfixkart.in", "user123", ROLE_USER, &[])
            .await?;

    seed_catalog(&pool).await?;
    seed_flash_sale(&pool).await?;
    seed_blog(&pool, super_admin_id).await?;

    println!("Seed completed. Super admin: {super_admin_id}, admin: {admin_id}, user: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
    permissions: &[&str],
) -> anyhow::Result<Uuid> {
    if let Some((id,)) = sqlx::query_as::<_, (Uuid,)>("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?
    {
        println!("User {email} already present");
        return Ok(id);
    }

    let id = Uuid::new_v4();
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, permissions, referral_code)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .bind(json!(permissions))
    .bind(build_referral_code(id))
    .execute(pool)
    .await?;

    println!("Created user {email} (role={role})");
    Ok(id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    for (position, (name, slug, description)) in CATEGORIES.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO categories (name, slug, description, sort_order)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(slug)
        .bind(description)
        .bind(position as i32)
        .execute(pool)
        .await?;
    }

    for product in &PRODUCTS {
        sqlx::query(
            r#"
            INSERT INTO products
                (category_id, name, slug, description, price, sale_price, stock, moq, is_featured)
            SELECT c.id, $2, $3, $4, $5, $6, $7, $8, $9
            FROM categories c WHERE c.slug = $1
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(product.category)
        .bind(product.name)
        .bind(product.slug)
        .bind(product.description)
        .bind(product.price)
        .bind(product.sale_price)
        .bind(product.stock)
        .bind(product.moq)
        .bind(product.featured)
        .execute(pool)
        .await?;
    }

    for (sku, name, price, stock) in [
        ("BAT-4000-STD", "Standard", 129_900_i64, 80),
        ("BAT-4000-PRO", "Pro (with adhesive kit)", 149_900_i64, 40),
    ] {
        sqlx::query(
            r#"
            INSERT INTO product_variants (product_id, sku, name, price, stock, moq)
            SELECT p.id, $2, $3, $4, $5, p.moq
            FROM products p WHERE p.slug = $1
            ON CONFLICT (sku) DO NOTHING
            "#,
        )
        .bind("li-ion-battery-4000mah")
        .bind(sku)
        .bind(name)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}

async fn seed_flash_sale(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM flash_sales WHERE name = $1")
        .bind("Weekend Repair Rush")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let now = Utc::now();
    let (sale_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO flash_sales (name, description, start_time, end_time)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind("Weekend Repair Rush")
    .bind("Tools at their lowest price this weekend")
    .bind(now - Duration::hours(1))
    .bind(now + Duration::days(2))
    .fetch_one(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO flash_sale_items (flash_sale_id, product_id, flash_sale_price)
        SELECT $1, p.id, $3 FROM products p WHERE p.slug = $2
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(sale_id)
    .bind("precision-screwdriver-kit")
    .bind(64_900_i64)
    .execute(pool)
    .await?;

    println!("Seeded flash sale");
    Ok(())
}

async fn seed_blog(pool: &sqlx::PgPool, author_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO blog_posts (author_id, title, slug, excerpt, content, status, published_at)
        VALUES ($1, $2, $3, $4, $5, 'published', now())
        ON CONFLICT (slug) DO NOTHING
        "#,
    )
    .bind(author_id)
    .bind("Choosing a Replacement Display")
    .bind("choosing-a-replacement-display")
    .bind("OLED or LCD: what to stock for your repair bench")
    .bind("OLED panels cost more but match factory colour. LCD panels suit budget repairs.")
    .execute(pool)
    .await?;

    println!("Seeded blog");
    Ok(())
}
