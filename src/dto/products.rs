use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    models::{Category, Product, ProductCard, ProductVariant},
    pricing::PriceQuote,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub category_id: Option<Uuid>,
    pub name: String,
    pub slug: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub price: i64,
    pub sale_price: Option<i64>,
    pub stock: i32,
    pub moq: Option<i32>,
    #[serde(default)]
    pub images: Vec<String>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    /// Send `clear_sale_price: true` to remove an existing sale price.
    pub sale_price: Option<i64>,
    #[serde(default)]
    pub clear_sale_price: bool,
    pub stock: Option<i32>,
    pub moq: Option<i32>,
    pub images: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateVariantRequest {
    pub sku: Option<String>,
    pub name: String,
    pub price: i64,
    pub sale_price: Option<i64>,
    pub stock: i32,
    pub moq: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateVariantRequest {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub price: Option<i64>,
    pub sale_price: Option<i64>,
    #[serde(default)]
    pub clear_sale_price: bool,
    pub stock: Option<i32>,
    pub moq: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VariantCard {
    #[serde(flatten)]
    pub variant: ProductVariant,
    pub pricing: PriceQuote,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RatingSummary {
    pub average: f64,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    pub product: ProductCard,
    pub category: Option<Category>,
    pub variants: Vec<VariantCard>,
    pub rating: RatingSummary,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<ProductCard>)]
    pub items: Vec<ProductCard>,
}

/// Raw catalog rows for admin screens.
#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct AdminProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}
