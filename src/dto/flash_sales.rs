use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{FlashSale, ProductCard};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFlashSaleRequest {
    pub name: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateFlashSaleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FlashSaleItemRequest {
    pub product_id: Uuid,
    pub flash_sale_price: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FlashSaleProduct {
    #[serde(flatten)]
    pub product: ProductCard,
    pub flash_sale_price: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FlashSaleWithProducts {
    pub sale: FlashSale,
    pub products: Vec<FlashSaleProduct>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct FlashSaleList {
    #[schema(value_type = Vec<FlashSaleWithProducts>)]
    pub items: Vec<FlashSaleWithProducts>,
}
