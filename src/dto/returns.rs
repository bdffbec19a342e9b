use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::ReturnRequest;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReturnRequest {
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub quantity: i32,
    pub reason: String,
    pub details: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateReturnRequest {
    pub status: String,
    pub admin_note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ReturnList {
    #[schema(value_type = Vec<ReturnRequest>)]
    pub items: Vec<ReturnRequest>,
}
