use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ReferredUser {
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReferralSummary {
    pub referral_code: String,
    pub total_referrals: i64,
    pub referred: Vec<ReferredUser>,
}
