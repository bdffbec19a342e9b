use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::{
    db::DbPool,
    dto::referrals::{ReferralSummary, ReferredUser},
    entity::{
        referrals::{Column, Entity as Referrals},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn my_referrals(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<ReferralSummary>> {
    let me = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let referred: Vec<ReferredUser> = Referrals::find()
        .filter(Column::ReferrerId.eq(user.user_id))
        .order_by_desc(Column::CreatedAt)
        .find_also_related(Users)
        .all(&state.orm)
        .await?
        .into_iter()
        .filter_map(|(referral, referred)| {
            referred.map(|u| ReferredUser {
                name: u.name,
                joined_at: referral.created_at.with_timezone(&Utc),
            })
        })
        .collect();

    Ok(ApiResponse::success(
        "Referrals",
        ReferralSummary {
            referral_code: me.referral_code,
            total_referrals: referral_count(&state.pool, user.user_id).await?,
            referred,
        },
        Some(Meta::empty()),
    ))
}

pub async fn referral_count(pool: &DbPool, referrer_id: Uuid) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM referrals WHERE referrer_id = $1")
        .bind(referrer_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
