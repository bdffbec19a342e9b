use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    dto::addresses::{AddressList, AddressRequest},
    entity::addresses::{ActiveModel, Column, Entity as Addresses, Model as AddressModel},
    error::{AppError, AppResult, conflict_on_unique},
    middleware::auth::AuthUser,
    models::Address,
    response::{ApiResponse, Meta},
    state::AppState,
};

const DEFAULT_COUNTRY: &str = "India";
const DEFAULT_RACE: &str = "Default address changed by another request, retry";

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items = Addresses::find()
        .filter(Column::UserId.eq(user.user_id))
        .order_by_desc(Column::IsDefault)
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Address::from)
        .collect();
    Ok(ApiResponse::success("Addresses", AddressList { items }, Some(Meta::empty())))
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    payload: AddressRequest,
) -> AppResult<ApiResponse<Address>> {
    validate(&payload)?;

    let txn = state.orm.begin().await?;
    let existing = Addresses::find()
        .filter(Column::UserId.eq(user.user_id))
        .count(&txn)
        .await?;
    let is_default = existing == 0 || payload.is_default.unwrap_or(false);
    if is_default {
        clear_default(&txn, user.user_id).await?;
    }

    let address = ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        full_name: Set(payload.full_name.trim().to_string()),
        phone: Set(payload.phone.trim().to_string()),
        line1: Set(payload.line1.trim().to_string()),
        line2: Set(payload.line2.filter(|l| !l.trim().is_empty())),
        city: Set(payload.city.trim().to_string()),
        state: Set(payload.state.trim().to_string()),
        postal_code: Set(payload.postal_code.trim().to_string()),
        country: Set(country_or_default(payload.country)),
        is_default: Set(is_default),
        created_at: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(|err| conflict_on_unique(err, DEFAULT_RACE))?;
    txn.commit().await?;

    Ok(ApiResponse::success("Address created", Address::from(address), Some(Meta::empty())))
}

pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AddressRequest,
) -> AppResult<ApiResponse<Address>> {
    validate(&payload)?;

    let txn = state.orm.begin().await?;
    let existing = find_owned(&txn, user.user_id, id).await?;
    let make_default = payload.is_default.unwrap_or(false) && !existing.is_default;
    if make_default {
        clear_default(&txn, user.user_id).await?;
    }

    let mut active: ActiveModel = existing.into();
    active.full_name = Set(payload.full_name.trim().to_string());
    active.phone = Set(payload.phone.trim().to_string());
    active.line1 = Set(payload.line1.trim().to_string());
    active.line2 = Set(payload.line2.filter(|l| !l.trim().is_empty()));
    active.city = Set(payload.city.trim().to_string());
    active.state = Set(payload.state.trim().to_string());
    active.postal_code = Set(payload.postal_code.trim().to_string());
    active.country = Set(country_or_default(payload.country));
    if make_default {
        active.is_default = Set(true);
    }
    let address = active
        .update(&txn)
        .await
        .map_err(|err| conflict_on_unique(err, DEFAULT_RACE))?;
    txn.commit().await?;

    Ok(ApiResponse::success("Address updated", Address::from(address), Some(Meta::empty())))
}

/// Removing the default address promotes the most recent remaining one.
pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;
    let existing = find_owned(&txn, user.user_id, id).await?;
    let was_default = existing.is_default;
    Addresses::delete_by_id(existing.id).exec(&txn).await?;

    if was_default {
        let next = Addresses::find()
            .filter(Column::UserId.eq(user.user_id))
            .order_by_desc(Column::CreatedAt)
            .one(&txn)
            .await?;
        if let Some(next) = next {
            let mut active: ActiveModel = next.into();
            active.is_default = Set(true);
            active
                .update(&txn)
                .await
                .map_err(|err| conflict_on_unique(err, DEFAULT_RACE))?;
        }
    }
    txn.commit().await?;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}

pub async fn set_default_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Address>> {
    let txn = state.orm.begin().await?;
    let existing = find_owned(&txn, user.user_id, id).await?;
    clear_default(&txn, user.user_id).await?;

    let mut active: ActiveModel = existing.into();
    active.is_default = Set(true);
    let address = active
        .update(&txn)
        .await
        .map_err(|err| conflict_on_unique(err, DEFAULT_RACE))?;
    txn.commit().await?;

    Ok(ApiResponse::success("Default address set", Address::from(address), Some(Meta::empty())))
}

pub async fn find_owned<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    id: Uuid,
) -> AppResult<AddressModel> {
    Addresses::find_by_id(id)
        .filter(Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(AppError::NotFound)
}

async fn clear_default<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<()> {
    Addresses::update_many()
        .col_expr(Column::IsDefault, Expr::value(false))
        .filter(Column::UserId.eq(user_id))
        .filter(Column::IsDefault.eq(true))
        .exec(db)
        .await?;
    Ok(())
}

fn country_or_default(country: Option<String>) -> String {
    country
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_COUNTRY.to_string())
}

fn validate(payload: &AddressRequest) -> AppResult<()> {
    let required = [
        ("full_name", &payload.full_name),
        ("phone", &payload.phone),
        ("line1", &payload.line1),
        ("city", &payload.city),
        ("state", &payload.state),
        ("postal_code", &payload.postal_code),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} is required")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AddressRequest {
        AddressRequest {
            full_name: "Asha Rao".into(),
            phone: "9876543210".into(),
            line1: "12 MG Road".into(),
            line2: None,
            city: "Bengaluru".into(),
            state: "KA".into(),
            postal_code: "560001".into(),
            country: None,
            is_default: None,
        }
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        assert!(validate(&request()).is_ok());
        let mut missing_city = request();
        missing_city.city = "  ".into();
        assert!(validate(&missing_city).is_err());
    }

    #[test]
    fn country_falls_back_when_blank() {
        assert_eq!(country_or_default(None), DEFAULT_COUNTRY);
        assert_eq!(country_or_default(Some(" ".into())), DEFAULT_COUNTRY);
        assert_eq!(country_or_default(Some("Nepal".into())), "Nepal");
    }
}
