use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    config::AppConfig,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest},
    entity::{
        referrals::ActiveModel as ReferralActive,
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult, conflict_on_unique},
    middleware::auth::AuthUser,
    models::User,
    permissions::ROLE_USER,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let RegisterRequest {
        name,
        email,
        password,
        phone,
        referral_code,
    } = payload;
    let name = name.trim().to_string();
    let email = normalize_email(&email);

    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    if !is_plausible_email(&email) {
        return Err(AppError::BadRequest("email is invalid".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already taken".to_string()));
    }

    let referrer = match referral_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
    {
        Some(code) => {
            let referrer = Users::find()
                .filter(UserCol::ReferralCode.eq(code.to_uppercase()))
                .one(&state.orm)
                .await?;
            match referrer {
                Some(r) => Some(r.id),
                None => return Err(AppError::BadRequest("Invalid referral code".into())),
            }
        }
        None => None,
    };

    let password_hash = hash_password(&password)?;
    let id = Uuid::new_v4();

    let txn = state.orm.begin().await?;
    let user = UserActive {
        id: Set(id),
        name: Set(name),
        email: Set(email),
        password_hash: Set(password_hash),
        phone: Set(phone.filter(|p| !p.trim().is_empty())),
        role: Set(ROLE_USER.to_string()),
        permissions: Set(serde_json::json!([])),
        referral_code: Set(build_referral_code(id)),
        is_active: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(|err| conflict_on_unique(err, "Email is already taken"))?;

    if let Some(referrer_id) = referrer {
        ReferralActive {
            id: Set(Uuid::new_v4()),
            referrer_id: Set(referrer_id),
            referred_id: Set(user.id),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.id,
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id, "referred_by": referrer }),
    )
    .await;

    Ok(ApiResponse::success("User created", User::from(user), None))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(normalize_email(&email)))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("Invalid email or password".into())),
    };

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }
    if !user.is_active {
        return Err(AppError::Forbidden);
    }

    let token = issue_token(&state.config, &user)?;

    audit::record(
        &state.pool,
        user.id,
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token,
            user: User::from(user),
        },
        Some(Meta::empty()),
    ))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("OK", User::from(model), None))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let existing = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        active.name = Set(name);
    }
    if let Some(phone) = payload.phone {
        let phone = phone.trim().to_string();
        active.phone = Set((!phone.is_empty()).then_some(phone));
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    Ok(ApiResponse::success("Profile updated", User::from(updated), None))
}

pub fn issue_token(config: &AppConfig, user: &UserModel) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(config.jwt_ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let permissions: Vec<String> =
        serde_json::from_value(user.permissions.clone()).map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "stored permissions are malformed");
            AppError::Internal(anyhow::anyhow!("malformed permissions for user {}", user.id))
        })?;

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.clone(),
        permissions,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

/// `DFK` followed by the first eight hex digits of the user id.
pub fn build_referral_code(user_id: Uuid) -> String {
    let simple = user_id.simple().to_string();
    format!("DFK{}", simple[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referral_codes_are_prefixed_and_uppercase() {
        let id = Uuid::parse_str("0f3a9c2e-1111-2222-3333-444455556666").unwrap();
        assert_eq!(build_referral_code(id), "DFK0F3A9C2E");
    }

    #[test]
    fn email_checks() {
        assert_eq!(normalize_email("  Buyer@Example.COM "), "buyer@example.com");
        assert!(is_plausible_email("a@b.in"));
        assert!(!is_plausible_email("no-at-sign"));
        assert!(!is_plausible_email("@b.in"));
        assert!(!is_plausible_email("a@localhost"));
    }

    fn account(permissions: serde_json::Value) -> UserModel {
        UserModel {
            id: Uuid::new_v4(),
            name: "Staff".into(),
            email: "staff@example.com".into(),
            password_hash: String::new(),
            phone: None,
            role: "admin".into(),
            permissions,
            referral_code: "DFKSTAFF".into(),
            is_active: true,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn malformed_permissions_refuse_a_token() {
        let config = AppConfig::for_tests("postgres://unused");
        let err = issue_token(&config, &account(serde_json::json!({ "orders": "all" })))
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let token = issue_token(&config, &account(serde_json::json!(["orders:*"]))).unwrap();
        let decoded = crate::middleware::auth::decode_token(&token, &config.jwt_secret).unwrap();
        assert_eq!(decoded.permissions, vec!["orders:*".to_string()]);
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("secret123").unwrap();
        assert!(verify_password("secret123", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
