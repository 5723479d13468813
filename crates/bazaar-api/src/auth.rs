use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use bazaar_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;
use crate::extract::Json;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_LIFETIME_DAYS: i64 = 30;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    validate_email(&email, state.email_domain.as_deref())?;
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::InvalidInput(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Transient(format!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let account_email = email.clone();
    state
        .blocking(move |db| {
            db.create_account(user_id, &account_email, &password_hash)?;
            db.ensure_user(user_id, &account_email)?;
            Ok(())
        })
        .await?;

    let token = create_token(&state.jwt_secret, user_id, &email)
        .map_err(|e| ApiError::Transient(e.to_string()))?;
    info!("Registered {} ({})", email, user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = normalize_email(&req.email);
    let lookup = email.clone();
    let account = state
        .blocking(move |db| db.get_account_by_email(&lookup))
        .await?
        .ok_or(ApiError::NotAuthenticated)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&account.password)
        .map_err(|e| ApiError::Transient(format!("stored hash unreadable: {}", e)))?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        warn!("Failed login for {}", email);
        return Err(ApiError::NotAuthenticated);
    }

    let user_id: Uuid = account
        .id
        .parse()
        .map_err(|e| ApiError::Transient(format!("corrupt account id '{}': {}", account.id, e)))?;

    let token = create_token(&state.jwt_secret, user_id, &account.email)
        .map_err(|e| ApiError::Transient(e.to_string()))?;

    Ok(Json(LoginResponse {
        user_id,
        email: account.email,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn validate_email(email: &str, required_domain: Option<&str>) -> Result<(), ApiError> {
    let invalid = || ApiError::InvalidInput(format!("'{}' is not a valid email address", email));

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }

    if let Some(required) = required_domain {
        let required = required.trim_start_matches('@').to_lowercase();
        if domain != required {
            return Err(ApiError::InvalidInput(format!(
                "registration is limited to @{} addresses",
                required
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(validate_email("asha@campus.edu", None).is_ok());
        assert!(validate_email("a.b+c@mail.campus.edu", None).is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["", "asha", "@campus.edu", "asha@", "asha@campus", "a@b@c.edu", "a b@c.edu", "a@.edu"] {
            assert!(validate_email(bad, None).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn enforces_configured_domain() {
        assert!(validate_email("asha@campus.edu", Some("campus.edu")).is_ok());
        assert!(validate_email("asha@campus.edu", Some("@Campus.edu")).is_ok());
        assert!(validate_email("asha@gmail.com", Some("campus.edu")).is_err());
        assert!(validate_email("asha@evil-campus.edu", Some("campus.edu")).is_err());
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email("  Asha@Campus.EDU "), "asha@campus.edu");
    }

    #[test]
    fn tokens_round_trip_through_the_gateway_verifier() {
        let user_id = Uuid::new_v4();
        let token = create_token("secret", user_id, "asha@campus.edu").unwrap();
        let claims = bazaar_gateway::connection::verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "asha@campus.edu");
    }
}
