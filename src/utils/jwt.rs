use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn for_user(user: &user::Model, expiration_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            exp: (now + Duration::hours(expiration_hours)).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn is_rider(&self) -> bool {
        self.role == UserRole::Rider
    }
}

/// Sign a session token for `user`.
pub fn issue_token(user: &user::Model, secret: &str, expiration_hours: i64) -> AppResult<String> {
    encode(
        &Header::default(),
        &Claims::for_user(user, expiration_hours),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
}

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            email: "driver@example.com".to_string(),
            password_hash: String::new(),
            name: "Dee".to_string(),
            phone: None,
            role: UserRole::Driver,
            created_at: Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn test_token_carries_identity_and_role() {
        let user = driver();
        let token = issue_token(&user, "secret", 1).unwrap();
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, UserRole::Driver);
        assert!(!claims.is_rider());
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = issue_token(&driver(), "secret", 1).unwrap();
        assert!(matches!(
            verify_token(&token, "other"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let token = issue_token(&driver(), "secret", -2).unwrap();
        assert!(matches!(
            verify_token(&token, "secret"),
            Err(AppError::Unauthorized(_))
        ));
    }
}
