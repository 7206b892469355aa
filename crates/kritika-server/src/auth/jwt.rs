use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Username
    pub username: String,
    /// Role (admin, moderator, user)
    pub role: String,
    /// Token type (access, refresh)
    pub token_type: TokenType,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

const ACCESS_TOKEN_MINUTES: i64 = 15;
const REFRESH_TOKEN_DAYS: i64 = 7;

/// Generate access + refresh token pair
pub fn generate_token_pair(
    user_id: Uuid,
    username: &str,
    role: &str,
    secret: &str,
) -> Result<TokenPair, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let key = EncodingKey::from_secret(secret.as_bytes());

    let access_claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role: role.to_string(),
        token_type: TokenType::Access,
        iat: now.timestamp(),
        exp: (now + Duration::minutes(ACCESS_TOKEN_MINUTES)).timestamp(),
    };
    let access_token = encode(&Header::default(), &access_claims, &key)?;

    let refresh_claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role: role.to_string(),
        token_type: TokenType::Refresh,
        iat: now.timestamp(),
        exp: (now + Duration::days(REFRESH_TOKEN_DAYS)).timestamp(),
    };
    let refresh_token = encode(&Header::default(), &refresh_claims, &key)?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_MINUTES * 60,
    })
}

/// Validate a JWT token and return claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-for-jwt";

    #[test]
    fn test_token_generation_and_validation() {
        let user_id = Uuid::new_v4();

        let pair = generate_token_pair(user_id, "reviewer", "user", SECRET).unwrap();
        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());

        let claims = validate_token(&pair.access_token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username, "reviewer");
        assert_eq!(claims.role, "user");
        assert_eq!(claims.token_type, TokenType::Access);

        let refresh_claims = validate_token(&pair.refresh_token, SECRET).unwrap();
        assert_eq!(refresh_claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn test_access_token_expires_in_fifteen_minutes() {
        let pair = generate_token_pair(Uuid::new_v4(), "alice", "moderator", SECRET).unwrap();
        let claims = validate_token(&pair.access_token, SECRET).unwrap();
        assert_eq!(claims.role, "moderator");
        let diff = claims.exp - claims.iat;
        assert!((899..=901).contains(&diff));
    }

    #[test]
    fn test_refresh_token_expires_in_seven_days() {
        let pair = generate_token_pair(Uuid::new_v4(), "bob", "user", SECRET).unwrap();
        let claims = validate_token(&pair.refresh_token, SECRET).unwrap();
        let diff = claims.exp - claims.iat;
        assert!((604_799..=604_801).contains(&diff));
    }

    #[test]
    fn test_invalid_secret_rejects_token() {
        let pair = generate_token_pair(Uuid::new_v4(), "user1", "user", SECRET).unwrap();
        assert!(validate_token(&pair.access_token, "wrong-secret").is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(validate_token("not-a-valid-jwt", SECRET).is_err());
        assert!(validate_token("", SECRET).is_err());
    }

    #[test]
    fn test_access_and_refresh_tokens_are_different() {
        let pair = generate_token_pair(Uuid::new_v4(), "user1", "user", SECRET).unwrap();
        assert_ne!(pair.access_token, pair.refresh_token);
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);
    }
}
