//! Shared JWT issuance and verification.
//!
//! Both the shop API extractors and the gateway filter verify tokens through
//! this one component, so the two boundaries can never drift apart on what a
//! valid credential looks like.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::config::AuthConfig;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is invalid or expired")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("expected an access token")]
    WrongType,
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Platform roles as a closed set. Unknown role strings are rejected at the
/// authorization boundary rather than silently granted nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Cliente,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Cliente => "CLIENTE",
        }
    }
}

impl FromStr for Role {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "CLIENTE" => Ok(Role::Cliente),
            other => Err(TokenError::UnknownRole(other.to_string())),
        }
    }
}

/// Discriminates the two token kinds via the `token_type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id
    pub sub: String,
    /// Role names; absent on refresh tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    pub token_type: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    /// Roles that map into the closed set; unknown names are skipped here
    /// and never grant anything
    pub fn known_roles(&self) -> Vec<Role> {
        self.roles
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|r| r.parse().ok())
            .collect()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|r| r == role.as_str())
    }
}

/// Issues and verifies signed, time-limited tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_hours: i64,
    refresh_token_days: i64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_token_hours: config.access_token_hours,
            refresh_token_days: config.refresh_token_days,
        }
    }

    /// Issue a short-lived access token carrying the subject and its role
    /// names as stored (custom roles beyond the built-in set are carried
    /// verbatim; authorization decisions still match on the closed enum)
    pub fn issue_access_token(&self, sub: &str, roles: &[String]) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            roles: Some(roles.to_vec()),
            token_type: TokenKind::Access,
            exp: now + self.access_token_hours * 3600,
            iat: now,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Issue a long-lived refresh token carrying only the subject
    pub fn issue_refresh_token(&self, sub: &str) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            roles: None,
            token_type: TokenKind::Refresh,
            exp: now + self.refresh_token_days * 86400,
            iat: now,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Verify signature and expiry. Any parse, signature, or claim failure
    /// is reported as invalid; nothing fails open.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        // jsonwebtoken already checks exp, but expiry is part of the contract
        // here and must not depend on the library's default leeway
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }

    /// Verify and additionally require an access token. Refresh tokens are
    /// structurally valid bearer credentials but must not grant API access.
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        match claims.token_type {
            TokenKind::Access => Ok(claims),
            TokenKind::Refresh => Err(TokenError::WrongType),
        }
    }

    /// Verify and require a refresh token
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        match claims.token_type {
            TokenKind::Refresh => Ok(claims),
            TokenKind::Access => Err(TokenError::WrongType),
        }
    }
}
