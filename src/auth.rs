use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{proceeds, AppState, Error, Payload};

pub const ISSUER: &str = "teacherdash-backend";
pub const AUDIENCE: &str = "teacherdash-frontend";
pub const TEACHER_ROLE: &str = "teacher";
pub const EXPIRES_IN: &str = "8h";
const SESSION_HOURS: i64 = 8;

/// The single account allowed to log in.
///
/// The password only lives in memory as a salted PBKDF2 hash and the username
/// as a SHA-256 digest, so neither comparison short-circuits on a matching
/// prefix.
pub struct Credentials {
    username: String,
    username_digest: Vec<u8>,
    password_hash: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Result<Self, Error> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Pbkdf2.hash_password(password.as_bytes(), &salt)?.to_string();
        Ok(Self {
            username: username.to_string(),
            username_digest: digest(username),
            password_hash,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn matches(&self, username: &str, password: &str) -> Result<bool, Error> {
        let hash = PasswordHash::new(&self.password_hash)?;
        let username_ok = digest(username) == self.username_digest;
        let password_ok = Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok();
        Ok(username_ok & password_ok)
    }
}

fn digest(value: &str) -> Vec<u8> {
    let mut hasher: Sha256 = Digest::new();
    hasher.update(value.as_bytes());
    hasher.finalize().to_vec()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Who a verified token belongs to, handed to protected handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub role: String,
    pub iat: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Authorization header is required")]
    MissingHeader,
    #[error("Invalid authorization header format. Use: Bearer <token>")]
    BadFormat,
    #[error("Token is required")]
    MissingToken,
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token verification failed")]
    VerificationFailed,
    #[error("Invalid token payload")]
    InvalidPayload,
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::MissingHeader => "MISSING_AUTH_HEADER",
            SessionError::BadFormat => "INVALID_AUTH_FORMAT",
            SessionError::MissingToken => "MISSING_TOKEN",
            SessionError::Expired => "TOKEN_EXPIRED",
            SessionError::InvalidToken => "INVALID_TOKEN",
            SessionError::VerificationFailed => "TOKEN_VERIFICATION_FAILED",
            SessionError::InvalidPayload => "INVALID_TOKEN_PAYLOAD",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for SessionError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => SessionError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => SessionError::InvalidToken,
            _ => SessionError::VerificationFailed,
        }
    }
}

/// HS256 key material for issuing and checking session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(&self, username: &str) -> Result<String, Error> {
        self.issue_at(username, Utc::now())
    }

    pub fn issue_at(&self, username: &str, issued_at: DateTime<Utc>) -> Result<String, Error> {
        let claims = Claims {
            username: Some(username.to_string()),
            role: Some(TEACHER_ROLE.to_string()),
            iat: issued_at.timestamp(),
            exp: (issued_at + Duration::hours(SESSION_HOURS)).timestamp(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
        };
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, Error> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Identity, SessionError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)?.claims;
        match (claims.username, claims.role) {
            (Some(username), Some(role)) if !username.is_empty() && !role.is_empty() => {
                Ok(Identity {
                    username,
                    role,
                    iat: claims.iat,
                })
            }
            _ => Err(SessionError::InvalidPayload),
        }
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(header: Option<&HeaderValue>) -> Result<&str, SessionError> {
    let header = header.ok_or(SessionError::MissingHeader)?;
    let header = header.to_str().map_err(|_| SessionError::BadFormat)?;
    let parts: Vec<&str> = header.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] if token.trim().is_empty() => Err(SessionError::MissingToken),
        ["Bearer", token] => Ok(*token),
        _ => Err(SessionError::BadFormat),
    }
}

/// Route layer for everything behind a login.
pub async fn require_session<B>(mut req: Request<B>, next: Next<B>) -> Result<Response, Error> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .cloned()
        .ok_or_else(|| Error::AuthInternal {
            message: "application state missing from request".to_string(),
        })?;

    let token = bearer_token(req.headers().get(AUTHORIZATION))?;
    let identity = state.keys.verify(token)?;
    log::info!("Authenticated user: {} ({})", identity.username, identity.role);

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Payload<LoggedIn> {
    let Json(login) = body.map_err(|rejection| Error::InvalidPayload {
        message: rejection.to_string(),
    })?;

    let (username, password) = match (login.username, login.password) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            (username, password)
        }
        _ => return Err(Error::MissingCredentials),
    };

    if !state.credentials.matches(&username, &password)? {
        log::warn!("Rejected login attempt");
        return Err(Error::InvalidCredentials);
    }

    let token = state.keys.issue(state.credentials.username())?;
    log::info!("Issued session for {}", state.credentials.username());

    proceeds(LoggedIn {
        token,
        user: SessionUser {
            username: state.credentials.username().to_string(),
            role: TEACHER_ROLE.to_string(),
        },
        expires_in: EXPIRES_IN.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub username: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedIn {
    pub token: String,
    pub user: SessionUser,
    pub expires_in: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::new("test_secret_key_for_testing_only")
    }

    #[test]
    fn credentials_match_only_the_configured_pair() {
        let credentials = Credentials::new("teacher", "hunter22").unwrap();

        assert!(credentials.matches("teacher", "hunter22").unwrap());
        assert!(!credentials.matches("teacher", "hunter23").unwrap());
        assert!(!credentials.matches("Teacher", "hunter22").unwrap());
        assert!(!credentials.matches("someone", "else").unwrap());
        assert!(!credentials.matches("", "").unwrap());
    }

    #[test]
    fn issued_token_round_trips_identity() {
        let keys = keys();
        let token = keys.issue("teacher").unwrap();

        let identity = keys.verify(&token).unwrap();
        assert_eq!(identity.username, "teacher");
        assert_eq!(identity.role, TEACHER_ROLE);
        assert!(identity.iat <= Utc::now().timestamp());
    }

    #[test]
    fn token_within_window_is_accepted() {
        let keys = keys();
        let token = keys
            .issue_at("teacher", Utc::now() - Duration::hours(7))
            .unwrap();
        assert!(keys.verify(&token).is_ok());
    }

    #[test]
    fn token_past_window_is_expired() {
        let keys = keys();
        let token = keys
            .issue_at("teacher", Utc::now() - Duration::hours(9))
            .unwrap();
        assert_eq!(keys.verify(&token), Err(SessionError::Expired));
    }

    #[test]
    fn malformed_token_is_invalid_not_expired() {
        assert_eq!(
            keys().verify("invalid.token.here"),
            Err(SessionError::InvalidToken)
        );
        assert_eq!(keys().verify("garbage"), Err(SessionError::InvalidToken));
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let token = SessionKeys::new("another_secret").issue("teacher").unwrap();
        assert_eq!(keys().verify(&token), Err(SessionError::InvalidToken));
    }

    #[test]
    fn token_for_other_audience_is_invalid() {
        let keys = keys();
        let now = Utc::now();
        let token = keys
            .sign(&Claims {
                username: Some("teacher".to_string()),
                role: Some(TEACHER_ROLE.to_string()),
                iat: now.timestamp(),
                exp: (now + Duration::hours(1)).timestamp(),
                iss: ISSUER.to_string(),
                aud: "someone-else".to_string(),
            })
            .unwrap();
        assert_eq!(keys.verify(&token), Err(SessionError::InvalidToken));
    }

    #[test]
    fn token_without_identity_claims_is_invalid_payload() {
        let keys = keys();
        let now = Utc::now();
        let token = keys
            .sign(&Claims {
                username: None,
                role: Some(TEACHER_ROLE.to_string()),
                iat: now.timestamp(),
                exp: (now + Duration::hours(1)).timestamp(),
                iss: ISSUER.to_string(),
                aud: AUDIENCE.to_string(),
            })
            .unwrap();
        assert_eq!(keys.verify(&token), Err(SessionError::InvalidPayload));
    }

    #[test]
    fn bearer_header_parsing() {
        let header = |value: &'static str| HeaderValue::from_static(value);

        assert_eq!(bearer_token(None), Err(SessionError::MissingHeader));
        assert_eq!(
            bearer_token(Some(&header("Basic abc"))),
            Err(SessionError::BadFormat)
        );
        assert_eq!(
            bearer_token(Some(&header("bearer abc"))),
            Err(SessionError::BadFormat)
        );
        assert_eq!(
            bearer_token(Some(&header("Bearer a b"))),
            Err(SessionError::BadFormat)
        );
        assert_eq!(
            bearer_token(Some(&header("Bearer"))),
            Err(SessionError::BadFormat)
        );
        assert_eq!(
            bearer_token(Some(&header("Bearer "))),
            Err(SessionError::MissingToken)
        );
        assert_eq!(bearer_token(Some(&header("Bearer abc"))), Ok("abc"));
    }
}
