// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::AppError,
    models::user::{Role, User},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    pub role: Role,
    pub kind: TokenKind,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }

    /// Student-only routes call this in the handler.
    pub fn require_student(&self) -> Result<i64, AppError> {
        if self.role != Role::Student {
            return Err(AppError::Unauthorized("Only students can do this".to_string()));
        }
        self.user_id()
    }
}

/// Signs a token of `kind` for the user.
pub fn sign_jwt(
    id: i64,
    role: Role,
    kind: TokenKind,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    // Calculate expiration: current time + expiration_seconds
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        role,
        kind,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Signs an (access, refresh) pair.
pub fn issue_token_pair(user: &User, config: &Config) -> Result<(String, String), AppError> {
    let access = sign_jwt(
        user.id,
        user.role,
        TokenKind::Access,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;
    let refresh = sign_jwt(
        user.id,
        user.role,
        TokenKind::Refresh,
        &config.jwt_refresh_secret,
        config.jwt_refresh_expiration,
    )?;
    Ok((access, refresh))
}

/// Verifies and decodes a JWT string, rejecting tokens of the wrong kind.
pub fn verify_jwt(token: &str, secret: &str, expected: TokenKind) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    if token_data.claims.kind != expected {
        return Err(AppError::AuthError("Invalid token".to_string()));
    }

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header and injects `Claims`
/// into the request extensions. Missing or invalid access tokens yield 401.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return Err(AppError::AuthError("Not authorized, no token".to_string())),
    };

    let claims = verify_jwt(token, &config.jwt_secret, TokenKind::Access)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn require_role(req: &Request<Body>, allowed: fn(Role) -> bool) -> Result<(), AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(AppError::AuthError("Not authorized".to_string()))?;

    if !allowed(claims.role) {
        return Err(AppError::Unauthorized(format!(
            "Role '{}' is not allowed to access this resource",
            claims.role
        )));
    }
    Ok(())
}

/// Must be used AFTER `auth_middleware`. Teachers and admins pass.
pub async fn teacher_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    require_role(&req, |role| role.can_author())?;
    Ok(next.run(req).await)
}

/// Must be used AFTER `auth_middleware`. Only admins pass.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    require_role(&req, |role| role == Role::Admin)?;
    Ok(next.run(req).await)
}
