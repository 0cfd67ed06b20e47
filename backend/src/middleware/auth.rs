//! Authentication middleware
//!
//! Callers arrive with a JWT issued by the platform's identity service. The
//! middleware verifies it and exposes the caller as [`AuthUser`]; handlers
//! turn that into the [`Actor`] recorded on status history and certificates.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use shared::Actor;

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: String,
    pub name: Option<String>,
    pub permissions: Vec<String>,
}

impl AuthUser {
    /// Check if user has a specific permission
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        let permission = format!("{}:{}", resource, action);
        self.permissions.contains(&permission)
    }

    /// Identity recorded as `changed_by` / `issued_by`
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id.clone(),
            display_name: self.name.clone(),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Validate the bearer token and attach the caller to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            return AppError::Unauthorized("Missing or invalid Authorization header".to_string())
                .into_response();
        }
    };

    let claims = match decode_jwt(token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    if claims.sub.trim().is_empty() {
        return AppError::Unauthorized("Token has no subject".to_string()).into_response();
    }

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        name: claims.name,
        permissions: claims.permissions,
    });

    next.run(request).await
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> AppResult<Claims> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::InvalidToken
    })
}

/// Issue a token; used by tests and local tooling
pub fn encode_jwt(claims: &Claims, secret: &str) -> AppResult<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// Permission guard for use in handlers
pub fn check_permission(user: &AuthUser, resource: &str, action: &str) -> AppResult<()> {
    if user.has_permission(resource, action) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %user.user_id,
            "Permission denied: requires {}:{}",
            resource,
            action
        );
        Err(AppError::InsufficientPermissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp_offset: i64) -> Claims {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub: "inspector-7".to_string(),
            name: Some("Inspector Lee".to_string()),
            permissions: vec!["inspections:write".to_string()],
            exp: now + exp_offset,
            iat: now,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let token = encode_jwt(&claims(3600), "secret").unwrap();
        let decoded = decode_jwt(&token, "secret").unwrap();
        assert_eq!(decoded.sub, "inspector-7");
        assert_eq!(decoded.permissions, vec!["inspections:write"]);
    }

    #[test]
    fn test_wrong_secret_and_expiry_are_rejected() {
        let token = encode_jwt(&claims(3600), "secret").unwrap();
        assert!(matches!(decode_jwt(&token, "other"), Err(AppError::InvalidToken)));

        let expired = encode_jwt(&claims(-3600), "secret").unwrap();
        assert!(matches!(decode_jwt(&expired, "secret"), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_permission_check() {
        let user = AuthUser {
            user_id: "u1".to_string(),
            name: None,
            permissions: vec!["certificates:read".to_string()],
        };
        assert!(check_permission(&user, "certificates", "read").is_ok());
        assert!(matches!(
            check_permission(&user, "certificates", "manage"),
            Err(AppError::InsufficientPermissions)
        ));
        assert_eq!(user.actor().user_id, "u1");
    }
}
