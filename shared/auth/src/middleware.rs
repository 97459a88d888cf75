use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use tutorlink_common::{AppError, UserRole};

use crate::jwt::{Claims, JwtService};

/// Identity of the caller as carried by a validated token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub token_role: UserRole,
}

impl TryFrom<&Claims> for AuthenticatedUser {
    type Error = AppError;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: claims.user_id()?,
            username: claims.username.clone(),
            email: claims.email.clone(),
            token_role: claims.role,
        })
    }
}

/// Authentication middleware that validates JWT tokens and stores the claims
/// in the request extensions.
pub async fn auth_middleware(
    State(jwt_service): State<JwtService>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token_from_headers(request.headers()).ok_or_else(|| {
        tracing::debug!(path = %request.uri().path(), "Missing bearer token");
        AppError::Authentication("Missing or invalid authorization header".to_string())
    })?;

    let claims = jwt_service.validate_token(token).map_err(|e| {
        tracing::debug!(path = %request.uri().path(), error = %e, "Rejected bearer token");
        e
    })?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .ok_or_else(|| AppError::Authentication("Authentication required".to_string()))?;

        AuthenticatedUser::try_from(claims)
    }
}

/// Extract JWT token from Authorization header
fn extract_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
