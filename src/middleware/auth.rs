use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::user::Principal;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub exp: usize,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Principal {
            user_id: claims.sub,
            email: claims.email,
            phone: claims.phone,
            role: claims.role,
        }
    }
}

pub fn decode_principal(token: &str, secret: &str) -> Result<Principal, AppError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::HS256))
        .map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            AppError::Unauthorized
        })?;
    Ok(token_data.claims.into())
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let principal = decode_principal(token, &state.jwt_secret)?;

    // Insert the principal into request extensions
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}
