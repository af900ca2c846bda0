//! Bearer token authentication for client endpoints.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::str::FromStr;

use crate::config::AuthConfig;
use crate::domain::foundation::UserId;

/// Claims carried in client access tokens.
#[derive(Debug, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    #[allow(dead_code)]
    pub exp: i64,
}

/// Validates HS256 bearer tokens issued to the mobile and web clients.
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Verifies a token and returns the authenticated user id.
    pub fn authenticate(&self, token: &str) -> Option<UserId> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "bearer token rejected");
                e
            })
            .ok()?;
        UserId::from_str(&data.claims.sub).ok()
    }
}
