//! Authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Authentication configuration (HS256 bearer tokens)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Symmetric signing secret for client JWTs
    pub jwt_secret: SecretString,

    /// Expected token issuer
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

impl AuthConfig {
    /// Validate authentication configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let secret = self.jwt_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"));
        }
        if secret.len() < 32 {
            return Err(ValidationError::JwtSecretTooShort);
        }
        Ok(())
    }
}

fn default_issuer() -> String {
    "linguapay".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secret_is_rejected() {
        let config = AuthConfig {
            jwt_secret: SecretString::new("short".to_string()),
            issuer: default_issuer(),
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::JwtSecretTooShort)
        ));
    }

    #[test]
    fn long_secret_is_accepted() {
        let config = AuthConfig {
            jwt_secret: SecretString::new("0123456789abcdef0123456789abcdef".to_string()),
            issuer: default_issuer(),
        };
        assert!(config.validate().is_ok());
    }
}
