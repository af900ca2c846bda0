//! Payment provider configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Payment configuration, one section per provider
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub click: ClickConfig,

    #[serde(default)]
    pub payme: Option<PaymeConfig>,

    #[serde(default)]
    pub google_play: Option<GooglePlayConfig>,
}

impl PaymentConfig {
    /// Validate payment configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        self.click.validate()?;
        if let Some(payme) = &self.payme {
            payme.validate(environment)?;
        }
        if let Some(google) = &self.google_play {
            google.validate()?;
        }
        Ok(())
    }
}

/// Click merchant credentials
#[derive(Debug, Clone, Deserialize)]
pub struct ClickConfig {
    /// Merchant id assigned by Click
    pub merchant_id: String,

    /// Merchant user id for the merchant API
    pub merchant_user_id: String,

    /// Webhook signing secret
    pub secret_key: SecretString,
}

impl ClickConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.merchant_id.is_empty() {
            return Err(ValidationError::MissingRequired(
                "PAYMENT__CLICK__MERCHANT_ID",
            ));
        }
        if !self.merchant_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidClickMerchantId);
        }
        if self.secret_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired(
                "PAYMENT__CLICK__SECRET_KEY",
            ));
        }
        Ok(())
    }
}

/// Payme merchant credentials
#[derive(Debug, Clone, Deserialize)]
pub struct PaymeConfig {
    /// Merchant id assigned by Payme
    pub merchant_id: String,

    /// API password used in the X-Auth header
    pub api_key: SecretString,

    /// JSON-RPC endpoint
    #[serde(default = "default_payme_endpoint")]
    pub endpoint: String,
}

impl PaymeConfig {
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.merchant_id.is_empty() {
            return Err(ValidationError::MissingRequired(
                "PAYMENT__PAYME__MERCHANT_ID",
            ));
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__PAYME__API_KEY"));
        }
        if *environment == Environment::Production && !self.endpoint.starts_with("https://") {
            return Err(ValidationError::PaymeEndpointMustBeHttps);
        }
        Ok(())
    }
}

fn default_payme_endpoint() -> String {
    "https://checkout.paycom.uz/api".to_string()
}

/// Google Play service account credentials
#[derive(Debug, Clone, Deserialize)]
pub struct GooglePlayConfig {
    /// Android application package name
    pub package_name: String,

    /// Service account email (JWT issuer)
    pub service_account_email: String,

    /// Service account RSA private key, PEM encoded
    pub service_account_key: SecretString,
}

impl GooglePlayConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.package_name.is_empty() {
            return Err(ValidationError::MissingRequired(
                "PAYMENT__GOOGLE_PLAY__PACKAGE_NAME",
            ));
        }
        if self.service_account_email.is_empty() {
            return Err(ValidationError::MissingRequired(
                "PAYMENT__GOOGLE_PLAY__SERVICE_ACCOUNT_EMAIL",
            ));
        }
        if !self
            .service_account_key
            .expose_secret()
            .contains("-----BEGIN")
        {
            return Err(ValidationError::InvalidGoogleServiceAccountKey);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click() -> ClickConfig {
        ClickConfig {
            merchant_id: "12345".to_string(),
            merchant_user_id: "67890".to_string(),
            secret_key: SecretString::new("secret".to_string()),
        }
    }

    #[test]
    fn click_requires_secret() {
        let config = ClickConfig {
            secret_key: SecretString::new(String::new()),
            ..click()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn click_merchant_id_must_be_numeric() {
        let config = ClickConfig {
            merchant_id: "merchant-12".to_string(),
            ..click()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidClickMerchantId)
        ));
        assert!(click().validate().is_ok());
    }

    #[test]
    fn payme_requires_https_in_production() {
        let config = PaymeConfig {
            merchant_id: "m".to_string(),
            api_key: SecretString::new("k".to_string()),
            endpoint: "http://checkout.test/api".to_string(),
        };
        assert!(config.validate(&Environment::Development).is_ok());
        assert!(matches!(
            config.validate(&Environment::Production),
            Err(ValidationError::PaymeEndpointMustBeHttps)
        ));
    }

    #[test]
    fn google_key_must_be_pem() {
        let config = GooglePlayConfig {
            package_name: "uz.example.app".to_string(),
            service_account_email: "svc@project.iam.gserviceaccount.com".to_string(),
            service_account_key: SecretString::new("not-a-pem".to_string()),
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidGoogleServiceAccountKey)
        ));
    }
}
