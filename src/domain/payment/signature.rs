//! Click webhook signature verification.
//!
//! Click signs each webhook with the MD5 digest of a fixed field
//! concatenation that embeds the merchant's secret key. The order is set
//! by Click's contract and must be reproduced exactly, including the
//! two-decimal amount formatting and the prepare-id field that only
//! participates for the complete action.
//!
//! Any mismatch is a hard, non-retryable rejection; no state is touched.

use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use super::amount::MinorUnits;
use super::errors::PaymentError;

/// Webhook action, as carried in the `action` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAction {
    /// `action = 0` - validate, no state mutation.
    Prepare,
    /// `action = 1` - settle and apply side effects.
    Complete,
}

impl WebhookAction {
    /// Parses Click's numeric action code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(WebhookAction::Prepare),
            1 => Some(WebhookAction::Complete),
            _ => None,
        }
    }

    /// Numeric code as it appears in the signing string.
    pub fn code(&self) -> i64 {
        match self {
            WebhookAction::Prepare => 0,
            WebhookAction::Complete => 1,
        }
    }
}

/// The signed fields of an inbound Click webhook.
#[derive(Debug, Clone)]
pub struct SignedFields<'a> {
    pub click_trans_id: i64,
    pub service_id: i64,
    pub merchant_trans_id: &'a str,
    /// Only part of the signing string for the complete action.
    pub merchant_prepare_id: Option<&'a str>,
    /// Claimed amount in minor units; formatted back to the provider's
    /// two-decimal major-unit representation for the digest.
    pub amount: MinorUnits,
    pub action: WebhookAction,
    pub sign_time: &'a str,
}

/// Verifier for Click webhook signatures.
pub struct ClickSignatureVerifier {
    secret: SecretString,
}

impl ClickSignatureVerifier {
    /// Creates a verifier holding the merchant secret key.
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies the supplied hex signature against the signed fields.
    ///
    /// # Errors
    ///
    /// - `SignatureInvalid` - digest mismatch or undecodable signature
    pub fn verify(&self, fields: &SignedFields<'_>, sign_string: &str) -> Result<(), PaymentError> {
        let expected = self.compute_digest(fields);

        let provided = hex::decode(sign_string).map_err(|_| {
            tracing::warn!(
                merchant_trans_id = fields.merchant_trans_id,
                "webhook signature is not valid hex"
            );
            PaymentError::SignatureInvalid
        })?;

        if !constant_time_compare(&expected, &provided) {
            tracing::warn!(
                merchant_trans_id = fields.merchant_trans_id,
                click_trans_id = fields.click_trans_id,
                action = fields.action.code(),
                "webhook signature mismatch"
            );
            return Err(PaymentError::SignatureInvalid);
        }

        Ok(())
    }

    /// Computes the hex signature for the given fields.
    ///
    /// Used by test fixtures and by outbound requests that Click expects
    /// the merchant to sign with the same scheme.
    pub fn sign_hex(&self, fields: &SignedFields<'_>) -> String {
        hex::encode(self.compute_digest(fields))
    }

    /// Computes the MD5 digest of the canonical signing string.
    fn compute_digest(&self, fields: &SignedFields<'_>) -> [u8; 16] {
        // Prepare id participates only for the complete action.
        let prepare_id_part = match fields.action {
            WebhookAction::Complete => fields.merchant_prepare_id.unwrap_or(""),
            WebhookAction::Prepare => "",
        };

        let source = format!(
            "{}{}{}{}{}{}{}{}",
            fields.click_trans_id,
            fields.service_id,
            self.secret.expose_secret(),
            fields.merchant_trans_id,
            prepare_id_part,
            fields.amount.to_major_string(),
            fields.action.code(),
            fields.sign_time,
        );

        let mut hasher = Md5::new();
        hasher.update(source.as_bytes());
        hasher.finalize().into()
    }
}

/// Constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
