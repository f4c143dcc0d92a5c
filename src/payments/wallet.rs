use crate::{config::WalletConfig, errors::ServiceError};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::instrument;

/// Outcome of a wallet verification call. `success` reflects the provider's
/// response body; the raw body is kept for diagnostics.
#[derive(Debug, Clone)]
pub struct WalletVerification {
    pub success: bool,
    pub raw_body: String,
}

/// Wallet-rail provider port: out-of-band transaction verification.
#[async_trait::async_trait]
pub trait WalletGateway: Send + Sync {
    async fn verify(&self, pid: &str, amount: Decimal) -> Result<WalletVerification, ServiceError>;
}

/// Form-POST implementation of [`WalletGateway`] against the provider's
/// verification endpoint.
///
/// The provider returns a plain-text or XML body; a body carrying a success
/// marker confirms the transaction. There is no signature to check — the
/// response is classified by content alone, which is a documented trust gap
/// of this rail.
#[derive(Debug, Clone)]
pub struct HttpWalletGateway {
    client: reqwest::Client,
    verify_url: String,
    merchant_code: String,
}

impl HttpWalletGateway {
    pub fn new(config: &WalletConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            verify_url: config.verify_url.clone(),
            merchant_code: config.merchant_code.clone(),
        })
    }
}

#[async_trait::async_trait]
impl WalletGateway for HttpWalletGateway {
    #[instrument(skip(self))]
    async fn verify(&self, pid: &str, amount: Decimal) -> Result<WalletVerification, ServiceError> {
        let form = [
            ("amt", amount.normalize().to_string()),
            ("pid", pid.to_string()),
            ("scd", self.merchant_code.clone()),
        ];

        let response = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentFailed(format!("wallet verify: {}", e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::PaymentFailed(format!("wallet verify body: {}", e)))?;

        Ok(WalletVerification {
            success: is_success_body(&body),
            raw_body: body,
        })
    }
}

/// Classifies a verification response body. Accepts a bare "success" marker
/// in any case, including the `<response>`/`<status>` XML tag forms.
pub fn is_success_body(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("success")
        || body.contains("<response>success")
        || body.contains("<status>success")
}
