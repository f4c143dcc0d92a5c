use crate::{config::CardConfig, errors::ServiceError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Line item forwarded to the provider's hosted checkout page.
#[derive(Debug, Clone, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    pub image: Option<String>,
    /// Unit amount in minor currency units (cents).
    pub unit_amount_minor: i64,
    pub quantity: i32,
}

/// Metadata attached to a session so the confirmation callback is
/// self-contained and never needs to re-read the cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub user_id: Option<Uuid>,
    pub coupon_code: Option<String>,
    /// Serialized `[{id, quantity, price}]` snapshot of the cart lines.
    pub products_json: String,
}

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub currency: String,
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    /// Provider-side discount object id, when a coupon applies.
    pub discount_id: Option<String>,
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

/// Provider checkout session as seen at creation and confirmation time.
#[derive(Debug, Clone)]
pub struct CardSession {
    pub id: String,
    pub payment_status: PaymentStatus,
    /// Total the provider will collect, in minor units.
    pub amount_total_minor: i64,
    pub metadata: SessionMetadata,
}

/// Card-rail provider port: hosted checkout sessions plus percent-off
/// discount objects.
#[async_trait::async_trait]
pub trait CardGateway: Send + Sync {
    async fn create_session(&self, req: CreateSessionRequest)
        -> Result<CardSession, ServiceError>;
    async fn retrieve_session(&self, session_id: &str) -> Result<CardSession, ServiceError>;
    async fn create_percent_discount(&self, percent: i32) -> Result<String, ServiceError>;
}

/// Stripe-compatible HTTP implementation of [`CardGateway`].
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base_url: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(config: &CardConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn session_from_response(payload: SessionResponse) -> CardSession {
        let payment_status = match payload.payment_status.as_deref() {
            Some("paid") => PaymentStatus::Paid,
            Some("no_payment_required") => PaymentStatus::NoPaymentRequired,
            _ => PaymentStatus::Unpaid,
        };

        let metadata = SessionMetadata {
            user_id: payload
                .metadata
                .get("user_id")
                .and_then(|v| Uuid::parse_str(v).ok()),
            coupon_code: payload
                .metadata
                .get("coupon_code")
                .filter(|v| !v.is_empty())
                .cloned(),
            products_json: payload.metadata.get("products").cloned().unwrap_or_default(),
        };

        CardSession {
            id: payload.id,
            payment_status,
            amount_total_minor: payload.amount_total.unwrap_or(0),
            metadata,
        }
    }
}

/// Provider response shape shared by create and retrieve.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    payment_status: Option<String>,
    amount_total: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CouponResponse {
    id: String,
}

#[async_trait::async_trait]
impl CardGateway for StripeGateway {
    async fn create_session(
        &self,
        req: CreateSessionRequest,
    ) -> Result<CardSession, ServiceError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            ("success_url".into(), req.success_url),
            ("cancel_url".into(), req.cancel_url),
        ];

        for (i, item) in req.line_items.iter().enumerate() {
            form.push((
                format!("line_items[{i}][price_data][currency]"),
                req.currency.clone(),
            ));
            form.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                item.name.clone(),
            ));
            if let Some(image) = &item.image {
                form.push((
                    format!("line_items[{i}][price_data][product_data][images][0]"),
                    image.clone(),
                ));
            }
            form.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                item.unit_amount_minor.to_string(),
            ));
            form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }

        if let Some(discount_id) = &req.discount_id {
            form.push(("discounts[0][coupon]".into(), discount_id.clone()));
        }

        if let Some(user_id) = req.metadata.user_id {
            form.push(("metadata[user_id]".into(), user_id.to_string()));
        }
        form.push((
            "metadata[coupon_code]".into(),
            req.metadata.coupon_code.clone().unwrap_or_default(),
        ));
        form.push(("metadata[products]".into(), req.metadata.products_json.clone()));

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentFailed(format!("session create: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::PaymentFailed(format!(
                "session create returned {}",
                response.status()
            )));
        }

        let payload: SessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::PaymentFailed(format!("session decode: {}", e)))?;
        Ok(Self::session_from_response(payload))
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CardSession, ServiceError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.api_base_url, session_id
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentFailed(format!("session retrieve: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::PaymentFailed(format!(
                "session retrieve returned {}",
                response.status()
            )));
        }

        let payload: SessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::PaymentFailed(format!("session decode: {}", e)))?;
        Ok(Self::session_from_response(payload))
    }

    async fn create_percent_discount(&self, percent: i32) -> Result<String, ServiceError> {
        let form = [
            ("percent_off", percent.to_string()),
            ("duration", "once".to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/coupons", self.api_base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentFailed(format!("discount create: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::PaymentFailed(format!(
                "discount create returned {}",
                response.status()
            )));
        }

        let payload: CouponResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::PaymentFailed(format!("discount decode: {}", e)))?;
        Ok(payload.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_mapping() {
        let payload = SessionResponse {
            id: "cs_1".into(),
            payment_status: Some("paid".into()),
            amount_total: Some(9000),
            metadata: HashMap::new(),
        };
        let session = StripeGateway::session_from_response(payload);
        assert_eq!(session.payment_status, PaymentStatus::Paid);
        assert_eq!(session.amount_total_minor, 9000);

        let payload = SessionResponse {
            id: "cs_2".into(),
            payment_status: Some("unpaid".into()),
            amount_total: None,
            metadata: HashMap::new(),
        };
        let session = StripeGateway::session_from_response(payload);
        assert_eq!(session.payment_status, PaymentStatus::Unpaid);
        assert_eq!(session.amount_total_minor, 0);
    }

    #[test]
    fn metadata_round_trips_from_string_map() {
        let user_id = Uuid::new_v4();
        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("coupon_code".to_string(), "SAVE10".to_string());
        metadata.insert("products".to_string(), "[]".to_string());

        let session = StripeGateway::session_from_response(SessionResponse {
            id: "cs_3".into(),
            payment_status: None,
            amount_total: None,
            metadata,
        });

        assert_eq!(session.metadata.user_id, Some(user_id));
        assert_eq!(session.metadata.coupon_code.as_deref(), Some("SAVE10"));
        assert_eq!(session.metadata.products_json, "[]");
    }

    #[test]
    fn empty_coupon_code_reads_as_none() {
        let mut metadata = HashMap::new();
        metadata.insert("coupon_code".to_string(), String::new());

        let session = StripeGateway::session_from_response(SessionResponse {
            id: "cs_4".into(),
            payment_status: None,
            amount_total: None,
            metadata,
        });

        assert_eq!(session.metadata.coupon_code, None);
    }
}
