//! Checkout orchestrator.
//!
//! Each order attempt moves through Building → PriceLocked →
//! AwaitingPaymentConfirmation → Fulfilled, or ends Rejected; an attempt the
//! caller abandons simply never comes back. No attempt record is persisted:
//! the card rail carries its state in provider session metadata, the wallet
//! rail in the client-held form payload, and cash on delivery completes
//! within a single call.
//!
//! All three rails converge on the same price-lock math and the same
//! fulfillment path: the order is persisted first, then coupon redemption
//! and reward issuance run best-effort — their failure is logged, never
//! unwound into the order.

use crate::{
    config::AppConfig,
    entities::{OrderModel, PaymentMethod, Product, ProductVariant},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{
        CardGateway, CreateSessionRequest, PaymentStatus, SessionLineItem, SessionMetadata,
        WalletGateway,
    },
    services::{
        coupons::{CouponService, CouponValidation},
        orders::{NewOrder, NewOrderLine, OrderService, ShippingInfo},
        stock,
    },
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const TOKEN_SUFFIX_LEN: usize = 6;
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const COD_TOKEN_PREFIX: &str = "COD";

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    coupons: CouponService,
    orders: OrderService,
    card: Arc<dyn CardGateway>,
    wallet: Arc<dyn WalletGateway>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        coupons: CouponService,
        orders: OrderService,
        card: Arc<dyn CardGateway>,
        wallet: Arc<dyn WalletGateway>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            coupons,
            orders,
            card,
            wallet,
        }
    }

    /// Locks the authoritative total for a cart snapshot: recomputes the
    /// subtotal from the client-echoed line prices, re-validates each line
    /// against live stock, and applies the coupon when the code resolves for
    /// this user. A code that does not resolve (unknown or expired) locks
    /// without a discount rather than failing the attempt.
    #[instrument(skip(self, lines))]
    pub async fn price_lock(
        &self,
        user_id: Option<Uuid>,
        lines: &[CheckoutLine],
        coupon_code: Option<&str>,
    ) -> Result<PriceLock, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        for line in lines {
            if line.quantity < 1 {
                return Err(ServiceError::InvalidInput(format!(
                    "quantity for product {} must be at least 1",
                    line.product_id
                )));
            }
            if line.unit_price < Decimal::ZERO {
                return Err(ServiceError::InvalidInput(format!(
                    "unit price for product {} must not be negative",
                    line.product_id
                )));
            }
        }

        // Second line of defense against time-of-check/time-of-use drift:
        // stock was validated on every cart mutation, but is re-checked here
        // against a fresh read before the total becomes authoritative.
        self.revalidate_stock(lines).await?;

        let coupon = match (coupon_code, user_id) {
            (Some(code), Some(user_id)) => match self.coupons.validate(code, user_id).await {
                Ok(validation) => Some(validation),
                Err(ServiceError::NotFound(_)) | Err(ServiceError::CouponExpired(_)) => None,
                Err(err) => return Err(err),
            },
            _ => None,
        };

        let (subtotal_minor, discount_minor, total_minor) =
            lock_totals(lines, coupon.as_ref().map(|c| c.discount_percentage))?;

        Ok(PriceLock {
            lines: lines.to_vec(),
            subtotal_minor,
            discount_minor,
            total_minor,
            coupon,
        })
    }

    /// Card rail, phase one: creates the provider checkout session carrying
    /// the locked total and self-contained metadata. Provider or network
    /// failure here is retryable — nothing has been persisted.
    #[instrument(skip(self, input))]
    pub async fn create_card_session(
        &self,
        user_id: Uuid,
        input: CardCheckoutInput,
    ) -> Result<CardSessionInit, ServiceError> {
        let lock = self
            .price_lock(Some(user_id), &input.lines, input.coupon_code.as_deref())
            .await?;

        let discount_id = match &lock.coupon {
            Some(coupon) => Some(
                self.card
                    .create_percent_discount(coupon.discount_percentage)
                    .await?,
            ),
            None => None,
        };

        let session = self
            .card
            .create_session(CreateSessionRequest {
                currency: self.config.currency.clone(),
                line_items: lock
                    .lines
                    .iter()
                    .map(|line| SessionLineItem {
                        name: line.name.clone(),
                        image: line.image.clone(),
                        unit_amount_minor: to_minor_units(line.unit_price).unwrap_or(0),
                        quantity: line.quantity,
                    })
                    .collect(),
                success_url: format!(
                    "{}/purchase-success?session_id={{CHECKOUT_SESSION_ID}}",
                    self.config.client_url
                ),
                cancel_url: format!("{}/purchase-cancel", self.config.client_url),
                discount_id,
                metadata: SessionMetadata {
                    user_id: Some(user_id),
                    coupon_code: lock.coupon.as_ref().map(|c| c.code.clone()),
                    products_json: serde_json::to_string(&snapshot_lines(&lock.lines))?,
                },
            })
            .await?;

        self.event_sender
            .send_or_log(Event::CardSessionCreated {
                session_id: session.id.clone(),
            })
            .await;

        info!(
            "Created card session {} for user {} ({} minor units)",
            session.id, user_id, lock.total_minor
        );
        Ok(CardSessionInit {
            session_id: session.id,
            total_amount: minor_to_amount(lock.total_minor),
        })
    }

    /// Card rail, phase two: the asynchronous confirmation callback. The
    /// session is re-fetched from the provider and only a `paid` status
    /// fulfills; the order is rebuilt entirely from session metadata.
    #[instrument(skip(self))]
    pub async fn confirm_card_payment(
        &self,
        session_id: &str,
    ) -> Result<OrderModel, ServiceError> {
        let session = self.card.retrieve_session(session_id).await?;

        if session.payment_status != PaymentStatus::Paid {
            return Err(ServiceError::PaymentFailed(format!(
                "session {} is not paid",
                session_id
            )));
        }

        let snapshots: Vec<LineSnapshot> = serde_json::from_str(&session.metadata.products_json)?;
        if snapshots.is_empty() {
            return Err(ServiceError::InvalidInput(
                "session metadata carries no products".to_string(),
            ));
        }

        self.fulfill(
            session.metadata.user_id,
            snapshots.into_iter().map(LineSnapshot::into_order_line).collect(),
            session.amount_total_minor,
            PaymentMethod::Card,
            session.id,
            None,
            session.metadata.coupon_code,
        )
        .await
    }

    /// Wallet rail, phase one: price-locks and hands back the redirect
    /// target plus the opaque form payload the frontend submits to the
    /// wallet. The generated payment id is the attempt's identity.
    #[instrument(skip(self, input))]
    pub async fn create_wallet_request(
        &self,
        user_id: Option<Uuid>,
        input: WalletCheckoutInput,
    ) -> Result<WalletRequest, ServiceError> {
        let lock = self
            .price_lock(user_id, &input.lines, input.coupon_code.as_deref())
            .await?;

        let pid = payment_token(&self.config.wallet.payment_id_prefix);
        let amount = minor_to_amount(lock.total_minor);

        let success_url = format!(
            "{}/purchase-success?pid={}&amt={}",
            self.config.client_url,
            pid,
            amount.normalize()
        );
        let fail_url = format!("{}/purchase-cancel", self.config.client_url);

        self.event_sender
            .send_or_log(Event::WalletRequestCreated {
                payment_id: pid.clone(),
            })
            .await;

        Ok(WalletRequest {
            payment_url: self.config.wallet.payment_url.clone(),
            form: WalletForm {
                amount,
                service_charge: Decimal::ZERO,
                delivery_charge: Decimal::ZERO,
                total_amount: amount,
                payment_id: pid,
                success_url,
                fail_url,
            },
        })
    }

    /// Wallet rail, phase two: verifies the transaction out-of-band with the
    /// wallet provider. A confirming body fulfills with the caller-asserted
    /// amount and payment id; an explicit denial is `VerificationFailed` and
    /// is not retried automatically.
    #[instrument(skip(self, input))]
    pub async fn verify_wallet_payment(
        &self,
        user_id: Option<Uuid>,
        input: VerifyWalletInput,
    ) -> Result<OrderModel, ServiceError> {
        if input.payment_id.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "payment id is required".to_string(),
            ));
        }
        if input.lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        if input.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "amount must be positive".to_string(),
            ));
        }

        let verification = self
            .wallet
            .verify(&input.payment_id, input.amount)
            .await?;

        if !verification.success {
            return Err(ServiceError::VerificationFailed(format!(
                "wallet denied payment {}",
                input.payment_id
            )));
        }

        let total_minor = to_minor_units(input.amount)
            .ok_or_else(|| ServiceError::InvalidInput("amount out of range".to_string()))?;

        self.fulfill(
            user_id,
            input
                .lines
                .iter()
                .map(|line| NewOrderLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            total_minor,
            PaymentMethod::WalletRedirect,
            input.payment_id,
            None,
            input.coupon_code,
        )
        .await
    }

    /// Cash-on-delivery rail: no external confirmation step exists, so the
    /// order is created synchronously. Shipping name, address and phone are
    /// all mandatory.
    #[instrument(skip(self, input))]
    pub async fn create_cod_order(
        &self,
        user_id: Option<Uuid>,
        input: CodCheckoutInput,
    ) -> Result<OrderModel, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        let shipping = validate_shipping(input.shipping)?;

        let lock = self
            .price_lock(user_id, &input.lines, input.coupon_code.as_deref())
            .await?;

        self.fulfill(
            user_id,
            lock.lines
                .iter()
                .map(|line| NewOrderLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            lock.total_minor,
            PaymentMethod::CashOnDelivery,
            payment_token(COD_TOKEN_PREFIX),
            Some(shipping),
            lock.coupon.as_ref().map(|c| c.code.clone()),
        )
        .await
    }

    /// Shared fulfillment: exactly one order is persisted with the locked
    /// total, then the coupon is redeemed and the reward coupon issued when
    /// the total crosses the threshold. Order creation failure propagates;
    /// the side effects after it are best-effort and merely logged, to be
    /// reconciled out-of-band.
    async fn fulfill(
        &self,
        user_id: Option<Uuid>,
        lines: Vec<NewOrderLine>,
        total_minor: i64,
        payment_method: PaymentMethod,
        payment_reference: String,
        shipping: Option<ShippingInfo>,
        coupon_code: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let order = self
            .orders
            .create_order(NewOrder {
                user_id,
                lines,
                total_amount: minor_to_amount(total_minor),
                payment_method,
                payment_reference,
                shipping,
            })
            .await?;

        if let Some(code) = &coupon_code {
            if let Err(err) = self.coupons.redeem(code, user_id).await {
                warn!(
                    "Coupon {} redemption failed after order {}: {}",
                    code, order.id, err
                );
            }
        }

        if total_minor >= self.config.checkout.reward_threshold_minor {
            if let Some(user_id) = user_id {
                if let Err(err) = self.coupons.issue_reward_coupon(user_id).await {
                    warn!(
                        "Reward coupon issuance failed after order {}: {}",
                        order.id, err
                    );
                }
            }
        }

        Ok(order)
    }

    async fn revalidate_stock(&self, lines: &[CheckoutLine]) -> Result<(), ServiceError> {
        use crate::entities::product_variant;

        for line in lines {
            let product = Product::find_by_id(line.product_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;

            let variants = ProductVariant::find()
                .filter(product_variant::Column::ProductId.eq(line.product_id))
                .all(&*self.db)
                .await?;

            let available =
                stock::availability(&product, &variants, line.variant_key.as_deref())?;
            stock::validate_request(available, line.quantity, &product.name)?;
        }
        Ok(())
    }
}

/// Cart line as echoed by the client at checkout time. The unit price is
/// recomputed into the locked total server-side, but its source remains the
/// client (documented trust limitation of the reference behavior).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub variant_key: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub name: String,
    pub image: Option<String>,
}

/// The PriceLocked artifact: totals in minor units, authoritative for the
/// remainder of the attempt.
#[derive(Debug, Clone)]
pub struct PriceLock {
    pub lines: Vec<CheckoutLine>,
    pub subtotal_minor: i64,
    pub discount_minor: i64,
    pub total_minor: i64,
    pub coupon: Option<CouponValidation>,
}

/// Input for the card rail
#[derive(Debug, Deserialize)]
pub struct CardCheckoutInput {
    pub lines: Vec<CheckoutLine>,
    pub coupon_code: Option<String>,
}

/// Card session handed back to the frontend for redirect
#[derive(Debug, Serialize)]
pub struct CardSessionInit {
    pub session_id: String,
    pub total_amount: Decimal,
}

/// Input for the wallet rail
#[derive(Debug, Deserialize)]
pub struct WalletCheckoutInput {
    pub lines: Vec<CheckoutLine>,
    pub coupon_code: Option<String>,
}

/// Redirect target plus the opaque form payload the frontend submits to the
/// wallet provider.
#[derive(Debug, Serialize)]
pub struct WalletRequest {
    pub payment_url: String,
    pub form: WalletForm,
}

#[derive(Debug, Serialize)]
pub struct WalletForm {
    #[serde(rename = "amt")]
    pub amount: Decimal,
    #[serde(rename = "psc")]
    pub service_charge: Decimal,
    #[serde(rename = "pdc")]
    pub delivery_charge: Decimal,
    #[serde(rename = "tAmt")]
    pub total_amount: Decimal,
    #[serde(rename = "pid")]
    pub payment_id: String,
    #[serde(rename = "su")]
    pub success_url: String,
    #[serde(rename = "fu")]
    pub fail_url: String,
}

/// Caller-supplied wallet verification request
#[derive(Debug, Deserialize)]
pub struct VerifyWalletInput {
    pub payment_id: String,
    pub amount: Decimal,
    pub lines: Vec<CheckoutLine>,
    pub coupon_code: Option<String>,
}

/// Input for the cash-on-delivery rail
#[derive(Debug, Deserialize)]
pub struct CodCheckoutInput {
    pub lines: Vec<CheckoutLine>,
    pub coupon_code: Option<String>,
    pub shipping: Option<ShippingInput>,
}

/// Shipping fields as received from the client; all three are required.
#[derive(Debug, Default, Deserialize)]
pub struct ShippingInput {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Compact line snapshot embedded in card session metadata.
#[derive(Debug, Serialize, Deserialize)]
struct LineSnapshot {
    id: Uuid,
    quantity: i32,
    price: Decimal,
}

impl LineSnapshot {
    fn into_order_line(self) -> NewOrderLine {
        NewOrderLine {
            product_id: self.id,
            quantity: self.quantity,
            unit_price: self.price,
        }
    }
}

fn snapshot_lines(lines: &[CheckoutLine]) -> Vec<LineSnapshot> {
    lines
        .iter()
        .map(|line| LineSnapshot {
            id: line.product_id,
            quantity: line.quantity,
            price: line.unit_price,
        })
        .collect()
}

fn validate_shipping(input: Option<ShippingInput>) -> Result<ShippingInfo, ServiceError> {
    let input =
        input.ok_or_else(|| ServiceError::MissingShippingInfo("shipping info".to_string()))?;

    let field = |value: Option<String>, name: &str| -> Result<String, ServiceError> {
        match value {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ServiceError::MissingShippingInfo(name.to_string())),
        }
    };

    Ok(ShippingInfo {
        name: field(input.name, "name")?,
        address: field(input.address, "address")?,
        phone: field(input.phone, "phone")?,
    })
}

/// Converts a major-unit price to minor units, rounding half-up to whole
/// cents per the payment providers' rounding rule.
fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

fn minor_to_amount(minor: i64) -> Decimal {
    Decimal::from(minor) / Decimal::ONE_HUNDRED
}

/// Computes (subtotal, discount, total) in minor units for a set of lines
/// and an optional percentage discount. Shared by all three rails so the
/// coupon math is rail-independent.
fn lock_totals(
    lines: &[CheckoutLine],
    discount_percent: Option<i32>,
) -> Result<(i64, i64, i64), ServiceError> {
    let mut subtotal_minor: i64 = 0;
    for line in lines {
        let unit_minor = to_minor_units(line.unit_price)
            .ok_or_else(|| ServiceError::InvalidInput("unit price out of range".to_string()))?;
        subtotal_minor += unit_minor * i64::from(line.quantity);
    }

    let discount_minor = match discount_percent {
        Some(percent) => (Decimal::from(subtotal_minor) * Decimal::from(percent)
            / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(0),
        None => 0,
    };

    Ok((
        subtotal_minor,
        discount_minor,
        subtotal_minor - discount_minor,
    ))
}

fn payment_token(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TOKEN_SUFFIX_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), suffix)
}
