use crate::{
    config::AppConfig,
    entities::{coupon, Coupon, CouponModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const REWARD_CODE_PREFIX: &str = "GIFT";
const REWARD_CODE_SUFFIX_LEN: usize = 6;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Coupon ledger: issuance, validation, redemption (deactivation) and
/// expiry of discount coupons.
///
/// A coupon is usable by user U when it is active and either owned by U or
/// ownerless (global). Redemption deactivates rather than deletes, and is
/// idempotent so concurrent checkout attempts racing on the same coupon
/// never fail the order.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CouponService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    fn usable_by(user_id: Uuid) -> Condition {
        Condition::any()
            .add(coupon::Column::OwnerId.eq(user_id))
            .add(coupon::Column::OwnerId.is_null())
    }

    /// Returns the coupon currently usable by the user, preferring the most
    /// recently created match so the ordering is deterministic.
    #[instrument(skip(self))]
    pub async fn lookup_applicable(
        &self,
        user_id: Uuid,
    ) -> Result<Option<CouponModel>, ServiceError> {
        let coupon = Coupon::find()
            .filter(coupon::Column::IsActive.eq(true))
            .filter(Self::usable_by(user_id))
            .order_by_desc(coupon::Column::CreatedAt)
            .one(&*self.db)
            .await?;
        Ok(coupon)
    }

    /// Validates a code for a user. Detecting expiry deactivates the coupon
    /// as a side effect of the read before the expiry is reported.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        user_id: Uuid,
    ) -> Result<CouponValidation, ServiceError> {
        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(Self::usable_by(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", code)))?;

        if coupon.is_expired_at(Utc::now()) {
            let code = coupon.code.clone();
            let mut active: coupon::ActiveModel = coupon.into();
            active.is_active = Set(false);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;

            self.event_sender
                .send_or_log(Event::CouponDeactivated { code: code.clone() })
                .await;
            return Err(ServiceError::CouponExpired(code));
        }

        Ok(CouponValidation {
            code: coupon.code,
            discount_percentage: coupon.discount_percentage,
        })
    }

    /// Deactivates a redeemed coupon. Calling this for an already-inactive
    /// or missing coupon is a no-op: checkout paths invoke it
    /// opportunistically and a race must not fail the order. Anonymous
    /// redemption (no user) only reaches global coupons.
    #[instrument(skip(self))]
    pub async fn redeem(&self, code: &str, user_id: Option<Uuid>) -> Result<(), ServiceError> {
        let scope = match user_id {
            Some(user_id) => Self::usable_by(user_id),
            None => Condition::all().add(coupon::Column::OwnerId.is_null()),
        };

        let result = Coupon::update_many()
            .col_expr(coupon::Column::IsActive, Expr::value(false))
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Code.eq(code))
            .filter(scope)
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            self.event_sender
                .send_or_log(Event::CouponRedeemed {
                    code: code.to_string(),
                })
                .await;
            info!("Redeemed coupon {}", code);
        }
        Ok(())
    }

    /// Issues the post-purchase reward coupon: any prior coupon owned by the
    /// user is replaced so at most one live reward coupon exists per user.
    #[instrument(skip(self))]
    pub async fn issue_reward_coupon(&self, user_id: Uuid) -> Result<CouponModel, ServiceError> {
        Coupon::delete_many()
            .filter(coupon::Column::OwnerId.eq(user_id))
            .exec(&*self.db)
            .await?;

        let now = Utc::now();
        let coupon = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(generate_reward_code()),
            discount_percentage: Set(self.config.checkout.reward_discount_percent),
            expiration_date: Set(now + Duration::days(self.config.checkout.reward_validity_days)),
            is_active: Set(true),
            owner_id: Set(Some(user_id)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let coupon = coupon.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::RewardCouponIssued {
                user_id,
                code: coupon.code.clone(),
            })
            .await;

        info!("Issued reward coupon {} for user {}", coupon.code, user_id);
        Ok(coupon)
    }

    /// Creates a coupon from admin input. A duplicate code is a `Conflict`,
    /// distinct from a generic database fault.
    #[instrument(skip(self))]
    pub async fn create_coupon(
        &self,
        input: CreateCouponInput,
    ) -> Result<CouponModel, ServiceError> {
        if input.code.trim().is_empty() {
            return Err(ServiceError::InvalidInput("code is required".to_string()));
        }
        if !(0..=100).contains(&input.discount_percentage) {
            return Err(ServiceError::InvalidInput(
                "discount_percentage must be between 0 and 100".to_string(),
            ));
        }

        let now = Utc::now();
        let coupon = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(input.code.clone()),
            discount_percentage: Set(input.discount_percentage),
            expiration_date: Set(input.expiration_date),
            is_active: Set(true),
            owner_id: Set(input.assign_to_user_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let coupon = match coupon.insert(&*self.db).await {
            Ok(coupon) => coupon,
            Err(err) => {
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    return Err(ServiceError::Conflict(format!(
                        "Coupon code {} already exists",
                        input.code
                    )));
                }
                return Err(err.into());
            }
        };

        self.event_sender
            .send_or_log(Event::CouponCreated(coupon.id))
            .await;

        info!("Created coupon {}", coupon.code);
        Ok(coupon)
    }

    /// Lists coupons, newest first.
    pub async fn list_coupons(&self) -> Result<Vec<CouponModel>, ServiceError> {
        let coupons = Coupon::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(coupons)
    }

    /// Deletes a coupon outright (admin operation; redemption only
    /// deactivates).
    #[instrument(skip(self))]
    pub async fn delete_coupon(&self, coupon_id: Uuid) -> Result<(), ServiceError> {
        let result = Coupon::delete_by_id(coupon_id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Coupon {} not found",
                coupon_id
            )));
        }

        self.event_sender
            .send_or_log(Event::CouponDeleted(coupon_id))
            .await;
        Ok(())
    }

    /// Time-based sweep removing coupons past their expiration date,
    /// independent of validate-time lazy deactivation. Returns the number of
    /// rows removed.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64, ServiceError> {
        let result = Coupon::delete_many()
            .filter(coupon::Column::ExpirationDate.lt(Utc::now()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            warn!("Purged {} expired coupons", result.rows_affected);
        }
        Ok(result.rows_affected)
    }
}

/// Validation result handed to checkout: just what the discount math needs.
#[derive(Debug, Clone, Serialize)]
pub struct CouponValidation {
    pub code: String,
    pub discount_percentage: i32,
}

/// Input for admin coupon creation
#[derive(Debug, Deserialize)]
pub struct CreateCouponInput {
    pub code: String,
    pub discount_percentage: i32,
    pub expiration_date: DateTime<Utc>,
    pub assign_to_user_id: Option<Uuid>,
}

fn generate_reward_code() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..REWARD_CODE_SUFFIX_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", REWARD_CODE_PREFIX, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_codes_have_prefix_and_length() {
        for _ in 0..32 {
            let code = generate_reward_code();
            assert!(code.starts_with(REWARD_CODE_PREFIX));
            assert_eq!(code.len(), REWARD_CODE_PREFIX.len() + REWARD_CODE_SUFFIX_LEN);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn expiry_check_uses_supplied_clock() {
        let now = Utc::now();
        let coupon = coupon::Model {
            id: Uuid::new_v4(),
            code: "SAVE10".to_string(),
            discount_percentage: 10,
            expiration_date: now - Duration::hours(1),
            is_active: true,
            owner_id: None,
            created_at: now - Duration::days(31),
            updated_at: now - Duration::days(31),
        };
        assert!(coupon.is_expired_at(now));
        assert!(!coupon.is_expired_at(now - Duration::hours(2)));
    }
}
