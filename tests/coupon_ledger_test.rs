mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestApp;
use sea_orm::EntityTrait;
use storefront_api::{
    entities::Coupon, errors::ServiceError, services::CreateCouponInput,
};
use uuid::Uuid;

fn coupon_input(code: &str, owner: Option<Uuid>) -> CreateCouponInput {
    CreateCouponInput {
        code: code.to_string(),
        discount_percentage: 10,
        expiration_date: Utc::now() + Duration::days(7),
        assign_to_user_id: owner,
    }
}

#[tokio::test]
async fn duplicate_code_is_a_conflict() {
    let app = TestApp::new().await;

    app.state
        .coupons
        .create_coupon(coupon_input("WELCOME10", None))
        .await
        .unwrap();

    let result = app
        .state
        .coupons
        .create_coupon(coupon_input("WELCOME10", Some(Uuid::new_v4())))
        .await;

    assert_matches!(result, Err(ServiceError::Conflict(_)));
}

#[tokio::test]
async fn lookup_prefers_most_recently_created_applicable_coupon() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    app.state
        .coupons
        .create_coupon(coupon_input("GLOBAL10", None))
        .await
        .unwrap();
    app.state
        .coupons
        .create_coupon(coupon_input("THEIRS10", Some(stranger)))
        .await
        .unwrap();
    app.state
        .coupons
        .create_coupon(coupon_input("MINE10", Some(user_id)))
        .await
        .unwrap();

    let found = app
        .state
        .coupons
        .lookup_applicable(user_id)
        .await
        .unwrap()
        .expect("an applicable coupon exists");

    // Another user's coupon is never returned; the newest applicable row
    // wins the tie deterministically.
    assert_ne!(found.code, "THEIRS10");
    assert_eq!(found.code, "MINE10");
}

#[tokio::test]
async fn validate_returns_code_and_discount() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    app.state
        .coupons
        .create_coupon(coupon_input("GLOBAL10", None))
        .await
        .unwrap();

    let validation = app
        .state
        .coupons
        .validate("GLOBAL10", user_id)
        .await
        .unwrap();

    assert_eq!(validation.code, "GLOBAL10");
    assert_eq!(validation.discount_percentage, 10);
}

#[tokio::test]
async fn validate_unknown_code_is_not_found() {
    let app = TestApp::new().await;

    let result = app.state.coupons.validate("NOPE", Uuid::new_v4()).await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn validating_an_expired_coupon_deactivates_it() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    let created = app
        .state
        .coupons
        .create_coupon(CreateCouponInput {
            code: "OLD10".to_string(),
            discount_percentage: 10,
            expiration_date: Utc::now() - Duration::hours(1),
            assign_to_user_id: None,
        })
        .await
        .unwrap();

    let result = app.state.coupons.validate("OLD10", user_id).await;
    assert_matches!(result, Err(ServiceError::CouponExpired(_)));

    // The expiry detection flipped the flag as a side effect of the read.
    let stored = Coupon::find_by_id(created.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_active);

    // A second validate now misses entirely: inactive rows are invisible.
    let result = app.state.coupons.validate("OLD10", user_id).await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn redeem_is_idempotent() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    let created = app
        .state
        .coupons
        .create_coupon(coupon_input("ONCE10", Some(user_id)))
        .await
        .unwrap();

    app.state
        .coupons
        .redeem("ONCE10", Some(user_id))
        .await
        .expect("first redemption succeeds");
    app.state
        .coupons
        .redeem("ONCE10", Some(user_id))
        .await
        .expect("second redemption is a no-op, never an error");

    let stored = Coupon::find_by_id(created.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_active);

    // Redeeming a code that never existed is also a no-op.
    app.state
        .coupons
        .redeem("NEVER-WAS", Some(user_id))
        .await
        .expect("missing coupon redemption is silent");
}

#[tokio::test]
async fn reward_issuance_replaces_any_prior_owned_coupon() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    let first = app
        .state
        .coupons
        .issue_reward_coupon(user_id)
        .await
        .unwrap();
    assert!(first.code.starts_with("GIFT"));
    assert_eq!(first.discount_percentage, 10);

    let second = app
        .state
        .coupons
        .issue_reward_coupon(user_id)
        .await
        .unwrap();
    assert_ne!(first.id, second.id);

    // Exactly one reward coupon remains for the user.
    let remaining: Vec<_> = app
        .state
        .coupons
        .list_coupons()
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.owner_id == Some(user_id))
        .collect();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.id);
}

#[tokio::test]
async fn purge_expired_sweeps_only_past_due_rows() {
    let app = TestApp::new().await;

    app.state
        .coupons
        .create_coupon(CreateCouponInput {
            code: "DEAD10".to_string(),
            discount_percentage: 10,
            expiration_date: Utc::now() - Duration::days(1),
            assign_to_user_id: None,
        })
        .await
        .unwrap();
    app.state
        .coupons
        .create_coupon(coupon_input("ALIVE10", None))
        .await
        .unwrap();

    let removed = app.state.coupons.purge_expired().await.unwrap();
    assert_eq!(removed, 1);

    let remaining = app.state.coupons.list_coupons().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].code, "ALIVE10");
}

#[tokio::test]
async fn delete_coupon_requires_an_existing_row() {
    let app = TestApp::new().await;

    let created = app
        .state
        .coupons
        .create_coupon(coupon_input("TEMP10", None))
        .await
        .unwrap();

    app.state.coupons.delete_coupon(created.id).await.unwrap();
    let result = app.state.coupons.delete_coupon(created.id).await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}
