use rust_decimal_macros::dec;
use storefront_api::{
    config::{CardConfig, WalletConfig},
    payments::{
        CardGateway, CreateSessionRequest, HttpWalletGateway, PaymentStatus, SessionLineItem,
        SessionMetadata, StripeGateway, WalletGateway,
    },
};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn wallet_config(server: &MockServer) -> WalletConfig {
    WalletConfig {
        verify_url: format!("{}/epay/transrec", server.uri()),
        merchant_code: "MERCHANT".to_string(),
        ..WalletConfig::default()
    }
}

fn card_config(server: &MockServer) -> CardConfig {
    CardConfig {
        secret_key: "sk_test_123".to_string(),
        api_base_url: server.uri(),
        ..CardConfig::default()
    }
}

#[tokio::test]
async fn wallet_gateway_posts_form_and_accepts_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/epay/transrec"))
        .and(body_string_contains("pid=ESW-1-ABCDEF"))
        .and(body_string_contains("scd=MERCHANT"))
        .and(body_string_contains("amt=90"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Success"))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpWalletGateway::new(&wallet_config(&server)).unwrap();
    let verification = gateway.verify("ESW-1-ABCDEF", dec!(90)).await.unwrap();

    assert!(verification.success);
    assert_eq!(verification.raw_body, "Success");
}

#[tokio::test]
async fn wallet_gateway_rejects_failure_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/epay/transrec"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<response><status>failure</status></response>"),
        )
        .mount(&server)
        .await;

    let gateway = HttpWalletGateway::new(&wallet_config(&server)).unwrap();
    let verification = gateway.verify("ESW-2-ABCDEF", dec!(10)).await.unwrap();

    assert!(!verification.success);
}

#[tokio::test]
async fn wallet_gateway_accepts_xml_success_tag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/epay/transrec"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<response_code><response>Success</response></response_code>"),
        )
        .mount(&server)
        .await;

    let gateway = HttpWalletGateway::new(&wallet_config(&server)).unwrap();
    let verification = gateway.verify("ESW-3-ABCDEF", dec!(10)).await.unwrap();

    assert!(verification.success);
}

#[tokio::test]
async fn card_gateway_creates_and_retrieves_sessions() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(body_string_contains("mode=payment"))
        .and(body_string_contains("unit_amount%5D=5000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "unpaid",
            "amount_total": 9000,
            "metadata": {
                "user_id": user_id.to_string(),
                "coupon_code": "SAVE10",
                "products": "[]"
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_test_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "amount_total": 9000,
            "metadata": {}
        })))
        .mount(&server)
        .await;

    let gateway = StripeGateway::new(&card_config(&server)).unwrap();
    let session = gateway
        .create_session(CreateSessionRequest {
            currency: "usd".to_string(),
            line_items: vec![SessionLineItem {
                name: "Widget".to_string(),
                image: None,
                unit_amount_minor: 5000,
                quantity: 2,
            }],
            success_url: "http://localhost/success".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
            discount_id: None,
            metadata: SessionMetadata {
                user_id: Some(user_id),
                coupon_code: Some("SAVE10".to_string()),
                products_json: "[]".to_string(),
            },
        })
        .await
        .unwrap();

    assert_eq!(session.id, "cs_test_1");
    assert_eq!(session.payment_status, PaymentStatus::Unpaid);
    assert_eq!(session.amount_total_minor, 9000);
    assert_eq!(session.metadata.user_id, Some(user_id));

    let retrieved = gateway.retrieve_session("cs_test_1").await.unwrap();
    assert_eq!(retrieved.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn card_gateway_surfaces_provider_errors_as_payment_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/coupons"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let gateway = StripeGateway::new(&card_config(&server)).unwrap();
    let result = gateway.create_percent_discount(10).await;

    assert!(matches!(
        result,
        Err(storefront_api::errors::ServiceError::PaymentFailed(_))
    ));
}
