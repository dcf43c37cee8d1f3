use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use checkout_gateway::config::{GatewayMode, RedirectConfig};
use checkout_gateway::database::memory::InMemoryStore;
use checkout_gateway::database::order_repository::{Order, OrderLine};
use checkout_gateway::database::transaction_repository::TransactionStatus;
use checkout_gateway::payments::providers::{
    GarantiConfig, GarantiProvider, PaytrConfig, PaytrProvider,
};
use checkout_gateway::payments::service::PaymentService;
use checkout_gateway::payments::signature::{
    garanti_hash_data, garanti_hashed_password, paytr_webhook_hash, GarantiHashInput,
    PaytrWebhookInput,
};
use checkout_gateway::{create_app, AppState};

const SUCCESS_URL: &str = "https://shop.example/payment/success";
const FAIL_URL: &str = "https://shop.example/payment/fail";
const CALLBACK_URL: &str = "https://api.shop.example/payments/garanti/callback";

struct TestApp {
    app: Router,
    store: Arc<InMemoryStore>,
    order: Order,
    panel_variant: Uuid,
    battery_variant: Uuid,
}

fn garanti_config() -> GarantiConfig {
    GarantiConfig {
        terminal_id: "30691297".to_string(),
        merchant_id: "7000679".to_string(),
        prov_user_id: "PROVAUT".to_string(),
        prov_password: "Secret123".to_string(),
        store_key: "12345678".to_string(),
        mode: GatewayMode::Test,
        gateway_url: "https://sanalposprovtest.garanti.com.tr/servlet/gt3dengine".to_string(),
        callback_url: CALLBACK_URL.to_string(),
        company_name: "TEST SHOP".to_string(),
    }
}

fn setup(paytr_base_url: &str) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let panel_variant = Uuid::new_v4();
    let battery_variant = Uuid::new_v4();

    let order = Order {
        id: Uuid::new_v4(),
        order_no: "ORB-20261234".to_string(),
        grand_total: Decimal::new(100000, 2),
        status: "pending".to_string(),
        payment_status: Some("pending".to_string()),
        payment_transaction_id: None,
        payment_method: None,
        guest_email: Some("buyer@example.com".to_string()),
        guest_name: Some("Ayşe Yılmaz".to_string()),
        guest_phone: Some("05321234567".to_string()),
        shipping_address: Some(serde_json::json!({"address": "Mezitli", "city": "Mersin"})),
    };
    store.insert_order(
        order.clone(),
        vec![
            OrderLine {
                product_name: Some("Güneş Paneli".to_string()),
                quantity: 2,
                unit_price: Decimal::new(40000, 2),
                variant_id: Some(panel_variant),
            },
            OrderLine {
                product_name: Some("Akü".to_string()),
                quantity: 1,
                unit_price: Decimal::new(20000, 2),
                variant_id: Some(battery_variant),
            },
            OrderLine {
                product_name: None,
                quantity: 1,
                unit_price: Decimal::ZERO,
                variant_id: None,
            },
        ],
    );
    store.set_stock(panel_variant, 10);
    store.set_stock(battery_variant, 5);

    let paytr_config = PaytrConfig {
        merchant_id: "100200".to_string(),
        merchant_key: "KEY123".to_string(),
        merchant_salt: "SALT456".to_string(),
        base_url: paytr_base_url.to_string(),
        ..Default::default()
    };

    let state = AppState {
        payments: Arc::new(PaymentService::new(store.clone(), store.clone())),
        garanti: Arc::new(GarantiProvider::new(garanti_config())),
        paytr: Arc::new(PaytrProvider::new(paytr_config)),
        redirects: RedirectConfig {
            success_url: SUCCESS_URL.to_string(),
            fail_url: FAIL_URL.to_string(),
        },
        environment: "development".to_string(),
        db: None,
    };

    TestApp {
        app: create_app(state),
        store,
        order,
        panel_variant,
        battery_variant,
    }
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "85.34.78.112, 10.0.0.1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn form_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn card_body(order_id: Uuid) -> Value {
    serde_json::json!({
        "orderId": order_id.to_string(),
        "cardNumber": "4282 2090 0434 8015",
        "cardExpiry": "08/2028",
        "cardCvc": "123",
        "cardHolderName": "Ayse Yilmaz"
    })
}

fn signed_notification(oid: &str, status: &str, total: &str) -> String {
    paytr_webhook_hash(
        "KEY123",
        &PaytrWebhookInput {
            merchant_oid: oid,
            merchant_salt: "SALT456",
            status,
            total_amount: total,
        },
    )
}

async fn initiate_garanti(test: &TestApp) -> Uuid {
    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "/payments/garanti/initiate",
            card_body(test.order.id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["transactionId"].as_str().unwrap().parse().unwrap()
}

async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/odeme/api/get-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "success", "token": token})),
        )
        .mount(server)
        .await;
}

async fn post_notification(app: &Router, fields: &[(&str, &str)]) -> String {
    let response = app
        .clone()
        .oneshot(form_request("/payments/paytr/callback", fields))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_text(response).await
}

async fn initiate_paytr(test: &TestApp) -> Uuid {
    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "/payments/paytr/initiate",
            serde_json::json!({"orderId": test.order.id.to_string()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["transactionId"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_garanti_initiate_returns_signed_form() {
    let test = setup("http://127.0.0.1:9");

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "/payments/garanti/initiate",
            card_body(test.order.id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    let form = &body["formData"];
    let txid = body["transactionId"].as_str().unwrap();
    let callback = format!("{}?txid={}", CALLBACK_URL, txid);

    assert_eq!(form["txnamount"], "100000");
    assert_eq!(form["txninstallmentcount"], "");
    assert_eq!(form["successurl"], callback.as_str());
    assert_eq!(form["errorurl"], callback.as_str());
    assert_eq!(form["customeripaddress"], "85.34.78.112");
    assert_eq!(form["cardexpiredateyear"], "28");
    assert_eq!(form["cardnumber"], "4282209004348015");

    let expected_hash = garanti_hash_data(&GarantiHashInput {
        terminal_id: "30691297",
        order_id: "ORB-20261234",
        amount: "100000",
        currency_code: "949",
        success_url: &callback,
        error_url: &callback,
        txn_type: "sales",
        installment_count: "",
        store_key: "12345678",
        hashed_password: &garanti_hashed_password("Secret123", "30691297"),
    });
    assert_eq!(form["secure3dhash"], expected_hash.as_str());
    assert!(body["formHtml"]
        .as_str()
        .unwrap()
        .contains("document.getElementById('paymentForm').submit()"));

    let tx = test.store.transaction(txid.parse().unwrap()).unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.provider, "garanti");
}

#[tokio::test]
async fn test_garanti_initiate_without_card_data_is_rejected() {
    let test = setup("http://127.0.0.1:9");

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "/payments/garanti/initiate",
            serde_json::json!({"orderId": test.order.id.to_string()}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("cardNumber"));
    assert!(test.store.transactions_for_order(test.order.id).is_empty());
}

#[tokio::test]
async fn test_garanti_callback_without_txid_redirects_to_fail_page() {
    let test = setup("http://127.0.0.1:9");

    let response = test
        .app
        .clone()
        .oneshot(form_request(
            "/payments/garanti/callback",
            &[("mdstatus", "1"), ("procreturncode", "00")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        format!("{}?error=missing_txid", FAIL_URL)
    );
}

#[tokio::test]
async fn test_garanti_callback_for_unknown_transaction() {
    let test = setup("http://127.0.0.1:9");

    let response = test
        .app
        .clone()
        .oneshot(form_request(
            &format!("/payments/garanti/callback?txid={}", Uuid::new_v4()),
            &[("mdstatus", "1"), ("procreturncode", "00")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        format!("{}?error=unknown_transaction", FAIL_URL)
    );
}

#[tokio::test]
async fn test_garanti_success_callback_is_applied_once() {
    let test = setup("http://127.0.0.1:9");
    let txid = initiate_garanti(&test).await;
    let uri = format!("/payments/garanti/callback?txid={}", txid);

    let response = test
        .app
        .clone()
        .oneshot(form_request(
            &uri,
            &[
                ("mdstatus", "1"),
                ("procreturncode", "00"),
                ("authcode", "304919"),
                ("hostrefnum", "512312345678"),
                ("oid", "ORB-20261234"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), format!("{}/ORB-20261234", SUCCESS_URL));

    let order = test.store.order(test.order.id).unwrap();
    assert_eq!(order.status, "approved");
    assert_eq!(order.payment_status.as_deref(), Some("paid"));
    assert_eq!(order.payment_transaction_id, Some(txid));

    // A late failure delivery must not overwrite the settled result.
    let replay = test
        .app
        .clone()
        .oneshot(form_request(
            &uri,
            &[("mdstatus", "0"), ("procreturncode", "99")],
        ))
        .await
        .unwrap();
    assert_eq!(location(&replay), format!("{}/ORB-20261234", SUCCESS_URL));

    let tx = test.store.transaction(txid).unwrap();
    assert_eq!(tx.status, TransactionStatus::Success);
    assert_eq!(tx.bank_auth_code.as_deref(), Some("304919"));
    assert_eq!(tx.bank_response_code.as_deref(), Some("00"));
    assert_eq!(test.store.order(test.order.id).unwrap().status, "approved");
}

#[tokio::test]
async fn test_garanti_declined_callback_carries_code_and_message() {
    let test = setup("http://127.0.0.1:9");
    let txid = initiate_garanti(&test).await;

    let response = test
        .app
        .clone()
        .oneshot(form_request(
            &format!("/payments/garanti/callback?txid={}", txid),
            &[
                ("mdstatus", "1"),
                ("procreturncode", "51"),
                ("errmsg", "Yetersiz bakiye"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        format!("{}?txid={}&code=51&msg=Yetersiz%20bakiye", FAIL_URL, txid)
    );

    let order = test.store.order(test.order.id).unwrap();
    assert_eq!(order.status, "payment_failed");
    assert_eq!(order.payment_status.as_deref(), Some("failed"));

    let tx = test.store.transaction(txid).unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(tx.error_code.as_deref(), Some("51"));
    assert_eq!(test.store.stock(test.panel_variant), Some(10));
}

#[tokio::test]
async fn test_garanti_callback_storage_failure_redirects_with_server_error() {
    let test = setup("http://127.0.0.1:9");
    let txid = initiate_garanti(&test).await;
    test.store.fail_writes(true);

    let response = test
        .app
        .clone()
        .oneshot(form_request(
            &format!("/payments/garanti/callback?txid={}", txid),
            &[("mdstatus", "1"), ("procreturncode", "00")],
        ))
        .await
        .unwrap();

    assert_eq!(
        location(&response),
        format!("{}?error=server_error", FAIL_URL)
    );
    assert_eq!(
        test.store.transaction(txid).unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn test_paytr_flow_decrements_stock_once() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-789").await;
    let test = setup(&server.uri());

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "/payments/paytr/initiate",
            serde_json::json!({"orderId": test.order.id.to_string()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token"], "tok-789");
    assert_eq!(
        body["iframeUrl"],
        format!("{}/odeme/guvenli/tok-789", server.uri())
    );
    let txid: Uuid = body["transactionId"].as_str().unwrap().parse().unwrap();
    assert_eq!(
        test.store.order(test.order.id).unwrap().payment_method.as_deref(),
        Some("paytr")
    );

    let hash = signed_notification("ORB20261234", "success", "100000");
    let notification = [
        ("merchant_oid", "ORB20261234"),
        ("status", "success"),
        ("total_amount", "100000"),
        ("hash", hash.as_str()),
    ];

    for _ in 0..2 {
        let response = test
            .app
            .clone()
            .oneshot(form_request("/payments/paytr/callback", &notification))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    assert_eq!(test.store.stock(test.panel_variant), Some(8));
    assert_eq!(test.store.stock(test.battery_variant), Some(4));

    let order = test.store.order(test.order.id).unwrap();
    assert_eq!(order.status, "paid");
    assert_eq!(order.payment_status.as_deref(), Some("paid"));
    assert_eq!(order.payment_transaction_id, Some(txid));
    assert_eq!(
        test.store.transaction(txid).unwrap().status,
        TransactionStatus::Success
    );
}

#[tokio::test]
async fn test_paytr_tampered_notification_changes_nothing() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    let test = setup(&server.uri());
    let txid = initiate_paytr(&test).await;

    let hash = signed_notification("ORB20261234", "failed", "100000");
    let response = test
        .app
        .clone()
        .oneshot(form_request(
            "/payments/paytr/callback",
            &[
                ("merchant_oid", "ORB20261234"),
                ("status", "success"),
                ("total_amount", "100000"),
                ("hash", hash.as_str()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "PAYTR notification failed: bad hash"
    );
    assert_eq!(
        test.store.transaction(txid).unwrap().status,
        TransactionStatus::Pending
    );
    assert_eq!(test.store.stock(test.panel_variant), Some(10));
}

#[tokio::test]
async fn test_paytr_notification_with_altered_amount_is_rejected() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-4").await;
    let test = setup(&server.uri());
    let txid = initiate_paytr(&test).await;

    let hash = signed_notification("ORB20261234", "success", "100000");
    let response = test
        .app
        .clone()
        .oneshot(form_request(
            "/payments/paytr/callback",
            &[
                ("merchant_oid", "ORB20261234"),
                ("status", "success"),
                ("total_amount", "100"),
                ("hash", hash.as_str()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "PAYTR notification failed: bad hash"
    );
    assert_eq!(
        test.store.transaction(txid).unwrap().status,
        TransactionStatus::Pending
    );
    assert_eq!(test.store.order(test.order.id).unwrap().status, "pending");
    assert_eq!(test.store.stock(test.panel_variant), Some(10));
}

#[tokio::test]
async fn test_paytr_notification_does_not_settle_garanti_transaction() {
    let test = setup("http://127.0.0.1:9");
    let txid = initiate_garanti(&test).await;

    let hash = signed_notification("ORB20261234", "success", "100000");
    let response = test
        .app
        .clone()
        .oneshot(form_request(
            "/payments/paytr/callback",
            &[
                ("merchant_oid", "ORB20261234"),
                ("status", "success"),
                ("total_amount", "100000"),
                ("hash", hash.as_str()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert_eq!(
        test.store.transaction(txid).unwrap().status,
        TransactionStatus::Pending
    );
    let order = test.store.order(test.order.id).unwrap();
    assert_eq!(order.status, "pending");
    assert_eq!(order.payment_transaction_id, None);
    assert_eq!(test.store.stock(test.panel_variant), Some(10));
    assert_eq!(test.store.stock(test.battery_variant), Some(5));
}

#[tokio::test]
async fn test_paytr_failed_notification_keeps_stock() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-2").await;
    let test = setup(&server.uri());
    let txid = initiate_paytr(&test).await;

    let hash = signed_notification("ORB20261234", "failed", "100000");
    let response = test
        .app
        .clone()
        .oneshot(form_request(
            "/payments/paytr/callback",
            &[
                ("merchant_oid", "ORB20261234"),
                ("status", "failed"),
                ("total_amount", "100000"),
                ("hash", hash.as_str()),
                ("failed_reason_code", "6"),
                ("failed_reason_msg", "Musteri odeme yapmaktan vazgecti"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(body_text(response).await, "OK");
    let tx = test.store.transaction(txid).unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(tx.error_code.as_deref(), Some("6"));

    let order = test.store.order(test.order.id).unwrap();
    assert_eq!(order.status, "pending_payment");
    assert_eq!(order.payment_status.as_deref(), Some("failed"));
    assert_eq!(test.store.stock(test.panel_variant), Some(10));
}

#[tokio::test]
async fn test_paytr_token_rejection_creates_no_transaction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/odeme/api/get-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"status": "failed", "reason": "paytr_token gecersiz"}),
        ))
        .mount(&server)
        .await;
    let test = setup(&server.uri());

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "/payments/paytr/initiate",
            serde_json::json!({"orderId": test.order.id.to_string()}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["details"], "paytr_token gecersiz");
    assert!(test.store.transactions_for_order(test.order.id).is_empty());
    assert_eq!(test.store.order(test.order.id).unwrap().payment_method, None);
}

#[tokio::test]
async fn test_paytr_storage_failure_is_still_acknowledged() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-3").await;
    let test = setup(&server.uri());
    let txid = initiate_paytr(&test).await;
    test.store.fail_writes(true);

    let hash = signed_notification("ORB20261234", "success", "100000");
    let response = test
        .app
        .clone()
        .oneshot(form_request(
            "/payments/paytr/callback",
            &[
                ("merchant_oid", "ORB20261234"),
                ("status", "success"),
                ("total_amount", "100000"),
                ("hash", hash.as_str()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert_eq!(
        test.store.transaction(txid).unwrap().status,
        TransactionStatus::Pending
    );
    assert_eq!(test.store.stock(test.panel_variant), Some(10));
}

#[tokio::test]
async fn test_paytr_settlement_failure_rolls_back_until_retry() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-5").await;
    let test = setup(&server.uri());
    let txid = initiate_paytr(&test).await;

    let hash = signed_notification("ORB20261234", "success", "100000");
    let notification = [
        ("merchant_oid", "ORB20261234"),
        ("status", "success"),
        ("total_amount", "100000"),
        ("hash", hash.as_str()),
    ];
    test.store.fail_order_writes(true);
    assert_eq!(post_notification(&test.app, &notification).await, "OK");
    assert_eq!(
        test.store.transaction(txid).unwrap().status,
        TransactionStatus::Pending
    );
    assert_eq!(test.store.order(test.order.id).unwrap().status, "pending");
    assert_eq!(test.store.stock(test.panel_variant), Some(10));
    assert_eq!(test.store.stock(test.battery_variant), Some(5));

    test.store.fail_order_writes(false);
    assert_eq!(post_notification(&test.app, &notification).await, "OK");
    assert_eq!(post_notification(&test.app, &notification).await, "OK");

    assert_eq!(
        test.store.transaction(txid).unwrap().status,
        TransactionStatus::Success
    );
    let order = test.store.order(test.order.id).unwrap();
    assert_eq!(order.status, "paid");
    assert_eq!(order.payment_transaction_id, Some(txid));
    assert_eq!(test.store.stock(test.panel_variant), Some(8));
    assert_eq!(test.store.stock(test.battery_variant), Some(4));
}

#[tokio::test]
async fn test_paid_order_cannot_be_initiated_again() {
    let test = setup("http://127.0.0.1:9");
    let txid = initiate_garanti(&test).await;
    test.app
        .clone()
        .oneshot(form_request(
            &format!("/payments/garanti/callback?txid={}", txid),
            &[("mdstatus", "1"), ("procreturncode", "00")],
        ))
        .await
        .unwrap();

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "/payments/garanti/initiate",
            card_body(test.order.id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "Order is already paid");
    assert_eq!(test.store.transactions_for_order(test.order.id).len(), 1);
    let order = test.store.order(test.order.id).unwrap();
    assert_eq!(order.payment_status.as_deref(), Some("paid"));
    assert_eq!(order.payment_transaction_id, Some(txid));
}

#[tokio::test]
async fn test_paytr_notification_for_unknown_order_is_acknowledged() {
    let test = setup("http://127.0.0.1:9");
    let hash = signed_notification("ORB99999999", "success", "5000");

    let response = test
        .app
        .clone()
        .oneshot(form_request(
            "/payments/paytr/callback",
            &[
                ("merchant_oid", "ORB99999999"),
                ("status", "success"),
                ("total_amount", "5000"),
                ("hash", hash.as_str()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn test_installment_quotes() {
    let test = setup("http://127.0.0.1:9");

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/payments/installments/{}", test.order.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let options = body["options"].as_array().unwrap();
    assert_eq!(options.len(), 12);
    assert_eq!(options[2]["count"], 3);
    assert_eq!(options[2]["totalAmount"], "1050.10");
}

#[tokio::test]
async fn test_installment_quotes_for_missing_order() {
    let test = setup("http://127.0.0.1:9");

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/payments/installments/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failure_message_lookup() {
    let test = setup("http://127.0.0.1:9");

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/payments/failure-message?code=51&msg=Insufficient")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["code"], "51");
    assert_eq!(body["message"], "Kart limitiniz yetersiz.");
}

#[tokio::test]
async fn test_health_without_database() {
    let test = setup("http://127.0.0.1:9");

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "not_configured");
    assert_eq!(body["garanti_mode"], "TEST");
}
