use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::{Method, StatusCode},
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
};
use serde_json::Value;
use storefront_engine::{
    db_types::Chain,
    test_utils::{
        prepare_test_env,
        random_db_path,
        seed::{seed_product, seed_rate, seed_shop},
        MockVerifier,
    },
    traits::DeterministicWallet,
    ExchangeRateApi,
    InvoiceApi,
    OrderFlowApi,
    PaymentApi,
    SqliteDatabase,
};

use crate::{
    auth::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER},
    config::ServerConfig,
    integrations::LogNotifier,
    routes::{
        ActiveInvoiceRoute,
        BulkUpdateStatusRoute,
        CheckPaymentRoute,
        CreateOrderRoute,
        GetOrderRoute,
        GetRateRoute,
        IssueInvoiceRoute,
        IssueSubscriptionInvoiceRoute,
        OrderPaymentsRoute,
        SearchOrdersRoute,
        SetRateRoute,
        SubmitPaymentRoute,
        UpdateStatusRoute,
    },
};

pub const XPUB: &str = "xpub6ServerTestKey";
pub const BTC_RATE_CENTS: i64 = 4_273_504;
pub const TX_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const TX_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

pub const BUYER: (&str, &str) = ("alice", "buyer");
pub const SELLER: (&str, &str) = ("wendy", "seller");
pub const ADMIN: (&str, &str) = ("root", "admin");

/// One seeded shop ("wendy"'s, with a BTC fallback wallet), one $100.00 product with 5 in stock, and a stored BTC
/// rate. At that rate a $100 order invoices at 234_001 base units.
pub struct Stage {
    pub db: SqliteDatabase,
    pub verifier: MockVerifier,
    pub shop_id: i64,
    pub product_id: i64,
}

pub async fn stage() -> Stage {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating test database");
    let shop = seed_shop(&db, "Wendy's Widgets", "wendy", Some("bc1qshopfallbackwallet")).await;
    let product = seed_product(&db, shop.id, "Widget", 10_000, 5).await;
    seed_rate(&db, Chain::Btc, BTC_RATE_CENTS).await;
    Stage { db, verifier: MockVerifier::new(), shop_id: shop.id, product_id: product.id }
}

/// Wires up the full route table against the given backend and verifier, with only a BTC xpub configured.
pub fn configure_app(db: SqliteDatabase, verifier: MockVerifier) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let mut config = ServerConfig::default();
        config.xpubs.insert(Chain::Btc, XPUB.to_string());
        let orders_api = OrderFlowApi::new(db.clone(), LogNotifier);
        let invoice_api = InvoiceApi::new(db.clone(), DeterministicWallet);
        let payment_api = PaymentApi::new(db.clone(), verifier, LogNotifier);
        let rates_api = ExchangeRateApi::new(db.clone());
        cfg.app_data(web::Data::new(config))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(invoice_api))
            .app_data(web::Data::new(payment_api))
            .app_data(web::Data::new(rates_api))
            .service(CreateOrderRoute::<SqliteDatabase, LogNotifier>::new())
            .service(SearchOrdersRoute::<SqliteDatabase, LogNotifier>::new())
            .service(BulkUpdateStatusRoute::<SqliteDatabase, LogNotifier>::new())
            .service(GetOrderRoute::<SqliteDatabase, LogNotifier>::new())
            .service(UpdateStatusRoute::<SqliteDatabase, LogNotifier>::new())
            .service(IssueInvoiceRoute::<SqliteDatabase, DeterministicWallet>::new())
            .service(IssueSubscriptionInvoiceRoute::<SqliteDatabase, DeterministicWallet>::new())
            .service(ActiveInvoiceRoute::<SqliteDatabase, DeterministicWallet>::new())
            .service(SubmitPaymentRoute::<SqliteDatabase, MockVerifier, LogNotifier>::new())
            .service(CheckPaymentRoute::<SqliteDatabase, MockVerifier, LogNotifier>::new())
            .service(OrderPaymentsRoute::<SqliteDatabase, MockVerifier, LogNotifier>::new())
            .service(GetRateRoute::<SqliteDatabase>::new())
            .service(SetRateRoute::<SqliteDatabase>::new());
    }
}

pub fn request(method: Method, path: &str, actor: Option<(&str, &str)>, body: Option<Value>) -> actix_http::Request {
    let mut req = TestRequest::default().method(method).uri(path);
    if let Some((id, role)) = actor {
        req = req.insert_header((ACTOR_ID_HEADER, id)).insert_header((ACTOR_ROLE_HEADER, role));
    }
    if let Some(body) = body {
        req = req.set_json(body);
    }
    req.to_request()
}

pub async fn send<S, B>(app: &S, req: actix_http::Request) -> (StatusCode, Value)
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let res = test::call_service(app, req).await;
    let status = res.status();
    let bytes = test::read_body(res).await;
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

/// POST a single-line order for `quantity` widgets as the given buyer, returning the new order id.
pub async fn place_order<S, B>(app: &S, actor: (&str, &str), product_id: i64, quantity: i64) -> i64
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let body = serde_json::json!({ "product_id": product_id, "quantity": quantity });
    let (status, body) = send(app, request(Method::POST, "/orders", Some(actor), Some(body))).await;
    assert_eq!(status, StatusCode::CREATED, "order creation failed: {body}");
    body["order"]["id"].as_i64().expect("order id missing from response")
}

/// Issue a BTC invoice for the order, returning `(address, crypto_amount)`.
pub async fn issue_btc_invoice<S, B>(app: &S, actor: (&str, &str), order_id: i64) -> (String, i64)
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let path = format!("/orders/{order_id}/invoice");
    let body = serde_json::json!({ "chain": "BTC" });
    let (status, body) = send(app, request(Method::POST, &path, Some(actor), Some(body))).await;
    assert!(status.is_success(), "invoice issuance failed: {body}");
    let address = body["address"].as_str().expect("invoice address missing").to_string();
    let amount = body["crypto_amount"].as_i64().expect("invoice amount missing");
    (address, amount)
}
