use actix_web::{
    http::{Method, StatusCode},
    test,
    App,
};
use serde_json::json;

use super::helpers::*;

#[actix_web::test]
async fn creating_an_order_snapshots_the_price() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let body = json!({ "product_id": stage.product_id, "quantity": 2, "delivery_address": "12 Main St" });
    let (status, body) = send(&app, request(Method::POST, "/orders", Some(BUYER), Some(body))).await;
    assert_eq!(status, StatusCode::CREATED, "was: {body}");
    assert_eq!(body["order"]["status"], "Pending");
    assert_eq!(body["order"]["total_price"], 20_000);
    assert_eq!(body["items"][0]["quantity"], 2);
}

#[actix_web::test]
async fn requests_without_identity_headers_are_unauthorized() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let body = json!({ "product_id": stage.product_id, "quantity": 1 });
    let (status, body) = send(&app, request(Method::POST, "/orders", None, Some(body))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "was: {body}");
}

#[actix_web::test]
async fn only_buyers_may_place_orders() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let body = json!({ "product_id": stage.product_id, "quantity": 1 });
    let (status, _) = send(&app, request(Method::POST, "/orders", Some(SELLER), Some(body))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn unknown_products_are_a_404() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let body = json!({ "product_id": 999, "quantity": 1 });
    let (status, body) = send(&app, request(Method::POST, "/orders", Some(BUYER), Some(body))).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "was: {body}");
}

#[actix_web::test]
async fn ordering_more_than_the_shelf_holds_is_a_conflict() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let body = json!({ "product_id": stage.product_id, "quantity": 6 });
    let (status, body) = send(&app, request(Method::POST, "/orders", Some(BUYER), Some(body))).await;
    assert_eq!(status, StatusCode::CONFLICT, "was: {body}");
    assert_eq!(body["code"], "STOCK_INSUFFICIENT");
}

#[actix_web::test]
async fn buyers_only_see_their_own_orders() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    place_order(&app, BUYER, stage.product_id, 1).await;
    let (status, body) = send(&app, request(Method::GET, "/orders", Some(("bob", "buyer")), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(0));
    let (status, body) = send(&app, request(Method::GET, "/orders", Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[actix_web::test]
async fn the_status_state_machine_is_enforced_over_http() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    let path = format!("/orders/{order_id}/status");

    // A buyer may not push their order forward.
    let (status, _) =
        send(&app, request(Method::PATCH, &path, Some(BUYER), Some(json!({ "new_status": "Shipped" })))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The seller confirms; Pending → Shipped would have been a 409.
    let (status, body) =
        send(&app, request(Method::PATCH, &path, Some(SELLER), Some(json!({ "new_status": "Confirmed" })))).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body["status"], "Confirmed");

    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    let path = format!("/orders/{order_id}/status");
    let (status, body) =
        send(&app, request(Method::PATCH, &path, Some(SELLER), Some(json!({ "new_status": "Shipped" })))).await;
    assert_eq!(status, StatusCode::CONFLICT, "was: {body}");
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[actix_web::test]
async fn bulk_updates_where_every_item_fails_are_a_422() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let body = json!({ "updates": [{ "order_id": 999, "new_status": "Confirmed" }] });
    let (status, body) = send(&app, request(Method::POST, "/orders/status", Some(ADMIN), Some(body))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "was: {body}");
    assert_eq!(body["failed"][0]["order_id"], 999);

    // One success flips the whole response back to a 200 with the same itemised shape.
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    let body = json!({ "updates": [
        { "order_id": order_id, "new_status": "Confirmed" },
        { "order_id": 999, "new_status": "Confirmed" },
    ]});
    let (status, body) = send(&app, request(Method::POST, "/orders/status", Some(ADMIN), Some(body))).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body["succeeded"][0]["id"].as_i64(), Some(order_id));
    assert_eq!(body["failed"][0]["order_id"], 999);
}

#[actix_web::test]
async fn invoice_issuance_is_idempotent_over_http() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    let path = format!("/orders/{order_id}/invoice");

    let (status, first) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "chain": "BTC" })))).await;
    assert_eq!(status, StatusCode::CREATED, "was: {first}");
    assert_eq!(first["crypto_amount"], 234_001);
    assert!(first["address"].as_str().unwrap_or_default().starts_with("bc1q"));

    let (status, second) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "chain": "BTC" })))).await;
    assert_eq!(status, StatusCode::OK, "was: {second}");
    assert_eq!(second["address"], first["address"]);

    let (status, body) = send(&app, request(Method::GET, &path, Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], first["id"]);
}

#[actix_web::test]
async fn subscription_invoices_are_billing_system_only() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let path = "/subscriptions/7/invoice";
    let body = json!({ "chain": "BTC", "amount_cents": 10_000 });

    // only the billing system's admin identity may bill a subscription
    let (status, _) = send(&app, request(Method::POST, path, Some(BUYER), Some(body.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, first) = send(&app, request(Method::POST, path, Some(ADMIN), Some(body.clone()))).await;
    assert_eq!(status, StatusCode::CREATED, "was: {first}");
    assert_eq!(first["subscription_id"], 7);
    assert_eq!(first["crypto_amount"], 234_001);

    // re-billing the same period returns the live invoice unchanged
    let (status, second) = send(&app, request(Method::POST, path, Some(ADMIN), Some(body))).await;
    assert_eq!(status, StatusCode::OK, "was: {second}");
    assert_eq!(second["address"], first["address"]);

    let bogus = json!({ "chain": "BTC", "amount_cents": 0 });
    let (status, _) = send(&app, request(Method::POST, path, Some(ADMIN), Some(bogus))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn chains_without_a_configured_key_are_unsupported() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    let path = format!("/orders/{order_id}/invoice");

    // ETH is a real chain, but this deployment holds no key for it.
    let (status, body) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "chain": "ETH" })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
    assert_eq!(body["code"], "UNSUPPORTED_CHAIN");

    let (status, body) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "chain": "XRP" })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
    assert_eq!(body["code"], "UNSUPPORTED_CHAIN");
}

#[actix_web::test]
async fn exchange_rates_are_readable_and_admin_writable() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let (status, body) = send(&app, request(Method::GET, "/rates/BTC", None, None)).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body["rate"], BTC_RATE_CENTS);

    let update = json!({ "chain": "DOGE", "rate_cents": 13 });
    let (status, _) = send(&app, request(Method::POST, "/rates", Some(BUYER), Some(update.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&app, request(Method::POST, "/rates", Some(ADMIN), Some(update))).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let (status, body) = send(&app, request(Method::GET, "/rates/DOGE", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rate"], 13);

    // No rate stored for LTC, and a rate is never guessed.
    let (status, _) = send(&app, request(Method::GET, "/rates/LTC", None, None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
