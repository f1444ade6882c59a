use actix_web::{
    http::{Method, StatusCode},
    test,
    App,
};
use serde_json::json;
use storefront_common::CryptoAmount;

use super::helpers::*;

#[actix_web::test]
async fn an_exact_payment_confirms_the_order() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    let (_, amount) = issue_btc_invoice(&app, BUYER, order_id).await;
    stage.verifier.confirm(TX_A, CryptoAmount::from_base_units(amount), 6);

    let path = format!("/orders/{order_id}/payments");
    let (status, body) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "tx_hash": TX_A })))).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body["disposition"], "Confirmed");
    assert_eq!(body["order"]["status"], "Confirmed");
    assert_eq!(body["payment"]["status"], "Confirmed");

    use storefront_engine::traits::StorefrontDatabase;
    let product = stage.db.fetch_product(stage.product_id).await.unwrap().unwrap();
    assert_eq!(product.stock_quantity, 4);
}

#[actix_web::test]
async fn an_underpayment_outside_tolerance_is_rejected_without_burning_the_hash() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    let (_, amount) = issue_btc_invoice(&app, BUYER, order_id).await;
    let path = format!("/orders/{order_id}/payments");

    // ~1.7% short, well outside the default 0.5% band.
    stage.verifier.confirm(TX_A, CryptoAmount::from_base_units(230_000), 6);
    let (status, body) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "tx_hash": TX_A })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
    assert_eq!(body["code"], "AMOUNT_MISMATCH");

    // The hash was not burned: once the chain reports the right amount, the same hash settles the order.
    stage.verifier.confirm(TX_A, CryptoAmount::from_base_units(amount), 6);
    let (status, body) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "tx_hash": TX_A })))).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body["disposition"], "Confirmed");
}

#[actix_web::test]
async fn a_rejected_claim_burns_the_hash() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    issue_btc_invoice(&app, BUYER, order_id).await;
    let path = format!("/orders/{order_id}/payments");

    stage.verifier.reject(TX_B, "TX_NOT_FOUND", "no such transaction");
    let (status, body) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "tx_hash": TX_B })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
    assert_eq!(body["code"], "PAYMENT_NOT_VERIFIED");

    // Even a now-confirmable transaction stays dead once rejected.
    stage.verifier.confirm(TX_B, CryptoAmount::from_base_units(234_001), 6);
    let (status, body) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "tx_hash": TX_B })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
    assert_eq!(body["code"], "PAYMENT_NOT_VERIFIED");
}

#[actix_web::test]
async fn one_transaction_pays_for_exactly_one_order() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let first = place_order(&app, BUYER, stage.product_id, 1).await;
    let (_, amount) = issue_btc_invoice(&app, BUYER, first).await;
    stage.verifier.confirm(TX_A, CryptoAmount::from_base_units(amount), 6);
    let path = format!("/orders/{first}/payments");
    let (status, _) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "tx_hash": TX_A })))).await;
    assert_eq!(status, StatusCode::OK);

    let second = place_order(&app, BUYER, stage.product_id, 1).await;
    issue_btc_invoice(&app, BUYER, second).await;
    let path = format!("/orders/{second}/payments");
    let (status, body) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "tx_hash": TX_A })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
    assert_eq!(body["code"], "TX_ALREADY_USED");
}

#[actix_web::test]
async fn unconfirmed_payments_wait_and_can_be_polled_to_completion() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    let (_, amount) = issue_btc_invoice(&app, BUYER, order_id).await;
    let path = format!("/orders/{order_id}/payments");

    stage.verifier.pend(TX_A, CryptoAmount::from_base_units(amount), 1);
    let (status, body) = send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "tx_hash": TX_A })))).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body["disposition"], "AwaitingConfirmations");
    assert_eq!(body["order"]["status"], "Pending");

    // More blocks land; the polling endpoint re-runs settlement without resubmitting the proof.
    stage.verifier.confirm(TX_A, CryptoAmount::from_base_units(amount), 6);
    let poll = format!("/orders/{order_id}/payments/{TX_A}");
    let (status, body) = send(&app, request(Method::GET, &poll, Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body["disposition"], "Confirmed");
    assert_eq!(body["order"]["status"], "Confirmed");

    let (status, body) = send(&app, request(Method::GET, &path, Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[actix_web::test]
async fn only_the_orders_buyer_may_claim_payment() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    issue_btc_invoice(&app, BUYER, order_id).await;
    let path = format!("/orders/{order_id}/payments");
    let (status, body) =
        send(&app, request(Method::POST, &path, Some(("mallory", "buyer")), Some(json!({ "tx_hash": TX_A })))).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "was: {body}");
}

#[actix_web::test]
async fn garbage_proofs_are_a_bad_request() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    issue_btc_invoice(&app, BUYER, order_id).await;
    let path = format!("/orders/{order_id}/payments");

    let (status, body) =
        send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "tx_hash": "not-a-hash" })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");

    let both = json!({ "tx_hash": TX_A, "explorer_link": "https://mempool.space/tx/abc" });
    let (status, body) = send(&app, request(Method::POST, &path, Some(BUYER), Some(both))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
}

#[actix_web::test]
async fn explorer_links_are_accepted_as_proof() {
    let stage = stage().await;
    let app = test::init_service(App::new().configure(configure_app(stage.db.clone(), stage.verifier.clone()))).await;
    let order_id = place_order(&app, BUYER, stage.product_id, 1).await;
    let (_, amount) = issue_btc_invoice(&app, BUYER, order_id).await;
    stage.verifier.confirm(TX_A, CryptoAmount::from_base_units(amount), 6);

    let path = format!("/orders/{order_id}/payments");
    let link = format!("https://blockstream.info/tx/{TX_A}");
    let (status, body) =
        send(&app, request(Method::POST, &path, Some(BUYER), Some(json!({ "explorer_link": link })))).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body["payment"]["tx_hash"], TX_A);
}
