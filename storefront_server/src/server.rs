use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use storefront_engine::{
    traits::DeterministicWallet,
    ExchangeRateApi,
    InvoiceApi,
    OrderFlowApi,
    PaymentApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    integrations::{ExplorerVerifier, LogNotifier},
    routes::{
        health,
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

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_expiry_worker {
        start_expiry_worker(db.clone(), config.expiry_interval_secs);
    }
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::InitializeError(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let verifier =
        ExplorerVerifier::from_config(&config).map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), LogNotifier);
        let invoice_api = InvoiceApi::new(db.clone(), DeterministicWallet);
        let mut payment_api = PaymentApi::new(db.clone(), verifier.clone(), LogNotifier);
        if let Some(tolerance) = config.payment_tolerance {
            payment_api = payment_api.with_tolerance(tolerance);
        }
        let rates_api = ExchangeRateApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sfs::access_log"))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(invoice_api))
            .app_data(web::Data::new(payment_api))
            .app_data(web::Data::new(rates_api))
            .service(health)
            .service(CreateOrderRoute::<SqliteDatabase, LogNotifier>::new())
            .service(SearchOrdersRoute::<SqliteDatabase, LogNotifier>::new())
            .service(BulkUpdateStatusRoute::<SqliteDatabase, LogNotifier>::new())
            .service(GetOrderRoute::<SqliteDatabase, LogNotifier>::new())
            .service(UpdateStatusRoute::<SqliteDatabase, LogNotifier>::new())
            .service(IssueInvoiceRoute::<SqliteDatabase, DeterministicWallet>::new())
            .service(IssueSubscriptionInvoiceRoute::<SqliteDatabase, DeterministicWallet>::new())
            .service(ActiveInvoiceRoute::<SqliteDatabase, DeterministicWallet>::new())
            .service(SubmitPaymentRoute::<SqliteDatabase, ExplorerVerifier, LogNotifier>::new())
            .service(CheckPaymentRoute::<SqliteDatabase, ExplorerVerifier, LogNotifier>::new())
            .service(OrderPaymentsRoute::<SqliteDatabase, ExplorerVerifier, LogNotifier>::new())
            .service(GetRateRoute::<SqliteDatabase>::new())
            .service(SetRateRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
