//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Handlers are thin: parse the request, call the engine API, map the outcome onto a status code. Every policy
//! decision (who may see an order, when a hash is burned, when stock moves) lives in the engine, not here.

use std::str::FromStr;

use actix_web::{get, web, HttpResponse, Responder};
use chrono::Duration;
use log::*;
use storefront_engine::{
    db_types::{Chain, Role},
    traits::{BlockchainVerifier, ExchangeRates, Notifier, StorefrontDatabase, StorefrontError, WalletAllocator},
    BulkStatusUpdate,
    ExchangeRateApi,
    InvoiceApi,
    OrderFlowApi,
    PaymentApi,
};

use crate::{
    auth::AuthenticatedActor,
    config::ServerConfig,
    data_objects::{
        InvoiceRequest,
        JsonResponse,
        NewOrderRequest,
        OrderSearchQuery,
        PaymentSubmission,
        RateUpdate,
        StatusUpdateRequest,
        SubscriptionInvoiceRequest,
    },
    errors::ServerError,
};

/// Invoice issuance needs both the order backend and the rate store. In practice one database provides both, so the
/// routes take a single backend parameter with this combined bound.
pub trait InvoicingBackend: StorefrontDatabase + ExchangeRates {}
impl<T: StorefrontDatabase + ExchangeRates> InvoicingBackend for T {}

// Web-actix cannot handle generics in handlers, so registration is implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + Send + Sync + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" impl StorefrontDatabase, Notifier);
/// Create a new order from a cart, in either the single-item or multi-item dialect. The order is created `Pending`
/// and holds no stock until a payment confirms against it.
pub async fn create_order<B, N>(
    auth: AuthenticatedActor,
    body: web::Json<NewOrderRequest>,
    api: web::Data<OrderFlowApi<B, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase,
    N: Notifier,
{
    let actor = auth.actor();
    trace!("💻️ [{}] requested a new order", actor.id);
    if actor.role != Role::Buyer {
        return Err(ServerError::Engine(StorefrontError::Unauthorized("Only buyers may place orders".to_string())));
    }
    let NewOrderRequest { cart, delivery_address } = body.into_inner();
    let order = api.create_order(actor, cart, delivery_address).await.map_err(ServerError::at_creation)?;
    Ok(HttpResponse::Created().json(order))
}

route!(get_order => Get "/orders/{order_id}" impl StorefrontDatabase, Notifier);
pub async fn get_order<B, N>(
    auth: AuthenticatedActor,
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase,
    N: Notifier,
{
    let order_id = path.into_inner();
    let order = api.order(auth.actor(), order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(search_orders => Get "/orders" impl StorefrontDatabase, Notifier);
/// Order listing. Buyers are always scoped to their own orders and sellers to a shop they own; admins may query
/// freely. `status` takes a comma-separated list.
pub async fn search_orders<B, N>(
    auth: AuthenticatedActor,
    query: web::Query<OrderSearchQuery>,
    api: web::Data<OrderFlowApi<B, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase,
    N: Notifier,
{
    let filter = query.into_inner().into_filter()?;
    let orders = api.search_orders(auth.actor(), filter).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(update_status => Patch "/orders/{order_id}/status" impl StorefrontDatabase, Notifier);
/// Request a status transition on one order. Illegal transitions are a 409; transitions the actor's role may not
/// request are a 403. Re-applying the current status is an idempotent no-op and returns 200.
pub async fn update_status<B, N>(
    auth: AuthenticatedActor,
    path: web::Path<i64>,
    body: web::Json<StatusUpdateRequest>,
    api: web::Data<OrderFlowApi<B, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase,
    N: Notifier,
{
    let order_id = path.into_inner();
    let order = api.update_status(auth.actor(), order_id, body.new_status).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(bulk_update_status => Post "/orders/status" impl StorefrontDatabase, Notifier);
/// Apply many status updates in one call. Items fail independently and the per-item breakdown is always returned:
/// 200 when at least one item succeeded, 422 when every item failed.
pub async fn bulk_update_status<B, N>(
    auth: AuthenticatedActor,
    body: web::Json<BulkStatusUpdate>,
    api: web::Data<OrderFlowApi<B, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase,
    N: Notifier,
{
    let result = api.bulk_update_status(auth.actor(), body.into_inner()).await;
    let response = if result.all_failed() {
        HttpResponse::UnprocessableEntity().json(result)
    } else {
        HttpResponse::Ok().json(result)
    };
    Ok(response)
}

//----------------------------------------------   Invoices  ----------------------------------------------------
route!(issue_invoice => Post "/orders/{order_id}/invoice" impl InvoicingBackend, WalletAllocator);
/// Issue (or re-fetch) the crypto invoice for an order. Returns 201 with a fresh invoice, or 200 with the existing
/// live invoice. A chain this deployment has no extended public key for is reported as unsupported.
pub async fn issue_invoice<B, W>(
    auth: AuthenticatedActor,
    path: web::Path<i64>,
    body: web::Json<InvoiceRequest>,
    api: web::Data<InvoiceApi<B, W>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: InvoicingBackend,
    W: WalletAllocator + Sync,
{
    let order_id = path.into_inner();
    let chain = body.parse_chain()?;
    let xpub = config.xpub_for(chain).ok_or_else(|| {
        debug!("💻️ No xpub configured for {chain}; rejecting invoice request for order #{order_id}");
        ServerError::Engine(StorefrontError::UnsupportedChain(chain.to_string()))
    })?;
    let ttl = body.ttl_seconds.map(Duration::seconds).unwrap_or(config.invoice_ttl);
    let (invoice, fresh) = api.issue_invoice(auth.actor(), order_id, chain, xpub, ttl).await?;
    let response =
        if fresh { HttpResponse::Created().json(invoice) } else { HttpResponse::Ok().json(invoice) };
    Ok(response)
}

route!(issue_subscription_invoice => Post "/subscriptions/{subscription_id}/invoice" impl InvoicingBackend, WalletAllocator);
/// Issue (or re-fetch) the crypto invoice for a subscription billing period. Subscriptions live in an external
/// billing system, which calls this with its admin service identity and the USD amount to bill.
pub async fn issue_subscription_invoice<B, W>(
    auth: AuthenticatedActor,
    path: web::Path<i64>,
    body: web::Json<SubscriptionInvoiceRequest>,
    api: web::Data<InvoiceApi<B, W>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: InvoicingBackend,
    W: WalletAllocator + Sync,
{
    let subscription_id = path.into_inner();
    let chain = body.parse_chain()?;
    let amount = body.amount()?;
    let xpub = config.xpub_for(chain).ok_or_else(|| {
        debug!("💻️ No xpub configured for {chain}; rejecting invoice request for subscription #{subscription_id}");
        ServerError::Engine(StorefrontError::UnsupportedChain(chain.to_string()))
    })?;
    let ttl = body.ttl_seconds.map(Duration::seconds).unwrap_or(config.invoice_ttl);
    let (invoice, fresh) =
        api.issue_subscription_invoice(auth.actor(), subscription_id, amount, chain, xpub, ttl).await?;
    let response =
        if fresh { HttpResponse::Created().json(invoice) } else { HttpResponse::Ok().json(invoice) };
    Ok(response)
}

route!(active_invoice => Get "/orders/{order_id}/invoice" impl InvoicingBackend, WalletAllocator);
pub async fn active_invoice<B, W>(
    auth: AuthenticatedActor,
    path: web::Path<i64>,
    api: web::Data<InvoiceApi<B, W>>,
) -> Result<HttpResponse, ServerError>
where
    B: InvoicingBackend,
    W: WalletAllocator + Sync,
{
    let order_id = path.into_inner();
    match api.active_invoice(auth.actor(), order_id).await? {
        Some(invoice) => Ok(HttpResponse::Ok().json(invoice)),
        None => Ok(HttpResponse::NotFound().json(JsonResponse::failure(format!("Order #{order_id} has no live invoice")))),
    }
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(submit_payment => Post "/orders/{order_id}/payments" impl StorefrontDatabase, BlockchainVerifier, Notifier);
/// Submit an on-chain payment claim against an order. Success (or an idempotent replay of a confirmed claim) is a
/// 200 carrying the settled outcome; rejections carry a stable machine-readable `code` in the error body.
pub async fn submit_payment<B, V, N>(
    auth: AuthenticatedActor,
    path: web::Path<i64>,
    body: web::Json<PaymentSubmission>,
    api: web::Data<PaymentApi<B, V, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase,
    V: BlockchainVerifier + Sync,
    N: Notifier,
{
    let order_id = path.into_inner();
    let actor = auth.actor();
    trace!("💻️ [{}] submitted a payment claim for order #{order_id}", actor.id);
    let claim = body.into_inner().into_claim(order_id, actor)?;
    let outcome = api.submit_payment(actor, &claim).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(check_payment => Get "/orders/{order_id}/payments/{tx_hash}" impl StorefrontDatabase, BlockchainVerifier, Notifier);
/// Re-check a previously submitted payment for new confirmations. This re-runs settlement, so a payment that has
/// reached finality since submission confirms the order here.
pub async fn check_payment<B, V, N>(
    auth: AuthenticatedActor,
    path: web::Path<(i64, String)>,
    api: web::Data<PaymentApi<B, V, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase,
    V: BlockchainVerifier + Sync,
    N: Notifier,
{
    let (order_id, tx_hash) = path.into_inner();
    let outcome = api.check_payment_status(auth.actor(), order_id, &tx_hash).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(order_payments => Get "/orders/{order_id}/payments" impl StorefrontDatabase, BlockchainVerifier, Notifier);
pub async fn order_payments<B, V, N>(
    auth: AuthenticatedActor,
    path: web::Path<i64>,
    api: web::Data<PaymentApi<B, V, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase,
    V: BlockchainVerifier + Sync,
    N: Notifier,
{
    let order_id = path.into_inner();
    let payments = api.payments_for_order(auth.actor(), order_id).await?;
    Ok(HttpResponse::Ok().json(payments))
}

//----------------------------------------------   Exchange rates  ----------------------------------------------------
route!(get_rate => Get "/rates/{chain}" impl ExchangeRates);
pub async fn get_rate<B>(path: web::Path<String>, api: web::Data<ExchangeRateApi<B>>) -> Result<HttpResponse, ServerError>
where B: ExchangeRates {
    let symbol = path.into_inner();
    let chain =
        Chain::from_str(&symbol).map_err(|_| ServerError::Engine(StorefrontError::UnsupportedChain(symbol)))?;
    let rate = api.fetch_last_rate(chain).await?;
    Ok(HttpResponse::Ok().json(rate))
}

route!(set_rate => Post "/rates" impl ExchangeRates);
/// Push a new exchange rate. Admin only; invoices issued from now on price against it.
pub async fn set_rate<B>(
    auth: AuthenticatedActor,
    body: web::Json<RateUpdate>,
    api: web::Data<ExchangeRateApi<B>>,
) -> Result<HttpResponse, ServerError>
where B: ExchangeRates {
    let rate = body.into_inner().into_rate()?;
    api.set_exchange_rate(auth.actor(), &rate).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Exchange rate updated")))
}
