use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use storefront_engine::traits::StorefrontError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Identity headers are missing or malformed. {0}")]
    UnidentifiedActor(String),
    #[error(transparent)]
    Conflict(StorefrontError),
    #[error(transparent)]
    Engine(#[from] StorefrontError),
}

impl ServerError {
    /// Order creation reports stock problems as a state conflict rather than a bad claim, since the client's cart
    /// was well-formed and the shelf simply emptied first.
    pub fn at_creation(e: StorefrontError) -> Self {
        match e {
            StorefrontError::StockInsufficient { .. } => Self::Conflict(e),
            other => Self::Engine(other),
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnidentifiedActor(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Engine(e) => engine_status_code(e),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = match self {
            Self::Engine(e) | Self::Conflict(e) => e.code(),
            _ => None,
        };
        let body = match code {
            Some(code) => serde_json::json!({ "error": self.to_string(), "code": code }),
            None => serde_json::json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}

/// The engine's error taxonomy collapses onto four families of status codes: absent things are 404, permission
/// problems are 403, claims the client can fix are 400, state conflicts are 409, and anything the client should
/// simply retry later is 503.
fn engine_status_code(e: &StorefrontError) -> StatusCode {
    match e {
        StorefrontError::OrderNotFound(_) |
        StorefrontError::ShopNotFound(_) |
        StorefrontError::ProductsNotFound(_) |
        StorefrontError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
        StorefrontError::Unauthorized(_) => StatusCode::FORBIDDEN,
        StorefrontError::Validation(_) |
        StorefrontError::UnsupportedChain(_) |
        StorefrontError::TxAlreadyUsed(_) |
        StorefrontError::InvoiceReuse(_) |
        StorefrontError::PaymentNotVerified { .. } |
        StorefrontError::AmountMismatch { .. } |
        StorefrontError::InvoiceExpired(_) |
        StorefrontError::ProductUnavailable(_) |
        StorefrontError::Conversion(_) => StatusCode::BAD_REQUEST,
        StorefrontError::StockInsufficient { .. } => StatusCode::BAD_REQUEST,
        StorefrontError::InvalidTransition { .. } | StorefrontError::OrderNotPending(_) => StatusCode::CONFLICT,
        StorefrontError::Transient(_) | StorefrontError::RateUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StorefrontError::Database(_) | StorefrontError::MissingXpub(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
