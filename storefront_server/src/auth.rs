//! Identity extraction for route handlers.
//!
//! Requests identify the acting party with an `x-actor-id` / `x-actor-role` header pair. This server trusts the
//! headers as given; authenticating them (a gateway, a session layer, mTLS) is a deployment concern and sits in
//! front of this process.

use std::{future::Future, pin::Pin, str::FromStr};

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use storefront_engine::db_types::{Actor, Role};

use crate::errors::ServerError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// An [`Actor`] pulled out of the identity headers. Use it as a handler parameter; requests without a complete,
/// well-formed header pair are rejected with a 401 before the handler runs.
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub Actor);

impl AuthenticatedActor {
    pub fn actor(&self) -> &Actor {
        &self.0
    }
}

impl FromRequest for AuthenticatedActor {
    type Error = ServerError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = extract_actor(req);
        Box::pin(async move { result })
    }
}

fn extract_actor(req: &HttpRequest) -> Result<AuthenticatedActor, ServerError> {
    let id = header_value(req, ACTOR_ID_HEADER)?;
    if id.is_empty() {
        return Err(ServerError::UnidentifiedActor(format!("{ACTOR_ID_HEADER} must not be empty")));
    }
    let role = header_value(req, ACTOR_ROLE_HEADER)?;
    let role = Role::from_str(&role)
        .map_err(|_| ServerError::UnidentifiedActor(format!("{role} is not a recognised actor role")))?;
    Ok(AuthenticatedActor(Actor { id, role }))
}

fn header_value(req: &HttpRequest, name: &str) -> Result<String, ServerError> {
    let value = req
        .headers()
        .get(name)
        .ok_or_else(|| ServerError::UnidentifiedActor(format!("{name} header is missing")))?;
    let value = value
        .to_str()
        .map_err(|_| ServerError::UnidentifiedActor(format!("{name} header is not valid UTF-8")))?;
    Ok(value.trim().to_string())
}
