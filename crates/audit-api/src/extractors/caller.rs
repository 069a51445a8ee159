//! Caller extractor
//!
//! Builds the audit `CallerContext` from request headers. Identity is
//! established upstream; this service only records what it is told.

use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use audit_core::EntityId;
use audit_service::services::CallerContext;

use crate::response::ApiError;

/// Authenticated actor id set by the upstream gateway
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Free-text justification for the access
pub const ACCESS_REASON_HEADER: &str = "x-access-reason";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Request caller as seen by the audit trail
#[derive(Debug, Clone)]
pub struct Caller(pub CallerContext);

impl Caller {
    pub fn into_inner(self) -> CallerContext {
        self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        caller_from_headers(&parts.headers, peer).map(Caller)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the caller from headers, falling back to the peer address for the IP
pub fn caller_from_headers(
    headers: &HeaderMap,
    peer_ip: Option<String>,
) -> Result<CallerContext, ApiError> {
    let actor_id = header_str(headers, ACTOR_ID_HEADER)
        .map(|raw| {
            EntityId::parse(raw).map_err(|_| {
                tracing::warn!(value = raw, "Malformed actor id header");
                ApiError::invalid_header(format!("{ACTOR_ID_HEADER} must be an integer"))
            })
        })
        .transpose()?;

    // First hop of X-Forwarded-For is the original client
    let source_ip = header_str(headers, FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .or(peer_ip);

    let mut caller = CallerContext::anonymous().with_actor(actor_id);
    if let Some(ip) = source_ip {
        caller = caller.with_source_ip(ip);
    }
    if let Some(agent) = header_str(headers, header::USER_AGENT.as_str()) {
        caller = caller.with_client(agent);
    }
    if let Some(reason) = header_str(headers, ACCESS_REASON_HEADER) {
        caller = caller.with_reason(reason);
    }
    Ok(caller)
}
