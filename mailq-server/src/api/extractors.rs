//! Request admission for the API.
//!
//! Provides:
//! - `admit`: middleware running the admission gate for a route group and
//!   stamping the rate-limit headers on the response.
//! - `ClientIp`: the caller's address.
//!
//! Credentials are read from `Authorization: Bearer <key>` or `X-API-Key`.
//! `X-Forwarded-For` is only believed when the connection comes from one of
//! the configured trusted proxies; otherwise the socket address counts.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{
        Extensions, HeaderMap, HeaderValue, header::AUTHORIZATION, request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use mailq_core::admission::RateDecision;
use mailq_core::entities::Permission;
use mailq_sdk::signature::{
    API_KEY_HEADER, RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RESET_HEADER,
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use time::format_description::well_known::Rfc3339;

use super::ApiError;
use crate::state::AppState;

/// Middleware state: which permission a route group requires.
#[derive(Clone)]
pub struct Gate {
    pub state: AppState,
    pub permission: Permission,
}

pub async fn admit(State(gate): State<Gate>, mut request: Request, next: Next) -> Response {
    let credential = credential(request.headers()).map(str::to_owned);
    let ip = client_ip(
        request.headers(),
        request.extensions(),
        &gate.state.trusted_proxies,
    );

    let admission = match gate
        .state
        .gate
        .authorize(credential.as_deref(), ip, gate.permission)
        .await
    {
        Ok(admission) => admission,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let rate = admission.rate;
    request.extensions_mut().insert(admission);
    let mut response = next.run(request).await;
    apply_rate_headers(response.headers_mut(), &rate);
    response
}

/// Presented API key, if any. An empty value counts as absent.
fn credential(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        });
    bearer
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        })
        .filter(|key| !key.is_empty())
}

/// Address a request is attributed to.
///
/// Behind trusted proxies the client is the rightmost `X-Forwarded-For`
/// entry that is not itself a trusted proxy. Entries further left were
/// written by the client and are ignored.
fn client_ip(headers: &HeaderMap, extensions: &Extensions, trusted: &[IpAddr]) -> Option<IpAddr> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())?;
    if !trusted.contains(&peer) {
        return Some(peer);
    }
    let forwarded: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|entry| entry.trim().parse().ok())
        .collect();
    let client = forwarded
        .into_iter()
        .rev()
        .find(|ip| !trusted.contains(ip))
        .unwrap_or(peer);
    Some(client)
}

pub fn apply_rate_headers(headers: &mut HeaderMap, rate: &RateDecision) {
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(rate.limit));
    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(rate.remaining));
    if let Some(reset) = rate
        .reset_at
        .format(&Rfc3339)
        .ok()
        .and_then(|s| HeaderValue::from_str(&s).ok())
    {
        headers.insert(RATE_LIMIT_RESET_HEADER, reset);
    }
}

/// The caller's IP address, resolved like the admission gate does.
pub struct ClientIp(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip(
            &parts.headers,
            &parts.extensions,
            &state.trusted_proxies,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(credential(&headers), None);

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("mq_a_b"));
        assert_eq!(credential(&headers), Some("mq_a_b"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer mq_c_d"));
        assert_eq!(credential(&headers), Some("mq_c_d"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(credential(&headers), Some("mq_a_b"));

        let mut empty = HeaderMap::new();
        empty.insert(API_KEY_HEADER, HeaderValue::from_static(" "));
        assert_eq!(credential(&empty), None);
    }

    fn peer(ip: [u8; 4]) -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from((ip, 4000))));
        extensions
    }

    #[test]
    fn test_forwarded_for_ignored_from_untrusted_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5"));

        assert_eq!(
            client_ip(&headers, &peer([198, 51, 100, 20]), &[]),
            Some(IpAddr::from([198, 51, 100, 20]))
        );
        let proxy = IpAddr::from([10, 0, 0, 1]);
        assert_eq!(
            client_ip(&headers, &peer([198, 51, 100, 20]), &[proxy]),
            Some(IpAddr::from([198, 51, 100, 20]))
        );
        assert_eq!(client_ip(&headers, &Extensions::new(), &[proxy]), None);
    }

    #[test]
    fn test_forwarded_for_from_trusted_proxy() {
        let proxies = [IpAddr::from([10, 0, 0, 1]), IpAddr::from([10, 0, 0, 2])];
        let mut headers = HeaderMap::new();

        // No header: the proxy itself is the caller.
        assert_eq!(
            client_ip(&headers, &peer([10, 0, 0, 1]), &proxies),
            Some(IpAddr::from([10, 0, 0, 1]))
        );

        // The client prepended a forged entry; the proxies appended the
        // real address and their own.
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 203.0.113.5, 10.0.0.2"),
        );
        assert_eq!(
            client_ip(&headers, &peer([10, 0, 0, 1]), &proxies),
            Some(IpAddr::from([203, 0, 113, 5]))
        );
    }
}
