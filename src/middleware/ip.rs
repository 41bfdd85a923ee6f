use axum::{
    extract::{connect_info::ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Client address for rate limiting.
///
/// With `trust_proxy` set: the first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer. Otherwise the headers are ignored.
/// Loopback when nothing is known.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> IpAddr {
    let fallback = peer.unwrap_or(IpAddr::from([127, 0, 0, 1]));
    if !trust_proxy {
        return fallback;
    }
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|hv| hv.to_str().ok())
        .and_then(|h| h.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    let real = || {
        headers
            .get("x-real-ip")
            .and_then(|hv| hv.to_str().ok())
            .and_then(|h| h.trim().parse::<IpAddr>().ok())
    };
    forwarded.or_else(real).unwrap_or(fallback)
}

/// Peer address when the server was started with connect info; absent in
/// tests that call the router directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaybeRemoteAddr(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for MaybeRemoteAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match ConnectInfo::<SocketAddr>::from_request_parts(parts, state).await {
            Ok(ConnectInfo(addr)) => Ok(MaybeRemoteAddr(Some(addr))),
            Err(_) => Ok(MaybeRemoteAddr(None)),
        }
    }
}
