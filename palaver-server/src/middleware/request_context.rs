use std::str::FromStr;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use shared::config::Config;
use uuid::Uuid;

/// Per-request context made available to handlers via extensions.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    /// Correlation id, echoed back on the response.
    pub request_id: String,
}

/// Header the correlation id travels in, resolved from config once.
#[derive(Clone)]
pub struct RequestIdState {
    header: HeaderName,
}

impl RequestIdState {
    pub fn from_config(config: &Config) -> Self {
        let header = HeaderName::from_str(&config.server.request_id_header)
            .unwrap_or_else(|_| HeaderName::from_static("x-request-id"));
        Self { header }
    }
}

/// Adopts the caller's correlation id or mints a fresh UUID, then makes
/// it available three ways: request extension, forwarded request header,
/// response header. Correlation is best-effort by contract, so nothing
/// in here can fail the request.
pub async fn assign_request_id(
    State(state): State<RequestIdState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let (request_id, header_value) = adopt_or_mint(request.headers().get(&state.header));

    request
        .extensions_mut()
        .insert(RequestContext { request_id });
    request
        .headers_mut()
        .insert(state.header.clone(), header_value.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(state.header, header_value);
    response
}

/// Keeps a non-blank inbound id; anything absent or unusable is
/// replaced by a minted UUIDv4, which always encodes as a header.
fn adopt_or_mint(inbound: Option<&HeaderValue>) -> (String, HeaderValue) {
    let adopted = inbound
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .and_then(|id| {
            HeaderValue::from_str(id)
                .ok()
                .map(|value| (id.to_string(), value))
        });

    adopted.unwrap_or_else(|| {
        let minted = Uuid::new_v4().to_string();
        let value =
            HeaderValue::from_str(&minted).unwrap_or_else(|_| HeaderValue::from_static("unset"));
        (minted, value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_ids_are_adopted_after_trimming() {
        let value = HeaderValue::from_static("  flow-42  ");
        let (id, header) = adopt_or_mint(Some(&value));
        assert_eq!(id, "flow-42");
        assert_eq!(header, HeaderValue::from_static("flow-42"));
    }

    #[test]
    fn blank_or_missing_ids_are_minted_as_uuids() {
        let blank = HeaderValue::from_static("   ");
        let (from_blank, _) = adopt_or_mint(Some(&blank));
        assert!(Uuid::parse_str(&from_blank).is_ok());

        let (from_missing, header) = adopt_or_mint(None);
        assert!(Uuid::parse_str(&from_missing).is_ok());
        assert_eq!(header.to_str().unwrap(), from_missing);
    }

    #[test]
    fn request_id_state_falls_back_on_invalid_header_names() {
        let mut config = Config::with_defaults();
        config.server.request_id_header = "not a header\n".to_string();
        let state = RequestIdState::from_config(&config);
        assert_eq!(state.header, HeaderName::from_static("x-request-id"));
    }
}
