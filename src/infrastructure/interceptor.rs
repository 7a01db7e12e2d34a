//! Network response interception and envelope decoding
//!
//! The page-composition API answers every navigation with an envelope whose
//! `widgetStates` map carries JSON-encoded strings keyed by opaque widget
//! identifiers. The interceptor filters the session's response stream by
//! path pattern, drops duplicate deliveries, and second-parses each widget
//! value. Non-JSON widget values and envelopes without a widget map are
//! skipped quietly - "no data this pass" is not an error.

use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::browser::NetworkResponse;
use super::parsing::WidgetMap;

/// Interception configuration
#[derive(Debug, Clone)]
pub struct InterceptConfig {
    /// URL substrings that identify composition-API responses
    pub path_patterns: Vec<String>,
    /// Bound for the driver-side response channel
    pub buffer_size: usize,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            path_patterns: vec![
                "/api/composer-api.bx/page/json/v2".to_string(),
                "/api/entrypoint-api.bx/page/json/v2".to_string(),
                "searchResultsV2".to_string(),
            ],
            buffer_size: 64,
        }
    }
}

/// One decoded response: source URL plus its second-parsed widget map
#[derive(Debug, Clone)]
pub struct WidgetEnvelope {
    pub url: String,
    pub widgets: WidgetMap,
}

/// Filters and decodes the session's network responses
pub struct ResponseInterceptor {
    config: InterceptConfig,
    seen_bodies: HashSet<[u8; 32]>,
}

impl Default for ResponseInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseInterceptor {
    pub fn new() -> Self {
        Self::with_config(InterceptConfig::default())
    }

    pub fn with_config(config: InterceptConfig) -> Self {
        Self {
            config,
            seen_bodies: HashSet::new(),
        }
    }

    /// Whether a response URL matches the watched API paths
    pub fn matches(&self, url: &str) -> bool {
        self.config
            .path_patterns
            .iter()
            .any(|pattern| url.contains(pattern.as_str()))
    }

    /// Reset duplicate tracking at a navigation boundary. The same payload
    /// may legitimately reappear on a later navigation; within one it is a
    /// duplicate delivery.
    pub fn begin_navigation(&mut self) {
        self.seen_bodies.clear();
    }

    /// Decode one observed response into a widget envelope.
    /// Returns `None` for non-matching paths, error statuses, duplicate
    /// deliveries, undecodable bodies, and envelopes without widget data.
    pub fn accept(&mut self, response: &NetworkResponse) -> Option<WidgetEnvelope> {
        if response.status != 200 || !self.matches(&response.url) {
            return None;
        }
        if !self.seen_bodies.insert(*blake3::hash(response.body.as_bytes()).as_bytes()) {
            trace!("duplicate response for {} dropped", response.url);
            return None;
        }

        let widgets = decode_widget_states(&response.body);
        if widgets.is_empty() {
            debug!("response {} carried no widget states", response.url);
            return None;
        }
        Some(WidgetEnvelope {
            url: response.url.clone(),
            widgets,
        })
    }

    /// Drain everything currently buffered on the response channel.
    pub fn drain(&mut self, rx: &mut mpsc::Receiver<NetworkResponse>) -> Vec<WidgetEnvelope> {
        let mut envelopes = Vec::new();
        while let Ok(response) = rx.try_recv() {
            if let Some(envelope) = self.accept(&response) {
                envelopes.push(envelope);
            }
        }
        envelopes
    }
}

/// Second-parse pass over the envelope's widget map. Values arrive as
/// JSON-encoded strings; plain-string values that do not parse are skipped,
/// and structured values pass through as-is.
pub fn decode_widget_states(body: &str) -> WidgetMap {
    let Ok(envelope) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    let Some(states) = envelope.pointer("/widgetStates").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut widgets = Vec::new();
    for (key, value) in states {
        match value {
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(parsed) => widgets.push((key.clone(), parsed)),
                Err(_) => trace!("widget '{}' value is not JSON, skipped", key),
            },
            other => widgets.push((key.clone(), other.clone())),
        }
    }
    widgets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(url: &str, body: &str) -> NetworkResponse {
        NetworkResponse {
            url: url.to_string(),
            status: 200,
            body: body.to_string(),
        }
    }

    const ENVELOPE: &str = r#"{
        "widgetStates": {
            "webPrice-123-default-1": "{\"price\": \"1 999 ₽\"}",
            "webBanner-1-default-1": "just text, not json",
            "structured-1": {"already": "parsed"}
        }
    }"#;

    #[test]
    fn envelope_decodes_with_field_isolation() {
        let mut interceptor = ResponseInterceptor::new();
        let envelope = interceptor
            .accept(&response(
                "https://www.ozon.ru/api/composer-api.bx/page/json/v2?url=/product/x-1234567/",
                ENVELOPE,
            ))
            .unwrap();
        // The non-JSON widget is skipped, the rest survive
        assert_eq!(envelope.widgets.len(), 2);
        assert!(envelope.widgets.iter().any(|(k, _)| k.starts_with("webPrice")));
    }

    #[test]
    fn non_matching_paths_are_ignored() {
        let mut interceptor = ResponseInterceptor::new();
        assert!(interceptor
            .accept(&response("https://www.ozon.ru/api/other/endpoint", ENVELOPE))
            .is_none());
    }

    #[test]
    fn duplicate_delivery_is_dropped_until_next_navigation() {
        let mut interceptor = ResponseInterceptor::new();
        let url = "https://www.ozon.ru/api/entrypoint-api.bx/page/json/v2?url=/search/";
        assert!(interceptor.accept(&response(url, ENVELOPE)).is_some());
        assert!(interceptor.accept(&response(url, ENVELOPE)).is_none());

        interceptor.begin_navigation();
        assert!(interceptor.accept(&response(url, ENVELOPE)).is_some());
    }

    #[test]
    fn missing_widget_states_is_no_data_not_error() {
        let mut interceptor = ResponseInterceptor::new();
        let url = "https://www.ozon.ru/api/composer-api.bx/page/json/v2?url=/x/";
        assert!(interceptor.accept(&response(url, r#"{"layout": []}"#)).is_none());
        assert!(interceptor.accept(&response(url, "not json at all")).is_none());
    }

    #[test]
    fn error_status_is_ignored() {
        let mut interceptor = ResponseInterceptor::new();
        let mut resp = response(
            "https://www.ozon.ru/api/composer-api.bx/page/json/v2?url=/x/",
            ENVELOPE,
        );
        resp.status = 403;
        assert!(interceptor.accept(&resp).is_none());
    }
}
