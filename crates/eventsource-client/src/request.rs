//! Request target resolution and HTTP request rendering.

use std::collections::HashMap;
use std::fmt::Write as _;

use eventsource_transport::Endpoint;
use url::{Host, Url};

use crate::error::{EventSourceError, EventSourceResult};

/// Everything derived from the configured URI that every (re)connect needs.
#[derive(Debug, Clone)]
pub(crate) struct RequestTarget {
    /// The URI exactly as configured; also the origin of every event
    uri: String,
    endpoint: Endpoint,
    host_header: String,
    origin_header: String,
    path_and_query: String,
}

impl RequestTarget {
    /// Resolves `uri` into an endpoint and the request line pieces.
    pub(crate) fn parse(uri: &str) -> EventSourceResult<Self> {
        let invalid = |reason: &str| EventSourceError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(invalid(&format!("unsupported scheme '{other}'"))),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(invalid("missing host")),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        // host_str keeps IPv6 brackets, which is what the headers need
        let host_str = url.host_str().unwrap_or(&host);
        let host_header = match url.port() {
            Some(explicit) => format!("{host_str}:{explicit}"),
            None => host_str.to_string(),
        };
        let origin_header = format!("http://{host_str}");

        let mut path_and_query = url.path().to_string();
        if let Some(query) = url.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        Ok(Self {
            uri: uri.to_string(),
            endpoint: Endpoint::new(host, port, secure),
            origin_header,
            host_header,
            path_and_query,
        })
    }

    pub(crate) fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Renders the GET request sent on every connection attempt.
    ///
    /// Custom headers are emitted in name order after the standard ones.
    pub(crate) fn render(
        &self,
        last_event_id: Option<&str>,
        headers: &HashMap<String, String>,
    ) -> String {
        let mut request = String::with_capacity(256);
        let _ = write!(request, "GET {} HTTP/1.1\r\n", self.path_and_query);
        request.push_str("Accept: text/event-stream\r\n");
        let _ = write!(request, "Host: {}\r\n", self.host_header);
        let _ = write!(request, "Origin: {}\r\n", self.origin_header);
        request.push_str("Cache-Control: no-cache\r\n");
        if let Some(id) = last_event_id
            && !id.is_empty()
        {
            let _ = write!(request, "Last-Event-ID: {id}\r\n");
        }

        let mut custom: Vec<_> = headers.iter().collect();
        custom.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in custom {
            let _ = write!(request, "{name}: {value}\r\n");
        }

        request.push_str("\r\n");
        request
    }
}

/// Rejects header names and values that would corrupt the request.
pub(crate) fn validate_header(name: &str, value: &str) -> EventSourceResult<()> {
    if name.is_empty() {
        return Err(EventSourceError::Configuration(
            "header name must not be empty".to_string(),
        ));
    }
    if name
        .chars()
        .any(|c| matches!(c, '\r' | '\n' | ':' | ' ' | '\t'))
    {
        return Err(EventSourceError::Configuration(format!(
            "invalid header name '{}'",
            name.escape_debug()
        )));
    }
    if value.contains(['\r', '\n']) {
        return Err(EventSourceError::Configuration(format!(
            "invalid value for header '{name}'"
        )));
    }
    Ok(())
}
