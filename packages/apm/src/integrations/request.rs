// packages/apm/src/integrations/request.rs
//! Request span plugin shared by the framework integrations

use crate::interception::wrapper::TracePlugin;
use crate::recording::span::SpanRecord;
use hyper::{Method, Request, Response, StatusCode, Uri};

/// Records method, target and status of an inbound HTTP request.
/// Responses with a status of 400 or above mark the span as an error.
#[derive(Debug, Clone, Default)]
pub struct RequestPlugin;

impl RequestPlugin {
    /// Record method, path and query of an incoming request
    pub fn record_request(span: &mut SpanRecord, method: &Method, uri: &Uri) {
        span.set_attribute("http.method", method.as_str());
        span.set_attribute("http.uri", uri.path());
        if let Some(query) = uri.query() {
            span.set_attribute("http.query", query);
        }
    }

    /// Record the response status; 4xx and 5xx mark the span as failed
    pub fn record_status(span: &mut SpanRecord, status: StatusCode) {
        span.set_attribute("http.status_code", status.as_u16().to_string());
        if status.is_client_error() || status.is_server_error() {
            span.set_error(format!("HTTP {}", status));
        }
    }
}

impl<B, C> TracePlugin<Request<B>, Response<C>> for RequestPlugin {
    fn on_before(&self, span: &mut SpanRecord, req: &Request<B>) {
        Self::record_request(span, req.method(), req.uri());
    }

    fn on_end(&self, span: &mut SpanRecord, resp: &Response<C>) {
        Self::record_status(span, resp.status());
    }
}
