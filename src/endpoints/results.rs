//! What an endpoint hands back to the host: something that renders itself as
//! an HTTP response.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crate::protocol::constants::errors;
use crate::protocol::ProtocolError;

pub trait EndpointResult: Send {
    fn into_response(self: Box<Self>) -> Response;
}

fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, max-age=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// JSON body. Token-bearing responses must not be cached.
pub struct JsonResult {
    pub status: StatusCode,
    pub body: Value,
    pub cacheable: bool,
}

impl JsonResult {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            cacheable: false,
        }
    }

    /// Public metadata such as discovery documents.
    pub fn cacheable(body: Value) -> Self {
        Self {
            cacheable: true,
            ..Self::ok(body)
        }
    }
}

impl EndpointResult for JsonResult {
    fn into_response(self: Box<Self>) -> Response {
        let response = (self.status, Json(self.body)).into_response();
        if self.cacheable {
            response
        } else {
            no_store(response)
        }
    }
}

/// OAuth error body (RFC 6749 §5.2).
pub struct ProtocolErrorResult {
    pub status: StatusCode,
    pub error: ProtocolError,
}

impl ProtocolErrorResult {
    /// Status follows the error code: client and token failures are 401.
    pub fn new(error: ProtocolError) -> Self {
        let status = match error.error.as_str() {
            errors::INVALID_CLIENT
            | errors::INVALID_TOKEN => StatusCode::UNAUTHORIZED,
            errors::INSUFFICIENT_SCOPE => StatusCode::FORBIDDEN,
            errors::SERVER_ERROR => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self { status, error }
    }
}

impl EndpointResult for ProtocolErrorResult {
    fn into_response(self: Box<Self>) -> Response {
        let mut response = no_store((self.status, Json(&self.error)).into_response());
        if self.status == StatusCode::UNAUTHORIZED || self.status == StatusCode::FORBIDDEN {
            let challenge = format!(
                "Bearer error=\"{}\", error_description=\"{}\"",
                self.error.error,
                self.error.error_description.replace('"', "'")
            );
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

/// `302 Found` to `location`.
pub struct RedirectResult {
    pub location: String,
}

impl RedirectResult {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    /// `base` with `params` appended to its query string.
    pub fn with_query(base: &str, params: &[(&str, &str)]) -> Self {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in params {
            serializer.append_pair(k, v);
        }
        let query = serializer.finish();
        let separator = if base.contains('?') { '&' } else { '?' };
        Self::new(format!("{}{}{}", base, separator, query))
    }
}

impl EndpointResult for RedirectResult {
    fn into_response(self: Box<Self>) -> Response {
        match HeaderValue::from_str(&self.location) {
            Ok(location) => {
                let mut response = StatusCode::FOUND.into_response();
                response.headers_mut().insert(header::LOCATION, location);
                no_store(response)
            }
            Err(_) => {
                log::error!("endpoint:redirect invalid location={:?}", self.location);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

pub struct HtmlResult {
    pub html: String,
}

impl EndpointResult for HtmlResult {
    fn into_response(self: Box<Self>) -> Response {
        no_store(Html(self.html).into_response())
    }
}

pub struct StatusCodeResult(pub StatusCode);

impl EndpointResult for StatusCodeResult {
    fn into_response(self: Box<Self>) -> Response {
        self.0.into_response()
    }
}
