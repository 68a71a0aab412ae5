use std::collections::HashMap;

use axum::http::{header, HeaderMap, HeaderValue, Method};

use crate::config::ServerOptions;

/// Everything a handler sees of the incoming HTTP request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub form: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            query: HashMap::new(),
            form: HashMap::new(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_form(mut self, key: &str, value: &str) -> Self {
        self.form.insert(key.to_string(), value.to_string());
        self
    }

    /// Query string for GET, form body otherwise.
    pub fn params(&self) -> &HashMap<String, String> {
        if self.method == Method::GET {
            &self.query
        } else {
            &self.form
        }
    }

    /// Deserialize the request parameters into a protocol message.
    pub fn parse_params<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .params()
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map))
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_form_post(&self) -> bool {
        self.method == Method::POST
            && self
                .header(header::CONTENT_TYPE)
                .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
    }

    /// Value of a request cookie.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }

    /// Issuer for this request: the configured one, or derived from `Host`.
    pub fn issuer(&self, options: &ServerOptions) -> String {
        if let Some(issuer) = &options.issuer_uri {
            return issuer.trim_end_matches('/').to_string();
        }
        let host = self.header(header::HOST).unwrap_or("localhost");
        format!("http://{}", host)
    }
}

/// Parse an `application/x-www-form-urlencoded` payload.
pub fn parse_urlencoded(input: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookies_are_split_per_pair() {
        let ctx = RequestContext::get("/connect/checksession")
            .with_header(header::COOKIE, "theme=dark; idsrv=abc123; idsrv.session=S1");
        assert_eq!(ctx.cookie("idsrv").as_deref(), Some("abc123"));
        assert_eq!(ctx.cookie("idsrv.session").as_deref(), Some("S1"));
        assert!(ctx.cookie("missing").is_none());
    }

    #[test]
    fn issuer_prefers_configured_value() {
        let ctx = RequestContext::get("/").with_header(header::HOST, "auth.local:5000");
        assert_eq!(ctx.issuer(&ServerOptions::default()), "http://auth.local:5000");

        let options = ServerOptions {
            issuer_uri: Some("https://login.example.com/".into()),
            ..Default::default()
        };
        assert_eq!(ctx.issuer(&options), "https://login.example.com");
    }

    #[test]
    fn params_follow_the_method() {
        let get = RequestContext::get("/").with_query("a", "1").with_form("a", "2");
        let post = RequestContext::post("/").with_query("a", "1").with_form("a", "2");
        assert_eq!(get.params()["a"], "1");
        assert_eq!(post.params()["a"], "2");
    }

    #[test]
    fn urlencoded_payload_is_decoded() {
        let params = parse_urlencoded(b"grant_type=client_credentials&scope=a+b%20c");
        assert_eq!(params["grant_type"], "client_credentials");
        assert_eq!(params["scope"], "a b c");
    }
}
