//! axum adapter: hands every request to the endpoint router, one scope per
//! request.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::composition::IdentityServer;
use crate::container::Scope;
use crate::endpoints::{parse_urlencoded, EndpointRouter, RequestContext};
use crate::error::TollgateResult;
use crate::services::{CorsPolicy, CorsPolicyProvider};

/// Form bodies above this size are rejected.
const MAX_FORM_BYTES: usize = 1024 * 1024;

pub fn router(server: Arc<IdentityServer>) -> Router {
    Router::new().fallback(dispatch).with_state(server)
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(server: Arc<IdentityServer>, addr: SocketAddr) -> TollgateResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!(
        "host:listen addr={} endpoints={}",
        listener.local_addr()?,
        server.endpoints().len()
    );
    axum::serve(listener, router(server)).await?;
    Ok(())
}

async fn dispatch(State(server): State<Arc<IdentityServer>>, request: Request) -> Response {
    let context = match request_context(request).await {
        Ok(context) => context,
        Err(status) => return status.into_response(),
    };
    let origin = context.header(header::ORIGIN).map(str::to_string);

    let scope = server.create_scope();
    let cors = match &origin {
        Some(origin) => match scope.resolve::<dyn CorsPolicyProvider>() {
            Ok(provider) => provider.policy(&context.path, origin),
            Err(e) => {
                log::error!("host:cors path={} error={}", context.path, e);
                None
            }
        },
        None => None,
    };
    if context.method == Method::OPTIONS && origin.is_some() {
        let status = if cors.is_some() {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::FORBIDDEN
        };
        return with_cors(status.into_response(), cors.as_ref());
    }

    let response = match handle(&scope, &context).await {
        Ok(response) => response,
        Err(e) => {
            log::error!(
                "host:request method={} path={} scope={} error={}",
                context.method,
                context.path,
                scope.id(),
                e
            );
            StatusCode::from(e).into_response()
        }
    };
    with_cors(response, cors.as_ref())
}

async fn handle(
    scope: &Scope,
    context: &RequestContext,
) -> TollgateResult<Response> {
    let router = scope.resolve::<dyn EndpointRouter>()?;
    let Some(descriptor) = router.find(context) else {
        log::debug!("host:route path={} result=not_found", context.path);
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let handler = descriptor.create_handler(scope)?;
    log::info!(
        "host:request method={} path={} endpoint={}",
        context.method,
        context.path,
        descriptor.name()
    );
    let result = handler.process(context).await?;
    Ok(result.into_response())
}

async fn request_context(request: Request) -> Result<RequestContext, StatusCode> {
    let (parts, body) = request.into_parts();
    let mut context = RequestContext::new(parts.method, parts.uri.path());
    context.headers = parts.headers;
    if let Some(query) = parts.uri.query() {
        context.query = parse_urlencoded(query.as_bytes());
    }
    if context.is_form_post() {
        context.form = read_form(body).await?;
    }
    Ok(context)
}

async fn read_form(body: Body) -> Result<std::collections::HashMap<String, String>, StatusCode> {
    let bytes = to_bytes(body, MAX_FORM_BYTES).await.map_err(|e| {
        log::warn!("host:body error={}", e);
        StatusCode::PAYLOAD_TOO_LARGE
    })?;
    Ok(parse_urlencoded(&bytes))
}

/// Headers come from the policy resolved for this request's scope, so a
/// host decorator on `CorsPolicyProvider` takes effect per request.
fn with_cors(mut response: Response, policy: Option<&CorsPolicy>) -> Response {
    let Some(policy) = policy else {
        return response;
    };
    let headers = response.headers_mut();
    if let Ok(origin) = HeaderValue::from_str(&policy.allowed_origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
    if let Ok(methods) = HeaderValue::from_str(&policy.allowed_methods.join(", ")) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
    }
    if let Ok(allowed) = HeaderValue::from_str(&policy.allowed_headers.join(", ")) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allowed);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ServiceCollection;
    use axum::http::Request;
    use tower::ServiceExt;

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::HOST, "login.example.com")
            .body(Body::empty())
            .unwrap()
    }

    fn app() -> Router {
        let server = crate::composition::assemble(ServiceCollection::new()).unwrap();
        router(Arc::new(server))
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let response = app()
            .oneshot(get("/nothing/here"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn discovery_is_served() {
        let response = app()
            .oneshot(get("/.well-known/openid-configuration"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc["issuer"], "http://login.example.com");
    }

    fn spa_app() -> Router {
        let mut spa = crate::protocol::Client::new("spa");
        spa.allowed_cors_origins = vec!["https://app.example.com".into()];
        let options = crate::config::ServerOptions {
            clients: vec![spa],
            ..Default::default()
        };
        let server = crate::composition::assemble_with(ServiceCollection::new(), options).unwrap();
        router(Arc::new(server))
    }

    fn preflight(uri: &str, origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri(uri)
            .header(header::HOST, "login.example.com")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn preflight_allows_a_client_origin() {
        let response = spa_app()
            .oneshot(preflight("/connect/token", "https://app.example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example.com");
        assert_eq!(headers[header::VARY], "Origin");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST");
    }

    #[tokio::test]
    async fn preflight_from_unknown_origin_is_forbidden() {
        let response = spa_app()
            .oneshot(preflight("/connect/token", "https://evil.example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn cross_origin_get_carries_the_allowed_origin() {
        let request = Request::builder()
            .uri("/.well-known/openid-configuration")
            .header(header::HOST, "login.example.com")
            .header(header::ORIGIN, "https://app.example.com")
            .body(Body::empty())
            .unwrap();
        let response = spa_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
    }

    #[tokio::test]
    async fn token_endpoint_rejects_get() {
        let response = app()
            .oneshot(get("/connect/token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
