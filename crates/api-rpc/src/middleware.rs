//! HTTP middleware
//!
//! Copies the `Authorization` header into the request extensions, where the
//! RPC method callbacks can read it.

use http::header::AUTHORIZATION;
use http::Request;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Raw `Authorization` header of the HTTP request carrying the call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationHeader(pub Option<String>);

impl AuthorizationHeader {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuthHeaderLayer;

impl<S> Layer<S> for AuthHeaderLayer {
    type Service = AuthHeaderService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthHeaderService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct AuthHeaderService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for AuthHeaderService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        // Non-UTF-8 values count as missing
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        request
            .extensions_mut()
            .insert(AuthorizationHeader(header));
        self.inner.call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    async fn captured(request: Request<()>) -> Option<String> {
        let svc = AuthHeaderLayer.layer(service_fn(|req: Request<()>| async move {
            Ok::<_, Infallible>(req.extensions().get::<AuthorizationHeader>().cloned())
        }));
        svc.oneshot(request)
            .await
            .unwrap()
            .expect("extension must always be set")
            .0
    }

    #[tokio::test]
    async fn test_header_is_copied() {
        let request = Request::builder()
            .header(AUTHORIZATION, "Bearer abc")
            .body(())
            .unwrap();
        assert_eq!(captured(request).await.as_deref(), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_missing_header_is_none() {
        let request = Request::builder().body(()).unwrap();
        assert_eq!(captured(request).await, None);
    }
}
