use std::{
    borrow::Cow,
    convert::Infallible,
    future::Future,
    net::SocketAddr,
};

use axum::{
    response::{
        IntoResponse,
        Response,
    },
    routing::get,
    Json,
    Router,
};
use errors::ErrorMetadataAnyhowExt;
use http::StatusCode;
use serde::{
    Deserialize,
    Serialize,
};
use tokio::net::TcpSocket;
use tower::{
    limit::GlobalConcurrencyLimitLayer,
    ServiceBuilder,
};

use crate::{
    errors::report_error,
    knobs::HTTP_SERVER_TCP_BACKLOG,
};

/// `HttpError` is used as a vehicle for getting client facing error messages
/// to clients on the HTTP protocol. Errors that are tagged with ErrorMetadata
/// can be used to build these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    /// HTTP Status Code
    status_code: StatusCode,
    /// Human-readable error code sent in HTTP response
    error_code: Cow<'static, str>,
    /// Detailed customer-facing error message sent in HTTP response
    msg: Cow<'static, str>,
}

impl HttpError {
    pub fn new<S, T>(status_code: StatusCode, error_code: S, msg: T) -> Self
    where
        S: Into<Cow<'static, str>>,
        T: Into<Cow<'static, str>>,
    {
        Self {
            status_code,
            error_code: error_code.into(),
            msg: msg.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn error_code(&self) -> &str {
        &self.error_code
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn into_response(self) -> Response {
        if self.msg.is_empty() && self.error_code.is_empty() {
            self.status_code.into_response()
        } else {
            (
                self.status_code,
                Json(ResponseErrorMessage {
                    code: self.error_code,
                    message: self.msg,
                }),
            )
                .into_response()
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ResponseErrorMessage {
    code: Cow<'static, str>,
    message: Cow<'static, str>,
}

/// `HttpResponseError` is used to convert `anyhow::Error` (and
/// `HttpError` inside it if present) into `http::Response` that is returned
/// from the HTTP middleware. All HTTP handlers should return
/// `HttpResponseError`s. Errors are logged in the `IntoResponse` impl, the
/// exit point of the HTTP layer.
#[derive(Debug)]
pub struct HttpResponseError {
    trace: anyhow::Error,
    http_error: HttpError,
}

impl From<Infallible> for HttpResponseError {
    fn from(x: Infallible) -> Self {
        match x {}
    }
}

impl IntoResponse for HttpResponseError {
    fn into_response(mut self) -> Response {
        // This is the only place we log errors because it is the exit point of
        // the HTTP layer
        report_error(&mut self.trace);
        self.http_error.into_response()
    }
}

impl From<anyhow::Error> for HttpResponseError {
    fn from(err: anyhow::Error) -> HttpResponseError {
        let http_error = HttpError {
            status_code: err.http_status(),
            error_code: err.short_msg().to_string().into(),
            msg: err.msg().to_string().into(),
        };
        Self {
            trace: err,
            http_error,
        }
    }
}

impl From<HttpResponseError> for anyhow::Error {
    fn from(value: HttpResponseError) -> Self {
        value.trace
    }
}

/// Router + middleware for one of our HTTP services.
pub struct TfaasHttpService {
    router: Router,
    service_name: &'static str,
    version: String,
}

impl TfaasHttpService {
    pub fn new(
        router: Router,
        service_name: &'static str,
        version: String,
        max_concurrency: usize,
    ) -> Self {
        let router =
            router.layer(ServiceBuilder::new().layer(GlobalConcurrencyLimitLayer::new(
                max_concurrency,
            )));
        Self {
            router,
            service_name,
            version,
        }
    }

    /// Routes not handled by the passed-in router.
    fn meta_routes(&self) -> Router {
        let version = self.version.clone();
        Router::new().route("/version", get(move || async move { version }))
    }

    pub async fn serve<F: Future<Output = ()> + Send + 'static>(
        self,
        addr: SocketAddr,
        shutdown: F,
    ) -> anyhow::Result<()> {
        let meta_routes = self.meta_routes();
        let router = self.router.merge(meta_routes);
        tracing::info!("{} listening on {addr}", self.service_name);
        serve_http(router, addr, shutdown).await
    }
}

/// Serves an HTTP server using the given router.
pub async fn serve_http<F>(router: Router, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    // Set SO_REUSEADDR and a bounded TCP accept backlog for our server's
    // listening socket. Set TCP_NODELAY on accepted connections.
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.set_nodelay(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(*HTTP_SERVER_TCP_BACKLOG)?;

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use errors::ErrorMetadata;
    use http::StatusCode;

    use super::HttpResponseError;

    #[test]
    fn test_http_response_error_from_tagged_error() {
        let err: anyhow::Error =
            ErrorMetadata::bad_request("InvalidFunctionName", "name must be alphanumeric").into();
        let http_response_err: HttpResponseError = err.into();
        assert_eq!(
            http_response_err.http_error.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(http_response_err.http_error.error_code(), "InvalidFunctionName");
        assert_eq!(
            http_response_err.http_error.message(),
            "name must be alphanumeric"
        );
    }

    #[test]
    fn test_http_response_error_from_untagged_error() {
        let err = anyhow::anyhow!("kaboom");
        let http_response_err: HttpResponseError = err.into();
        assert_eq!(
            http_response_err.http_error.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
