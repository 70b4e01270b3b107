//! Dispatcher is a Kubernetes admission webhook handler.
//!
//! It accepts `admission.k8s.io/v1` AdmissionReview requests, hands them to a [`Decide`]
//! implementation, and answers with an AdmissionReview carrying the verdict. The bundled
//! [`AllowAll`] decision admits everything.
//!
//! [`Decide`]: decide::Decide
//! [`AllowAll`]: decide::AllowAll

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use tower_http::trace::TraceLayer;

pub mod decide;
pub mod handler;
pub mod scheme;
pub mod v1;

pub use handler::Dispatcher;

/// BODY_LIMIT is the largest request body accepted.
pub const BODY_LIMIT: usize = 4 << 20;

/// Error is every way a review can fail. Each maps to an HTTP status via [`Error::status`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("contentType={0}, expect application/json")]
    ContentType(String),
    #[error("Request could not be decoded: {0}")]
    Decode(#[from] scheme::DecodeError),
    #[error("Request could not be decoded: AdmissionReview has no request")]
    MissingRequest,
    #[error("Unsupported group version kind: {0}")]
    UnsupportedKind(v1::GroupVersionKind),
    #[error("Expected v1.AdmissionReview but got: {0}")]
    UnexpectedType(&'static str),
    #[error("{0}")]
    Encode(#[source] serde_json::Error),
}

impl Error {
    /// Status is the HTTP status code reported for the error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::ContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::Decode(_) | Error::MissingRequest | Error::UnsupportedKind(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::UnexpectedType(_) | Error::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (
            self.status(),
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            self.to_string(),
        )
            .into_response()
    }
}

/// Result typedef for the dispatcher.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// App returns a Router serving `dispatcher` on POST `path`.
///
/// Panics if `path` doesn't start with a `/`.
pub fn app<P: AsRef<str>>(dispatcher: Dispatcher, path: P) -> Router {
    Router::new()
        .route(path.as_ref(), post(handler::serve))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(dispatcher))
}
