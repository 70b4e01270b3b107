//! Handler turns an HTTP request carrying an AdmissionReview into the HTTP response.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::{
    Error, Result,
    decide::Decide,
    scheme::Scheme,
    v1::{AdmissionReview, GroupVersionKind},
};

/// CONTENT_TYPE_JSON is the only media type accepted, and the one responses are sent as.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Dispatcher holds everything a request needs: the scheme to decode with and the decision to
/// apply.
pub struct Dispatcher {
    scheme: Scheme,
    decider: Box<dyn Decide>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// New returns a Dispatcher deciding with `decider`.
    pub fn new<D: Decide + 'static>(scheme: Scheme, decider: D) -> Self {
        Self {
            scheme,
            decider: Box::new(decider),
        }
    }

    /// Review validates and decodes `body`, runs the decision, and returns the response envelope.
    pub fn review(
        &self,
        content_type: Option<&HeaderValue>,
        body: &[u8],
    ) -> Result<AdmissionReview> {
        let content_type = content_type
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default();
        if content_type != CONTENT_TYPE_JSON {
            return Err(Error::ContentType(content_type));
        }

        debug!(body = %String::from_utf8_lossy(body), "handling request");
        let (obj, gvk) = self.scheme.decode(body)?;
        if gvk != GroupVersionKind::admission_review() {
            return Err(Error::UnsupportedKind(gvk));
        }
        let requested = obj
            .downcast::<AdmissionReview>()
            .map_err(|obj| Error::UnexpectedType(obj.type_name()))?;
        let uid = match &requested.request {
            Some(req) => req.uid.clone(),
            None => return Err(Error::MissingRequest),
        };

        let mut response = self.decider.decide(&requested);
        response.uid = uid;
        let review = AdmissionReview::respond(&gvk, response);
        debug!(response = ?review, "sending response");
        Ok(review)
    }

    /// Handle is [`Dispatcher::review`] plus encoding.
    pub fn handle(&self, content_type: Option<&HeaderValue>, body: &[u8]) -> Result<Vec<u8>> {
        let review = self.review(content_type, body)?;
        serde_json::to_vec(&review).map_err(Error::Encode)
    }
}

/// Serve is the axum handler. Mount it on a POST route.
pub async fn serve(
    State(dispatcher): State<Arc<Dispatcher>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let res = match dispatcher.handle(headers.get(header::CONTENT_TYPE), &body) {
        Ok(buf) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, CONTENT_TYPE_JSON)],
            buf,
        )
            .into_response(),
        Err(err) => {
            if err.status() == StatusCode::UNSUPPORTED_MEDIA_TYPE {
                warn!(error = %err, "rejecting request");
            } else {
                error!(error = %err, "rejecting request");
            }
            err.into_response()
        }
    };
    metrics::counter!("admission_reviews_total", "code" => res.status().as_u16().to_string())
        .increment(1);
    res
}
