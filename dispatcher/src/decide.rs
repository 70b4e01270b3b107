//! Decision strategies.

use tracing::trace;

use crate::v1::{AdmissionResponse, AdmissionReview};

/// ALLOW_ALL_MESSAGE is the status message [`AllowAll`] attaches to every response.
pub const ALLOW_ALL_MESSAGE: &str = "this webhook allows all requests";

/// Decide produces the verdict for a review.
///
/// The returned response's `uid` is overwritten by the caller, so implementations don't need to
/// set it.
pub trait Decide: Send + Sync {
    /// Decide returns the response for `review`.
    fn decide(&self, review: &AdmissionReview) -> AdmissionResponse;
}

impl<F> Decide for F
where
    F: Fn(&AdmissionReview) -> AdmissionResponse + Send + Sync,
{
    fn decide(&self, review: &AdmissionReview) -> AdmissionResponse {
        self(review)
    }
}

/// AllowAll admits everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl Decide for AllowAll {
    fn decide(&self, review: &AdmissionReview) -> AdmissionResponse {
        if let Some(req) = &review.request {
            trace!(kind = %req.kind, "admitting");
        }
        AdmissionResponse::allow(ALLOW_ALL_MESSAGE)
    }
}
