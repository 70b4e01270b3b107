use assert_json_diff::assert_json_include;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, StatusCode, header, request::Request},
};
use dispatcher::{
    Dispatcher,
    decide::{ALLOW_ALL_MESSAGE, AllowAll},
    scheme::{Scheme, SchemeBuilder},
    v1::{AdmissionResponse, AdmissionReview, GroupVersionKind},
};
use serde_json::{Value, from_slice, json, to_value, to_vec};
use test_log::test;
use tower::util::ServiceExt; // for `oneshot`

use util::{PATH, RESPONSE_LIMIT, app, full_review, review};

mod util;

async fn post(
    app: axum::Router,
    content_type: Option<&str>,
    body: impl Into<Body>,
) -> (StatusCode, HeaderMap, Bytes) {
    let mut req = Request::post(PATH);
    if let Some(ct) = content_type {
        req = req.header(header::CONTENT_TYPE, ct);
    }
    let response = app
        .oneshot(req.body(body.into()).expect("unable to build request"))
        .await
        .expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let buf = axum::body::to_bytes(response.into_body(), RESPONSE_LIMIT)
        .await
        .expect("error reading response body");
    (status, headers, buf)
}

fn json_body(v: &Value) -> Vec<u8> {
    to_vec(v).expect("JSON serialization failure")
}

mod allow {
    use super::*;

    #[self::test(tokio::test)]
    async fn minimal() {
        let (status, headers, buf) = post(
            app(),
            Some("application/json"),
            json_body(&review("abc-123")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"application/json"[..])
        );
        let text = String::from_utf8(buf.to_vec()).expect("response is UTF-8");
        assert!(
            text.contains(r#""response":{"uid":"abc-123","allowed":true,"status":{"message":"this webhook allows all requests"}}"#),
            "unexpected body: {text}"
        );
    }

    #[self::test(tokio::test)]
    async fn full() {
        let (status, _, buf) = post(
            app(),
            Some("application/json"),
            json_body(&full_review("705ab4f5-6393-11e8-b7cc-42010a800002")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = from_slice(&buf).expect("error deserializing response");
        assert_json_include!(
            actual: v,
            expected: json!({
                "kind": "AdmissionReview",
                "apiVersion": "admission.k8s.io/v1",
                "response": {
                    "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                    "allowed": true,
                    "status": {"message": ALLOW_ALL_MESSAGE},
                },
            })
        );
        let rev: AdmissionReview = from_slice(&buf).expect("error deserializing response");
        assert!(rev.request.is_none());
        assert!(rev.response.is_some_and(|r| r.allowed));
    }

    #[self::test(tokio::test)]
    async fn uids() {
        for uid in ["", "0", "abc-123", "705ab4f5-6393-11e8-b7cc-42010a800002"] {
            let (status, _, buf) =
                post(app(), Some("application/json"), json_body(&review(uid))).await;
            assert_eq!(status, StatusCode::OK);
            let rev: AdmissionReview = from_slice(&buf).expect("error deserializing response");
            let response = rev.response.expect("response present");
            assert_eq!(response.uid, uid);
            assert!(response.allowed);
        }
    }

    #[self::test(tokio::test)]
    async fn idempotent() {
        let app = app();
        let body = json_body(&full_review("same"));
        let (_, _, first) = post(app.clone(), Some("application/json"), body.clone()).await;
        let (_, _, second) = post(app, Some("application/json"), body).await;
        assert_eq!(first, second);
    }

    #[self::test(tokio::test)]
    async fn round_trip() {
        let (_, _, buf) = post(
            app(),
            Some("application/json"),
            json_body(&full_review("rt")),
        )
        .await;
        let rev: AdmissionReview = from_slice(&buf).expect("error deserializing response");
        let again: AdmissionReview = from_slice(&to_vec(&rev).expect("re-encode"))
            .expect("error deserializing re-encoded response");
        assert_eq!(rev, again);
        assert_eq!(
            from_slice::<Value>(&buf).expect("response is JSON"),
            to_value(&again).expect("re-encode")
        );
    }
}

mod reject {
    use super::*;

    #[self::test(tokio::test)]
    async fn content_type() {
        let bodies: [Vec<u8>; 3] = [
            json_body(&review("abc-123")),
            b"not json".to_vec(),
            Vec::new(),
        ];
        for body in bodies {
            let (status, headers, buf) = post(app(), Some("text/plain"), body).await;
            assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
            assert_eq!(&buf[..], b"contentType=text/plain, expect application/json");
            assert_eq!(
                headers.get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
                Some(&b"text/plain; charset=utf-8"[..])
            );
            assert_eq!(
                headers
                    .get(header::X_CONTENT_TYPE_OPTIONS)
                    .map(|v| v.as_bytes()),
                Some(&b"nosniff"[..])
            );
        }
    }

    #[self::test(tokio::test)]
    async fn missing_content_type() {
        let (status, _, buf) = post(app(), None, json_body(&review("abc-123"))).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(&buf[..], b"contentType=, expect application/json");
    }

    #[self::test(tokio::test)]
    async fn not_json() {
        let (status, _, buf) = post(app(), Some("application/json"), "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let text = String::from_utf8_lossy(&buf);
        assert!(
            text.starts_with("Request could not be decoded: couldn't get version/kind"),
            "{text}"
        );
    }

    #[self::test(tokio::test)]
    async fn empty() {
        let (status, _, _) = post(app(), Some("application/json"), Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[self::test(tokio::test)]
    async fn wrong_version() {
        let mut v = review("abc-123");
        v["apiVersion"] = json!("admission.k8s.io/v1beta1");
        let (status, _, buf) = post(app(), Some("application/json"), json_body(&v)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("is registered for version"), "{text}");
    }

    #[self::test(tokio::test)]
    async fn other_kind() {
        let pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "test"},
        });
        let (status, _, buf) = post(app(), Some("application/json"), json_body(&pod)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(&buf[..], b"Unsupported group version kind: /v1, Kind=Pod");
    }

    #[self::test(tokio::test)]
    async fn bad_schema() {
        let mut v = review("abc-123");
        v["request"]["uid"] = json!(42);
        let (status, _, _) = post(app(), Some("application/json"), json_body(&v)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[self::test(tokio::test)]
    async fn no_request() {
        let v = json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"});
        let (status, _, buf) = post(app(), Some("application/json"), json_body(&v)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            &buf[..],
            b"Request could not be decoded: AdmissionReview has no request"
        );
    }

    #[self::test(tokio::test)]
    async fn unexpected_type() {
        let mut b = SchemeBuilder::new("untyped");
        b.add_known_type::<Value>(GroupVersionKind::admission_review())
            .expect("registration");
        let app = dispatcher::app(Dispatcher::new(b.build(), AllowAll), PATH);
        let (status, headers, buf) =
            post(app, Some("application/json"), json_body(&review("x"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            &buf[..],
            b"Expected v1.AdmissionReview but got: serde_json::value::Value"
        );
        assert_eq!(
            headers.get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"text/plain; charset=utf-8"[..])
        );
    }

    #[self::test(tokio::test)]
    async fn method() {
        let response = app()
            .oneshot(
                Request::get(PATH)
                    .body(Body::empty())
                    .expect("unable to build request"),
            )
            .await
            .expect("router is infallible");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[self::test(tokio::test)]
    async fn too_large() {
        let body = vec![b' '; dispatcher::BODY_LIMIT.saturating_add(1)];
        let (status, _, _) = post(app(), Some("application/json"), body).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}

mod decide {
    use super::*;

    #[self::test(tokio::test)]
    async fn custom() {
        let scheme = Scheme::admission().expect("default registrations conflict");
        let d = Dispatcher::new(scheme, |rev: &AdmissionReview| {
            let name = rev
                .request
                .as_ref()
                .map(|r| r.name.clone())
                .unwrap_or_default();
            AdmissionResponse::default().deny(format!("{name} is not welcome"))
        });
        let app = dispatcher::app(d, PATH);
        let (status, _, buf) = post(
            app,
            Some("application/json"),
            json_body(&full_review("deny-me")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let rev: AdmissionReview = from_slice(&buf).expect("error deserializing response");
        let response = rev.response.expect("response present");
        assert_eq!(response.uid, "deny-me");
        assert!(!response.allowed);
        assert_eq!(
            response.result.and_then(|s| s.message).as_deref(),
            Some("test is not welcome")
        );
    }
}

mod counter {
    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;

    #[self::test]
    fn by_code() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("unable to build runtime");
        metrics::with_local_recorder(&recorder, || {
            rt.block_on(async {
                for uid in ["a", "b"] {
                    let (status, _, _) =
                        post(app(), Some("application/json"), json_body(&review(uid))).await;
                    assert_eq!(status, StatusCode::OK);
                }
                let (status, _, _) = post(app(), Some("text/plain"), Body::empty()).await;
                assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
            });
        });
        let text = handle.render();
        assert!(
            text.contains(r#"admission_reviews_total{code="200"} 2"#),
            "{text}"
        );
        assert!(
            text.contains(r#"admission_reviews_total{code="415"} 1"#),
            "{text}"
        );
    }
}
