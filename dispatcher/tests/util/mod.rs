use dispatcher::{Dispatcher, decide::AllowAll, scheme::Scheme};
use serde_json::{Value, json};

pub const PATH: &str = "/validate";
pub const RESPONSE_LIMIT: usize = 1024 * 1024 * 10;

pub fn app() -> axum::Router {
    let scheme = match Scheme::admission() {
        Ok(s) => s,
        Err(e) => panic!("error building scheme: {e}"),
    };
    dispatcher::app(Dispatcher::new(scheme, AllowAll), PATH)
}

/// Review returns a minimal v1 AdmissionReview for a Pod with the given uid.
pub fn review(uid: &str) -> Value {
    json!({
        "kind": "AdmissionReview",
        "apiVersion": "admission.k8s.io/v1",
        "request": {
            "uid": uid,
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
        },
    })
}

/// Full_review returns a v1 AdmissionReview shaped like one the API server sends.
pub fn full_review(uid: &str) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "requestKind": {"group": "", "version": "v1", "kind": "Pod"},
            "requestResource": {"group": "", "version": "v1", "resource": "pods"},
            "uid": uid,
            "name": "test",
            "namespace": "default",
            "operation": "CREATE",
            "object": {
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "test", "namespace": "default"},
                "spec": {"containers": [{"name": "app", "image": "busybox"}]},
            },
            "userInfo": {
                "username": "admin",
                "uid": "0",
                "groups": ["admin"],
            },
            "dryRun": false,
            "options": {"apiVersion": "meta.k8s.io/v1", "kind": "CreateOptions"},
        },
    })
}
