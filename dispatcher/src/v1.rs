//! Wire types for the `admission.k8s.io/v1` API.
//!
//! These follow the upstream Go definitions closely enough that any review the API server sends
//! survives a decode/encode cycle. Every field is optional on the wire: missing strings come back
//! empty and missing structs come back as their default.

use std::{collections::BTreeMap, fmt};

use k8s_openapi::{
    ByteString,
    api::authentication::v1::UserInfo,
    apimachinery::pkg::apis::meta::v1::StatusDetails,
};
use kube::core::{TypeMeta, admission::Operation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GROUP is the admission API group.
pub const GROUP: &str = "admission.k8s.io";
/// VERSION is the admission API version these types implement.
pub const VERSION: &str = "v1";
/// KIND is the only kind the webhook answers.
pub const KIND: &str = "AdmissionReview";

/// GroupVersionKind identifies a schema.
///
/// Formats the way the API machinery does, so `admission.k8s.io/v1, Kind=AdmissionReview` and
/// `/v1, Kind=Pod` for the core group.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct GroupVersionKind {
    /// Group is the API group; empty for the core group.
    #[serde(default)]
    pub group: String,
    /// Version is the API version.
    #[serde(default)]
    pub version: String,
    /// Kind is the type name.
    #[serde(default)]
    pub kind: String,
}

impl GroupVersionKind {
    /// Gvk constructs a GroupVersionKind from its parts.
    pub fn gvk<G, V, K>(group: G, version: V, kind: K) -> Self
    where
        G: Into<String>,
        V: Into<String>,
        K: Into<String>,
    {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Admission_review is the GroupVersionKind of a v1 AdmissionReview.
    pub fn admission_review() -> Self {
        Self::gvk(GROUP, VERSION, KIND)
    }

    /// Api_version renders the `apiVersion` string for this kind.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}, Kind={}", self.group, self.version, self.kind)
    }
}

impl From<&GroupVersionKind> for TypeMeta {
    fn from(gvk: &GroupVersionKind) -> Self {
        TypeMeta {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
        }
    }
}

/// GroupVersionResource names a resource endpoint.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct GroupVersionResource {
    /// Group is the API group; empty for the core group.
    #[serde(default)]
    pub group: String,
    /// Version is the API version.
    #[serde(default)]
    pub version: String,
    /// Resource is the plural resource name.
    #[serde(default)]
    pub resource: String,
}

/// AdmissionReview is the envelope exchanged with the API server.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AdmissionReview {
    /// Types holds the `apiVersion` and `kind`.
    #[serde(flatten)]
    pub types: TypeMeta,
    /// Request is set on reviews sent by the API server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    /// Response is set on reviews sent back by the webhook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

impl AdmissionReview {
    /// Respond wraps `response` in an envelope stamped with `gvk`.
    pub fn respond(gvk: &GroupVersionKind, response: AdmissionResponse) -> Self {
        Self {
            types: gvk.into(),
            request: None,
            response: Some(response),
        }
    }
}

/// AdmissionRequest describes the operation being admitted.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Uid correlates the request with its response.
    #[serde(default)]
    pub uid: String,
    /// Kind is the type of the object being admitted.
    #[serde(default)]
    pub kind: GroupVersionKind,
    /// Resource is the resource being requested.
    #[serde(default)]
    pub resource: GroupVersionResource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    /// Request_kind is the kind of the original request, if it was converted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_kind: Option<GroupVersionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_resource: Option<GroupVersionResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_sub_resource: Option<String>,
    /// Name of the object, which may be empty on CREATE with generateName.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Operation is the verb being performed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    /// User_info describes who made the request.
    #[serde(default)]
    pub user_info: UserInfo,
    /// Object is the new object, kept as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    /// Old_object is the existing object on UPDATE and DELETE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    /// Options is the operation's options struct, kept as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// AdmissionResponse is the webhook's verdict.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Uid must match the request's uid.
    #[serde(default)]
    pub uid: String,
    /// Allowed reports whether the operation may proceed.
    #[serde(default)]
    pub allowed: bool,
    /// Result carries a human-readable reason for the verdict.
    #[serde(rename = "status", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Status>,
    /// Patch is a JSON patch to apply; base64 on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<ByteString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_annotations: Option<BTreeMap<String, String>>,
    /// Warnings are returned to the requesting client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl AdmissionResponse {
    /// Allow returns an allowing response with `message` as its status message.
    pub fn allow<S: ToString>(message: S) -> Self {
        Self {
            allowed: true,
            result: Some(Status::message(message)),
            ..Default::default()
        }
    }

    /// Deny turns the response into a denial with `reason` as its status message.
    pub fn deny<S: ToString>(mut self, reason: S) -> Self {
        self.allowed = false;
        self.result = Some(Status::message(reason));
        self
    }
}

/// Status is the subset of `meta/v1.Status` carried in a response.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Status {
    /// Status is "Success" or "Failure".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Message is a human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Reason is a machine-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,
    /// Code is the suggested HTTP status code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl Status {
    /// Message returns a Status with only the message set.
    pub fn message<S: ToString>(message: S) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Default::default()
        }
    }
}
