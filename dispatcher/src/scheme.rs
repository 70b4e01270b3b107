//! Scheme maps group/version/kinds to typed decoders.
//!
//! A [`SchemeBuilder`] collects registrations at startup and is frozen into an immutable
//! [`Scheme`], which is then shared read-only by every request.

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
};

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, trace};

use crate::v1::{self, GroupVersionKind};

/// SCHEME_NAME is the name reported in "not registered" errors.
pub const SCHEME_NAME: &str = "admission-dispatcher";

/// DecodeError enumerates the ways a body can fail to decode.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("couldn't get version/kind; json parse error: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("Object 'Kind' is missing in '{0}'")]
    MissingKind(String),
    #[error("Object 'apiVersion' is missing in '{0}'")]
    MissingVersion(String),
    #[error("unexpected GroupVersion string: {0}")]
    GroupVersion(String),
    #[error("no kind \"{kind}\" is registered for version \"{api_version}\" in scheme \"{scheme}\"")]
    NotRegistered {
        kind: String,
        api_version: String,
        scheme: String,
    },
    #[error("{0}")]
    Schema(#[source] serde_json::Error),
}

/// SchemeError is reported for invalid registrations.
#[derive(thiserror::Error, Debug)]
pub enum SchemeError {
    #[error("double registration of different types for {gvk}: old={old}, new={new}")]
    Conflict {
        gvk: GroupVersionKind,
        old: &'static str,
        new: &'static str,
    },
}

/// Object is a decoded value of whatever type was registered for its kind.
pub struct Object {
    inner: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Object {
    fn new<T: Send + 'static>(v: T) -> Self {
        Self {
            inner: Box::new(v),
            type_name: type_name::<T>(),
        }
    }

    /// Type_name reports the concrete type's name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Is reports whether the object is a `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Downcast recovers the concrete value, or gives the Object back if it's not a `T`.
    pub fn downcast<T: 'static>(self) -> Result<Box<T>, Self> {
        let type_name = self.type_name;
        self.inner
            .downcast::<T>()
            .map_err(|inner| Self { inner, type_name })
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

type DecodeFn = fn(Value) -> Result<Object, serde_json::Error>;

fn decode_as<T>(v: Value) -> Result<Object, serde_json::Error>
where
    T: DeserializeOwned + Send + 'static,
{
    serde_json::from_value::<T>(v).map(Object::new)
}

#[derive(Clone, Copy)]
struct KnownType {
    id: TypeId,
    name: &'static str,
    decode: DecodeFn,
}

/// SchemeBuilder collects type registrations.
pub struct SchemeBuilder {
    name: String,
    known: HashMap<GroupVersionKind, KnownType>,
}

impl SchemeBuilder {
    /// New returns an empty builder for a scheme called `name`.
    pub fn new<S: ToString>(name: S) -> Self {
        Self {
            name: name.to_string(),
            known: HashMap::new(),
        }
    }

    /// Add_known_type registers `T` as the decoding target for `gvk`.
    ///
    /// Registering the same type again is a no-op; registering a different type for a kind that's
    /// already taken is an error.
    pub fn add_known_type<T>(&mut self, gvk: GroupVersionKind) -> Result<&mut Self, SchemeError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let new = KnownType {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            decode: decode_as::<T>,
        };
        if let Some(old) = self.known.get(&gvk) {
            if old.id == new.id {
                return Ok(self);
            }
            return Err(SchemeError::Conflict {
                gvk,
                old: old.name,
                new: new.name,
            });
        }
        trace!(%gvk, ty = new.name, "registered type");
        self.known.insert(gvk, new);
        Ok(self)
    }

    /// Add_resource registers a k8s-openapi resource under its own group/version/kind.
    pub fn add_resource<K>(&mut self) -> Result<&mut Self, SchemeError>
    where
        K: k8s_openapi::Resource + DeserializeOwned + Send + 'static,
    {
        self.add_known_type::<K>(GroupVersionKind::gvk(K::GROUP, K::VERSION, K::KIND))
    }

    /// Build freezes the registrations.
    pub fn build(self) -> Scheme {
        debug!(name = %self.name, kinds = self.known.len(), "scheme built");
        Scheme {
            name: self.name,
            known: self.known,
        }
    }
}

/// Scheme is an immutable registry of decodable kinds.
pub struct Scheme {
    name: String,
    known: HashMap<GroupVersionKind, KnownType>,
}

impl fmt::Debug for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheme")
            .field("name", &self.name)
            .field("kinds", &self.known.len())
            .finish()
    }
}

#[derive(Deserialize, Default)]
struct Types {
    #[serde(default, rename = "apiVersion")]
    api_version: String,
    #[serde(default)]
    kind: String,
}

impl Scheme {
    /// Admission returns the scheme the webhook serves with: core/v1, admission/v1, and
    /// admissionregistration/v1.
    pub fn admission() -> Result<Self, SchemeError> {
        let mut b = SchemeBuilder::new(SCHEME_NAME);
        add_core_v1(&mut b)?;
        add_admission_v1(&mut b)?;
        add_admissionregistration_v1(&mut b)?;
        Ok(b.build())
    }

    /// Name reports the scheme's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recognizes reports whether `gvk` is registered.
    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.known.contains_key(gvk)
    }

    /// Decode reads the type information out of `data` and decodes it as the registered type.
    pub fn decode(&self, data: &[u8]) -> Result<(Object, GroupVersionKind), DecodeError> {
        let value: Value = serde_json::from_slice(data).map_err(DecodeError::Syntax)?;
        // A null body has no type information, same as an empty object.
        let types = Option::<Types>::deserialize(&value)
            .map_err(DecodeError::Syntax)?
            .unwrap_or_default();
        let (group, version) = split_api_version(&types.api_version)?;
        if types.kind.is_empty() {
            return Err(DecodeError::MissingKind(
                String::from_utf8_lossy(data).into_owned(),
            ));
        }
        if version.is_empty() {
            return Err(DecodeError::MissingVersion(
                String::from_utf8_lossy(data).into_owned(),
            ));
        }
        let gvk = GroupVersionKind {
            group,
            version,
            kind: types.kind,
        };

        let known = self
            .known
            .get(&gvk)
            .ok_or_else(|| DecodeError::NotRegistered {
                kind: gvk.kind.clone(),
                api_version: types.api_version.clone(),
                scheme: self.name.clone(),
            })?;
        let obj = (known.decode)(value).map_err(DecodeError::Schema)?;
        trace!(%gvk, ty = known.name, "decoded");
        Ok((obj, gvk))
    }
}

/// Split_api_version splits an `apiVersion` into group and version.
///
/// A bare version is the core group. More than one slash is an error.
fn split_api_version(api_version: &str) -> Result<(String, String), DecodeError> {
    if api_version == "/" {
        return Ok((String::new(), String::new()));
    }
    let mut parts = api_version.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(version), None, None) => Ok((String::new(), version.to_string())),
        (Some(group), Some(version), None) => Ok((group.to_string(), version.to_string())),
        _ => Err(DecodeError::GroupVersion(api_version.to_string())),
    }
}

/// Add_core_v1 registers the core/v1 kinds.
pub fn add_core_v1(b: &mut SchemeBuilder) -> Result<(), SchemeError> {
    use k8s_openapi::api::core::v1::*;

    b.add_resource::<Binding>()?
        .add_resource::<ComponentStatus>()?
        .add_resource::<ConfigMap>()?
        .add_resource::<Endpoints>()?
        .add_resource::<Event>()?
        .add_resource::<LimitRange>()?
        .add_resource::<Namespace>()?
        .add_resource::<Node>()?
        .add_resource::<PersistentVolume>()?
        .add_resource::<PersistentVolumeClaim>()?
        .add_resource::<Pod>()?
        .add_resource::<PodTemplate>()?
        .add_resource::<ReplicationController>()?
        .add_resource::<ResourceQuota>()?
        .add_resource::<Secret>()?
        .add_resource::<Service>()?
        .add_resource::<ServiceAccount>()?;
    Ok(())
}

/// Add_admission_v1 registers the admission/v1 AdmissionReview.
pub fn add_admission_v1(b: &mut SchemeBuilder) -> Result<(), SchemeError> {
    b.add_known_type::<v1::AdmissionReview>(GroupVersionKind::admission_review())?;
    Ok(())
}

/// Add_admissionregistration_v1 registers the admissionregistration/v1 kinds.
pub fn add_admissionregistration_v1(b: &mut SchemeBuilder) -> Result<(), SchemeError> {
    use k8s_openapi::api::admissionregistration::v1::*;

    b.add_resource::<MutatingWebhookConfiguration>()?
        .add_resource::<ValidatingWebhookConfiguration>()?
        .add_resource::<ValidatingAdmissionPolicy>()?
        .add_resource::<ValidatingAdmissionPolicyBinding>()?;
    Ok(())
}
