//! OpenShift `User` resource
//!
//! The `user.openshift.io/v1` API is served by the platform, so the type is
//! declared by hand instead of deriving a CRD. Implementing the
//! `k8s_openapi` traits gives it `kube::Resource` for free, which lets it
//! flow through `Api`, `Controller` and `ObjectRef` like any built-in kind.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ClusterResourceScope;
use serde::{Deserialize, Serialize};

/// A cluster-scoped OpenShift user
///
/// Only `metadata.name` and `metadata.uid` are consumed by the operator.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Display name of the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Identity provider mappings (`provider:login`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identities: Option<Vec<String>>,

    /// Groups the user belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

impl k8s_openapi::Resource for User {
    const API_VERSION: &'static str = "user.openshift.io/v1";
    const GROUP: &'static str = "user.openshift.io";
    const KIND: &'static str = "User";
    const VERSION: &'static str = "v1";
    const URL_PATH_SEGMENT: &'static str = "users";
    type Scope = ClusterResourceScope;
}

impl k8s_openapi::Metadata for User {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl User {
    /// Create a user object with the given name and uid
    pub fn new(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                uid: Some(uid.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
