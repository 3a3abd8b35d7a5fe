//! Kubernetes Resource Builders
//!
//! This module maps a `User` to the objects that make up its sandbox: one
//! Namespace and one RoleBinding granting the user admin inside it. The
//! builders are pure so the mapping can be tested without a cluster.

use crate::user::User;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Suffix appended to the lowercased user name
pub const DEFAULT_NAMESPACE_SUFFIX: &str = "-sbx";

/// Classification label applied to every sandbox namespace
pub const SANDBOX_LABEL_KEY: &str = "env";
pub const SANDBOX_LABEL_VALUE: &str = "sandbox";

/// Annotation carrying the name of the user the namespace was created for
pub const REQUESTER_ANNOTATION: &str = "openshift.io/requester";

/// Name of the RoleBinding created inside the sandbox
pub const DEFAULT_ROLE_BINDING_NAME: &str = "admin";

/// Pre-existing ClusterRole granted to the user
pub const DEFAULT_ADMIN_CLUSTER_ROLE: &str = "admin";

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Knobs for the sandbox layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSettings {
    /// Suffix appended to the lowercased user name
    pub namespace_suffix: String,
    /// Name of the RoleBinding inside the sandbox
    pub role_binding_name: String,
    /// ClusterRole bound to the user
    pub admin_cluster_role: String,
    /// Recreate the RoleBinding when the namespace exists but the binding does not
    pub repair_role_bindings: bool,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            namespace_suffix: DEFAULT_NAMESPACE_SUFFIX.to_string(),
            role_binding_name: DEFAULT_ROLE_BINDING_NAME.to_string(),
            admin_cluster_role: DEFAULT_ADMIN_CLUSTER_ROLE.to_string(),
            repair_role_bindings: false,
        }
    }
}

impl SandboxSettings {
    /// Sandbox namespace name for a user name
    pub fn namespace_name(&self, user_name: &str) -> String {
        format!("{}{}", user_name.to_lowercase(), self.namespace_suffix)
    }

    /// Labels stamped on sandbox namespaces
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            SANDBOX_LABEL_KEY.to_string(),
            SANDBOX_LABEL_VALUE.to_string(),
        )])
    }

    /// Label selector matching sandbox namespaces, used to narrow the namespace watch
    pub fn label_selector(&self) -> String {
        format!("{}={}", SANDBOX_LABEL_KEY, SANDBOX_LABEL_VALUE)
    }
}

/// Desired objects for one user
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxResources {
    /// Name of the sandbox namespace
    pub namespace_name: String,
    /// Sandbox namespace, without owner references
    pub namespace: Namespace,
    /// Admin RoleBinding inside the sandbox
    pub role_binding: RoleBinding,
}

impl SandboxResources {
    /// Build the desired sandbox for a user
    pub fn for_user(user: &User, settings: &SandboxSettings) -> Self {
        let user_name = user.name_any();
        let namespace_name = settings.namespace_name(&user_name);

        Self {
            namespace: build_namespace(&user_name, &namespace_name, settings),
            role_binding: build_role_binding(&user_name, &namespace_name, settings),
            namespace_name,
        }
    }
}

/// Build the sandbox Namespace
///
/// The requester annotation keeps the user name in its original case.
pub fn build_namespace(
    user_name: &str,
    namespace_name: &str,
    settings: &SandboxSettings,
) -> Namespace {
    let annotations = BTreeMap::from([(
        REQUESTER_ANNOTATION.to_string(),
        user_name.to_string(),
    )]);

    Namespace {
        metadata: ObjectMeta {
            name: Some(namespace_name.to_string()),
            labels: Some(settings.labels()),
            annotations: Some(annotations),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Build the RoleBinding granting the admin ClusterRole to the user
pub fn build_role_binding(
    user_name: &str,
    namespace_name: &str,
    settings: &SandboxSettings,
) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(settings.role_binding_name.clone()),
            namespace: Some(namespace_name.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: settings.admin_cluster_role.clone(),
        },
        subjects: Some(vec![Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: "User".to_string(),
            name: user_name.to_string(),
            namespace: None,
        }]),
    }
}
