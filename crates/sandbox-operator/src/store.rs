//! Object store access
//!
//! The reconciler reads and writes cluster objects through [`ObjectStore`],
//! generic over a [`ResourceKind`]. Production code talks to the API server
//! through [`KubeStore`]; tests substitute an in-memory store.

use crate::error::{OperatorError, Result};
use crate::user::User;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::{Api, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Field manager recorded on objects created by the operator
pub const FIELD_MANAGER: &str = "sandbox-operator";

/// A kind of cluster object the operator can read and create
pub trait ResourceKind:
    Resource<DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// API handle scoped the way this kind is served
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;
}

impl ResourceKind for User {
    fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }
}

impl ResourceKind for Namespace {
    fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }
}

impl ResourceKind for RoleBinding {
    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::default_namespaced(client),
        }
    }
}

/// Read/write access to cluster objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object by name. A missing object is `Ok(None)`.
    async fn get<K: ResourceKind>(&self, namespace: Option<&str>, name: &str)
        -> Result<Option<K>>;

    /// Create an object, failing with [`OperatorError::AlreadyExists`] on a name clash
    async fn create<K: ResourceKind>(&self, object: &K) -> Result<K>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store on top of a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: ResourceKind>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>> {
        debug!(kind = %K::kind(&()), namespace = ?namespace, name, "Fetching object");
        let api = K::api(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(OperatorError::from)
    }

    async fn create<K: ResourceKind>(&self, object: &K) -> Result<K> {
        let name = object.name_any();
        debug!(
            kind = %K::kind(&()),
            namespace = ?object.namespace(),
            name = %name,
            "Creating object"
        );

        let api = K::api(self.client.clone(), object.namespace().as_deref());
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        api.create(&params, object)
            .await
            .map_err(|e| map_create_error(&K::kind(&()), name, e))
    }
}

/// Translate a create failure; a 409 conflict means the name is taken
fn map_create_error(kind: &str, name: String, error: kube::Error) -> OperatorError {
    match error {
        kube::Error::Api(resp) if resp.code == 409 => OperatorError::AlreadyExists {
            kind: kind.to_string(),
            name,
        },
        e => OperatorError::from(e),
    }
}
