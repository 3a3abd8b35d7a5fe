//! # Sandbox Operator
//!
//! Kubernetes operator that gives every OpenShift `User` an isolated
//! sandbox: one namespace named after the user and one RoleBinding granting
//! the user the `admin` ClusterRole inside it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sandbox_operator::prelude::*;
//! use kube::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::try_default().await?;
//!     run_controller(client, ControllerConfig::default(), SandboxSettings::default()).await
//! }
//! ```
//!
//! ## Architecture
//!
//! The operator follows the standard level-triggered controller pattern:
//!
//! 1. **Watch**: Users, plus the sandbox namespaces they own, are watched by
//!    the kube-rs runtime. A namespace change requeues its owning User.
//! 2. **Reconcile**: [`reconciler::Reconciler`] reads the User, builds the
//!    desired objects with [`resources::SandboxResources`] and creates the
//!    namespace followed by the RoleBinding when the namespace is missing.
//! 3. **Retry**: errors are returned to the runtime, which requeues the User
//!    with per-user exponential backoff.
//!
//! For `User` `Alice` the operator creates:
//!
//! ```yaml
//! apiVersion: v1
//! kind: Namespace
//! metadata:
//!   name: alice-sbx
//!   labels:
//!     env: sandbox
//!   annotations:
//!     openshift.io/requester: Alice
//!   ownerReferences:
//!     - apiVersion: user.openshift.io/v1
//!       kind: User
//!       name: Alice
//!       controller: true
//!       blockOwnerDeletion: true
//! ---
//! apiVersion: rbac.authorization.k8s.io/v1
//! kind: RoleBinding
//! metadata:
//!   name: admin
//!   namespace: alice-sbx
//! roleRef:
//!   apiGroup: rbac.authorization.k8s.io
//!   kind: ClusterRole
//!   name: admin
//! subjects:
//!   - apiGroup: rbac.authorization.k8s.io
//!     kind: User
//!     name: Alice
//! ```
//!
//! Deleting the User lets the cluster garbage collector remove the namespace,
//! which in turn removes the RoleBinding inside it.
//!
//! ## Modules
//!
//! - [`user`] - OpenShift `User` resource type
//! - [`resources`] - Desired-state builders (Namespace, RoleBinding)
//! - [`ownership`] - Controller owner references
//! - [`store`] - Object store abstraction and its Kubernetes implementation
//! - [`reconciler`] - Reconciliation logic
//! - [`controller`] - Controller runtime wiring, retry backoff and metrics
//! - [`error`] - Error types for operator operations

pub mod controller;
pub mod error;
pub mod ownership;
pub mod reconciler;
pub mod resources;
pub mod store;
pub mod user;

#[cfg(test)]
mod testing;

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::controller::{
        run_controller, ControllerConfig, ControllerContext, ControllerMetrics, RetryBackoff,
    };
    pub use crate::error::{OperatorError, Result};
    pub use crate::ownership::set_controller_reference;
    pub use crate::reconciler::{Outcome, Reconciler};
    pub use crate::resources::{SandboxResources, SandboxSettings};
    pub use crate::store::{KubeStore, ObjectStore, ResourceKind};
    pub use crate::user::User;
}
