//! User reconciliation
//!
//! One pass reads the User, derives its sandbox and creates whatever is
//! missing. The namespace is the marker for "provisioned": when it exists the
//! pass ends without writing anything, unless RoleBinding repair is enabled
//! and the namespace is controlled by this User. All failures are returned to the
//! caller, which owns retry scheduling.

use crate::error::Result;
use crate::ownership::{is_controlled_by, set_controller_reference};
use crate::resources::{SandboxResources, SandboxSettings};
use crate::store::ObjectStore;
use crate::user::User;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Result of a successful reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The User no longer exists; nothing to do
    UserGone,
    /// Namespace and RoleBinding were created in this pass
    Provisioned { namespace: String },
    /// The namespace already existed
    AlreadyProvisioned { namespace: String },
    /// The namespace existed and a missing RoleBinding was recreated
    Repaired { namespace: String },
}

impl From<Outcome> for Action {
    fn from(_: Outcome) -> Self {
        Action::await_change()
    }
}

/// Drives a User's sandbox towards its desired state
pub struct Reconciler<S> {
    store: S,
    settings: SandboxSettings,
    span: Span,
}

impl<S: ObjectStore> Reconciler<S> {
    /// Create a reconciler logging under `span`
    pub fn new(store: S, settings: SandboxSettings, span: Span) -> Self {
        Self {
            store,
            settings,
            span,
        }
    }

    /// Sandbox layout this reconciler builds
    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    /// Reconcile the User named by `identity`
    ///
    /// # Errors
    ///
    /// Any store failure other than not-found is returned unchanged, including
    /// a RoleBinding failure after the namespace was already created.
    pub async fn reconcile(&self, identity: &ObjectRef<User>) -> Result<Outcome> {
        let span = info_span!(
            parent: &self.span,
            "reconcile_user",
            user = %identity.name
        );
        self.reconcile_user(identity).instrument(span).await
    }

    async fn reconcile_user(&self, identity: &ObjectRef<User>) -> Result<Outcome> {
        info!("Reconciling User");

        let Some(user) = self
            .store
            .get::<User>(identity.namespace.as_deref(), &identity.name)
            .await?
        else {
            // Dependents are garbage collected through their owner references
            debug!("User not found, nothing to do");
            return Ok(Outcome::UserGone);
        };

        let SandboxResources {
            namespace_name,
            mut namespace,
            role_binding,
        } = SandboxResources::for_user(&user, &self.settings);

        set_controller_reference(&user, &mut namespace)?;

        if let Some(existing) = self.store.get::<Namespace>(None, &namespace_name).await? {
            if self.settings.repair_role_bindings {
                return self
                    .repair_role_binding(&user, &existing, namespace_name, role_binding)
                    .await;
            }
            info!(namespace = %namespace_name, "Skip reconcile: Namespace already exists");
            return Ok(Outcome::AlreadyProvisioned {
                namespace: namespace_name,
            });
        }

        info!(namespace = %namespace_name, "Creating a new Namespace");
        self.store.create(&namespace).await?;

        debug!(namespace = %namespace_name, "Creating admin RoleBinding");
        self.store.create(&role_binding).await?;

        info!(namespace = %namespace_name, "Sandbox provisioned");
        Ok(Outcome::Provisioned {
            namespace: namespace_name,
        })
    }

    async fn repair_role_binding(
        &self,
        user: &User,
        namespace: &Namespace,
        namespace_name: String,
        role_binding: RoleBinding,
    ) -> Result<Outcome> {
        let uid = user.uid().unwrap_or_default();
        if !is_controlled_by(namespace, &uid) {
            warn!(
                namespace = %namespace_name,
                "Namespace is not controlled by this User, skipping RoleBinding repair"
            );
            return Ok(Outcome::AlreadyProvisioned {
                namespace: namespace_name,
            });
        }

        let existing = self
            .store
            .get::<RoleBinding>(Some(&namespace_name), &self.settings.role_binding_name)
            .await?;

        if existing.is_some() {
            debug!(namespace = %namespace_name, "Sandbox already provisioned");
            return Ok(Outcome::AlreadyProvisioned {
                namespace: namespace_name,
            });
        }

        warn!(namespace = %namespace_name, "Admin RoleBinding missing, recreating");
        self.store.create(&role_binding).await?;
        Ok(Outcome::Repaired {
            namespace: namespace_name,
        })
    }
}
