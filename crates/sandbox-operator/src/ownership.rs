//! Owner references
//!
//! Deleting an owner makes the platform garbage collector delete every
//! dependent carrying a reference to it. The operator only records the
//! reference; the cascade itself is performed by the cluster.

use crate::error::{OperatorError, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// Record `owner` as the controller of `dependent`
///
/// Fails when the owner has no name or uid yet, or when the dependent is
/// already controlled by a different object. An existing reference to the
/// same owner is replaced. The reference blocks owner deletion until the
/// dependent is gone.
pub fn set_controller_reference<O, D>(owner: &O, dependent: &mut D) -> Result<()>
where
    O: Resource<DynamicType = ()>,
    D: Resource<DynamicType = ()>,
{
    let mut reference = owner.controller_owner_ref(&()).ok_or_else(|| {
        OperatorError::OwnerReference(format!(
            "{} '{}' has no uid",
            O::kind(&()),
            owner.name_any()
        ))
    })?;
    reference.block_owner_deletion = Some(true);

    if let Some(existing) = dependent
        .owner_references()
        .iter()
        .find(|r| r.controller == Some(true) && !same_owner(r, &reference))
    {
        return Err(OperatorError::AlreadyOwned {
            kind: D::kind(&()).to_string(),
            name: dependent.name_any(),
            owner: format!("{}/{}", existing.kind, existing.name),
        });
    }

    let references = dependent.owner_references_mut();
    references.retain(|r| !same_owner(r, &reference));
    references.push(reference);
    Ok(())
}

/// Check whether `object` is controlled by the owner with uid `owner_uid`
pub fn is_controlled_by<D: Resource>(object: &D, owner_uid: &str) -> bool {
    object
        .owner_references()
        .iter()
        .any(|r| r.controller == Some(true) && r.uid == owner_uid)
}

/// Owner references match on group, kind and name; the version may differ
fn same_owner(a: &OwnerReference, b: &OwnerReference) -> bool {
    api_group(&a.api_version) == api_group(&b.api_version) && a.kind == b.kind && a.name == b.name
}

fn api_group(api_version: &str) -> &str {
    api_version
        .rsplit_once('/')
        .map(|(group, _)| group)
        .unwrap_or("")
}
