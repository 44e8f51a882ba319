//! Permission gate.
//!
//! Every gateway call passes through [`check_permission`] before its adapter
//! runs. Two rules apply, in order:
//!
//! 1. Read-only: a mutating call on a `read_only` mount is refused, naming
//!    the mount.
//! 2. Groups: named groups apply to every method; method maps apply only to
//!    the method they name. `strict` requires all listed groups, otherwise
//!    any one is enough.

use super::error::{VfsError, VfsResult};
use super::mount::{GroupRule, Mountpoint, ResolvedTarget};
use super::path;
use super::types::VfsMethod;
use crate::session::Session;

/// How the read-only rule applies to a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOnlyCheck {
    /// Reads never trip the rule.
    Skip,
    /// Refuse if the resolved mount is read-only.
    Enforce,
    /// Refuse only if this address lies on the resolved mount and it is
    /// read-only (archives check their first selection).
    Target(String),
}

impl ReadOnlyCheck {
    /// `Enforce` for mutating methods, `Skip` otherwise.
    pub fn for_method(method: VfsMethod) -> Self {
        if method.is_mutating() {
            Self::Enforce
        } else {
            Self::Skip
        }
    }
}

/// Build the gate for one call.
pub fn check_permission<'a>(
    session: &'a Session,
    method: VfsMethod,
    read_only: ReadOnlyCheck,
    strict: bool,
) -> impl Fn(&ResolvedTarget) -> VfsResult<()> + 'a {
    move |target| check_mount(session, method, &read_only, strict, &target.mount)
}

/// Apply both rules to a mountpoint.
pub fn check_mount(
    session: &Session,
    method: VfsMethod,
    read_only: &ReadOnlyCheck,
    strict: bool,
    mount: &Mountpoint,
) -> VfsResult<()> {
    let refuse_write = match read_only {
        ReadOnlyCheck::Skip => false,
        ReadOnlyCheck::Enforce => mount.attributes.read_only,
        ReadOnlyCheck::Target(address) => {
            mount.attributes.read_only && path::get_prefix(address) == mount.name
        }
    };
    if refuse_write {
        return Err(VfsError::ReadOnly(mount.name.clone()));
    }

    if !validate_groups(&session.groups, method, &mount.attributes.groups, strict) {
        return Err(VfsError::forbidden(format!(
            "Permission was denied for '{}' in '{}'",
            method, mount.name
        )));
    }

    Ok(())
}

/// True if `user_groups` satisfies the mount's group rules for `method`.
pub fn validate_groups(
    user_groups: &[String],
    method: VfsMethod,
    rules: &[GroupRule],
    strict: bool,
) -> bool {
    let satisfies = |required: &[String]| {
        if required.is_empty() {
            return true;
        }
        let mut held = required.iter().map(|g| user_groups.contains(g));
        if strict { held.all(|ok| ok) } else { held.any(|ok| ok) }
    };

    let named: Vec<String> = rules
        .iter()
        .filter_map(|rule| match rule {
            GroupRule::Named(group) => Some(group.clone()),
            GroupRule::Methods(_) => None,
        })
        .collect();

    let methods_ok = rules.iter().all(|rule| match rule {
        GroupRule::Methods(map) => map
            .get(method.as_ref())
            .is_none_or(|required| satisfies(required)),
        GroupRule::Named(_) => true,
    });

    satisfies(&named) && methods_ok
}
