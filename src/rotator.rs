//! Bulk credential rotation.
//!
//! A [`Rotator`] resolves a [`RotationRequest`] to a set of user IDs through a
//! [`UserDirectory`], writes a freshly generated password for each of them via a
//! [`CredentialStore`], and reports the aggregate outcome. The requesting
//! administrator is never part of the target set.

use std::collections::BTreeSet;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::auth::PasswordPolicy;
use crate::logger::{AuditEvent, AuditLog};

pub type UserId = i64;

static ROLE_KEY_STRIP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-z0-9_\-]").expect("role key pattern is valid")
});

/// Normalize a submitted role key: lower-case, only `[a-z0-9_-]` kept.
pub fn sanitize_role_key(raw: &str) -> String {
    ROLE_KEY_STRIP
        .replace_all(&raw.trim().to_lowercase(), "")
        .into_owned()
}

// ===============================================================
//                          DATA MODEL
// ===============================================================

/// A user as seen by the rotator: an ID and the role keys it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub id: UserId,
    pub roles: BTreeSet<String>,
}

/// A selectable role, keyed by its sanitized key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleScope {
    /// No role filter: every user except the requester.
    AllRoles,
    /// Role scoping was requested; only holders of these roles are targeted.
    Roles(BTreeSet<String>),
}

impl RoleScope {
    /// Build a role-scoped filter from raw keys. Keys that sanitize to nothing are dropped.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        RoleScope::Roles(
            keys.into_iter()
                .map(|k| sanitize_role_key(k.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationRequest {
    pub requester: UserId,
    pub scope: RoleScope,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum FailureCause {
    #[error("credential store failure: {0}")]
    CredentialStoreFailure(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<(UserId, FailureCause)>,
}

/// Why a rotation request was turned down. Each reason has its own notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("You did not check the required box. Please try again.")]
    MissingConfirmation,
    #[error("You must select at least 1 user role. Please try again.")]
    NoRolesSelected,
    #[error("There are no users to process.")]
    NoUsers,
    #[error("The reset process failed. Please try again.")]
    ProcessFailure,
}

impl RejectReason {
    /// Short stable code, used in audit records.
    pub fn reason_code(&self) -> &'static str {
        match self {
            RejectReason::MissingConfirmation => "checkmark",
            RejectReason::NoRolesSelected => "noroles",
            RejectReason::NoUsers => "users",
            RejectReason::ProcessFailure => "process",
        }
    }
}

/// The caller is not allowed to run rotations at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Access denied: user #{user} is not allowed to reset passwords.")]
pub struct AccessDenied {
    pub user: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Rejected(RejectReason),
    Completed(RotationResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub run_id: Uuid,
    pub outcome: Outcome,
}

// ===============================================================
//                         COLLABORATORS
// ===============================================================

pub trait UserDirectory {
    /// All users, or only holders of `role` when given.
    fn list_users(&self, role: Option<&str>) -> Result<Vec<DirectoryEntry>>;

    fn list_roles(&self) -> Result<Vec<RoleInfo>>;
}

pub trait CredentialStore {
    fn set_credential(&self, user: UserId, new_value: &str) -> Result<()>;
}

pub trait IdentityProvider {
    fn current_user_id(&self) -> UserId;

    fn current_user_can_administer(&self) -> bool;
}

// ===============================================================
//                            ROTATOR
// ===============================================================

pub struct Rotator<'a> {
    directory: &'a dyn UserDirectory,
    store: &'a dyn CredentialStore,
    identity: &'a dyn IdentityProvider,
    policy: PasswordPolicy,
    audit: Option<&'a AuditLog>,
}

impl<'a> Rotator<'a> {
    pub fn new(
        directory: &'a dyn UserDirectory,
        store: &'a dyn CredentialStore,
        identity: &'a dyn IdentityProvider,
    ) -> Self {
        Self {
            directory,
            store,
            identity,
            policy: PasswordPolicy::default(),
            audit: None,
        }
    }

    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_audit(mut self, audit: &'a AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Roles the selection screen can offer.
    pub fn available_roles(&self) -> Result<Vec<RoleInfo>> {
        self.directory.list_roles()
    }

    /// Resolve the user IDs a request would touch. The requester is always removed.
    /// An empty set is a valid answer, not an error.
    pub fn resolve_targets(&self, requester: UserId, scope: &RoleScope) -> Result<BTreeSet<UserId>> {
        let mut targets = BTreeSet::new();
        match scope {
            RoleScope::AllRoles => {
                targets.extend(self.directory.list_users(None)?.into_iter().map(|u| u.id));
            }
            RoleScope::Roles(roles) => {
                for role in roles {
                    let users = self.directory.list_users(Some(role.as_str()))?;
                    targets.extend(users.into_iter().map(|u| u.id));
                }
            }
        }
        targets.remove(&requester);
        Ok(targets)
    }

    /// Check a request and resolve it. On success the returned set is non-empty.
    pub fn validate_request(&self, request: &RotationRequest) -> Result<BTreeSet<UserId>, RejectReason> {
        if !request.confirmed {
            return Err(RejectReason::MissingConfirmation);
        }
        if let RoleScope::Roles(roles) = &request.scope {
            if roles.is_empty() {
                return Err(RejectReason::NoRolesSelected);
            }
        }

        let targets = match self.resolve_targets(request.requester, &request.scope) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("User directory lookup failed: {e:#}");
                return Err(RejectReason::ProcessFailure);
            }
        };
        if targets.is_empty() {
            return Err(RejectReason::NoUsers);
        }
        Ok(targets)
    }

    /// Write a new random password for every target. Individual failures are
    /// recorded and the batch carries on.
    pub fn rotate(&self, targets: &BTreeSet<UserId>) -> RotationResult {
        self.rotate_run(None, targets)
    }

    /// Full request cycle: authorize, validate, resolve, rotate, report.
    pub fn process(&self, request: &RotationRequest) -> Result<Report, AccessDenied> {
        let actor = self.identity.current_user_id();
        if !self.identity.current_user_can_administer() {
            return Err(AccessDenied { user: actor });
        }

        let run_id = Uuid::new_v4();
        // Exclusion always follows the authenticated caller.
        let request = RotationRequest {
            requester: actor,
            ..request.clone()
        };

        let targets = match self.validate_request(&request) {
            Ok(t) => t,
            Err(reason) => return Ok(self.reject(run_id, reason)),
        };

        self.audit_event(
            AuditEvent::RotationStarted,
            run_id,
            None,
            Some(&format!("{} target(s)", targets.len())),
        );

        let result = self.rotate_run(Some(run_id), &targets);
        if result.succeeded == 0 {
            return Ok(self.reject(run_id, RejectReason::ProcessFailure));
        }

        let summary = serde_json::to_string(&result).unwrap_or_default();
        self.audit_event(AuditEvent::RotationCompleted, run_id, None, Some(&summary));

        Ok(Report {
            run_id,
            outcome: Outcome::Completed(result),
        })
    }

    fn rotate_run(&self, run_id: Option<Uuid>, targets: &BTreeSet<UserId>) -> RotationResult {
        let mut result = RotationResult::default();

        for &user in targets {
            result.attempted += 1;
            let password = Zeroizing::new(self.policy.generate());

            match self.store.set_credential(user, &password) {
                Ok(()) => {
                    result.succeeded += 1;
                    if let Some(run_id) = run_id {
                        self.audit_event(AuditEvent::PasswordRotated, run_id, Some(user), None);
                    }
                }
                Err(e) => {
                    let cause = FailureCause::CredentialStoreFailure(format!("{e:#}"));
                    if let Some(run_id) = run_id {
                        self.audit_event(
                            AuditEvent::RotationFailed,
                            run_id,
                            Some(user),
                            Some(&cause.to_string()),
                        );
                    }
                    result.failures.push((user, cause));
                }
            }
        }

        result
    }

    fn reject(&self, run_id: Uuid, reason: RejectReason) -> Report {
        self.audit_event(AuditEvent::RotationRejected, run_id, None, Some(reason.reason_code()));
        Report {
            run_id,
            outcome: Outcome::Rejected(reason),
        }
    }

    // Audit failures never abort a rotation.
    fn audit_event(&self, event: AuditEvent, run_id: Uuid, target: Option<UserId>, detail: Option<&str>) {
        let Some(audit) = self.audit else { return };
        let actor = Some(self.identity.current_user_id());
        if let Err(e) = audit.log_event(event, Some(run_id), actor, target, detail) {
            eprintln!("Failed to write audit record: {e:#}");
        }
    }
}
