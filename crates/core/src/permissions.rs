use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalLevel;
use crate::domain::request::RequestStatus;
use crate::workflow::{required_level, WorkflowAction};

/// A named role with a fixed capability set, independent of any single
/// request. Profiles come from the identity collaborator; the engine only
/// ever authorizes against them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessProfile {
    pub name: String,
    pub levels: Vec<ApprovalLevel>,
    pub can_settle: bool,
}

impl AccessProfile {
    pub fn new(name: impl Into<String>, levels: Vec<ApprovalLevel>, can_settle: bool) -> Self {
        Self { name: name.into(), levels, can_settle }
    }

    fn has_level(&self, level: ApprovalLevel) -> bool {
        self.levels.contains(&level)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionDenyReason {
    UnknownProfile,
    NotActionable { status: RequestStatus, action: WorkflowAction },
    MissingLevel { profile: String, required: ApprovalLevel },
    MissingSettleCapability { profile: String },
}

impl PermissionDenyReason {
    pub fn describe(&self) -> String {
        match self {
            Self::UnknownProfile => "actor has no resolvable access profile".to_owned(),
            Self::NotActionable { status, action } => {
                format!("request in status `{}` does not accept `{}`", status.as_str(), action.as_str())
            }
            Self::MissingLevel { profile, required } => {
                format!("profile `{profile}` lacks approval level `{}`", required.as_str())
            }
            Self::MissingSettleCapability { profile } => {
                format!("profile `{profile}` cannot settle approved requests")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub level: Option<ApprovalLevel>,
    pub deny_reason: Option<PermissionDenyReason>,
}

impl PermissionDecision {
    fn allow(level: Option<ApprovalLevel>) -> Self {
        Self { allowed: true, level, deny_reason: None }
    }

    fn deny(reason: PermissionDenyReason) -> Self {
        Self { allowed: false, level: None, deny_reason: Some(reason) }
    }
}

/// Static capability table. Pure lookup, no I/O; consulted once per
/// candidate request before any mutation. Denies on anything it does not
/// recognize.
#[derive(Clone, Debug, Default)]
pub struct PermissionValidator {
    profiles: HashMap<String, AccessProfile>,
}

impl PermissionValidator {
    pub fn new(profiles: Vec<AccessProfile>) -> Self {
        let profiles =
            profiles.into_iter().map(|profile| (normalize_key(&profile.name), profile)).collect();
        Self { profiles }
    }

    /// The product's shipped profile table.
    pub fn default_table() -> Self {
        Self::new(vec![
            AccessProfile::new("Gerente", vec![ApprovalLevel::Management], false),
            AccessProfile::new("Diretor", vec![ApprovalLevel::Director], false),
            AccessProfile::new("Presidente", vec![ApprovalLevel::President], false),
            AccessProfile::new(
                "Admin",
                vec![ApprovalLevel::Management, ApprovalLevel::Director, ApprovalLevel::President],
                true,
            ),
            AccessProfile::new("Tesoureiro", Vec::new(), true),
        ])
    }

    pub fn profile(&self, name: &str) -> Option<&AccessProfile> {
        self.profiles.get(&normalize_key(name))
    }

    /// Whether `profile` may perform `action` on a request currently in
    /// `status`, and which approval level that act represents.
    pub fn can_act(
        &self,
        profile: Option<&AccessProfile>,
        status: RequestStatus,
        action: WorkflowAction,
    ) -> PermissionDecision {
        let Some(profile) = profile else {
            return PermissionDecision::deny(PermissionDenyReason::UnknownProfile);
        };

        match action {
            WorkflowAction::MarkPaid => {
                if status != RequestStatus::Approved {
                    return PermissionDecision::deny(PermissionDenyReason::NotActionable {
                        status,
                        action,
                    });
                }
                if !profile.can_settle {
                    return PermissionDecision::deny(
                        PermissionDenyReason::MissingSettleCapability {
                            profile: profile.name.clone(),
                        },
                    );
                }
                PermissionDecision::allow(None)
            }
            WorkflowAction::Approve | WorkflowAction::Reject => {
                let Some(required) = required_level(status) else {
                    return PermissionDecision::deny(PermissionDenyReason::NotActionable {
                        status,
                        action,
                    });
                };
                if !profile.has_level(required) {
                    return PermissionDecision::deny(PermissionDenyReason::MissingLevel {
                        profile: profile.name.clone(),
                        required,
                    });
                }
                PermissionDecision::allow(Some(required))
            }
        }
    }

    /// Convenience for callers holding only a profile name: unknown names
    /// fail closed.
    pub fn can_act_as(
        &self,
        profile_name: &str,
        status: RequestStatus,
        action: WorkflowAction,
    ) -> PermissionDecision {
        self.can_act(self.profile(profile_name), status, action)
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
