//! Org invite lifecycle
//!
//! An invite moves through `sent -> accepted -> associated -> approved`.
//! Each step fills its own fields exactly once. On the wire the invite is a
//! flat record of optional fields; decoding rejects any record whose fields
//! were not filled in that order.
//!
//! Clients never call the transition functions on fetched invites. They ask
//! the registry to transition and receive the new envelope. The functions
//! are the registry-side rules, used by [`crate::mock::MockRegistry`].

use crate::error::{Error, Result};
use crate::identity::{EntityKind, Identifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state names, also used as list filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteState {
    Sent,
    Accepted,
    Associated,
    Approved,
}

impl InviteState {
    pub const ALL: [InviteState; 4] = [
        InviteState::Sent,
        InviteState::Accepted,
        InviteState::Associated,
        InviteState::Approved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InviteState::Sent => "sent",
            InviteState::Accepted => "accepted",
            InviteState::Associated => "associated",
            InviteState::Approved => "approved",
        }
    }
}

impl fmt::Display for InviteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InviteState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s.to_lowercase())
            .ok_or_else(|| Error::validation(format!("unknown invite state {:?}", s)))
    }
}

/// Fields filled so far, one variant per state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteStage {
    Sent,
    Accepted {
        accepted: DateTime<Utc>,
    },
    Associated {
        accepted: DateTime<Utc>,
        invitee_id: Identifier,
    },
    Approved {
        accepted: DateTime<Utc>,
        invitee_id: Identifier,
        approver_id: Identifier,
        approved: DateTime<Utc>,
    },
}

impl InviteStage {
    pub fn state(&self) -> InviteState {
        match self {
            InviteStage::Sent => InviteState::Sent,
            InviteStage::Accepted { .. } => InviteState::Accepted,
            InviteStage::Associated { .. } => InviteState::Associated,
            InviteStage::Approved { .. } => InviteState::Approved,
        }
    }
}

/// An invitation for an email address to join an org
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OrgInviteRecord", into = "OrgInviteRecord")]
pub struct OrgInvite {
    org_id: Identifier,
    inviter_id: Identifier,
    pending_teams: Vec<Identifier>,
    email: String,
    created: DateTime<Utc>,
    stage: InviteStage,
}

impl OrgInvite {
    /// A freshly sent invite; every lifecycle field starts empty
    pub fn new(
        org_id: Identifier,
        inviter_id: Identifier,
        email: &str,
        pending_teams: Vec<Identifier>,
        created: DateTime<Utc>,
    ) -> Result<Self> {
        if org_id.kind() != EntityKind::Org {
            return Err(Error::validation("invite org_id must be an org identifier"));
        }
        if inviter_id.kind() != EntityKind::User {
            return Err(Error::validation("invite inviter_id must be a user identifier"));
        }
        if let Some(team) = pending_teams.iter().find(|t| t.kind() != EntityKind::Team) {
            return Err(Error::validation(format!("{} is not a team identifier", team)));
        }
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::validation(format!("invalid email address {:?}", email)));
        }
        Ok(Self {
            org_id,
            inviter_id,
            pending_teams,
            email: email.to_string(),
            created,
            stage: InviteStage::Sent,
        })
    }

    pub fn org_id(&self) -> &Identifier {
        &self.org_id
    }

    pub fn inviter_id(&self) -> &Identifier {
        &self.inviter_id
    }

    pub fn pending_teams(&self) -> &[Identifier] {
        &self.pending_teams
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn stage(&self) -> &InviteStage {
        &self.stage
    }

    pub fn state(&self) -> InviteState {
        self.stage.state()
    }

    pub fn accepted(&self) -> Option<DateTime<Utc>> {
        match &self.stage {
            InviteStage::Sent => None,
            InviteStage::Accepted { accepted }
            | InviteStage::Associated { accepted, .. }
            | InviteStage::Approved { accepted, .. } => Some(*accepted),
        }
    }

    pub fn invitee_id(&self) -> Option<&Identifier> {
        match &self.stage {
            InviteStage::Associated { invitee_id, .. } | InviteStage::Approved { invitee_id, .. } => {
                Some(invitee_id)
            }
            _ => None,
        }
    }

    pub fn approver_id(&self) -> Option<&Identifier> {
        match &self.stage {
            InviteStage::Approved { approver_id, .. } => Some(approver_id),
            _ => None,
        }
    }

    pub fn approved(&self) -> Option<DateTime<Utc>> {
        match &self.stage {
            InviteStage::Approved { approved, .. } => Some(*approved),
            _ => None,
        }
    }

    fn refuse(&self, action: &str) -> Error {
        Error::validation(format!(
            "cannot {} an invite that is {}",
            action,
            self.state()
        ))
    }

    /// sent -> accepted
    pub fn accept(self, at: DateTime<Utc>) -> Result<Self> {
        match self.stage {
            InviteStage::Sent => Ok(Self {
                stage: InviteStage::Accepted { accepted: at },
                ..self
            }),
            _ => Err(self.refuse("accept")),
        }
    }

    /// accepted -> associated, binding the invite to a user
    pub fn associate(self, invitee_id: Identifier) -> Result<Self> {
        if invitee_id.kind() != EntityKind::User {
            return Err(Error::validation("invitee must be a user identifier"));
        }
        match self.stage {
            InviteStage::Accepted { accepted } => Ok(Self {
                stage: InviteStage::Associated {
                    accepted,
                    invitee_id,
                },
                ..self
            }),
            _ => Err(self.refuse("associate")),
        }
    }

    /// associated -> approved
    pub fn approve(self, approver_id: Identifier, at: DateTime<Utc>) -> Result<Self> {
        if approver_id.kind() != EntityKind::User {
            return Err(Error::validation("approver must be a user identifier"));
        }
        match self.stage {
            InviteStage::Associated {
                accepted,
                invitee_id,
            } => Ok(Self {
                stage: InviteStage::Approved {
                    accepted,
                    invitee_id,
                    approver_id,
                    approved: at,
                },
                ..self
            }),
            _ => Err(self.refuse("approve")),
        }
    }
}

/// Flat wire form of an invite
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrgInviteRecord {
    org_id: Identifier,
    inviter_id: Identifier,
    invitee_id: Option<Identifier>,
    approver_id: Option<Identifier>,
    #[serde(default)]
    pending_teams: Vec<Identifier>,
    email: String,
    created: DateTime<Utc>,
    accepted: Option<DateTime<Utc>>,
    approved: Option<DateTime<Utc>>,
}

impl TryFrom<OrgInviteRecord> for OrgInvite {
    type Error = Error;

    fn try_from(record: OrgInviteRecord) -> Result<Self> {
        let stage = match (
            record.accepted,
            record.invitee_id,
            record.approver_id,
            record.approved,
        ) {
            (None, None, None, None) => InviteStage::Sent,
            (Some(accepted), None, None, None) => InviteStage::Accepted { accepted },
            (Some(accepted), Some(invitee_id), None, None) => InviteStage::Associated {
                accepted,
                invitee_id,
            },
            (Some(accepted), Some(invitee_id), Some(approver_id), Some(approved)) => {
                InviteStage::Approved {
                    accepted,
                    invitee_id,
                    approver_id,
                    approved,
                }
            }
            _ => {
                return Err(Error::decode(format!(
                    "invite for {} has lifecycle fields filled out of order",
                    record.email
                )))
            }
        };
        Ok(Self {
            org_id: record.org_id,
            inviter_id: record.inviter_id,
            pending_teams: record.pending_teams,
            email: record.email,
            created: record.created,
            stage,
        })
    }
}

impl From<OrgInvite> for OrgInviteRecord {
    fn from(invite: OrgInvite) -> Self {
        let accepted = invite.accepted();
        let invitee_id = invite.invitee_id().copied();
        let approver_id = invite.approver_id().copied();
        let approved = invite.approved();
        Self {
            org_id: invite.org_id,
            inviter_id: invite.inviter_id,
            invitee_id,
            approver_id,
            pending_teams: invite.pending_teams,
            email: invite.email,
            created: invite.created,
            accepted,
            approved,
        }
    }
}
