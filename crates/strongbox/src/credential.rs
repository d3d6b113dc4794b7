//! Credential bodies
//!
//! A credential is a named value stored at a path expression. Its state is
//! `set` exactly when it carries a value; every way of building a body,
//! including decoding one, upholds that pairing.

use crate::envelope::Body;
use crate::error::{Error, Result};
use crate::identity::{EntityKind, Identifier};
use crate::pathexp::{PathExp, WILDCARD};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest credential name accepted
pub const MAX_NAME_LEN: usize = 64;

/// What a value producer hands to the write protocol
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialValue {
    Set(String),
    Unset,
}

impl CredentialValue {
    pub fn string(value: impl Into<String>) -> Self {
        CredentialValue::Set(value.into())
    }

    /// Split into the stored state and optional value
    fn into_parts(self) -> (CredentialState, Option<String>) {
        match self {
            CredentialValue::Set(value) => (CredentialState::Set, Some(value)),
            CredentialValue::Unset => (CredentialState::Unset, None),
        }
    }
}

// Never print secret material
impl fmt::Debug for CredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialValue::Set(_) => f.write_str("Set(<redacted>)"),
            CredentialValue::Unset => f.write_str("Unset"),
        }
    }
}

/// Whether a credential currently holds a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialState {
    Set,
    Unset,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialState::Set => "set",
            CredentialState::Unset => "unset",
        }
    }
}

/// Check a credential name; names and path segments never overlap
pub fn validate_name(name: &str) -> Result<()> {
    if name == WILDCARD {
        return Err(Error::validation("credential name cannot be a wildcard"));
    }
    if name.is_empty() {
        return Err(Error::validation("credential name cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::validation(format!(
            "credential name longer than {} characters",
            MAX_NAME_LEN
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(Error::validation(format!(
            "credential name {:?} must start with a letter or digit",
            name
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
    {
        return Err(Error::validation(format!(
            "invalid character {:?} in credential name {:?}",
            c, name
        )));
    }
    Ok(())
}

fn check_kind(id: &Identifier, kind: EntityKind) -> Result<()> {
    if id.kind() != kind {
        return Err(Error::validation(format!(
            "expected a {} identifier, got a {} identifier",
            kind,
            id.kind()
        )));
    }
    Ok(())
}

/// First credential body version: state is implied by the value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialV1 {
    pub org_id: Identifier,
    pub project_id: Identifier,
    pub name: String,
    pub pathexp: PathExp,
    pub value: Option<String>,
}

/// Current credential body with an explicit state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CredentialV2Wire")]
pub struct CredentialV2 {
    org_id: Identifier,
    project_id: Identifier,
    name: String,
    pathexp: PathExp,
    value: Option<String>,
    state: CredentialState,
}

#[derive(Deserialize)]
struct CredentialV2Wire {
    org_id: Identifier,
    project_id: Identifier,
    name: String,
    pathexp: PathExp,
    #[serde(default)]
    value: Option<String>,
    state: CredentialState,
}

impl TryFrom<CredentialV2Wire> for CredentialV2 {
    type Error = Error;

    fn try_from(wire: CredentialV2Wire) -> Result<Self> {
        match (wire.state, &wire.value) {
            (CredentialState::Set, Some(_)) | (CredentialState::Unset, None) => {}
            (state, _) => {
                return Err(Error::decode(format!(
                    "credential {} is {} but {} a value",
                    wire.name,
                    state.as_str(),
                    if wire.value.is_some() { "has" } else { "lacks" }
                )))
            }
        }
        Ok(Self {
            org_id: wire.org_id,
            project_id: wire.project_id,
            name: wire.name,
            pathexp: wire.pathexp,
            value: wire.value,
            state: wire.state,
        })
    }
}

impl CredentialV2 {
    /// Build a body, lowercasing the name and pairing state with value
    pub fn new(
        org_id: Identifier,
        project_id: Identifier,
        name: &str,
        pathexp: PathExp,
        value: CredentialValue,
    ) -> Result<Self> {
        check_kind(&org_id, EntityKind::Org)?;
        check_kind(&project_id, EntityKind::Project)?;
        validate_name(name)?;
        if let CredentialValue::Set(v) = &value {
            if v.is_empty() {
                return Err(Error::validation("a set credential needs a non-empty value"));
            }
        }
        let (state, value) = value.into_parts();
        Ok(Self {
            org_id,
            project_id,
            name: name.to_lowercase(),
            pathexp,
            value,
            state,
        })
    }

    pub fn org_id(&self) -> &Identifier {
        &self.org_id
    }

    pub fn project_id(&self) -> &Identifier {
        &self.project_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pathexp(&self) -> &PathExp {
        &self.pathexp
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn state(&self) -> CredentialState {
        self.state
    }
}

/// Either credential body version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    V1(CredentialV1),
    V2(CredentialV2),
}

impl Credential {
    pub fn org_id(&self) -> &Identifier {
        match self {
            Credential::V1(c) => &c.org_id,
            Credential::V2(c) => c.org_id(),
        }
    }

    pub fn project_id(&self) -> &Identifier {
        match self {
            Credential::V1(c) => &c.project_id,
            Credential::V2(c) => c.project_id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Credential::V1(c) => &c.name,
            Credential::V2(c) => c.name(),
        }
    }

    pub fn pathexp(&self) -> &PathExp {
        match self {
            Credential::V1(c) => &c.pathexp,
            Credential::V2(c) => c.pathexp(),
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Credential::V1(c) => c.value.as_deref(),
            Credential::V2(c) => c.value(),
        }
    }

    pub fn state(&self) -> CredentialState {
        match self {
            Credential::V1(c) if c.value.is_some() => CredentialState::Set,
            Credential::V1(_) => CredentialState::Unset,
            Credential::V2(c) => c.state(),
        }
    }
}

impl From<Credential> for Body {
    fn from(credential: Credential) -> Self {
        match credential {
            Credential::V1(c) => Body::CredentialV1(c),
            Credential::V2(c) => Body::CredentialV2(c),
        }
    }
}

impl TryFrom<Body> for Credential {
    type Error = Error;

    fn try_from(body: Body) -> Result<Self> {
        match body {
            Body::CredentialV1(c) => Ok(Credential::V1(c)),
            Body::CredentialV2(c) => Ok(Credential::V2(c)),
            other => Err(Error::decode(format!("expected credential body, got {}", other.tag()))),
        }
    }
}
