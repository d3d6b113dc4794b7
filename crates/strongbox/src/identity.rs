//! Typed identifiers
//!
//! Every stored entity is addressed by an 18 byte identifier:
//!
//! ```text
//! | 1 byte: id format version | 1 byte: entity kind | 16 bytes: payload |
//! ```
//!
//! The payload is derived in one of two ways, fixed per entity kind:
//! - content: first 16 bytes of SHA-256 over the body's canonical bytes.
//!   Used for entities that never change after creation (orgs, projects, teams).
//! - mutable: 16 random bytes, assigned once and kept across versions.
//!   Used for entities whose body gets replaced (credentials, invites, users).
//!
//! The text form is lowercase hex.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Current identifier format version
const ID_VERSION: u8 = 0x01;

const PAYLOAD_LEN: usize = 16;
const ID_LEN: usize = PAYLOAD_LEN + 2;

/// How an entity kind derives its identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMode {
    Content,
    Mutable,
}

/// Kinds of entity the registry stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Org,
    Project,
    Team,
    Credential,
    OrgInvite,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::User,
        EntityKind::Org,
        EntityKind::Project,
        EntityKind::Team,
        EntityKind::Credential,
        EntityKind::OrgInvite,
    ];

    /// Wire byte embedded in the identifier
    pub fn byte(&self) -> u8 {
        match self {
            EntityKind::User => 0x01,
            EntityKind::Org => 0x03,
            EntityKind::Project => 0x04,
            EntityKind::Team => 0x0d,
            EntityKind::Credential => 0x07,
            EntityKind::OrgInvite => 0x13,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.byte() == byte)
    }

    pub fn mode(&self) -> IdMode {
        match self {
            EntityKind::Org | EntityKind::Project | EntityKind::Team => IdMode::Content,
            EntityKind::User | EntityKind::Credential | EntityKind::OrgInvite => IdMode::Mutable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Org => "org",
            EntityKind::Project => "project",
            EntityKind::Team => "team",
            EntityKind::Credential => "credential",
            EntityKind::OrgInvite => "org_invite",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Globally unique, typed entity identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identifier {
    kind: EntityKind,
    payload: [u8; PAYLOAD_LEN],
}

impl Identifier {
    fn assemble(kind: EntityKind, source: &[u8]) -> Self {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&source[..PAYLOAD_LEN]);
        Self { kind, payload }
    }

    /// Derive the identifier of an immutable entity from its canonical bytes
    pub fn derive(kind: EntityKind, canonical: &[u8]) -> Result<Self> {
        if kind.mode() != IdMode::Content {
            return Err(Error::validation(format!(
                "{} identifiers are mutable, not content-derived",
                kind
            )));
        }
        let digest = Sha256::digest(canonical);
        Ok(Self::assemble(kind, &digest))
    }

    /// Derive a content identifier from a body's canonical JSON encoding
    pub fn derive_from<T: Serialize>(kind: EntityKind, body: &T) -> Result<Self> {
        let canonical = serde_json::to_vec(body)?;
        Self::derive(kind, &canonical)
    }

    /// Assign a fresh identifier to a mutable entity
    pub fn new_mutable(kind: EntityKind) -> Result<Self> {
        if kind.mode() != IdMode::Mutable {
            return Err(Error::validation(format!(
                "{} identifiers are content-derived, not mutable",
                kind
            )));
        }
        let uuid = uuid::Uuid::new_v4();
        Ok(Self::assemble(kind, uuid.as_bytes()))
    }

    /// Entity kind embedded in the identifier
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Full wire bytes: version, kind, payload
    pub fn to_bytes(&self) -> [u8; ID_LEN] {
        let mut bytes = [0u8; ID_LEN];
        bytes[0] = ID_VERSION;
        bytes[1] = self.kind.byte();
        bytes[2..].copy_from_slice(&self.payload);
        bytes
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({}:{})", self.kind(), self)
    }
}

impl FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = hex::decode(s).map_err(|e| Error::parse(format!("invalid identifier {:?}: {}", s, e)))?;
        let bytes: [u8; ID_LEN] = raw
            .try_into()
            .map_err(|_| Error::parse(format!("identifier {:?} has the wrong length", s)))?;
        if bytes[0] != ID_VERSION {
            return Err(Error::parse(format!("unsupported identifier version {}", bytes[0])));
        }
        let kind = EntityKind::from_byte(bytes[1])
            .ok_or_else(|| Error::parse(format!("unknown entity kind byte {:#04x}", bytes[1])))?;
        Ok(Self::assemble(kind, &bytes[2..]))
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
