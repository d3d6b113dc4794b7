//! Versioned envelopes
//!
//! Every stored entity travels as `{ id, version, body }`. The body carries an
//! explicit `type` discriminant; decoding switches on it and refuses anything
//! it does not know, or anything that does not belong to the identifier's
//! entity kind.

use crate::credential::{CredentialV1, CredentialV2};
use crate::error::{Error, Result};
use crate::identity::{EntityKind, Identifier};
use crate::invite::OrgInvite;
use crate::model::{Org, Project, Team, User};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Name of the discriminant field inside every body
pub const TAG_FIELD: &str = "type";

/// Identifier + version + body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<B> {
    pub id: Identifier,
    pub version: u8,
    pub body: B,
}

/// Envelope whose body has not been decoded yet
pub type RawEnvelope = Envelope<Value>;

impl<B> Envelope<B> {
    pub fn wrap(id: Identifier, version: u8, body: B) -> Self {
        Self { id, version, body }
    }

    /// The envelope for the next accepted mutation: same id, version + 1
    pub fn next(&self, body: B) -> Result<Self> {
        let version = self
            .version
            .checked_add(1)
            .ok_or_else(|| Error::validation("envelope version overflow"))?;
        Ok(Self {
            id: self.id,
            version,
            body,
        })
    }

    pub fn map<C, F: FnOnce(B) -> C>(self, f: F) -> Envelope<C> {
        Envelope {
            id: self.id,
            version: self.version,
            body: f(self.body),
        }
    }
}

impl<B: Serialize> Envelope<B> {
    /// First version of an immutable entity, identified by its content
    pub fn content(kind: EntityKind, body: B) -> Result<Self> {
        let id = Identifier::derive_from(kind, &body)?;
        Ok(Self::wrap(id, 1, body))
    }
}

impl<B> Envelope<B> {
    /// First version of a mutable entity, under a freshly assigned id
    pub fn mutable(kind: EntityKind, body: B) -> Result<Self> {
        let id = Identifier::new_mutable(kind)?;
        Ok(Self::wrap(id, 1, body))
    }
}

impl<B: Into<Body>> Envelope<B> {
    /// Erase the concrete body type for sending
    pub fn into_tagged(self) -> Envelope<Body> {
        self.map(Into::into)
    }
}

impl Envelope<Body> {
    /// Narrow a decoded envelope to one concrete body type
    pub fn into_typed<T>(self) -> Result<Envelope<T>>
    where
        T: TryFrom<Body, Error = Error>,
    {
        let Envelope { id, version, body } = self;
        Ok(Envelope::wrap(id, version, T::try_from(body)?))
    }
}

/// Known body discriminants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyTag {
    User,
    Org,
    Project,
    Team,
    CredentialV1,
    CredentialV2,
    OrgInvite,
}

impl BodyTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyTag::User => "user",
            BodyTag::Org => "org",
            BodyTag::Project => "project",
            BodyTag::Team => "team",
            BodyTag::CredentialV1 => "credential_v1",
            BodyTag::CredentialV2 => "credential_v2",
            BodyTag::OrgInvite => "org_invite",
        }
    }

    /// Entity kind whose identifiers may carry this body
    pub fn kind(&self) -> EntityKind {
        match self {
            BodyTag::User => EntityKind::User,
            BodyTag::Org => EntityKind::Org,
            BodyTag::Project => EntityKind::Project,
            BodyTag::Team => EntityKind::Team,
            BodyTag::CredentialV1 | BodyTag::CredentialV2 => EntityKind::Credential,
            BodyTag::OrgInvite => EntityKind::OrgInvite,
        }
    }
}

impl FromStr for BodyTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(BodyTag::User),
            "org" => Ok(BodyTag::Org),
            "project" => Ok(BodyTag::Project),
            "team" => Ok(BodyTag::Team),
            "credential_v1" => Ok(BodyTag::CredentialV1),
            "credential_v2" => Ok(BodyTag::CredentialV2),
            "org_invite" => Ok(BodyTag::OrgInvite),
            other => Err(Error::decode(format!("unknown body type {:?}", other))),
        }
    }
}

impl fmt::Display for BodyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of entity bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Body {
    User(User),
    Org(Org),
    Project(Project),
    Team(Team),
    CredentialV1(CredentialV1),
    CredentialV2(CredentialV2),
    OrgInvite(OrgInvite),
}

impl Body {
    pub fn tag(&self) -> BodyTag {
        match self {
            Body::User(_) => BodyTag::User,
            Body::Org(_) => BodyTag::Org,
            Body::Project(_) => BodyTag::Project,
            Body::Team(_) => BodyTag::Team,
            Body::CredentialV1(_) => BodyTag::CredentialV1,
            Body::CredentialV2(_) => BodyTag::CredentialV2,
            Body::OrgInvite(_) => BodyTag::OrgInvite,
        }
    }
}

/// Decode a raw envelope, checking the discriminant against the id's kind
pub fn unwrap(raw: RawEnvelope) -> Result<(BodyTag, Envelope<Body>)> {
    let tag = raw
        .body
        .get(TAG_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::decode(format!("body of {} has no type discriminant", raw.id)))?
        .parse::<BodyTag>()?;

    if tag.kind() != raw.id.kind() {
        return Err(Error::decode(format!(
            "body type {} cannot belong to a {} identifier",
            tag,
            raw.id.kind()
        )));
    }

    let body: Body = serde_json::from_value(raw.body)
        .map_err(|e| Error::decode(format!("invalid {} body: {}", tag, e)))?;

    Ok((tag, Envelope::wrap(raw.id, raw.version, body)))
}

/// Decode a raw JSON value holding one envelope into a concrete body type
pub fn decode<T>(value: Value) -> Result<Envelope<T>>
where
    T: TryFrom<Body, Error = Error>,
{
    let raw: RawEnvelope = serde_json::from_value(value)?;
    let (_, envelope) = unwrap(raw)?;
    envelope.into_typed()
}

/// Decode a JSON array of envelopes into a concrete body type
pub fn decode_list<T>(value: Value) -> Result<Vec<Envelope<T>>>
where
    T: TryFrom<Body, Error = Error>,
{
    let raws: Vec<RawEnvelope> = serde_json::from_value(value)?;
    raws.into_iter()
        .map(|raw| unwrap(raw).and_then(|(_, envelope)| envelope.into_typed()))
        .collect()
}

macro_rules! body_variant {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Body {
            fn from(body: $ty) -> Self {
                Body::$variant(body)
            }
        }

        impl TryFrom<Body> for $ty {
            type Error = Error;

            fn try_from(body: Body) -> Result<Self> {
                match body {
                    Body::$variant(inner) => Ok(inner),
                    other => Err(Error::decode(format!(
                        "expected {} body, got {}",
                        BodyTag::$variant,
                        other.tag()
                    ))),
                }
            }
        }
    };
}

body_variant!(User, User);
body_variant!(Org, Org);
body_variant!(Project, Project);
body_variant!(Team, Team);
body_variant!(CredentialV1, CredentialV1);
body_variant!(CredentialV2, CredentialV2);
body_variant!(OrgInvite, OrgInvite);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn org_envelope() -> Envelope<Org> {
        Envelope::content(EntityKind::Org, Org { name: "acme".to_string() }).unwrap()
    }

    #[test]
    fn test_content_envelope() {
        let a = org_envelope();
        let b = org_envelope();
        assert_eq!(a.id, b.id);
        assert_eq!(a.version, 1);
    }

    #[test]
    fn test_next_keeps_id() {
        let env = Envelope::mutable(EntityKind::User, User::new("alice", "a@example.com", "Alice")).unwrap();
        let next = env.next(User::new("alice", "alice@example.com", "Alice")).unwrap();
        assert_eq!(next.id, env.id);
        assert_eq!(next.version, 2);
    }

    #[test]
    fn test_next_refuses_version_overflow() {
        let org = org_envelope();
        let last = Envelope::wrap(org.id, u8::MAX, org.body.clone());
        let err = last.next(org.body).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.to_string(), "envelope version overflow");
    }

    #[test]
    fn test_tagged_wire_form() {
        let env = org_envelope().into_tagged();
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["body"]["type"], "org");
        assert_eq!(value["body"]["name"], "acme");
        assert_eq!(value["version"], 1);

        let decoded: Envelope<Org> = decode(value).unwrap();
        assert_eq!(decoded.body.name, "acme");
    }

    #[test]
    fn test_unknown_discriminant() {
        let env = org_envelope();
        let raw = RawEnvelope::wrap(env.id, 1, json!({"type": "galaxy", "name": "acme"}));
        assert!(matches!(unwrap(raw), Err(Error::Decode(_))));
    }

    #[test]
    fn test_missing_discriminant_is_not_guessed() {
        let env = org_envelope();
        // Structurally a perfect org body, but untagged
        let raw = RawEnvelope::wrap(env.id, 1, json!({"name": "acme"}));
        assert!(matches!(unwrap(raw), Err(Error::Decode(_))));
    }

    #[test]
    fn test_discriminant_must_match_kind() {
        let env = org_envelope();
        let raw = RawEnvelope::wrap(env.id, 1, json!({"type": "user", "username": "a", "email": "b", "name": "c"}));
        let err = unwrap(raw).unwrap_err();
        assert!(err.to_string().contains("cannot belong to a org identifier"));
    }

    #[test]
    fn test_into_typed_mismatch() {
        let env = org_envelope().into_tagged();
        let result: Result<Envelope<Project>> = env.into_typed();
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_list() {
        let a = org_envelope().into_tagged();
        let b = Envelope::content(EntityKind::Org, Org { name: "beta".to_string() })
            .unwrap()
            .into_tagged();
        let value = serde_json::to_value(vec![a, b]).unwrap();
        let orgs: Vec<Envelope<Org>> = decode_list(value).unwrap();
        let names: Vec<&str> = orgs.iter().map(|o| o.body.name.as_str()).collect();
        assert_eq!(names, vec!["acme", "beta"]);
    }
}
