//! In-memory registry
//!
//! A [`Dispatcher`] that plays both the registry and the daemon with all
//! state held in memory. Invite transition rules come from the invite model;
//! a refused request reaches the caller as a transport error, the same way a
//! refusal from a remote registry would.

use crate::api::InviteCode;
use crate::credential::Credential;
use crate::dispatch::{
    ignore_progress, Channel, Dispatcher, Method, ProgressEvent, ProgressFn, Request,
};
use crate::envelope::{self, Body, Envelope};
use crate::error::{Error, Result};
use crate::identity::{EntityKind, Identifier};
use crate::invite::{InviteState, OrgInvite};
use crate::model::{Org, Project, Team, User};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Default)]
struct State {
    users: Vec<Envelope<User>>,
    current: Option<Identifier>,
    orgs: Vec<Envelope<Org>>,
    projects: Vec<Envelope<Project>>,
    teams: Vec<Envelope<Team>>,
    credentials: Vec<Envelope<Credential>>,
    invites: Vec<Envelope<OrgInvite>>,
    codes: HashMap<Identifier, String>,
    members: Vec<(Identifier, Identifier)>,
    failures: Vec<(String, String)>,
    requests: Vec<String>,
}

/// Registry and daemon stand-in
pub struct MockRegistry {
    state: Mutex<State>,
}

impl MockRegistry {
    /// An empty registry with `alice` signed in
    pub fn new() -> Result<Self> {
        let registry = Self {
            state: Mutex::new(State::default()),
        };
        registry.sign_in(User::new("alice", "alice@example.com", "Alice"))?;
        Ok(registry)
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::transport("registry state lock poisoned"))
    }

    /// Register a user and make them the caller of later requests
    pub fn sign_in(&self, user: User) -> Result<Identifier> {
        let envelope = Envelope::mutable(EntityKind::User, user)?;
        let id = envelope.id;
        let mut state = self.state()?;
        state.users.push(envelope);
        state.current = Some(id);
        Ok(id)
    }

    /// Switch the caller to an already registered user
    pub fn sign_in_as(&self, id: &Identifier) -> Result<()> {
        let mut state = self.state()?;
        if !state.users.iter().any(|u| u.id == *id) {
            return Err(Error::not_found(format!("no user {}", id)));
        }
        state.current = Some(*id);
        Ok(())
    }

    pub fn current_user(&self) -> Result<Envelope<User>> {
        self.state()?.current_user().cloned()
    }

    pub fn add_org(&self, name: &str) -> Result<Identifier> {
        let envelope = Envelope::content(EntityKind::Org, Org { name: name.to_string() })?;
        let id = envelope.id;
        let mut state = self.state()?;
        if !state.orgs.iter().any(|o| o.id == id) {
            state.orgs.push(envelope);
        }
        Ok(id)
    }

    pub fn add_project(&self, org_id: Identifier, name: &str) -> Result<Identifier> {
        let envelope = Envelope::content(
            EntityKind::Project,
            Project {
                org_id,
                name: name.to_string(),
            },
        )?;
        let id = envelope.id;
        let mut state = self.state()?;
        state.org(&org_id)?;
        if !state.projects.iter().any(|p| p.id == id) {
            state.projects.push(envelope);
        }
        Ok(id)
    }

    pub fn add_team(&self, org_id: Identifier, name: &str) -> Result<Identifier> {
        let envelope = Envelope::content(
            EntityKind::Team,
            Team {
                org_id,
                name: name.to_string(),
            },
        )?;
        let id = envelope.id;
        let mut state = self.state()?;
        state.org(&org_id)?;
        if !state.teams.iter().any(|t| t.id == id) {
            state.teams.push(envelope);
        }
        Ok(id)
    }

    pub fn org_id(&self, name: &str) -> Result<Identifier> {
        let state = self.state()?;
        state
            .orgs
            .iter()
            .find(|o| o.body.name == name)
            .map(|o| o.id)
            .ok_or_else(|| Error::not_found(format!("no org {}", name)))
    }

    pub fn project_id(&self, org_id: &Identifier, name: &str) -> Result<Identifier> {
        let state = self.state()?;
        state
            .projects
            .iter()
            .find(|p| p.body.org_id == *org_id && p.body.name == name)
            .map(|p| p.id)
            .ok_or_else(|| Error::not_found(format!("no project {}", name)))
    }

    /// The code mailed with the most recent invite for `email`
    pub fn invite_code(&self, email: &str) -> Option<String> {
        let state = self.state().ok()?;
        let invite = state
            .invites
            .iter()
            .rev()
            .find(|i| i.body.email().eq_ignore_ascii_case(email))?;
        state.codes.get(&invite.id).cloned()
    }

    pub fn team_members(&self, team_id: &Identifier) -> Result<Vec<Identifier>> {
        let state = self.state()?;
        Ok(state
            .members
            .iter()
            .filter(|(team, _)| team == team_id)
            .map(|(_, user)| *user)
            .collect())
    }

    /// Everything stored, latest version of each credential
    pub fn credentials(&self) -> Result<Vec<Envelope<Credential>>> {
        Ok(self.state()?.credentials.clone())
    }

    /// `METHOD /path` of every request received, in order
    pub fn requests(&self) -> Result<Vec<String>> {
        Ok(self.state()?.requests.clone())
    }

    /// Refuse every later request whose path starts with `prefix`
    pub fn fail_on(&self, prefix: &str, message: &str) -> Result<()> {
        self.state()?
            .failures
            .push((prefix.to_string(), message.to_string()));
        Ok(())
    }

    fn handle(&self, request: Request, progress: &ProgressFn) -> Result<Option<Value>> {
        let daemon = request.channel == Channel::Daemon;
        let id = request.correlation_id.clone().unwrap_or_default();
        let report = |message: String| {
            if daemon {
                progress(&ProgressEvent {
                    id: id.clone(),
                    message,
                });
            }
        };

        report(format!("preparing {} {}", request.method, request.path));
        let result = {
            let mut state = self.state()?;
            state
                .requests
                .push(format!("{} {}", request.method, request.path));
            let failure = state
                .failures
                .iter()
                .find(|(prefix, _)| request.path.starts_with(prefix.as_str()))
                .map(|(_, message)| message.clone());
            match failure {
                Some(message) => Err(Error::transport(message)),
                None => state.route(&request),
            }
        };
        debug!(method = %request.method, path = %request.path, ok = result.is_ok(), "Registry handled request");

        match result {
            Ok(body) => {
                report(format!("{} {} complete", request.method, request.path));
                Ok(body)
            }
            Err(Error::Transport(message)) => Err(Error::Transport(message)),
            Err(other) => Err(Error::transport(other.to_string())),
        }
    }
}

#[async_trait]
impl Dispatcher for MockRegistry {
    async fn call(&self, request: Request) -> Result<Option<Value>> {
        self.handle(request, &ignore_progress)
    }

    async fn call_with_progress(&self, request: Request, progress: &ProgressFn) -> Result<Option<Value>> {
        self.handle(request, progress)
    }
}

fn tagged<'a, B, I>(items: I) -> Result<Option<Value>>
where
    B: Clone + Into<Body> + 'a,
    I: Iterator<Item = &'a Envelope<B>>,
{
    let list: Vec<Envelope<Body>> = items.cloned().map(Envelope::into_tagged).collect();
    Ok(Some(serde_json::to_value(list)?))
}

fn tagged_one<B: Into<Body>>(item: Envelope<B>) -> Result<Option<Value>> {
    Ok(Some(serde_json::to_value(item.into_tagged())?))
}

fn required_id(request: &Request, key: &str) -> Result<Identifier> {
    request
        .query_value(key)
        .ok_or_else(|| Error::validation(format!("missing query parameter {}", key)))?
        .parse()
}

fn required_body(request: &Request) -> Result<Value> {
    request
        .body
        .clone()
        .ok_or_else(|| Error::validation(format!("{} needs a request body", request.path)))
}

fn require_daemon(request: &Request) -> Result<()> {
    if request.channel != Channel::Daemon {
        return Err(Error::validation(format!(
            "{} must be proxied by the daemon",
            request.path
        )));
    }
    Ok(())
}

impl State {
    fn route(&mut self, request: &Request) -> Result<Option<Value>> {
        let path = request.path.trim_matches('/');
        let segments: Vec<&str> = path.split('/').collect();
        let name = request.query_value("name");
        let named = |candidate: &str| name.map_or(true, |n| n == candidate);

        match (request.method, segments.as_slice()) {
            (Method::Get, ["self"]) => tagged_one(self.current_user()?.clone()),
            (Method::Get, ["orgs"]) => tagged(self.orgs.iter().filter(|o| named(o.body.name.as_str()))),
            (Method::Get, ["projects"]) => {
                let org_id = required_id(request, "org_id")?;
                tagged(
                    self.projects
                        .iter()
                        .filter(|p| p.body.org_id == org_id && named(p.body.name.as_str())),
                )
            }
            (Method::Get, ["teams"]) => {
                let org_id = required_id(request, "org_id")?;
                tagged(
                    self.teams
                        .iter()
                        .filter(|t| t.body.org_id == org_id && named(t.body.name.as_str())),
                )
            }
            (Method::Get, ["credentials"]) => {
                let org_id = required_id(request, "org_id")?;
                let project_id = match request.query_value("project_id") {
                    Some(text) => Some(text.parse::<Identifier>()?),
                    None => None,
                };
                tagged(self.credentials.iter().filter(|c| {
                    *c.body.org_id() == org_id
                        && project_id.map_or(true, |p| *c.body.project_id() == p)
                }))
            }
            (Method::Post, ["credentials"]) => {
                require_daemon(request)?;
                self.store_credential(required_body(request)?)
            }
            (Method::Get, ["org-invites"]) => {
                let org_id = required_id(request, "org_id")?;
                let states = request
                    .query_values("state")
                    .map(str::parse)
                    .collect::<Result<Vec<InviteState>>>()?;
                tagged(self.invites.iter().filter(|i| {
                    *i.body.org_id() == org_id
                        && (states.is_empty() || states.contains(&i.body.state()))
                }))
            }
            (Method::Post, ["org-invites"]) => self.create_invite(required_body(request)?),
            (Method::Post, ["org-invites", "accept"]) => {
                let index = self.find_invite(required_body(request)?)?;
                let invite = &mut self.invites[index];
                let accepted = invite.body.clone().accept(Utc::now())?;
                *invite = invite.next(accepted)?;
                Ok(None)
            }
            (Method::Post, ["org-invites", "associate"]) => {
                let index = self.find_invite(required_body(request)?)?;
                let user = self.current_user()?.id;
                let invite = &mut self.invites[index];
                let associated = invite.body.clone().associate(user)?;
                *invite = invite.next(associated)?;
                tagged_one(invite.clone())
            }
            (Method::Post, ["org-invites", id, "approve"]) => {
                require_daemon(request)?;
                let id: Identifier = id.parse()?;
                self.approve_invite(&id)
            }
            _ => Err(Error::transport(format!(
                "no route for {} {}",
                request.method, request.path
            ))),
        }
    }

    fn current_user(&self) -> Result<&Envelope<User>> {
        self.current
            .and_then(|id| self.users.iter().find(|u| u.id == id))
            .ok_or_else(|| Error::transport("not signed in"))
    }

    fn org(&self, id: &Identifier) -> Result<&Envelope<Org>> {
        self.orgs
            .iter()
            .find(|o| o.id == *id)
            .ok_or_else(|| Error::not_found(format!("unknown org {}", id)))
    }

    fn store_credential(&mut self, value: Value) -> Result<Option<Value>> {
        let incoming: Envelope<Credential> = envelope::decode(value)?;
        let org_id = *incoming.body.org_id();
        let project_id = *incoming.body.project_id();
        self.org(&org_id)?;
        if !self
            .projects
            .iter()
            .any(|p| p.id == project_id && p.body.org_id == org_id)
        {
            return Err(Error::not_found(format!("unknown project {}", project_id)));
        }

        let existing = self.credentials.iter_mut().find(|c| {
            c.body.pathexp() == incoming.body.pathexp() && c.body.name() == incoming.body.name()
        });
        match existing {
            Some(current) => {
                *current = current.next(incoming.body)?;
                tagged_one(current.clone())
            }
            None => {
                self.credentials.push(incoming.clone());
                tagged_one(incoming)
            }
        }
    }

    fn create_invite(&mut self, value: Value) -> Result<Option<Value>> {
        let invite: Envelope<OrgInvite> = envelope::decode(value)?;
        self.org(invite.body.org_id())?;
        if invite.body.state() != InviteState::Sent {
            return Err(Error::validation("a new invite must be in state sent"));
        }
        let code = uuid::Uuid::new_v4().simple().to_string();
        self.codes.insert(invite.id, code);
        self.invites.push(invite);
        Ok(None)
    }

    fn find_invite(&self, value: Value) -> Result<usize> {
        let code: InviteCode = serde_json::from_value(value)?;
        let org_id = self
            .orgs
            .iter()
            .find(|o| o.body.name == code.org)
            .map(|o| o.id)
            .ok_or_else(|| Error::not_found(format!("unknown org {}", code.org)))?;
        self.invites
            .iter()
            .rposition(|i| {
                *i.body.org_id() == org_id
                    && i.body.email().eq_ignore_ascii_case(&code.email)
                    && self.codes.get(&i.id) == Some(&code.code)
            })
            .ok_or_else(|| Error::not_found("invite not found"))
    }

    fn approve_invite(&mut self, id: &Identifier) -> Result<Option<Value>> {
        let approver = self.current_user()?.id;
        let index = self
            .invites
            .iter()
            .position(|i| i.id == *id)
            .ok_or_else(|| Error::not_found(format!("unknown invite {}", id)))?;
        let invite = &mut self.invites[index];
        let approved = invite.body.clone().approve(approver, Utc::now())?;
        *invite = invite.next(approved)?;

        if let Some(invitee) = invite.body.invitee_id().copied() {
            let teams = invite.body.pending_teams().to_vec();
            for team in teams {
                self.members.push((team, invitee));
            }
        }
        Ok(None)
    }
}
