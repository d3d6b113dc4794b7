use super::{expect_body, list_body};
use crate::dispatch::{Dispatcher, Method, ProgressFn, Request};
use crate::envelope::{self, Envelope};
use crate::error::Result;
use crate::identity::{EntityKind, Identifier};
use crate::invite::{InviteState, OrgInvite};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const ENDPOINT: &str = "/org-invites";

/// What an invitee proves they received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCode {
    pub org: String,
    pub email: String,
    pub code: String,
}

/// `/org-invites`
///
/// Transitions are requests; the registry decides whether they are legal and
/// reports violations as errors.
pub struct InvitesClient<'a> {
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> InvitesClient<'a> {
    pub(crate) fn new(dispatcher: &'a dyn Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Invites of an org; an empty `states` means every state
    pub async fn list(&self, org_id: &Identifier, states: &[InviteState]) -> Result<Vec<Envelope<OrgInvite>>> {
        let mut request = Request::get(ENDPOINT).with_query("org_id", org_id.to_string());
        for state in states {
            request = request.with_query("state", state.as_str());
        }
        let response = self.dispatcher.call(request).await?;
        envelope::decode_list(list_body(response))
    }

    /// Create an invite; a repeated send creates a second invite
    pub async fn send(
        &self,
        email: &str,
        org_id: Identifier,
        inviter_id: Identifier,
        team_ids: Vec<Identifier>,
    ) -> Result<Envelope<OrgInvite>> {
        let invite = OrgInvite::new(org_id, inviter_id, email, team_ids, Utc::now())?;
        let envelope = Envelope::mutable(EntityKind::OrgInvite, invite)?;
        let body = serde_json::to_value(envelope.clone().into_tagged())?;

        self.dispatcher.call(Request::post(ENDPOINT, body)).await?;
        info!(id = %envelope.id, org_id = %org_id, "Invite sent");
        Ok(envelope)
    }

    pub async fn accept(&self, code: &InviteCode) -> Result<()> {
        let body = serde_json::to_value(code)?;
        self.dispatcher
            .call(Request::post(format!("{}/accept", ENDPOINT), body))
            .await?;
        debug!(org = %code.org, "Invite accepted");
        Ok(())
    }

    /// Bind an accepted invite to the caller's identity
    pub async fn associate(&self, code: &InviteCode) -> Result<Envelope<OrgInvite>> {
        let path = format!("{}/associate", ENDPOINT);
        let body = serde_json::to_value(code)?;
        let response = self.dispatcher.call(Request::post(path.as_str(), body)).await?;
        let invite: Envelope<OrgInvite> = envelope::decode(expect_body(response, &path)?)?;
        debug!(id = %invite.id, "Invite associated");
        Ok(invite)
    }

    /// Approve an associated invite through the daemon
    pub async fn approve(&self, invite_id: &Identifier, progress: &ProgressFn) -> Result<()> {
        let path = format!("{}/{}/approve", ENDPOINT, invite_id);
        let (request, id) = Request::daemon(Method::Post, path, None);
        debug!(correlation_id = %id, invite = %invite_id, "Approving invite");
        self.dispatcher.call_with_progress(request, progress).await?;
        info!(invite = %invite_id, "Invite approved");
        Ok(())
    }
}
