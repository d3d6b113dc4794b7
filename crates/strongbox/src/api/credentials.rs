use super::{expect_body, list_body, OrgsClient, ProjectsClient};
use crate::credential::Credential;
use crate::dispatch::{Dispatcher, Method, ProgressFn, Request};
use crate::envelope::{self, Envelope};
use crate::error::{Error, Result};
use crate::identity::Identifier;
use crate::pathexp::{Dimension, PartialPathExp};
use tracing::{debug, info};

const ENDPOINT: &str = "/credentials";

/// `/credentials`
pub struct CredentialsClient<'a> {
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> CredentialsClient<'a> {
    pub(crate) fn new(dispatcher: &'a dyn Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Submit a credential envelope through the daemon
    ///
    /// Returns the envelope the registry stored, which carries the confirmed
    /// identifier and version.
    pub async fn create(
        &self,
        credential: Envelope<Credential>,
        progress: &ProgressFn,
    ) -> Result<Envelope<Credential>> {
        let body = serde_json::to_value(credential.into_tagged())?;
        let (request, id) = Request::daemon(Method::Post, ENDPOINT, Some(body));
        debug!(correlation_id = %id, "Submitting credential");

        let response = self.dispatcher.call_with_progress(request, progress).await?;
        let stored: Envelope<Credential> = envelope::decode(expect_body(response, ENDPOINT)?)?;
        info!(id = %stored.id, version = stored.version, "Credential stored");
        Ok(stored)
    }

    /// Credentials of an org, optionally narrowed to one project
    pub async fn list(
        &self,
        org_id: &Identifier,
        project_id: Option<&Identifier>,
    ) -> Result<Vec<Envelope<Credential>>> {
        let mut request = Request::get(ENDPOINT).with_query("org_id", org_id.to_string());
        if let Some(project_id) = project_id {
            request = request.with_query("project_id", project_id.to_string());
        }
        let response = self.dispatcher.call(request).await?;
        envelope::decode_list(list_body(response))
    }

    /// Credentials whose path expression falls under `pattern`
    pub async fn search(&self, pattern: &PartialPathExp) -> Result<Vec<Envelope<Credential>>> {
        let org = OrgsClient::new(self.dispatcher)
            .get_by_name(pattern.org())
            .await?
            .ok_or_else(|| Error::not_found("Org not found"))?;

        let project = pattern.segment(Dimension::Project);
        let project_id = if project.is_wildcard() {
            None
        } else {
            let mut projects = ProjectsClient::new(self.dispatcher)
                .search(&org.id, Some(project.as_str()))
                .await?;
            if projects.len() != 1 {
                return Err(Error::not_found("Project not found"));
            }
            projects.pop().map(|p| p.id)
        };

        let all = self.list(&org.id, project_id.as_ref()).await?;
        let total = all.len();
        let matched: Vec<_> = all
            .into_iter()
            .filter(|c| pattern.matches(c.body.pathexp()))
            .collect();
        debug!(pattern = %pattern, total, matched = matched.len(), "Filtered credentials");
        Ok(matched)
    }
}
