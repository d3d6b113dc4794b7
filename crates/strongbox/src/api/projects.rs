use super::list_body;
use crate::dispatch::{Dispatcher, Request};
use crate::envelope::{self, Envelope};
use crate::error::Result;
use crate::identity::Identifier;
use crate::model::Project;
use tracing::debug;

/// `/projects`
pub struct ProjectsClient<'a> {
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> ProjectsClient<'a> {
    pub(crate) fn new(dispatcher: &'a dyn Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Projects of an org, optionally narrowed to an exact name
    pub async fn search(&self, org_id: &Identifier, name: Option<&str>) -> Result<Vec<Envelope<Project>>> {
        debug!(org_id = %org_id, project = ?name, "Looking up projects");
        let mut request = Request::get("/projects").with_query("org_id", org_id.to_string());
        if let Some(name) = name {
            request = request.with_query("name", name);
        }
        let response = self.dispatcher.call(request).await?;
        envelope::decode_list(list_body(response))
    }

    pub async fn list(&self, org_id: &Identifier) -> Result<Vec<Envelope<Project>>> {
        self.search(org_id, None).await
    }
}
