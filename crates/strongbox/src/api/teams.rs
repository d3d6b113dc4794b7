use super::list_body;
use crate::dispatch::{Dispatcher, Request};
use crate::envelope::{self, Envelope};
use crate::error::Result;
use crate::identity::Identifier;
use crate::model::Team;

/// `/teams`
pub struct TeamsClient<'a> {
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> TeamsClient<'a> {
    pub(crate) fn new(dispatcher: &'a dyn Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub async fn get_by_name(&self, org_id: &Identifier, name: &str) -> Result<Vec<Envelope<Team>>> {
        let request = Request::get("/teams")
            .with_query("org_id", org_id.to_string())
            .with_query("name", name);
        let response = self.dispatcher.call(request).await?;
        envelope::decode_list(list_body(response))
    }
}
