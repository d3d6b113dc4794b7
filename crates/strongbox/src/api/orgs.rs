use super::list_body;
use crate::dispatch::{Dispatcher, Request};
use crate::envelope::{self, Envelope};
use crate::error::{Error, Result};
use crate::model::Org;
use tracing::debug;

/// `/orgs`
pub struct OrgsClient<'a> {
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> OrgsClient<'a> {
    pub(crate) fn new(dispatcher: &'a dyn Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Look an org up by exact name; more than one match is an error
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Envelope<Org>>> {
        debug!(org = name, "Looking up org");
        let response = self
            .dispatcher
            .call(Request::get("/orgs").with_query("name", name))
            .await?;
        let mut orgs: Vec<Envelope<Org>> = envelope::decode_list(list_body(response))?;
        if orgs.len() > 1 {
            return Err(Error::not_found(format!("Org name {} is ambiguous", name)));
        }
        Ok(orgs.pop())
    }

    /// Every org visible to the caller
    pub async fn list(&self) -> Result<Vec<Envelope<Org>>> {
        let response = self.dispatcher.call(Request::get("/orgs")).await?;
        envelope::decode_list(list_body(response))
    }
}
