//! Registry clients
//!
//! Thin typed wrappers over the [`Dispatcher`]: each builds a request for one
//! endpoint and decodes the envelopes that come back. Nothing is cached
//! between calls.

mod credentials;
mod invites;
mod orgs;
mod projects;
mod session;
mod teams;

pub use credentials::CredentialsClient;
pub use invites::{InviteCode, InvitesClient};
pub use orgs::OrgsClient;
pub use projects::ProjectsClient;
pub use session::SessionClient;
pub use teams::TeamsClient;

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

/// Entry point to the registry endpoints
#[derive(Clone)]
pub struct Client {
    dispatcher: Arc<dyn Dispatcher>,
}

impl Client {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &dyn Dispatcher {
        self.dispatcher.as_ref()
    }

    pub fn orgs(&self) -> OrgsClient<'_> {
        OrgsClient::new(self.dispatcher())
    }

    pub fn projects(&self) -> ProjectsClient<'_> {
        ProjectsClient::new(self.dispatcher())
    }

    pub fn teams(&self) -> TeamsClient<'_> {
        TeamsClient::new(self.dispatcher())
    }

    pub fn session(&self) -> SessionClient<'_> {
        SessionClient::new(self.dispatcher())
    }

    pub fn credentials(&self) -> CredentialsClient<'_> {
        CredentialsClient::new(self.dispatcher())
    }

    pub fn invites(&self) -> InvitesClient<'_> {
        InvitesClient::new(self.dispatcher())
    }
}

/// Insist on a response body
fn expect_body(response: Option<Value>, endpoint: &str) -> Result<Value> {
    response.ok_or_else(|| Error::decode(format!("{} returned no content", endpoint)))
}

/// Treat a missing body as an empty list
fn list_body(response: Option<Value>) -> Value {
    response.unwrap_or_else(|| Value::Array(Vec::new()))
}
