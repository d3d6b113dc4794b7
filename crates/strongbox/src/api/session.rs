use super::expect_body;
use crate::dispatch::{Dispatcher, Request};
use crate::envelope::{self, Envelope};
use crate::error::Result;
use crate::model::User;

/// `/self`
pub struct SessionClient<'a> {
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> SessionClient<'a> {
    pub(crate) fn new(dispatcher: &'a dyn Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// The user the current session is authenticated as
    pub async fn whoami(&self) -> Result<Envelope<User>> {
        let response = self.dispatcher.call(Request::get("/self")).await?;
        envelope::decode(expect_body(response, "/self")?)
    }
}
