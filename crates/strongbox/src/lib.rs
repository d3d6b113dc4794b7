//! strongbox - client core for a hosted secrets registry
//!
//! "A secret has exactly one address, and you always know which one."
//!
//! Credentials live at path expressions
//! (`/org/project/environment/service/identity/instance`) and travel as
//! versioned, typed envelopes. Writes and privileged operations go through
//! the local daemon, which streams progress back to the caller.
//!
//! - [`pathexp`]: parsing, construction and matching of path expressions
//! - [`identity`] / [`envelope`]: typed identifiers and tagged envelopes
//! - [`set`]: resolving `set`/`unset` input into stored credentials
//! - [`invite`]: the org invite lifecycle
//! - [`dispatch`] / [`transport`]: the request contract and its socket transport

pub mod api;
pub mod credential;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod invite;
pub mod mock;
pub mod model;
pub mod pathexp;
pub mod set;
pub mod transport;

pub use api::Client;
pub use credential::{Credential, CredentialState, CredentialValue};
pub use dispatch::{Dispatcher, ProgressEvent, ProgressFn, Request};
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use identity::{EntityKind, Identifier};
pub use invite::{InviteState, OrgInvite};
pub use pathexp::{PartialPathExp, PathExp};
pub use transport::SocketDispatcher;
