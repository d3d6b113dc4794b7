//! Plain entity bodies: users, orgs, projects, teams

use crate::identity::Identifier;
use serde::{Deserialize, Serialize};

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub name: String,
}

impl User {
    pub fn new(username: &str, email: &str, name: &str) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            name: name.to_string(),
        }
    }
}

/// An organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Org {
    pub name: String,
}

/// A project inside an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub org_id: Identifier,
    pub name: String,
}

/// A team inside an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub org_id: Identifier,
    pub name: String,
}
