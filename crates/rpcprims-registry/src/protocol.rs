//! JSON command set spoken between [`RemoteStore`](crate::RemoteStore) and
//! [`StoreServer`](crate::StoreServer). One command per frame, one reply per
//! command, in order.

use serde::{Deserialize, Serialize};

/// A single set-store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreCommand {
    Add { key: String, member: String },
    RandomMember { key: String },
    Remove { key: String, member: String },
    Members { key: String },
}

impl StoreCommand {
    pub fn key(&self) -> &str {
        match self {
            StoreCommand::Add { key, .. }
            | StoreCommand::RandomMember { key }
            | StoreCommand::Remove { key, .. }
            | StoreCommand::Members { key } => key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreCommand::Add { .. } => "add",
            StoreCommand::RandomMember { .. } => "random_member",
            StoreCommand::Remove { .. } => "remove",
            StoreCommand::Members { .. } => "members",
        }
    }
}

/// Reply to a [`StoreCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "value", rename_all = "snake_case")]
pub enum StoreReply {
    Added(bool),
    Member(Option<String>),
    Removed(bool),
    Members(Vec<String>),
    Error(String),
}
