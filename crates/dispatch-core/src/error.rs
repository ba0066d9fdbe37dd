//! Error types for the dispatch core.
//!
//! Expected outcomes (validation failures, pool exhaustion, empty
//! search results) are variants here rather than panics, so every lane
//! can turn them into an ordinary `success: false` response for the one
//! request that hit them.

use std::time::Duration;

use thiserror::Error;

use crate::action::Action;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing or empty required field. Reported verbatim, never logged as a fault.
    #[error("{0}")]
    Validation(String),

    /// No endpoint became free within the acquisition bound.
    #[error("Could not acquire an endpoint within {} ms", .0.as_millis())]
    PoolExhausted(Duration),

    /// An external generation call failed or returned something unusable.
    #[error("{0}")]
    Collaborator(String),

    /// The collaborator answered, but with nothing.
    #[error("No results found")]
    NoResults,

    /// Anything else. The detail goes to the logs only.
    #[error("internal error: {0}")]
    Internal(String),

    /// The owning session no longer accepts work.
    #[error("session closed")]
    SessionClosed,
}

impl DispatchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DispatchError::Validation(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        DispatchError::Collaborator(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        DispatchError::Internal(msg.into())
    }

    /// `true` for failures worth an `error!` on the server side.
    pub fn is_fault(&self) -> bool {
        !matches!(self, DispatchError::Validation(_) | DispatchError::NoResults)
    }

    /// Message sent to the client in the `error` field.
    pub fn client_message(&self, action: &str) -> String {
        let label = Action::parse(action)
            .map(Action::failure_label)
            .unwrap_or("Request error");
        match self {
            DispatchError::Validation(msg) => msg.clone(),
            DispatchError::NoResults => self.to_string(),
            DispatchError::PoolExhausted(_) | DispatchError::Collaborator(_) => {
                format!("{}: {}", label, self)
            }
            DispatchError::SessionClosed => format!("{}: {}", label, self),
            DispatchError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
