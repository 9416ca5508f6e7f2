//! Correlation between a directory-picker launch and its result.
//!
//! Every launch gets a fresh [`GrantToken`]. The caller keeps the matching
//! [`PendingGrant`]; the platform callback completes it through the
//! [`GrantBroker`] by token, over a single-shot channel.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{TreeError, TreeResult};
use crate::node::UriAccess;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrantToken(Uuid);

impl GrantToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for GrantToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the picker is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub token: GrantToken,
    /// Tree URI the picker opens at. The user may pick something else.
    pub initial_uri: String,
    pub access: UriAccess,
    pub persistable: bool,
    /// Grant covers every document below the picked tree.
    pub prefix: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted { uri: String, access: UriAccess },
    Dismissed,
}

#[derive(Debug)]
pub struct PendingGrant {
    request: GrantRequest,
    receiver: oneshot::Receiver<GrantOutcome>,
}

impl PendingGrant {
    pub fn token(&self) -> GrantToken {
        self.request.token
    }

    pub fn request(&self) -> &GrantRequest {
        &self.request
    }

    /// Take the outcome if the callback already delivered it.
    pub fn try_take(&mut self) -> TreeResult<GrantOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(TryRecvError::Empty) => Err(TreeError::Grant(format!(
                "request {} has not completed",
                self.request.token
            ))),
            Err(TryRecvError::Closed) => Err(TreeError::Grant(format!(
                "request {} was cancelled",
                self.request.token
            ))),
        }
    }
}

#[derive(Debug, Default)]
pub struct GrantBroker {
    pending: HashMap<GrantToken, oneshot::Sender<GrantOutcome>>,
}

impl GrantBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, initial_uri: &str) -> PendingGrant {
        self.pending.retain(|_, sender| !sender.is_closed());
        let (sender, receiver) = oneshot::channel();
        let request = GrantRequest {
            token: GrantToken::new(),
            initial_uri: initial_uri.to_string(),
            access: UriAccess::READ_WRITE,
            persistable: true,
            prefix: true,
        };
        debug!(token = %request.token, uri = %request.initial_uri, "grant request registered");
        self.pending.insert(request.token, sender);
        PendingGrant { request, receiver }
    }

    /// Deliver the platform's answer for `token`. Each token completes once.
    pub fn complete(&mut self, token: GrantToken, outcome: GrantOutcome) -> TreeResult<()> {
        let sender = self
            .pending
            .remove(&token)
            .ok_or_else(|| TreeError::Grant(format!("no pending request {token}")))?;
        sender
            .send(outcome)
            .map_err(|_| TreeError::Grant(format!("request {token} was abandoned")))
    }

    pub fn cancel(&mut self, token: GrantToken) -> bool {
        self.pending.remove(&token).is_some()
    }

    /// Requests still waiting on the platform. Requests whose
    /// `PendingGrant` was dropped no longer count.
    pub fn pending_count(&self) -> usize {
        self.pending.values().filter(|sender| !sender.is_closed()).count()
    }
}
