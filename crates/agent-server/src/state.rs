//! Application State

use std::sync::Arc;

use agent_core::Agent;
use tokio::sync::watch;

/// Process-wide state handed to every connection. Nothing in it is mutable.
#[derive(Clone)]
pub struct AppState {
    /// Agent with the shared provider client, tool executor and system prompt
    pub agent: Arc<Agent>,

    /// Flips to `true` once the operator asks for shutdown
    pub shutdown: watch::Receiver<bool>,
}
