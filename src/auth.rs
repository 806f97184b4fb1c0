//! Signed-in identity, as reported by the account provider.
//!
//! The provider itself (passwords, tokens, resets) lives outside this crate.
//! Components only need "who is signed in right now" and a way to react when
//! that changes, which a `watch` channel gives us directly.

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name,
        }
    }

    /// A fresh local account id.
    pub fn generate(display_name: Option<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), display_name)
    }
}

#[derive(Clone)]
pub struct AuthState {
    sender: Arc<watch::Sender<Option<Identity>>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }

    pub fn sign_in(&self, identity: Identity) {
        info!("signed in as {}", identity.uid);
        self.sender.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.sender.send_replace(None) {
            info!("signed out {}", previous.uid);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.sender.subscribe()
    }
}
