//! Native events delivered while the pump runs.
//!
//! Events cross the C ABI as JSON `{"type": ..., "data": ...}` documents and
//! are decoded here before reaching the registered [`EventHandler`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A user as reported by the native layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SdkEvent {
    ActivityJoin { secret: String },
    ActivitySpectate { secret: String },
    ActivityJoinRequest { user: User },
    OverlayToggle { locked: bool },
}

/// Application callbacks for native events. Every method defaults to a no-op.
///
/// Called on whichever thread is running [`crate::Core::run_callbacks`],
/// while that thread holds the session's dispatch guard.
pub trait EventHandler: Send + Sync {
    fn on_activity_join(&self, _secret: &str) {}
    fn on_activity_spectate(&self, _secret: &str) {}
    fn on_activity_join_request(&self, _user: &User) {}
    fn on_overlay_toggle(&self, _locked: bool) {}
}

/// Routes decoded events to an [`EventHandler`].
#[derive(Clone)]
pub struct EventSink {
    handler: Arc<dyn EventHandler>,
}

impl EventSink {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self { handler }
    }

    pub fn dispatch(&self, event: &SdkEvent) {
        match event {
            SdkEvent::ActivityJoin { secret } => self.handler.on_activity_join(secret),
            SdkEvent::ActivitySpectate { secret } => self.handler.on_activity_spectate(secret),
            SdkEvent::ActivityJoinRequest { user } => self.handler.on_activity_join_request(user),
            SdkEvent::OverlayToggle { locked } => self.handler.on_overlay_toggle(*locked),
        }
    }

    /// Decode and dispatch one JSON event. Malformed events are dropped.
    pub fn dispatch_json(&self, json: &str) {
        match serde_json::from_str::<SdkEvent>(json) {
            Ok(event) => self.dispatch(&event),
            Err(e) => tracing::warn!("dropping malformed native event: {e}"),
        }
    }
}
