//! Rich presence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::check_field;
use crate::core::Core;
use crate::error::{DEFAULT_CALLBACK, ResultCode, SessionError, raise_on_failure};
use crate::native::FeatureHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTimestamps {
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityAssets {
    pub large_image: String,
    pub large_text: String,
    pub small_image: String,
    pub small_text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySize {
    pub current_size: i32,
    pub max_size: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityParty {
    pub id: String,
    pub size: PartySize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivitySecrets {
    #[serde(rename = "match")]
    pub match_secret: String,
    pub join: String,
    pub spectate: String,
}

/// What the user is doing, as shown on their profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    pub state: String,
    pub details: String,
    pub timestamps: ActivityTimestamps,
    pub assets: ActivityAssets,
    pub party: ActivityParty,
    pub secrets: ActivitySecrets,
    pub instance: bool,
}

impl Activity {
    pub fn new(details: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            details: details.into(),
            state: state.into(),
            ..Self::default()
        }
    }

    pub fn started_now(mut self) -> Self {
        self.timestamps.start = Some(Utc::now());
        self
    }

    /// Reject values the native structures cannot hold.
    pub fn validate(&self) -> Result<(), SessionError> {
        let fields = [
            ("state", &self.state),
            ("details", &self.details),
            ("assets.large_image", &self.assets.large_image),
            ("assets.large_text", &self.assets.large_text),
            ("assets.small_image", &self.assets.small_image),
            ("assets.small_text", &self.assets.small_text),
            ("party.id", &self.party.id),
            ("secrets.match", &self.secrets.match_secret),
            ("secrets.join", &self.secrets.join),
            ("secrets.spectate", &self.secrets.spectate),
        ];
        for (name, value) in fields {
            check_field(name, value)?;
        }
        let size = self.party.size;
        if size.current_size < 0 || size.max_size < 0 || size.current_size > size.max_size {
            return Err(SessionError::InvalidArgument(format!(
                "party size {}/{} is out of range",
                size.current_size, size.max_size
            )));
        }
        if let (Some(start), Some(end)) = (self.timestamps.start, self.timestamps.end) {
            if end < start {
                return Err(SessionError::InvalidArgument(
                    "activity ends before it starts".to_string(),
                ));
            }
        }
        Ok(())
    }
}

pub struct ActivityManager<'a> {
    handle: FeatureHandle,
    core: &'a Core,
}

impl<'a> ActivityManager<'a> {
    pub(crate) fn new(handle: FeatureHandle, core: &'a Core) -> Self {
        Self { handle, core }
    }

    /// Publish `activity`. A failing result surfaces from the pump that
    /// delivers it.
    pub fn update_activity(&self, activity: &Activity) -> Result<(), SessionError> {
        self.update_activity_with(activity, DEFAULT_CALLBACK)
    }

    pub fn update_activity_with(
        &self,
        activity: &Activity,
        callback: impl FnOnce(ResultCode) -> Result<(), SessionError> + Send + 'static,
    ) -> Result<(), SessionError> {
        activity.validate()?;
        let json = serde_json::to_string(activity)
            .map_err(|e| SessionError::InvalidArgument(e.to_string()))?;
        self.core.execute(|d| {
            let done = self.core.completion(Box::new(callback));
            // SAFETY: execute admits us only while the handle's session is live.
            unsafe { d.sdk().update_activity(&self.handle, &json, done) };
            Ok(())
        })
    }

    pub fn clear_activity(&self) -> Result<(), SessionError> {
        self.clear_activity_with(DEFAULT_CALLBACK)
    }

    pub fn clear_activity_with(
        &self,
        callback: impl FnOnce(ResultCode) -> Result<(), SessionError> + Send + 'static,
    ) -> Result<(), SessionError> {
        self.core.execute(|d| {
            let done = self.core.completion(Box::new(callback));
            unsafe { d.sdk().clear_activity(&self.handle, done) };
            Ok(())
        })
    }

    /// Command the client runs to launch the game from a join invite.
    pub fn register_command(&self, command: &str) -> Result<(), SessionError> {
        if command.is_empty() || command.contains('\0') {
            return Err(SessionError::InvalidArgument(
                "launch command must be non-empty and free of NUL bytes".to_string(),
            ));
        }
        self.core.execute(|d| {
            raise_on_failure(unsafe { d.sdk().register_command(&self.handle, command) })
        })
    }
}
