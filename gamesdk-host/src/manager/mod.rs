//! Feature managers: thin views over a sub-handle fetched at session
//! creation. Every native call they make goes through [`crate::Core::execute`].

pub mod activity;
pub mod overlay;

pub use activity::{
    Activity, ActivityAssets, ActivityManager, ActivityParty, ActivitySecrets, ActivityTimestamps,
    PartySize,
};
pub use overlay::OverlayManager;

use crate::error::SessionError;

/// Longest string the native activity fields accept, in bytes.
pub const MAX_FIELD_LEN: usize = 127;

pub(crate) fn check_field(name: &str, value: &str) -> Result<(), SessionError> {
    if value.len() > MAX_FIELD_LEN {
        return Err(SessionError::InvalidArgument(format!(
            "{name} is {} bytes, limit is {MAX_FIELD_LEN}",
            value.len()
        )));
    }
    Ok(())
}
