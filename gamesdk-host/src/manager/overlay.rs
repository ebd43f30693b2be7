//! Overlay queries and input lock.

use crate::core::Core;
use crate::error::{DEFAULT_CALLBACK, ResultCode, SessionError};
use crate::native::FeatureHandle;

/// In-game overlay state.
pub struct OverlayManager<'a> {
    handle: FeatureHandle,
    core: &'a Core,
}

impl<'a> OverlayManager<'a> {
    pub(crate) fn new(handle: FeatureHandle, core: &'a Core) -> Self {
        Self { handle, core }
    }

    pub fn is_enabled(&self) -> Result<bool, SessionError> {
        // SAFETY: execute admits us only while the handle's session is live.
        self.core
            .execute(|d| Ok(unsafe { d.sdk().is_overlay_enabled(&self.handle) }))
    }

    pub fn is_locked(&self) -> Result<bool, SessionError> {
        self.core
            .execute(|d| Ok(unsafe { d.sdk().is_overlay_locked(&self.handle) }))
    }

    /// Lock (`true`) or unlock the overlay's input capture.
    pub fn set_locked(&self, locked: bool) -> Result<(), SessionError> {
        self.set_locked_with(locked, DEFAULT_CALLBACK)
    }

    pub fn set_locked_with(
        &self,
        locked: bool,
        callback: impl FnOnce(ResultCode) -> Result<(), SessionError> + Send + 'static,
    ) -> Result<(), SessionError> {
        self.core.execute(|d| {
            let done = self.core.completion(Box::new(callback));
            unsafe { d.sdk().set_overlay_locked(&self.handle, locked, done) };
            Ok(())
        })
    }
}
