//! Session creation parameters.
//!
//! The native parameter block is owned by [`CreateParams`] and released
//! exactly once, on drop. Moving the value into [`crate::Core::new`] hands
//! ownership to the session; a failed construction hands it back inside
//! [`crate::CreateError`].

use std::ops::BitOr;
use std::sync::Arc;

use tracing::debug;

use crate::error::SessionError;
use crate::event::{EventHandler, EventSink};
use crate::loader::NativeRuntime;
use crate::native::{NativeSdk, RawHandle};

/// Native creation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CreateFlags(u64);

impl CreateFlags {
    /// Require the desktop client to be running.
    pub const DEFAULT: CreateFlags = CreateFlags(0);
    /// Create the session even when the desktop client is absent.
    pub const NO_REQUIRE_DISCORD: CreateFlags = CreateFlags(1);

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, other: CreateFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CreateFlags {
    type Output = CreateFlags;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

pub struct CreateParams {
    sdk: Arc<dyn NativeSdk>,
    raw: RawHandle,
    client_id: i64,
    flags: CreateFlags,
    // Boxed so the address handed to the native layer stays put.
    events: Option<Box<EventSink>>,
}

impl CreateParams {
    pub fn new(runtime: &NativeRuntime) -> Result<Self, SessionError> {
        let sdk = runtime.sdk().clone();
        let raw = sdk.alloc_params().ok_or(SessionError::ParamsAllocation)?;
        debug!(params = raw.addr(), "allocated creation parameters");
        Ok(Self {
            sdk,
            raw,
            client_id: 0,
            flags: CreateFlags::DEFAULT,
            events: None,
        })
    }

    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    pub fn set_client_id(&mut self, client_id: i64) {
        // SAFETY: `raw` is live until drop.
        unsafe { self.sdk.set_client_id(self.raw, client_id) };
        self.client_id = client_id;
    }

    pub fn flags(&self) -> CreateFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: CreateFlags) {
        unsafe { self.sdk.set_flags(self.raw, flags.bits()) };
        self.flags = flags;
    }

    /// Route native events to `handler`. Replaces any earlier handler.
    pub fn register_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        let sink = Box::new(EventSink::new(handler));
        // SAFETY: the previous sink, if any, is dropped only after the native
        // side points at the new one; the new one lives until drop.
        unsafe { self.sdk.set_event_handler(self.raw, &sink) };
        self.events = Some(sink);
    }

    pub fn has_event_handler(&self) -> bool {
        self.events.is_some()
    }

    pub(crate) fn raw(&self) -> RawHandle {
        self.raw
    }

    /// Whether these parameters were allocated by `sdk`.
    pub(crate) fn is_from(&self, sdk: &Arc<dyn NativeSdk>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.sdk), Arc::as_ptr(sdk))
    }
}

impl std::fmt::Debug for CreateParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateParams")
            .field("raw", &self.raw)
            .field("client_id", &self.client_id)
            .field("flags", &self.flags)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl Drop for CreateParams {
    fn drop(&mut self) {
        // SAFETY: freed once, here; the session that used it is gone.
        unsafe { self.sdk.free_params(self.raw) };
        debug!(params = self.raw.addr(), "released creation parameters");
    }
}
