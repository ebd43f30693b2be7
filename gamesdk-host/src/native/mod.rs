//! The foreign-function seam.
//!
//! [`NativeSdk`] is the complete set of native entry points the crate uses.
//! [`dylib::DylibSdk`] implements it over a dynamically loaded binding
//! object; tests implement it with call-counting stand-ins.
//!
//! Handles come in two flavours. [`RawHandle`] is a plain non-null address
//! that backends produce. [`SessionHandle`] and [`FeatureHandle`] are
//! capabilities only this crate can mint. Using either one with the native
//! layer is `unsafe`, and the crate only does so under a live session's
//! dispatch guard.

pub mod dylib;

use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ResultCode, SessionError};
use crate::event::EventSink;
use crate::log::{LogHook, LogLevel};

/// A non-null native address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonZeroUsize);

impl RawHandle {
    pub fn new(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(Self)
    }

    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        Self::new(ptr as usize)
    }

    pub fn addr(self) -> usize {
        self.0.get()
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }
}

/// What native create produced. Discriminated before any handle is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(RawHandle),
    Failed(ResultCode),
}

/// Sub-handles fetched once at session creation.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Activity = 0,
    Overlay = 1,
}

/// The live native session. Owned by exactly one [`crate::Core`].
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHandle(RawHandle);

impl SessionHandle {
    pub(crate) fn new(raw: RawHandle) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> RawHandle {
        self.0
    }
}

/// A feature manager's sub-handle. Valid only while its session is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureHandle {
    feature: Feature,
    raw: RawHandle,
}

impl FeatureHandle {
    pub(crate) fn new(feature: Feature, raw: RawHandle) -> Self {
        Self { feature, raw }
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn raw(&self) -> RawHandle {
        self.raw
    }
}

/// Caller-supplied handling of an asynchronous result code.
pub type ResultCallback = Box<dyn FnOnce(ResultCode) -> Result<(), SessionError> + Send>;

/// Errors raised by completion callbacks, collected until the pump returns.
pub(crate) type FailureSink = Arc<Mutex<Vec<SessionError>>>;

/// One pending asynchronous native operation.
///
/// The backend calls [`Completion::complete`] exactly once, normally from
/// inside `run_callbacks`. An error returned by the callback is raised from
/// that `run_callbacks` call.
pub struct Completion {
    callback: ResultCallback,
    failures: FailureSink,
}

impl Completion {
    pub(crate) fn new(callback: ResultCallback, failures: FailureSink) -> Self {
        Self { callback, failures }
    }

    pub fn complete(self, code: ResultCode) {
        if let Err(e) = (self.callback)(code) {
            self.failures.lock().push(e);
        }
    }
}

/// Native entry points.
///
/// Only [`NativeSdk::bootstrap`] and [`NativeSdk::alloc_params`] are safe to
/// call directly. Every other method hands a native address to the foreign
/// layer and is `unsafe`: the crate makes those calls itself, from
/// [`crate::CreateParams`] and from inside [`crate::Core::execute`], and
/// application code has no safe way to reach them.
///
/// Implementations may assume the crate never calls two session-scoped
/// methods concurrently for the same session: every such call is made while
/// the owning [`crate::Core`] holds its dispatch guard.
///
/// # Safety
///
/// For each `unsafe` method the caller guarantees that `params` was returned
/// by `alloc_params` on this backend and not yet freed, and that `session`
/// and `manager` belong to a session created by this backend that has not
/// been destroyed. Borrowed hooks and sinks must outlive their registration
/// as noted per method.
pub trait NativeSdk: Send + Sync {
    /// Record where the vendor SDK lives. Called once per runtime.
    fn bootstrap(&self, sdk_path: &Path) -> ResultCode;

    fn alloc_params(&self) -> Option<RawHandle>;
    /// # Safety
    /// `params` is live and is not used again afterwards.
    unsafe fn free_params(&self, params: RawHandle);
    /// # Safety
    /// `params` is live.
    unsafe fn set_client_id(&self, params: RawHandle, client_id: i64);
    /// # Safety
    /// `params` is live.
    unsafe fn set_flags(&self, params: RawHandle, flags: u64);
    /// # Safety
    /// `params` is live and `sink` stays valid until `free_params` is called
    /// for it.
    unsafe fn set_event_handler(&self, params: RawHandle, sink: &EventSink);

    /// # Safety
    /// `params` is live.
    unsafe fn create(&self, params: RawHandle) -> CreateOutcome;
    /// # Safety
    /// `session` is live and is not used again afterwards.
    unsafe fn destroy(&self, session: &SessionHandle);
    /// # Safety
    /// `session` is live.
    unsafe fn feature(&self, session: &SessionHandle, feature: Feature) -> Option<RawHandle>;
    /// # Safety
    /// `session` is live.
    unsafe fn run_callbacks(&self, session: &SessionHandle) -> ResultCode;
    /// # Safety
    /// `session` is live and `hook` stays valid until replaced and any pump
    /// in progress has returned, or until `destroy`.
    unsafe fn set_log_hook(&self, session: &SessionHandle, min_level: LogLevel, hook: &LogHook);

    /// # Safety
    /// `manager` belongs to a live session.
    unsafe fn update_activity(&self, manager: &FeatureHandle, activity_json: &str, done: Completion);
    /// # Safety
    /// `manager` belongs to a live session.
    unsafe fn clear_activity(&self, manager: &FeatureHandle, done: Completion);
    /// # Safety
    /// `manager` belongs to a live session.
    unsafe fn register_command(&self, manager: &FeatureHandle, command: &str) -> ResultCode;

    /// # Safety
    /// `manager` belongs to a live session.
    unsafe fn is_overlay_enabled(&self, manager: &FeatureHandle) -> bool;
    /// # Safety
    /// `manager` belongs to a live session.
    unsafe fn is_overlay_locked(&self, manager: &FeatureHandle) -> bool;
    /// # Safety
    /// `manager` belongs to a live session.
    unsafe fn set_overlay_locked(&self, manager: &FeatureHandle, locked: bool, done: Completion);
}
