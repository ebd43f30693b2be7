//! The session core: one live native session, its open/closed state, and the
//! dispatch guard that serializes every native call made against it.
//!
//! ```text
//!  new ──► OPEN ──close()──► CLOSED
//!           │  ▲               │
//!   execute │  │               │ execute → SessionError::Closed
//!           └──┘               │ close   → no-op
//! ```
//!
//! All native calls on an open session go through [`Core::execute`]. It
//! fast-fails once closed, takes the guard, re-checks, runs the operation and
//! releases the guard on every exit path, panics included. The guard is
//! reentrant so callbacks fired from inside a dispatch may dispatch again on
//! the same thread.

use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info, warn};

use crate::error::{CreateError, SessionError, raise_on_failure};
use crate::loader::NativeRuntime;
use crate::log::{LogHook, LogLevel, default_log_hook};
use crate::manager::{ActivityManager, OverlayManager};
use crate::native::{
    Completion, CreateOutcome, FailureSink, Feature, FeatureHandle, NativeSdk, ResultCallback,
    SessionHandle,
};
use crate::params::CreateParams;

/// Admission to the live session, valid only inside [`Core::execute`].
///
/// It carries no public way to reach the native layer: the crate's own
/// operations use it, and application code can only compose those
/// operations under one guard acquisition.
///
/// ```compile_fail
/// # fn demo(core: &gamesdk_host::Core) {
/// core.execute(|d| {
///     unsafe { d.sdk().destroy(d.session()) };
///     Ok(())
/// });
/// # }
/// ```
pub struct Dispatch<'a> {
    sdk: &'a dyn NativeSdk,
    session: &'a SessionHandle,
    state: &'a DispatchState,
}

impl<'a> Dispatch<'a> {
    pub(crate) fn sdk(&self) -> &'a dyn NativeSdk {
        self.sdk
    }

    pub(crate) fn session(&self) -> &'a SessionHandle {
        self.session
    }
}

/// Everything only the guard holder may touch.
///
/// `depth` counts nested dispatches on the holding thread. While it is
/// non-zero, native code may still be running further up the stack with
/// pointers into `hook` or `params`, so teardown and hook release wait for
/// the outermost dispatch to return.
struct DispatchState {
    depth: Cell<usize>,
    close_pending: Cell<bool>,
    hook: RefCell<Option<Box<LogHook>>>,
    retired_hooks: RefCell<Vec<Box<LogHook>>>,
    params: RefCell<Option<CreateParams>>,
}

impl DispatchState {
    fn new() -> Self {
        Self {
            depth: Cell::new(0),
            close_pending: Cell::new(false),
            hook: RefCell::new(None),
            retired_hooks: RefCell::new(Vec::new()),
            params: RefCell::new(None),
        }
    }
}

/// One level of dispatch. Dropping the outermost level finishes any
/// deferred work, during unwinding too.
struct Depth<'a> {
    core: &'a Core,
    state: &'a DispatchState,
}

impl<'a> Depth<'a> {
    fn enter(core: &'a Core, state: &'a DispatchState) -> Self {
        state.depth.set(state.depth.get() + 1);
        Self { core, state }
    }
}

impl Drop for Depth<'_> {
    fn drop(&mut self) {
        let depth = self.state.depth.get() - 1;
        self.state.depth.set(depth);
        if depth > 0 {
            return;
        }
        let retired = std::mem::take(&mut *self.state.retired_hooks.borrow_mut());
        drop(retired);
        if self.state.close_pending.replace(false) {
            self.core.teardown(self.state);
        }
    }
}

pub struct Core {
    sdk: Arc<dyn NativeSdk>,
    session: SessionHandle,
    open: AtomicBool,
    guard: ReentrantMutex<DispatchState>,
    activity: FeatureHandle,
    overlay: FeatureHandle,
    failures: FailureSink,
    generation: u64,
}

impl Core {
    /// Create a session from `params`.
    ///
    /// Creation, default log-hook installation and feature sub-handle lookup
    /// all happen under a single guard acquisition. On failure nothing native
    /// is retained and `params` come back inside the error.
    pub fn new(runtime: &NativeRuntime, params: CreateParams) -> Result<Core, CreateError> {
        let sdk = runtime.sdk().clone();
        if !params.is_from(&sdk) {
            return Err(CreateError::new(SessionError::ForeignParams, params));
        }

        let client_id = params.client_id();
        let guard = ReentrantMutex::new(DispatchState::new());
        let (session, activity, overlay) = {
            let state = guard.lock();

            // SAFETY: `params` is live until it moves into `state` or back to the caller.
            let session = match unsafe { sdk.create(params.raw()) } {
                CreateOutcome::Created(raw) => SessionHandle::new(raw),
                CreateOutcome::Failed(code) => {
                    warn!(%code, "native create failed");
                    return Err(CreateError::new(SessionError::Failed(code), params));
                }
            };

            // SAFETY: the session was just created; the boxed hook is kept in `state`.
            let hook = Box::new(default_log_hook());
            unsafe { sdk.set_log_hook(&session, LogLevel::Debug, &hook) };
            state.hook.replace(Some(hook));

            let fetch = |feature| {
                // SAFETY: the session is live until destroyed below or by teardown.
                unsafe { sdk.feature(&session, feature) }
                    .map(|raw| FeatureHandle::new(feature, raw))
            };
            let (activity, overlay) = match (fetch(Feature::Activity), fetch(Feature::Overlay)) {
                (Some(a), Some(o)) => (a, o),
                (a, _) => {
                    let missing = if a.is_none() {
                        Feature::Activity
                    } else {
                        Feature::Overlay
                    };
                    warn!(?missing, "native layer returned no manager, destroying session");
                    unsafe { sdk.destroy(&session) };
                    let hook = state.hook.take();
                    drop(hook);
                    return Err(CreateError::new(SessionError::MissingFeature(missing), params));
                }
            };
            state.params.replace(Some(params));
            (session, activity, overlay)
        };

        info!(
            session = session.raw().addr(),
            client_id,
            generation = runtime.generation(),
            "session opened"
        );
        Ok(Core {
            sdk,
            session,
            open: AtomicBool::new(true),
            guard,
            activity,
            overlay,
            failures: Arc::new(Mutex::new(Vec::new())),
            generation: runtime.generation(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Run `op` against the live session under the dispatch guard.
    ///
    /// Calls nest: `op`, or a native callback it triggers, may call back into
    /// this `Core` on the same thread.
    pub fn execute<T>(
        &self,
        op: impl FnOnce(Dispatch<'_>) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        if !self.is_open() {
            return Err(SessionError::Closed);
        }
        let state = self.guard.lock();
        // close() may have won while we waited.
        if !self.is_open() {
            return Err(SessionError::Closed);
        }
        let _depth = Depth::enter(self, &state);
        op(Dispatch {
            sdk: self.sdk.as_ref(),
            session: &self.session,
            state: &state,
        })
    }

    /// Let the native layer drain its queued callbacks.
    ///
    /// Returns the first error raised by a completion callback during the
    /// pump, otherwise the pump's own result under the default policy.
    pub fn run_callbacks(&self) -> Result<(), SessionError> {
        // SAFETY: execute only admits us while the session is live.
        let code = self.execute(|d| Ok(unsafe { d.sdk().run_callbacks(d.session()) }))?;

        let raised = std::mem::take(&mut *self.failures.lock());
        let mut raised = raised.into_iter();
        if let Some(first) = raised.next() {
            for extra in raised {
                warn!(error = %extra, "additional callback failure in the same pump");
            }
            return Err(first);
        }
        raise_on_failure(code)
    }

    /// Replace the log hook. Lines below `min_level` are filtered natively.
    ///
    /// The previous hook stays alive until the outermost dispatch on this
    /// thread returns, so a hook may replace itself while it runs.
    pub fn set_log_hook(&self, min_level: LogLevel, hook: LogHook) -> Result<(), SessionError> {
        self.execute(|d| {
            let hook = Box::new(hook);
            // SAFETY: the session is live; the box lives in the dispatch state.
            unsafe { d.sdk().set_log_hook(d.session(), min_level, &hook) };
            if let Some(old) = d.state.hook.replace(Some(hook)) {
                d.state.retired_hooks.borrow_mut().push(old);
            }
            Ok(())
        })
    }

    pub fn activity_manager(&self) -> ActivityManager<'_> {
        ActivityManager::new(self.activity, self)
    }

    pub fn overlay_manager(&self) -> OverlayManager<'_> {
        OverlayManager::new(self.overlay, self)
    }

    /// Sub-handle fetched at creation. Only the crate's managers use it.
    pub fn feature(&self, feature: Feature) -> FeatureHandle {
        match feature {
            Feature::Activity => self.activity,
            Feature::Overlay => self.overlay,
        }
    }

    /// Generation of the runtime this session was created on.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wrap `callback` so its error, if any, surfaces from the next pump.
    pub(crate) fn completion(&self, callback: ResultCallback) -> Completion {
        Completion::new(callback, self.failures.clone())
    }

    /// Destroy the session. Safe from any thread, any number of times.
    ///
    /// Called from inside a dispatch (a log hook, event handler or
    /// completion running during [`Core::run_callbacks`]), the session is
    /// marked closed at once and destroyed when the outermost dispatch
    /// returns.
    pub fn close(&self) {
        if self
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let state = self.guard.lock();
        if state.depth.get() > 0 {
            debug!("close requested during dispatch, deferring teardown");
            state.close_pending.set(true);
            return;
        }
        self.teardown(&state);
    }

    /// Destroy and release. Runs once, with the guard held and no dispatch
    /// in progress.
    fn teardown(&self, state: &DispatchState) {
        // SAFETY: the close transition happens once, so this is the only destroy.
        unsafe { self.sdk.destroy(&self.session) };
        let hook = state.hook.take();
        let retired = std::mem::take(&mut *state.retired_hooks.borrow_mut());
        let params = state.params.take();
        drop((hook, retired, params));
        let dropped = std::mem::take(&mut *self.failures.lock());
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "discarding undelivered callback failures");
        }
        info!(session = self.session.raw().addr(), "session closed");
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("session", &self.session)
            .field("open", &self.is_open())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

