//! [`NativeSdk`] over a dynamically loaded binding object.
//!
//! The binding object exports the flat `gsdk_*` C ABI. Strings cross as
//! pointer + length, structured values as UTF-8 JSON. Callbacks come back
//! through the `extern "C"` trampolines at the bottom of this file, each of
//! which catches panics so nothing unwinds into native frames.

use std::ffi::{CString, c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use libloading::Library;
use tracing::{debug, info, warn};

use super::{
    Completion, CreateOutcome, Feature, FeatureHandle, NativeSdk, RawHandle, SessionHandle,
};
use crate::error::ResultCode;
use crate::event::EventSink;
use crate::loader::LoadError;
use crate::log::{LogHook, LogLevel};

/// `(json_ptr, json_len, user_data)`
type EventCallback = unsafe extern "C" fn(*const c_char, usize, *mut c_void);
/// `(level, message_ptr, message_len, user_data)`
type LogCallback = unsafe extern "C" fn(i32, *const c_char, usize, *mut c_void);
/// `(user_data, result)`
type ResultCallbackFn = unsafe extern "C" fn(*mut c_void, i32);

type BootstrapFn = unsafe extern "C" fn(*const c_char) -> i32;
type ParamsAllocFn = unsafe extern "C" fn() -> *mut c_void;
type ParamsFreeFn = unsafe extern "C" fn(*mut c_void);
type SetClientIdFn = unsafe extern "C" fn(*mut c_void, i64);
type SetFlagsFn = unsafe extern "C" fn(*mut c_void, u64);
type SetEventHandlerFn = unsafe extern "C" fn(*mut c_void, EventCallback, *mut c_void);
type CreateFn = unsafe extern "C" fn(*mut c_void, *mut *mut c_void) -> i32;
type DestroyFn = unsafe extern "C" fn(*mut c_void);
type GetManagerFn = unsafe extern "C" fn(*mut c_void, i32) -> *mut c_void;
type RunCallbacksFn = unsafe extern "C" fn(*mut c_void) -> i32;
type SetLogHookFn = unsafe extern "C" fn(*mut c_void, i32, LogCallback, *mut c_void);
type ActivityUpdateFn =
    unsafe extern "C" fn(*mut c_void, *const c_char, usize, ResultCallbackFn, *mut c_void);
type ActivityClearFn = unsafe extern "C" fn(*mut c_void, ResultCallbackFn, *mut c_void);
type RegisterCommandFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> i32;
type OverlayQueryFn = unsafe extern "C" fn(*mut c_void) -> bool;
type OverlaySetLockedFn = unsafe extern "C" fn(*mut c_void, bool, ResultCallbackFn, *mut c_void);

/// Entry points copied out of the binding object. Valid while the binding `Library` lives.
struct Symbols {
    bootstrap: BootstrapFn,
    params_alloc: ParamsAllocFn,
    params_free: ParamsFreeFn,
    set_client_id: SetClientIdFn,
    set_flags: SetFlagsFn,
    set_event_handler: SetEventHandlerFn,
    create: CreateFn,
    destroy: DestroyFn,
    get_manager: GetManagerFn,
    run_callbacks: RunCallbacksFn,
    set_log_hook: SetLogHookFn,
    activity_update: ActivityUpdateFn,
    activity_clear: ActivityClearFn,
    register_command: RegisterCommandFn,
    overlay_is_enabled: OverlayQueryFn,
    overlay_is_locked: OverlayQueryFn,
    overlay_set_locked: OverlaySetLockedFn,
}

impl Symbols {
    fn resolve(lib: &Library) -> Result<Self, LoadError> {
        Ok(Self {
            bootstrap: symbol(lib, "gsdk_bootstrap")?,
            params_alloc: symbol(lib, "gsdk_params_alloc")?,
            params_free: symbol(lib, "gsdk_params_free")?,
            set_client_id: symbol(lib, "gsdk_params_set_client_id")?,
            set_flags: symbol(lib, "gsdk_params_set_flags")?,
            set_event_handler: symbol(lib, "gsdk_params_set_event_handler")?,
            create: symbol(lib, "gsdk_create")?,
            destroy: symbol(lib, "gsdk_destroy")?,
            get_manager: symbol(lib, "gsdk_get_manager")?,
            run_callbacks: symbol(lib, "gsdk_run_callbacks")?,
            set_log_hook: symbol(lib, "gsdk_set_log_hook")?,
            activity_update: symbol(lib, "gsdk_activity_update")?,
            activity_clear: symbol(lib, "gsdk_activity_clear")?,
            register_command: symbol(lib, "gsdk_activity_register_command")?,
            overlay_is_enabled: symbol(lib, "gsdk_overlay_is_enabled")?,
            overlay_is_locked: symbol(lib, "gsdk_overlay_is_locked")?,
            overlay_set_locked: symbol(lib, "gsdk_overlay_set_locked")?,
        })
    }
}

fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T, LoadError> {
    // SAFETY: every `T` above is the exact C signature the binding exports.
    let sym = unsafe { lib.get::<T>(name.as_bytes()) }
        .map_err(|source| LoadError::Symbol { name, source })?;
    Ok(*sym)
}

fn open_library(path: &Path) -> Result<Library, LoadError> {
    // SAFETY: loading runs the object's initializers; the caller vouches for it.
    unsafe { Library::new(path) }.map_err(|source| LoadError::Link {
        path: path.to_path_buf(),
        source,
    })
}

/// The binding object, plus the vendor SDK when it had to be pre-loaded.
pub struct DylibSdk {
    symbols: Symbols,
    // Field order is drop order: binding first, then the object it links against.
    _binding: Library,
    _preload: Option<Library>,
}

impl DylibSdk {
    /// Open `binding`, after `preload` when given.
    pub fn open(binding: &Path, preload: Option<&Path>) -> Result<Self, LoadError> {
        let preload = match preload {
            Some(path) => {
                debug!(path = %path.display(), "pre-loading vendor SDK");
                Some(open_library(path)?)
            }
            None => None,
        };
        debug!(path = %binding.display(), "loading binding object");
        let lib = open_library(binding)?;
        let symbols = Symbols::resolve(&lib)?;
        info!(path = %binding.display(), preloaded = preload.is_some(), "native objects resident");
        Ok(Self {
            symbols,
            _binding: lib,
            _preload: preload,
        })
    }
}

impl NativeSdk for DylibSdk {
    fn bootstrap(&self, sdk_path: &Path) -> ResultCode {
        let Some(cpath) = sdk_path.to_str().and_then(|s| CString::new(s).ok()) else {
            warn!(path = %sdk_path.display(), "SDK path is not representable as a C string");
            return ResultCode::InvalidFilename;
        };
        ResultCode::from_raw(unsafe { (self.symbols.bootstrap)(cpath.as_ptr()) })
    }

    fn alloc_params(&self) -> Option<RawHandle> {
        RawHandle::from_ptr(unsafe { (self.symbols.params_alloc)() })
    }

    unsafe fn free_params(&self, params: RawHandle) {
        unsafe { (self.symbols.params_free)(params.as_ptr()) }
    }

    unsafe fn set_client_id(&self, params: RawHandle, client_id: i64) {
        unsafe { (self.symbols.set_client_id)(params.as_ptr(), client_id) }
    }

    unsafe fn set_flags(&self, params: RawHandle, flags: u64) {
        unsafe { (self.symbols.set_flags)(params.as_ptr(), flags) }
    }

    unsafe fn set_event_handler(&self, params: RawHandle, sink: &EventSink) {
        let user_data = sink as *const EventSink as *mut c_void;
        unsafe { (self.symbols.set_event_handler)(params.as_ptr(), event_trampoline, user_data) }
    }

    unsafe fn create(&self, params: RawHandle) -> CreateOutcome {
        let mut out: *mut c_void = std::ptr::null_mut();
        let code = ResultCode::from_raw(unsafe { (self.symbols.create)(params.as_ptr(), &mut out) });
        if !code.is_ok() {
            return CreateOutcome::Failed(code);
        }
        match RawHandle::from_ptr(out) {
            Some(handle) => CreateOutcome::Created(handle),
            None => {
                warn!("native create reported success without a handle");
                CreateOutcome::Failed(ResultCode::InternalError)
            }
        }
    }

    unsafe fn destroy(&self, session: &SessionHandle) {
        unsafe { (self.symbols.destroy)(session.raw().as_ptr()) }
    }

    unsafe fn feature(&self, session: &SessionHandle, feature: Feature) -> Option<RawHandle> {
        let ptr = unsafe { (self.symbols.get_manager)(session.raw().as_ptr(), feature as i32) };
        RawHandle::from_ptr(ptr)
    }

    unsafe fn run_callbacks(&self, session: &SessionHandle) -> ResultCode {
        ResultCode::from_raw(unsafe { (self.symbols.run_callbacks)(session.raw().as_ptr()) })
    }

    unsafe fn set_log_hook(&self, session: &SessionHandle, min_level: LogLevel, hook: &LogHook) {
        let user_data = hook as *const LogHook as *mut c_void;
        unsafe {
            (self.symbols.set_log_hook)(
                session.raw().as_ptr(),
                min_level.as_raw(),
                log_trampoline,
                user_data,
            )
        }
    }

    unsafe fn update_activity(&self, manager: &FeatureHandle, activity_json: &str, done: Completion) {
        let user_data = Box::into_raw(Box::new(done)) as *mut c_void;
        unsafe {
            (self.symbols.activity_update)(
                manager.raw().as_ptr(),
                activity_json.as_ptr() as *const c_char,
                activity_json.len(),
                completion_trampoline,
                user_data,
            )
        }
    }

    unsafe fn clear_activity(&self, manager: &FeatureHandle, done: Completion) {
        let user_data = Box::into_raw(Box::new(done)) as *mut c_void;
        unsafe {
            (self.symbols.activity_clear)(manager.raw().as_ptr(), completion_trampoline, user_data)
        }
    }

    unsafe fn register_command(&self, manager: &FeatureHandle, command: &str) -> ResultCode {
        let Ok(ccommand) = CString::new(command) else {
            return ResultCode::InvalidCommand;
        };
        ResultCode::from_raw(unsafe {
            (self.symbols.register_command)(manager.raw().as_ptr(), ccommand.as_ptr())
        })
    }

    unsafe fn is_overlay_enabled(&self, manager: &FeatureHandle) -> bool {
        unsafe { (self.symbols.overlay_is_enabled)(manager.raw().as_ptr()) }
    }

    unsafe fn is_overlay_locked(&self, manager: &FeatureHandle) -> bool {
        unsafe { (self.symbols.overlay_is_locked)(manager.raw().as_ptr()) }
    }

    unsafe fn set_overlay_locked(&self, manager: &FeatureHandle, locked: bool, done: Completion) {
        let user_data = Box::into_raw(Box::new(done)) as *mut c_void;
        unsafe {
            (self.symbols.overlay_set_locked)(
                manager.raw().as_ptr(),
                locked,
                completion_trampoline,
                user_data,
            )
        }
    }
}

// ─── Trampolines ─────────────────────────────────────────────────────

/// Borrow `len` bytes at `ptr` as lossy UTF-8. Null reads as empty.
unsafe fn read_utf8(ptr: *const c_char, len: usize) -> String {
    if ptr.is_null() || len == 0 {
        return String::new();
    }
    let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, len) };
    String::from_utf8_lossy(bytes).into_owned()
}

unsafe extern "C" fn event_trampoline(
    json_ptr: *const c_char,
    json_len: usize,
    user_data: *mut c_void,
) {
    if user_data.is_null() {
        return;
    }
    let json = unsafe { read_utf8(json_ptr, json_len) };
    // SAFETY: user_data is the boxed EventSink owned by CreateParams.
    let sink = unsafe { &*(user_data as *const EventSink) };
    if panic::catch_unwind(AssertUnwindSafe(|| sink.dispatch_json(&json))).is_err() {
        warn!("event handler panicked");
    }
}

unsafe extern "C" fn log_trampoline(
    level: i32,
    message_ptr: *const c_char,
    message_len: usize,
    user_data: *mut c_void,
) {
    if user_data.is_null() {
        return;
    }
    let message = unsafe { read_utf8(message_ptr, message_len) };
    let level = LogLevel::from_raw(level).unwrap_or(LogLevel::Debug);
    // SAFETY: user_data is the boxed LogHook kept alive by the owning Core.
    let hook = unsafe { &*(user_data as *const LogHook) };
    if panic::catch_unwind(AssertUnwindSafe(|| hook(level, &message))).is_err() {
        warn!("log hook panicked");
    }
}

unsafe extern "C" fn completion_trampoline(user_data: *mut c_void, result: i32) {
    if user_data.is_null() {
        return;
    }
    // SAFETY: produced by Box::into_raw above; the native layer calls back once.
    let done = unsafe { Box::from_raw(user_data as *mut Completion) };
    let code = ResultCode::from_raw(result);
    if panic::catch_unwind(AssertUnwindSafe(move || done.complete(code))).is_err() {
        warn!("completion callback panicked");
    }
}
