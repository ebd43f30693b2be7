//! Call-counting stand-in for the native layer.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use gamesdk_host::event::EventSink;
use gamesdk_host::native::{
    Completion, CreateOutcome, Feature, FeatureHandle, NativeSdk, RawHandle, SessionHandle,
};
use gamesdk_host::{Core, CreateParams, LogHook, LogLevel, NativeRuntime, ResultCode};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct Counters {
    pub bootstrap: AtomicUsize,
    pub alloc: AtomicUsize,
    pub free: AtomicUsize,
    pub create: AtomicUsize,
    pub destroy: AtomicUsize,
    pub feature: AtomicUsize,
    pub run_callbacks: AtomicUsize,
    pub set_log_hook: AtomicUsize,
    pub update_activity: AtomicUsize,
    pub clear_activity: AtomicUsize,
    pub register_command: AtomicUsize,
    pub overlay: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

#[derive(Default)]
pub struct RecordingSdk {
    pub calls: Counters,
    /// Session-scoped calls made after destroy.
    pub after_destroy: AtomicUsize,
    /// Times two session-scoped calls were inside the native region at once.
    pub overlaps: AtomicUsize,
    inside: AtomicBool,
    destroyed: AtomicBool,
    region_delay: Mutex<Option<Duration>>,

    create_failure: Mutex<Option<ResultCode>>,
    missing_feature: Mutex<Option<Feature>>,
    pump_result: Mutex<Option<ResultCode>>,
    completion_result: Mutex<Option<ResultCode>>,

    bootstrap_path: Mutex<Option<PathBuf>>,
    freed: Mutex<Vec<usize>>,
    next_handle: AtomicUsize,

    // Addresses handed over by the crate, dereferenced only while delivering.
    log_hook: Mutex<Option<(LogLevel, usize)>>,
    event_sink: Mutex<Option<usize>>,

    pending: Mutex<Vec<(Completion, ResultCode)>>,
    pending_logs: Mutex<Vec<(LogLevel, String)>>,
    pending_events: Mutex<Vec<String>>,
    overlay_locked: AtomicBool,
}

/// Marks the instrumented native region for the overlap detector.
struct Region<'a>(&'a RecordingSdk);

impl Drop for Region<'_> {
    fn drop(&mut self) {
        self.0.inside.store(false, Ordering::SeqCst);
    }
}

impl RecordingSdk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicUsize::new(0x1000),
            ..Self::default()
        })
    }

    pub fn fail_create_with(&self, code: ResultCode) {
        *self.create_failure.lock() = Some(code);
    }

    pub fn omit_feature(&self, feature: Feature) {
        *self.missing_feature.lock() = Some(feature);
    }

    pub fn set_pump_result(&self, code: ResultCode) {
        *self.pump_result.lock() = Some(code);
    }

    pub fn set_completion_result(&self, code: ResultCode) {
        *self.completion_result.lock() = Some(code);
    }

    pub fn set_region_delay(&self, delay: Duration) {
        *self.region_delay.lock() = Some(delay);
    }

    pub fn queue_log(&self, level: LogLevel, message: &str) {
        self.pending_logs.lock().push((level, message.to_string()));
    }

    pub fn queue_event(&self, json: &str) {
        self.pending_events.lock().push(json.to_string());
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_hook.lock().map(|(level, _)| level)
    }

    pub fn bootstrap_path(&self) -> Option<PathBuf> {
        self.bootstrap_path.lock().clone()
    }

    pub fn freed(&self) -> Vec<usize> {
        self.freed.lock().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Every session-scoped native call so far.
    pub fn session_calls(&self) -> usize {
        let c = &self.calls;
        [
            &c.destroy,
            &c.feature,
            &c.run_callbacks,
            &c.set_log_hook,
            &c.update_activity,
            &c.clear_activity,
            &c.register_command,
            &c.overlay,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum()
    }

    fn enter(&self) -> Region<'_> {
        if self.destroyed.load(Ordering::SeqCst) {
            bump(&self.after_destroy);
        }
        if self.inside.swap(true, Ordering::SeqCst) {
            bump(&self.overlaps);
        }
        if let Some(delay) = *self.region_delay.lock() {
            std::thread::sleep(delay);
        }
        Region(self)
    }

    fn handle(&self) -> RawHandle {
        let addr = self.next_handle.fetch_add(0x10, Ordering::SeqCst);
        RawHandle::new(addr).unwrap()
    }

    fn completion_code(&self) -> ResultCode {
        self.completion_result.lock().unwrap_or(ResultCode::Ok)
    }
}

impl NativeSdk for RecordingSdk {
    fn bootstrap(&self, sdk_path: &Path) -> ResultCode {
        bump(&self.calls.bootstrap);
        *self.bootstrap_path.lock() = Some(sdk_path.to_path_buf());
        ResultCode::Ok
    }

    fn alloc_params(&self) -> Option<RawHandle> {
        bump(&self.calls.alloc);
        Some(self.handle())
    }

    unsafe fn free_params(&self, params: RawHandle) {
        bump(&self.calls.free);
        self.freed.lock().push(params.addr());
    }

    unsafe fn set_client_id(&self, _params: RawHandle, _client_id: i64) {}

    unsafe fn set_flags(&self, _params: RawHandle, _flags: u64) {}

    unsafe fn set_event_handler(&self, _params: RawHandle, sink: &EventSink) {
        *self.event_sink.lock() = Some(sink as *const EventSink as usize);
    }

    unsafe fn create(&self, _params: RawHandle) -> CreateOutcome {
        bump(&self.calls.create);
        match *self.create_failure.lock() {
            Some(code) => CreateOutcome::Failed(code),
            None => CreateOutcome::Created(self.handle()),
        }
    }

    unsafe fn destroy(&self, _session: &SessionHandle) {
        let _region = self.enter();
        bump(&self.calls.destroy);
        self.destroyed.store(true, Ordering::SeqCst);
        self.log_hook.lock().take();
    }

    unsafe fn feature(&self, _session: &SessionHandle, feature: Feature) -> Option<RawHandle> {
        let _region = self.enter();
        bump(&self.calls.feature);
        if *self.missing_feature.lock() == Some(feature) {
            return None;
        }
        Some(self.handle())
    }

    unsafe fn run_callbacks(&self, _session: &SessionHandle) -> ResultCode {
        let (completions, logs, events) = {
            let _region = self.enter();
            bump(&self.calls.run_callbacks);
            (
                std::mem::take(&mut *self.pending.lock()),
                std::mem::take(&mut *self.pending_logs.lock()),
                std::mem::take(&mut *self.pending_events.lock()),
            )
        };

        let hook = *self.log_hook.lock();
        if let Some((min_level, addr)) = hook {
            // SAFETY: the Core keeps the hook alive until replaced or destroyed.
            let hook = unsafe { &*(addr as *const LogHook) };
            for (level, message) in logs.iter().filter(|(l, _)| l.passes(min_level)) {
                hook(*level, message);
            }
        }
        let sink = *self.event_sink.lock();
        if let Some(addr) = sink {
            // SAFETY: the params owning the sink outlive the session.
            let sink = unsafe { &*(addr as *const EventSink) };
            for json in &events {
                sink.dispatch_json(json);
            }
        }
        for (done, code) in completions {
            done.complete(code);
        }

        self.pump_result.lock().unwrap_or(ResultCode::Ok)
    }

    unsafe fn set_log_hook(&self, _session: &SessionHandle, min_level: LogLevel, hook: &LogHook) {
        let _region = self.enter();
        bump(&self.calls.set_log_hook);
        *self.log_hook.lock() = Some((min_level, hook as *const LogHook as usize));
    }

    unsafe fn update_activity(&self, _manager: &FeatureHandle, _activity_json: &str, done: Completion) {
        let _region = self.enter();
        bump(&self.calls.update_activity);
        let code = self.completion_code();
        self.pending.lock().push((done, code));
    }

    unsafe fn clear_activity(&self, _manager: &FeatureHandle, done: Completion) {
        let _region = self.enter();
        bump(&self.calls.clear_activity);
        let code = self.completion_code();
        self.pending.lock().push((done, code));
    }

    unsafe fn register_command(&self, _manager: &FeatureHandle, _command: &str) -> ResultCode {
        let _region = self.enter();
        bump(&self.calls.register_command);
        ResultCode::Ok
    }

    unsafe fn is_overlay_enabled(&self, _manager: &FeatureHandle) -> bool {
        let _region = self.enter();
        bump(&self.calls.overlay);
        true
    }

    unsafe fn is_overlay_locked(&self, _manager: &FeatureHandle) -> bool {
        let _region = self.enter();
        bump(&self.calls.overlay);
        self.overlay_locked.load(Ordering::SeqCst)
    }

    unsafe fn set_overlay_locked(&self, _manager: &FeatureHandle, locked: bool, done: Completion) {
        let _region = self.enter();
        bump(&self.calls.overlay);
        self.overlay_locked.store(locked, Ordering::SeqCst);
        let code = self.completion_code();
        self.pending.lock().push((done, code));
    }
}

pub fn sdk_path() -> PathBuf {
    std::env::temp_dir().join("discord_game_sdk.so")
}

pub fn runtime(sdk: &Arc<RecordingSdk>) -> NativeRuntime {
    NativeRuntime::bootstrap(sdk.clone(), &sdk_path()).unwrap()
}

pub fn params(runtime: &NativeRuntime) -> CreateParams {
    let mut params = CreateParams::new(runtime).unwrap();
    params.set_client_id(1121410048996954192);
    params
}

pub fn open_core(sdk: &Arc<RecordingSdk>) -> Core {
    let runtime = runtime(sdk);
    Core::new(&runtime, params(&runtime)).unwrap()
}
