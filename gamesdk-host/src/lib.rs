//! Host-side session manager for a native game SDK reached over FFI.
//!
//! Resolve the platform, stage the native artifacts, load them once, then
//! drive a single native session whose every call is serialized through one
//! dispatch guard:
//!
//! ```no_run
//! use gamesdk_host::{Core, CreateFlags, CreateParams, Loader, LoaderConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let _cleanup = gamesdk_host::cleanup_on_exit();
//! let runtime = Loader::new(LoaderConfig::discover()?).load()?;
//!
//! let mut params = CreateParams::new(&runtime)?;
//! params.set_client_id(1121410048996954192);
//! params.set_flags(CreateFlags::NO_REQUIRE_DISCORD);
//! let core = Core::new(&runtime, params)?;
//!
//! loop {
//!     core.run_callbacks()?;
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! # }
//! ```

pub mod cleanup;
pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod loader;
pub mod log;
pub mod manager;
pub mod native;
pub mod params;
pub mod platform;
pub mod stage;

pub use cleanup::{ExitCleanup, TempRegistry, cleanup_on_exit};
pub use config::LoaderConfig;
pub use crate::core::{Core, Dispatch};
pub use error::{CreateError, DEFAULT_CALLBACK, ResultCode, SessionError, raise_on_failure};
pub use event::{EventHandler, SdkEvent, User};
pub use loader::{InitError, LoadError, LoadPlan, Loader, NativeRuntime};
pub use log::{LogHook, LogLevel};
pub use manager::{Activity, ActivityManager, OverlayManager};
pub use native::{Feature, NativeSdk};
pub use params::{CreateFlags, CreateParams};
pub use platform::{ArchConvention, Os, Platform};
pub use stage::{ArtifactSource, Stager};
