//! Two-phase native load: stage artifacts, open them in the order the
//! platform requires, then bootstrap the native layer exactly once.
//!
//! A successful load yields a [`NativeRuntime`], the token [`crate::Core::new`]
//! and [`crate::CreateParams::new`] require. Loading may be repeated to swap
//! native objects; each load resolves the platform afresh.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::cleanup::TempRegistry;
use crate::config::LoaderConfig;
use crate::error::ResultCode;
use crate::native::NativeSdk;
use crate::native::dylib::DylibSdk;
use crate::platform::{Os, Platform, PlatformError};
use crate::stage::{ArtifactSource, DirResources, ResourceSource, StageError, Stager};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot load native object {path}: {source}")]
    Link {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("native object is missing symbol {name}: {source}")]
    Symbol {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("SDK path must be absolute: {0}")]
    InvalidPath(PathBuf),

    #[error("native bootstrap failed: {0}")]
    Bootstrap(ResultCode),
}

/// Anything that can go wrong between "which platform is this" and a
/// bootstrapped native layer.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Proof that a native backend is resident and bootstrapped.
///
/// Cloning is cheap. The backend stays loaded while any clone, any
/// [`crate::CreateParams`] or any [`crate::Core`] built from it is alive,
/// and unloads when the last of them is dropped. Nothing else in the process
/// holds on to it.
#[derive(Clone)]
pub struct NativeRuntime {
    sdk: Arc<dyn NativeSdk>,
    sdk_path: PathBuf,
    generation: u64,
}

impl NativeRuntime {
    /// Issue the single bootstrap call for `sdk`, passing the absolute path
    /// of the vendor SDK.
    pub fn bootstrap(sdk: Arc<dyn NativeSdk>, sdk_path: &Path) -> Result<Self, LoadError> {
        if !sdk_path.is_absolute() {
            return Err(LoadError::InvalidPath(sdk_path.to_path_buf()));
        }
        let code = sdk.bootstrap(sdk_path);
        if !code.is_ok() {
            return Err(LoadError::Bootstrap(code));
        }
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        info!(sdk = %sdk_path.display(), generation, "native layer bootstrapped");
        Ok(Self {
            sdk,
            sdk_path: sdk_path.to_path_buf(),
            generation,
        })
    }

    pub fn sdk_path(&self) -> &Path {
        &self.sdk_path
    }

    /// Increments with every successful bootstrap in this process.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn sdk(&self) -> &Arc<dyn NativeSdk> {
        &self.sdk
    }
}

impl std::fmt::Debug for NativeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRuntime")
            .field("sdk_path", &self.sdk_path)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Paths and order for one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    /// Opened before the binding object, when the platform requires it.
    pub preload: Option<PathBuf>,
    pub binding: PathBuf,
    /// Absolute vendor SDK path handed to bootstrap.
    pub bootstrap_path: PathBuf,
}

impl LoadPlan {
    pub fn new(os: Os, sdk_path: &Path, binding: &Path) -> Result<Self, LoadError> {
        let sdk_path = std::path::absolute(sdk_path)
            .map_err(|_| LoadError::InvalidPath(sdk_path.to_path_buf()))?;
        Ok(Self {
            preload: os.requires_sdk_preload().then(|| sdk_path.clone()),
            binding: binding.to_path_buf(),
            bootstrap_path: sdk_path,
        })
    }

    /// Open the native objects and bootstrap.
    pub fn execute(&self) -> Result<NativeRuntime, LoadError> {
        let sdk = DylibSdk::open(&self.binding, self.preload.as_deref())?;
        NativeRuntime::bootstrap(Arc::new(sdk), &self.bootstrap_path)
    }
}

/// Resolves, stages and loads the native objects.
pub struct Loader {
    config: LoaderConfig,
    resources: Arc<dyn ResourceSource>,
    platform: Option<Platform>,
    registry: Option<Arc<TempRegistry>>,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        let resources: Arc<dyn ResourceSource> = match &config.resource_dir {
            Some(dir) => Arc::new(DirResources::new(dir)),
            None => Arc::new(DirResources::beside_executable()),
        };
        Self {
            config,
            resources,
            platform: None,
            registry: None,
        }
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceSource>) -> Self {
        self.resources = resources;
        self
    }

    /// Pin the platform instead of detecting it on every load.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_registry(mut self, registry: Arc<TempRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load using `config.sdk_path` when set, the bundled vendor SDK otherwise.
    pub fn load(&self) -> Result<NativeRuntime, InitError> {
        match &self.config.sdk_path {
            Some(path) => self.load_with_sdk(path),
            None => self.load_from_resources(),
        }
    }

    /// Use a vendor SDK already on disk. On Windows it is copied when its
    /// file name differs from the one the binding object links against.
    pub fn load_with_sdk(&self, sdk_path: &Path) -> Result<NativeRuntime, InitError> {
        let platform = self.platform()?;
        let stager = self.stager();
        let sdk = self.stage_sdk(&platform, &stager, ArtifactSource::Local(sdk_path))?;
        self.finish(&platform, &stager, &sdk)
    }

    /// `file://` URLs are used in place where the name allows it; anything
    /// else is fetched into a fresh directory under the vendor file name.
    pub fn load_from_url(&self, url: &str) -> Result<NativeRuntime, InitError> {
        let platform = self.platform()?;
        let stager = self.stager();
        let sdk = if url.starts_with("file://") && !platform.os().requires_sdk_preload() {
            stager.stage(ArtifactSource::Remote(url))?
        } else {
            let name = platform.os().sdk_file_name(&self.config.sdk_name);
            stager.stage_as(ArtifactSource::Remote(url), &name)?
        };
        self.finish(&platform, &stager, &sdk)
    }

    /// Vendor SDK shipped with the application at `/lib/{arch}/{file}`
    /// (or `/{name}/lib/{arch}/{file}`), arch in the archive convention.
    pub fn load_from_resources(&self) -> Result<NativeRuntime, InitError> {
        let platform = self.platform()?;
        let stager = self.stager();
        let entry = platform.sdk_archive_entry(&self.config.sdk_name, self.config.archive_arch);
        let flat = format!("/{entry}");
        let nested = platform.sdk_bundled_path(&self.config.sdk_name, self.config.archive_arch);
        let name = platform.os().sdk_file_name(&self.config.sdk_name);

        let sdk = match stager.stage_as(ArtifactSource::Bundled(&flat), &name) {
            Err(StageError::ResourceNotFound(_)) => {
                debug!(tried = %flat, "falling back to nested SDK resource layout");
                stager.stage_as(ArtifactSource::Bundled(&nested), &name)?
            }
            other => other?,
        };
        self.finish(&platform, &stager, &sdk)
    }

    /// Download the vendor archive and extract this platform's SDK object.
    pub fn load_download(&self) -> Result<NativeRuntime, InitError> {
        let platform = self.platform()?;
        let stager = self.stager();
        let entry = platform.sdk_archive_entry(&self.config.sdk_name, self.config.archive_arch);
        let name = platform.os().sdk_file_name(&self.config.sdk_name);
        info!(url = %self.config.sdk_archive_url, entry = %entry, "downloading vendor SDK");
        let sdk = stager.download_archive_entry(&self.config.sdk_archive_url, &entry, &name)?;
        self.finish(&platform, &stager, &sdk)
    }

    /// Stage the binding object and build the plan without opening anything.
    pub fn plan(&self, platform: &Platform, sdk_path: &Path) -> Result<LoadPlan, InitError> {
        self.plan_with(platform, &self.stager(), sdk_path)
    }

    fn plan_with(
        &self,
        platform: &Platform,
        stager: &Stager,
        sdk_path: &Path,
    ) -> Result<LoadPlan, InitError> {
        let artifact = platform.binding_artifact(&self.config.binding_name, self.config.binding_arch);
        let binding = stager.stage(ArtifactSource::Bundled(&artifact.bundled_path()))?;
        Ok(LoadPlan::new(platform.os(), sdk_path, &binding)?)
    }

    fn finish(
        &self,
        platform: &Platform,
        stager: &Stager,
        sdk_path: &Path,
    ) -> Result<NativeRuntime, InitError> {
        let plan = self.plan_with(platform, stager, sdk_path)?;
        Ok(plan.execute()?)
    }

    fn stage_sdk(
        &self,
        platform: &Platform,
        stager: &Stager,
        source: ArtifactSource<'_>,
    ) -> Result<PathBuf, StageError> {
        if platform.os().requires_sdk_preload() {
            let name = platform.os().sdk_file_name(&self.config.sdk_name);
            stager.stage_as(source, &name)
        } else {
            stager.stage(source)
        }
    }

    fn platform(&self) -> Result<Platform, PlatformError> {
        match &self.platform {
            Some(platform) => Ok(platform.clone()),
            None => Platform::current(),
        }
    }

    fn stager(&self) -> Stager {
        let stager = Stager::from_config(&self.config, self.resources.clone());
        match &self.registry {
            Some(registry) => stager.with_registry(registry.clone()),
            None => stager,
        }
    }
}
