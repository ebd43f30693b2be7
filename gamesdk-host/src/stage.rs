//! Artifact staging: bundled resources, remote URLs, local files and single
//! ZIP entries materialized into fresh, uniquely named temporary directories.
//!
//! A fresh directory per artifact keeps the original file name intact, which
//! matters on Windows where the vendor SDK must keep its exact name to load.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::cleanup::{self, TempRegistry};
use crate::config::LoaderConfig;

/// Disambiguates directories created within the same clock tick.
static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("could not find '{0}' in bundled resources")]
    ResourceNotFound(String),

    #[error("cannot create temporary directory {path}: {source}")]
    TempDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to copy artifact to {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Remote {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("cannot find '{0}' in archive")]
    EntryNotFound(String),

    #[error("invalid artifact source: {0}")]
    InvalidSource(String),
}

/// Read access to artifacts shipped alongside the application.
pub trait ResourceSource: Send + Sync {
    /// Open a resource by absolute resource path (e.g. `/native/linux/amd64/x.so`).
    /// Returns `None` when the resource does not exist.
    fn open(&self, path: &str) -> Option<Box<dyn Read + '_>>;
}

/// Resources laid out on disk under a root directory.
#[derive(Debug, Clone)]
pub struct DirResources {
    root: PathBuf,
}

impl DirResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `resources/` next to the running executable.
    pub fn beside_executable() -> Self {
        let root = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("resources")))
            .unwrap_or_else(|| PathBuf::from("resources"));
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || relative.as_os_str().is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl ResourceSource for DirResources {
    fn open(&self, path: &str) -> Option<Box<dyn Read + '_>> {
        let full = self.resolve(path)?;
        let file = File::open(full).ok()?;
        Some(Box::new(file))
    }
}

/// In-memory resources, keyed by absolute resource path.
#[derive(Debug, Clone, Default)]
pub struct MemoryResources {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(normalize_resource_path(path), bytes.into());
    }

    pub fn with(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }
}

impl ResourceSource for MemoryResources {
    fn open(&self, path: &str) -> Option<Box<dyn Read + '_>> {
        let bytes = self.entries.get(&normalize_resource_path(path))?;
        Some(Box::new(Cursor::new(bytes.as_slice())))
    }
}

fn normalize_resource_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Where an artifact comes from.
#[derive(Debug, Clone, Copy)]
pub enum ArtifactSource<'a> {
    /// Resource path inside the bundled resources.
    Bundled(&'a str),
    /// `http(s)://` or `file://` URL.
    Remote(&'a str),
    /// A file already on the local filesystem.
    Local(&'a Path),
}

/// Materializes artifacts into fresh temporary directories.
pub struct Stager {
    resources: Arc<dyn ResourceSource>,
    registry: Arc<TempRegistry>,
    temp_root: PathBuf,
    prefix: String,
    user_agent: String,
    timeout: Duration,
}

impl Stager {
    pub fn new(resources: Arc<dyn ResourceSource>) -> Self {
        let config = LoaderConfig::default();
        Self::from_config(&config, resources)
    }

    pub fn from_config(config: &LoaderConfig, resources: Arc<dyn ResourceSource>) -> Self {
        Self {
            resources,
            registry: cleanup::global(),
            temp_root: config.temp_root(),
            prefix: config.temp_prefix.clone(),
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.download_timeout_secs),
        }
    }

    pub fn with_registry(mut self, registry: Arc<TempRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    pub fn registry(&self) -> &Arc<TempRegistry> {
        &self.registry
    }

    /// Stage under the source's own final path segment.
    pub fn stage(&self, source: ArtifactSource<'_>) -> Result<PathBuf, StageError> {
        self.stage_inner(source, None)
    }

    /// Stage under a fixed file name (the Windows vendor SDK rule).
    pub fn stage_as(
        &self,
        source: ArtifactSource<'_>,
        file_name: &str,
    ) -> Result<PathBuf, StageError> {
        self.stage_inner(source, Some(file_name))
    }

    fn stage_inner(
        &self,
        source: ArtifactSource<'_>,
        file_name: Option<&str>,
    ) -> Result<PathBuf, StageError> {
        match source {
            ArtifactSource::Bundled(path) => {
                let name = match file_name {
                    Some(name) => name,
                    None => last_segment(path)?,
                };
                let mut reader = self
                    .resources
                    .open(path)
                    .ok_or_else(|| StageError::ResourceNotFound(path.to_string()))?;
                debug!(resource = path, "staging bundled artifact");
                self.write_into_fresh_dir(name, &mut reader)
            }
            ArtifactSource::Remote(url) => {
                if let Some(local) = file_url_path(url) {
                    return self.stage_inner(ArtifactSource::Local(&local), file_name);
                }
                let name = match file_name {
                    Some(name) => name,
                    None => last_segment(strip_query(url))?,
                };
                let mut response = self.fetch(url)?;
                debug!(url, "staging remote artifact");
                self.write_into_fresh_dir(name, &mut response)
            }
            ArtifactSource::Local(path) => {
                let absolute = std::path::absolute(path).map_err(|source| StageError::Copy {
                    path: path.to_path_buf(),
                    source,
                })?;
                let current = absolute.file_name().and_then(|n| n.to_str());
                match file_name {
                    Some(required) if current != Some(required) => {
                        let mut file = File::open(&absolute).map_err(|source| {
                            StageError::Copy {
                                path: absolute.clone(),
                                source,
                            }
                        })?;
                        debug!(path = %absolute.display(), required, "copying local artifact to required name");
                        self.write_into_fresh_dir(required, &mut file)
                    }
                    _ => Ok(absolute),
                }
            }
        }
    }

    /// Scan a ZIP archive for `entry` (exact name match), copy only that
    /// entry into a fresh directory as `file_name`, stop at the first match.
    pub fn stage_from_archive<R: Read + Seek>(
        &self,
        reader: R,
        entry: &str,
        file_name: &str,
    ) -> Result<PathBuf, StageError> {
        let mut archive = zip::ZipArchive::new(reader)?;
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() || file.name() != entry {
                continue;
            }
            debug!(entry, "found archive entry");
            return self.write_into_fresh_dir(file_name, &mut file);
        }
        Err(StageError::EntryNotFound(entry.to_string()))
    }

    /// Download a ZIP archive and stage one entry from it.
    pub fn download_archive_entry(
        &self,
        url: &str,
        entry: &str,
        file_name: &str,
    ) -> Result<PathBuf, StageError> {
        let response = self.fetch(url)?;
        let bytes = response.bytes().map_err(|source| StageError::Remote {
            url: url.to_string(),
            source,
        })?;
        debug!(url, size = bytes.len(), "downloaded archive");
        self.stage_from_archive(Cursor::new(bytes), entry, file_name)
    }

    /// Create `{temp_root}/{prefix}-{nanos}-{seq}` and register it.
    pub fn create_temp_dir(&self) -> Result<PathBuf, StageError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let seq = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
        let dir = self.temp_root.join(format!("{}-{nanos}-{seq}", self.prefix));
        fs::create_dir(&dir).map_err(|source| StageError::TempDir {
            path: dir.clone(),
            source,
        })?;
        self.registry.register(&dir);
        Ok(dir)
    }

    fn write_into_fresh_dir(
        &self,
        file_name: &str,
        reader: &mut dyn Read,
    ) -> Result<PathBuf, StageError> {
        validate_file_name(file_name)?;
        let dir = self.create_temp_dir()?;
        let path = dir.join(file_name);
        let copy_err = |source| StageError::Copy {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(copy_err)?;
        self.registry.register(&path);

        let written = io::copy(reader, &mut file).map_err(copy_err)?;
        file.flush().map_err(copy_err)?;
        debug!(path = %path.display(), bytes = written, "artifact staged");
        Ok(path)
    }

    fn fetch(&self, url: &str) -> Result<reqwest::blocking::Response, StageError> {
        let remote_err = |source| StageError::Remote {
            url: url.to_string(),
            source,
        };
        let client = reqwest::blocking::Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.timeout)
            .build()
            .map_err(remote_err)?;
        client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(remote_err)
    }
}

fn validate_file_name(name: &str) -> Result<(), StageError> {
    let bad = name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']);
    if bad {
        return Err(StageError::InvalidSource(format!("bad file name {name:?}")));
    }
    Ok(())
}

fn last_segment(path: &str) -> Result<&str, StageError> {
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| StageError::InvalidSource(format!("no file name in {path:?}")))
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

fn file_url_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("file://")?;
    let rest = percent_decode_str(strip_query(rest)).decode_utf8_lossy();
    // file:///C:/x → C:/x
    let bytes = rest.as_bytes();
    if bytes.len() > 2 && bytes[0] == b'/' && bytes[2] == b':' && bytes[1].is_ascii_alphabetic() {
        return Some(PathBuf::from(&rest[1..]));
    }
    Some(PathBuf::from(rest.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stager(root: &Path, resources: MemoryResources) -> Stager {
        Stager::new(Arc::new(resources))
            .with_registry(Arc::new(TempRegistry::new()))
            .with_temp_root(root)
    }

    #[test]
    fn test_missing_bundled_resource() {
        let scratch = tempfile::tempdir().unwrap();
        let s = stager(scratch.path(), MemoryResources::new());
        let err = s.stage(ArtifactSource::Bundled("/native/linux/amd64/x.so")).unwrap_err();
        assert!(matches!(err, StageError::ResourceNotFound(p) if p == "/native/linux/amd64/x.so"));
        assert!(s.registry().is_empty());
    }

    #[test]
    fn test_fresh_directory_per_stage() {
        let scratch = tempfile::tempdir().unwrap();
        let res = MemoryResources::new().with("/a/lib.so", b"one".to_vec());
        let s = stager(scratch.path(), res);
        let first = s.stage(ArtifactSource::Bundled("/a/lib.so")).unwrap();
        let second = s.stage(ArtifactSource::Bundled("/a/lib.so")).unwrap();
        assert_ne!(first.parent(), second.parent());
        assert_eq!(s.registry().len(), 4);
    }

    #[test]
    fn test_stage_as_renames() {
        let scratch = tempfile::tempdir().unwrap();
        let res = MemoryResources::new().with("/x/whatever.bin", b"sdk".to_vec());
        let s = stager(scratch.path(), res);
        let path = s
            .stage_as(ArtifactSource::Bundled("/x/whatever.bin"), "discord_game_sdk.dll")
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "discord_game_sdk.dll");
        assert_eq!(fs::read(path).unwrap(), b"sdk");
    }

    #[test]
    fn test_local_file_used_in_place_when_name_matches() {
        let scratch = tempfile::tempdir().unwrap();
        let local = scratch.path().join("discord_game_sdk.so");
        fs::write(&local, b"sdk").unwrap();
        let s = stager(scratch.path(), MemoryResources::new());

        let same = s.stage(ArtifactSource::Local(&local)).unwrap();
        assert_eq!(same, local);
        let named = s
            .stage_as(ArtifactSource::Local(&local), "discord_game_sdk.so")
            .unwrap();
        assert_eq!(named, local);
        assert!(s.registry().is_empty());
    }

    #[test]
    fn test_local_file_copied_when_name_differs() {
        let scratch = tempfile::tempdir().unwrap();
        let local = scratch.path().join("renamed.dll");
        fs::write(&local, b"sdk-bytes").unwrap();
        let s = stager(scratch.path(), MemoryResources::new());

        let staged = s
            .stage_as(ArtifactSource::Local(&local), "discord_game_sdk.dll")
            .unwrap();
        assert_ne!(staged, local);
        assert_eq!(staged.file_name().unwrap(), "discord_game_sdk.dll");
        assert_eq!(fs::read(staged).unwrap(), b"sdk-bytes");
    }

    #[test]
    fn test_file_url_is_local() {
        let scratch = tempfile::tempdir().unwrap();
        let local = scratch.path().join("discord_game_sdk.so");
        fs::write(&local, b"sdk").unwrap();
        let s = stager(scratch.path(), MemoryResources::new());
        let url = format!("file://{}", local.display());
        if cfg!(unix) {
            assert_eq!(s.stage(ArtifactSource::Remote(&url)).unwrap(), local);
        }
    }

    #[test]
    fn test_dir_resources_rejects_escape() {
        let res = DirResources::new("/tmp/res");
        assert!(res.resolve("/../etc/passwd").is_none());
        assert!(res.resolve("/").is_none());
        assert_eq!(
            res.resolve("/native/linux/amd64/a.so").unwrap(),
            PathBuf::from("/tmp/res/native/linux/amd64/a.so")
        );
    }

    #[test]
    fn test_unreachable_temp_root() {
        let scratch = tempfile::tempdir().unwrap();
        let res = MemoryResources::new().with("/a/lib.so", b"x".to_vec());
        let s = stager(&scratch.path().join("missing/deeper"), res);
        let err = s.stage(ArtifactSource::Bundled("/a/lib.so")).unwrap_err();
        assert!(matches!(err, StageError::TempDir { .. }));
    }

    #[test]
    fn test_segment_helpers() {
        assert_eq!(last_segment("/a/b/c.so").unwrap(), "c.so");
        assert!(last_segment("/a/b/").is_err());
        assert_eq!(strip_query("https://h/x.zip?v=1"), "https://h/x.zip");
        assert_eq!(
            file_url_path("file:///C:/sdk/x.dll").unwrap(),
            PathBuf::from("C:/sdk/x.dll")
        );
        assert!(file_url_path("https://h/x.zip").is_none());
    }

    #[test]
    fn test_file_url_is_percent_decoded() {
        assert_eq!(
            file_url_path("file:///opt/My%20Game/discord_game_sdk.so").unwrap(),
            PathBuf::from("/opt/My Game/discord_game_sdk.so")
        );
        assert_eq!(
            file_url_path("file:///C:/Program%20Files/sdk/x.dll?v=2").unwrap(),
            PathBuf::from("C:/Program Files/sdk/x.dll")
        );

        let scratch = tempfile::tempdir().unwrap();
        let dir = scratch.path().join("My Game");
        fs::create_dir(&dir).unwrap();
        let local = dir.join("discord_game_sdk.so");
        fs::write(&local, b"sdk").unwrap();
        let s = stager(scratch.path(), MemoryResources::new());
        let url = format!("file://{}", local.display()).replace(' ', "%20");
        if cfg!(unix) {
            assert_eq!(s.stage(ArtifactSource::Remote(&url)).unwrap(), local);
        }
    }
}
