//! Platform resolution: host OS + CPU architecture → artifact names and paths.
//!
//! Two architecture conventions coexist. Bundled binding objects live under
//! the normalized tag (`amd64`), while the vendor archive uses `x86_64`.
//! They are kept independently configurable.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Base name of the binding object that exports the `gsdk_*` C ABI.
pub const BINDING_LIBRARY: &str = "discord_game_sdk_jni";

/// Base name of the vendor SDK object.
pub const SDK_LIBRARY: &str = "discord_game_sdk";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("cannot determine OS type: {0}")]
    UnsupportedOs(String),

    #[error("unsupported architecture: {0:?}")]
    UnsupportedArch(String),
}

/// Operating systems with a known library-naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Windows,
    Linux,
    #[serde(rename = "macos")]
    MacOs,
}

impl Os {
    /// Match a host-reported OS name (e.g. `"Windows 10"`, `"Linux"`,
    /// `"Mac OS X"`, or Rust's `"macos"`).
    pub fn detect(os_name: &str) -> Result<Os, PlatformError> {
        let name = os_name.to_lowercase();
        if name.contains("windows") {
            Ok(Os::Windows)
        } else if name.contains("linux") {
            Ok(Os::Linux)
        } else if name.contains("mac os") || name == "macos" || name.contains("darwin") {
            Ok(Os::MacOs)
        } else {
            Err(PlatformError::UnsupportedOs(os_name.to_string()))
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Os::Windows => "windows",
            Os::Linux => "linux",
            Os::MacOs => "macos",
        }
    }

    pub fn library_suffix(self) -> &'static str {
        match self {
            Os::Windows => ".dll",
            Os::Linux => ".so",
            Os::MacOs => ".dylib",
        }
    }

    /// Binding-object file name: `name.dll` on Windows, `libname.so` /
    /// `libname.dylib` elsewhere.
    pub fn library_file_name(self, name: &str) -> String {
        match self {
            Os::Windows => format!("{name}{}", self.library_suffix()),
            Os::Linux | Os::MacOs => format!("lib{name}{}", self.library_suffix()),
        }
    }

    /// Vendor SDK file name. No `lib` prefix on any platform.
    pub fn sdk_file_name(self, name: &str) -> String {
        format!("{name}{}", self.library_suffix())
    }

    /// Whether the vendor SDK must be resident before the binding object is
    /// opened.
    pub fn requires_sdk_preload(self) -> bool {
        matches!(self, Os::Windows)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// How a raw architecture string is rewritten for a given path convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchConvention {
    /// `x86_64` → `amd64`. Used for bundled binding objects.
    Normalized,
    /// `amd64` → `x86_64`. Used inside the vendor SDK archive.
    Vendor,
}

impl ArchConvention {
    pub fn apply(self, raw: &str) -> String {
        let arch = raw.to_lowercase();
        match (self, arch.as_str()) {
            (ArchConvention::Normalized, "x86_64") => "amd64".to_string(),
            (ArchConvention::Vendor, "amd64") => "x86_64".to_string(),
            _ => arch,
        }
    }
}

/// (OS tag, arch tag, object file name) for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub os: Os,
    pub arch: String,
    pub object_name: String,
}

impl ArtifactDescriptor {
    /// `/native/{os}/{arch}/{object}`
    pub fn bundled_path(&self) -> String {
        format!("/native/{}/{}/{}", self.os.tag(), self.arch, self.object_name)
    }
}

/// Resolved host platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    os: Os,
    arch: String,
}

impl Platform {
    pub fn resolve(os_name: &str, arch: &str) -> Result<Self, PlatformError> {
        let os = Os::detect(os_name)?;
        let arch = arch.to_lowercase();
        let valid = !arch.is_empty()
            && arch
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(PlatformError::UnsupportedArch(arch));
        }
        Ok(Self { os, arch })
    }

    /// The platform this process runs on.
    pub fn current() -> Result<Self, PlatformError> {
        Self::resolve(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn os(&self) -> Os {
        self.os
    }

    /// Architecture exactly as reported (lower-cased).
    pub fn raw_arch(&self) -> &str {
        &self.arch
    }

    pub fn arch(&self, convention: ArchConvention) -> String {
        convention.apply(&self.arch)
    }

    pub fn binding_artifact(&self, name: &str, convention: ArchConvention) -> ArtifactDescriptor {
        ArtifactDescriptor {
            os: self.os,
            arch: self.arch(convention),
            object_name: self.os.library_file_name(name),
        }
    }

    /// Entry path of the vendor SDK inside the vendor ZIP:
    /// `lib/{arch}/{name}{suffix}`.
    pub fn sdk_archive_entry(&self, name: &str, convention: ArchConvention) -> String {
        format!("lib/{}/{}", self.arch(convention), self.os.sdk_file_name(name))
    }

    /// Bundled copy of the vendor SDK: `/{name}/lib/{arch}/{name}{suffix}`.
    pub fn sdk_bundled_path(&self, name: &str, convention: ArchConvention) -> String {
        format!("/{name}/{}", self.sdk_archive_entry(name, convention))
    }
}
