//! Wrapper configuration.
//!
//! The operating mode is selected by the environment of the build that invokes the wrapper. The
//! flags appended to every compiler invocation default to a built-in list and can be overridden
//! with a `ccwrap.toml` placed next to the wrapper binary.
//!
//! # Example configuration
//! ```toml
//!  no_color_flags = ["-fno-color-diagnostics"]
//!  disabled_warnings = [
//!    "-Wno-error=zero-as-null-pointer-constant",
//!    "-Wno-error=unknown-warning-option",
//!  ]
//! ```
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Log file path. Its presence enables capture mode.
pub const STDERR_REDIRECT_KEY: &str = "ANDROID_LLVM_STDERR_REDIRECT";
/// Directory holding the prebuilt compiler used when the real compiler fails.
pub const PREBUILT_COMPILER_PATH_KEY: &str = "ANDROID_LLVM_PREBUILT_COMPILER_PATH";
/// Log filter for the wrapper itself, e.g. `CCWRAP_LOG=debug`.
pub const WRAPPER_LOG_KEY: &str = "CCWRAP_LOG";

pub const CONFIG_FILENAME: &str = "ccwrap.toml";

// New warnings may show up after rebasing on upstream; demote them until they are fixed.
const DISABLED_WARNINGS: &[&str] = &[
    "-Wno-error=zero-as-null-pointer-constant",
    "-Wno-error=unknown-warning-option",
];

const NO_COLOR_FLAGS: &[&str] = &["-fno-color-diagnostics"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    /// Appended only when stderr is captured.
    pub no_color_flags: Vec<String>,
    /// Appended to every invocation of the real compiler.
    pub disabled_warnings: Vec<String>,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            no_color_flags: NO_COLOR_FLAGS.iter().map(|s| s.to_string()).collect(),
            disabled_warnings: DISABLED_WARNINGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl WrapperConfig {
    /// Flags appended when the wrapper execs straight into the real compiler.
    pub fn direct_flags(&self) -> impl Iterator<Item = &str> {
        self.disabled_warnings.iter().map(String::as_str)
    }

    /// Flags appended when stderr is captured for the log.
    pub fn capture_flags(&self) -> impl Iterator<Item = &str> {
        self.no_color_flags
            .iter()
            .chain(self.disabled_warnings.iter())
            .map(String::as_str)
    }
}

/// Load configuration in `filepath`.
pub fn load_config(filepath: impl AsRef<Path>) -> Result<Option<WrapperConfig>> {
    if !filepath.as_ref().exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&filepath).context(format!(
        "failed to read file at `{}`",
        filepath.as_ref().display()
    ))?;

    let config: WrapperConfig = toml::from_str(content.as_str()).context(format!(
        "failed to parse TOML in `{}`",
        filepath.as_ref().display()
    ))?;

    Ok(Some(config))
}

/// Returns the configuration for a wrapper installed in `wrapper_dir`, or the defaults if there is
/// no `ccwrap.toml` beside it.
pub fn resolve_config(wrapper_dir: impl AsRef<Path>) -> Result<WrapperConfig> {
    let path = wrapper_dir.as_ref().join(CONFIG_FILENAME);
    match load_config(&path)? {
        Some(config) => {
            log::debug!("using flags from `{}`", path.display());
            Ok(config)
        }
        None => Ok(WrapperConfig::default()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Replace the wrapper with the real compiler. No capture, no fallback.
    Direct,
    /// Capture stderr into `log_path` and fall back to the prebuilt compiler on failure.
    Capture {
        log_path: PathBuf,
        /// Only consulted once the real compiler has failed.
        prebuilt_dir: Option<PathBuf>,
    },
}

impl Mode {
    pub fn from_vars(redirect: Option<OsString>, prebuilt: Option<OsString>) -> Self {
        match redirect {
            None => Mode::Direct,
            Some(log_path) => Mode::Capture {
                log_path: log_path.into(),
                prebuilt_dir: prebuilt.map(PathBuf::from),
            },
        }
    }

    /// Select the mode from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var_os(STDERR_REDIRECT_KEY),
            std::env::var_os(PREBUILT_COMPILER_PATH_KEY),
        )
    }
}
