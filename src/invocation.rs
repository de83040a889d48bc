use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};

/// Suffix of the real compiler binary that the wrapper stands in for.
pub const REAL_SUFFIX: &str = ".real";

/// A single compiler invocation as received by the wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// `argv[0]` is the name the wrapper was invoked as.
    pub argv: Vec<OsString>,
    /// Resolved path of the wrapper binary, e.g. `/opt/llvm/bin/clang`.
    pub wrapper_path: PathBuf,
}

fn with_real_suffix(s: &OsStr) -> OsString {
    let mut out = s.to_os_string();
    out.push(REAL_SUFFIX);
    out
}

impl Invocation {
    pub fn new(argv: Vec<OsString>, wrapper_path: impl Into<PathBuf>) -> Result<Self> {
        if argv.is_empty() {
            bail!("empty argument vector");
        }
        Ok(Self {
            argv,
            wrapper_path: wrapper_path.into(),
        })
    }

    /// Build the invocation of the running process.
    pub fn from_env() -> Result<Self> {
        let exe = std::env::current_exe().context("locating the wrapper binary")?;
        let wrapper_path = exe
            .canonicalize()
            .context(format!("resolving `{}`", exe.display()))?;
        Self::new(std::env::args_os().collect(), wrapper_path)
    }

    pub fn program_name(&self) -> &OsStr {
        &self.argv[0]
    }

    /// Arguments for the compiler, without the program name.
    pub fn args(&self) -> &[OsString] {
        &self.argv[1..]
    }

    /// File name of the wrapper binary, which is also the name of the tool it stands in for.
    pub fn tool_name(&self) -> Result<&OsStr> {
        self.wrapper_path.file_name().context(format!(
            "wrapper path `{}` has no file name",
            self.wrapper_path.display()
        ))
    }

    pub fn wrapper_dir(&self) -> &Path {
        self.wrapper_path.parent().unwrap_or(Path::new("/"))
    }

    /// `clang` -> `clang.real`, next to the wrapper.
    pub fn real_compiler_path(&self) -> PathBuf {
        PathBuf::from(with_real_suffix(self.wrapper_path.as_os_str()))
    }

    /// `argv[0]` handed to the real compiler when exec'ing into it directly.
    pub fn real_program_name(&self) -> OsString {
        with_real_suffix(self.program_name())
    }

    /// The binary with the same name as the wrapper in the prebuilt directory.
    pub fn fallback_compiler_path(&self, prebuilt_dir: impl AsRef<Path>) -> Result<PathBuf> {
        Ok(prebuilt_dir.as_ref().join(self.tool_name()?))
    }
}

/// Space-join a command line for the log.
pub fn display_command<S: AsRef<OsStr>>(command: &[S]) -> String {
    command
        .iter()
        .map(|arg| arg.as_ref().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
