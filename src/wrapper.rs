//! The compiler wrapper.
//!
//! Without a redirect configured the wrapper simply becomes the real compiler. With one, it runs
//! the real compiler as a child, appends whatever it printed on stderr to the shared log, and if
//! the compile failed hands the original command line over to the prebuilt compiler.
use std::{
    ffi::OsString,
    os::unix::process::CommandExt,
    path::Path,
    process::{Command, Stdio},
    time::Duration,
};

use anyhow::{Context, Result, bail};

use crate::{
    config::{Mode, PREBUILT_COMPILER_PATH_KEY, WrapperConfig},
    diagnostics::{LOCK_POLL_INTERVAL, LogEntry, append_entry},
    invocation::{Invocation, display_command},
};

/// What the wrapper process does once the wrapper logic is done.
#[derive(Debug)]
pub enum Next {
    /// Exit with this status.
    Exit(i32),
    /// Replace the process image with this command.
    Replace(Command),
}

pub struct Wrapper {
    invocation: Invocation,
    config: WrapperConfig,
    lock_poll: Duration,
}

impl Wrapper {
    pub fn new(invocation: Invocation, config: WrapperConfig) -> Self {
        Self {
            invocation,
            config,
            lock_poll: LOCK_POLL_INTERVAL,
        }
    }

    pub fn with_lock_poll(mut self, lock_poll: Duration) -> Self {
        self.lock_poll = lock_poll;
        self
    }

    pub fn run(&self, mode: &Mode) -> Result<Next> {
        match mode {
            Mode::Direct => Ok(Next::Replace(self.direct_command())),
            Mode::Capture {
                log_path,
                prebuilt_dir,
            } => self.capture(log_path, prebuilt_dir.as_deref()),
        }
    }

    /// The real compiler with the original arguments and the disabled warnings.
    pub fn direct_command(&self) -> Command {
        let inv = &self.invocation;
        let mut cmd = Command::new(inv.real_compiler_path());
        cmd.arg0(inv.real_program_name())
            .args(inv.args())
            .args(self.config.direct_flags());
        cmd
    }

    /// Full command line run in capture mode, starting with the real compiler path.
    pub fn capture_command_line(&self) -> Vec<OsString> {
        let inv = &self.invocation;
        let mut line = vec![inv.real_compiler_path().into_os_string()];
        line.extend(inv.args().iter().cloned());
        line.extend(self.config.capture_flags().map(OsString::from));
        line
    }

    /// The prebuilt compiler with the untouched original argv.
    pub fn fallback_command(&self, prebuilt_dir: Option<&Path>) -> Result<Command> {
        let Some(prebuilt_dir) = prebuilt_dir else {
            bail!("the real compiler failed and {PREBUILT_COMPILER_PATH_KEY} is not set");
        };
        let inv = &self.invocation;
        let mut cmd = Command::new(inv.fallback_compiler_path(prebuilt_dir)?);
        cmd.arg0(inv.program_name()).args(inv.args());
        Ok(cmd)
    }

    fn capture(&self, log_path: &Path, prebuilt_dir: Option<&Path>) -> Result<Next> {
        let line = self.capture_command_line();
        log::debug!("running {}", display_command(&line));

        let output = Command::new(&line[0])
            .args(&line[1..])
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .context(format!("running `{}`", line[0].to_string_lossy()))?;

        if !output.stderr.is_empty() {
            let entry = LogEntry::new(display_command(&line), output.stderr);
            append_entry(log_path, &entry, self.lock_poll)?;
        }

        if output.status.success() {
            return Ok(Next::Exit(0));
        }

        log::debug!(
            "{} exited with {}, falling back to the prebuilt compiler",
            line[0].to_string_lossy(),
            output.status
        );
        Ok(Next::Replace(self.fallback_command(prebuilt_dir)?))
    }
}

#[cfg(test)]
mod tests {
    use std::{ffi::OsStr, fs, os::unix::fs::PermissionsExt};

    use super::*;
    use crate::diagnostics::read_log;

    fn write_script(path: &Path, body: &str) -> Result<()> {
        fs::write(path, format!("#!/bin/sh\n{body}\n"))?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    fn wrapper_in(dir: &Path, args: &[&str]) -> Result<Wrapper> {
        let mut argv = vec![OsString::from("clang")];
        argv.extend(args.iter().map(OsString::from));
        let inv = Invocation::new(argv, dir.join("clang"))?;
        Ok(Wrapper::new(inv, WrapperConfig::default()).with_lock_poll(Duration::from_millis(10)))
    }

    fn args_of(cmd: &Command) -> Vec<&OsStr> {
        cmd.get_args().collect()
    }

    #[test]
    fn direct_mode_replaces_with_real_compiler() -> Result<()> {
        let wrapper = wrapper_in(Path::new("/opt/llvm/bin"), &["-c", "foo.c"])?;
        let Next::Replace(cmd) = wrapper.run(&Mode::Direct)? else {
            panic!("direct mode must replace the process");
        };
        assert_eq!(cmd.get_program(), "/opt/llvm/bin/clang.real");
        assert_eq!(
            vec![
                "-c",
                "foo.c",
                "-Wno-error=zero-as-null-pointer-constant",
                "-Wno-error=unknown-warning-option",
            ],
            args_of(&cmd)
        );
        Ok(())
    }

    #[test]
    fn quiet_success_leaves_log_untouched() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        write_script(&dir.path().join("clang.real"), "exit 0")?;
        let log = dir.path().join("clang-error.log");

        let wrapper = wrapper_in(dir.path(), &["-c", "foo.c"])?;
        let next = wrapper.run(&Mode::Capture {
            log_path: log.clone(),
            prebuilt_dir: None,
        })?;

        assert!(matches!(next, Next::Exit(0)));
        assert!(!log.exists());
        Ok(())
    }

    #[test]
    fn warnings_are_logged_on_success() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        write_script(&dir.path().join("clang.real"), "echo 'warning: x' >&2\nexit 0")?;
        let log = dir.path().join("clang-error.log");

        let wrapper = wrapper_in(dir.path(), &["-c", "foo.c"])?;
        let next = wrapper.run(&Mode::Capture {
            log_path: log.clone(),
            prebuilt_dir: None,
        })?;
        assert!(matches!(next, Next::Exit(0)));

        let entries = read_log(&log)?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].stderr, b"warning: x\n");
        assert_eq!(
            entries[0].command,
            display_command(&wrapper.capture_command_line())
        );
        Ok(())
    }

    #[test]
    fn failure_falls_back_with_original_argv() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        write_script(&dir.path().join("clang.real"), "echo 'error: y' >&2\nexit 1")?;
        let log = dir.path().join("clang-error.log");

        let wrapper = wrapper_in(dir.path(), &["-c", "foo.c"])?;
        let next = wrapper.run(&Mode::Capture {
            log_path: log.clone(),
            prebuilt_dir: Some("/prebuilts/clang/bin".into()),
        })?;

        let Next::Replace(cmd) = next else {
            panic!("a failed compile must fall back");
        };
        assert_eq!(cmd.get_program(), "/prebuilts/clang/bin/clang");
        assert_eq!(vec!["-c", "foo.c"], args_of(&cmd));
        assert_eq!(read_log(&log)?.len(), 1);
        Ok(())
    }

    #[test]
    fn failure_without_prebuilt_dir_is_an_error() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        write_script(&dir.path().join("clang.real"), "exit 3")?;

        let wrapper = wrapper_in(dir.path(), &[])?;
        let result = wrapper.run(&Mode::Capture {
            log_path: dir.path().join("clang-error.log"),
            prebuilt_dir: None,
        });
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn unwritable_log_is_fatal() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        write_script(&dir.path().join("clang.real"), "echo 'warning: x' >&2")?;

        let wrapper = wrapper_in(dir.path(), &[])?;
        let result = wrapper.run(&Mode::Capture {
            log_path: dir.path().join("missing").join("clang-error.log"),
            prebuilt_dir: Some(dir.path().into()),
        });
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn failed_log_write_stops_before_fallback() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        write_script(&dir.path().join("clang.real"), "echo 'error: y' >&2\nexit 1")?;

        // opens and locks fine, every write fails with ENOSPC
        let wrapper = wrapper_in(dir.path(), &["-c", "foo.c"])?;
        let result = wrapper.run(&Mode::Capture {
            log_path: "/dev/full".into(),
            prebuilt_dir: Some(dir.path().into()),
        });

        let err = result.err().expect("a failed log write must be fatal");
        assert!(format!("{err:#}").contains("writing to log"), "{err:#}");
        Ok(())
    }
}
