use std::path::Path;

use anyhow::Result;

use crate::{
    config::{Mode, resolve_config},
    invocation::Invocation,
    wrapper::{Next, Wrapper},
};

pub mod config;
pub mod diagnostics;
pub mod install;
pub mod invocation;
pub mod wrapper;

/// Name of the binary when it is run as itself rather than as a compiler.
pub const ADMIN_NAME: &str = "ccwrap";

/// Whether the executable at `exe` should behave as the admin CLI.
pub fn is_admin(exe: impl AsRef<Path>) -> bool {
    exe.as_ref()
        .file_stem()
        .is_some_and(|stem| stem == ADMIN_NAME)
}

/// Run the wrapper for the current process and return what to do next.
pub fn wrap_current_process() -> Result<Next> {
    let invocation = Invocation::from_env()?;
    let config = resolve_config(invocation.wrapper_dir())?;
    let mode = Mode::from_env();
    log::debug!("{:?} mode for {}", mode, invocation.wrapper_path.display());

    Wrapper::new(invocation, config).run(&mode)
}
