use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, bail};

use crate::invocation::REAL_SUFFIX;

/// Tools replaced by the wrapper when none are given.
pub const DEFAULT_TOOLS: &[&str] = &["clang", "clang-tidy"];

/// `clang++` is clang under another name; its `.real` points at `clang.real`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub name: String,
    pub target: String,
}

impl FromStr for Alias {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, target) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME=TARGET, got `{s}`"))?;
        if name.is_empty() || target.is_empty() {
            bail!("expected NAME=TARGET, got `{s}`");
        }
        Ok(Self {
            name: name.into(),
            target: target.into(),
        })
    }
}

pub fn default_aliases() -> Vec<Alias> {
    vec![Alias {
        name: "clang++".into(),
        target: "clang".into(),
    }]
}

fn real_path(bin_dir: &Path, name: &str) -> PathBuf {
    bin_dir.join(format!("{name}{REAL_SUFFIX}"))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        std::fs::remove_file(path).context(format!("removing `{}`", path.display()))?;
    }
    Ok(())
}

/// Put the wrapper in front of the compilers in `bin_dir`.
///
/// Each tool is moved to `<tool>.real` unless that already exists (a previous install, or a
/// prebuilt toolchain that was wrapped before), then the wrapper is copied over the tool's name.
/// Aliases get a `.real` symlink to their target's `.real` and a copy of the wrapper as well.
pub fn install_wrappers(
    bin_dir: impl AsRef<Path>,
    wrapper_exe: impl AsRef<Path>,
    tools: &[String],
    aliases: &[Alias],
) -> Result<()> {
    let bin_dir = bin_dir.as_ref();
    let wrapper_exe = wrapper_exe.as_ref();

    for tool in tools {
        let tool_path = bin_dir.join(tool);
        let real = real_path(bin_dir, tool);
        if real.exists() {
            log::debug!("`{}` already exists", real.display());
        } else if tool_path.exists() {
            log::info!("=> {} -> {}", tool_path.display(), real.display());
            std::fs::rename(&tool_path, &real)
                .context(format!("moving `{}` out of the way", tool_path.display()))?;
        } else {
            bail!("neither `{}` nor `{}` exists", tool_path.display(), real.display());
        }
    }

    for alias in aliases {
        if !tools.contains(&alias.target) {
            bail!(
                "alias `{}` points at `{}`, which is not being wrapped",
                alias.name,
                alias.target
            );
        }
        let link = real_path(bin_dir, &alias.name);
        remove_if_exists(&link)?;
        let target: OsString = format!("{}{REAL_SUFFIX}", alias.target).into();
        std::os::unix::fs::symlink(&target, &link)
            .context(format!("linking `{}`", link.display()))?;
    }

    let names = tools.iter().chain(aliases.iter().map(|a| &a.name));
    for name in names {
        let dest = bin_dir.join(name);
        remove_if_exists(&dest)?;
        // `fs::copy` carries the permission bits over
        std::fs::copy(wrapper_exe, &dest).context(format!(
            "copying `{}` to `{}`",
            wrapper_exe.display(),
            dest.display()
        ))?;
        log::info!("=> wrapped {name}");
    }

    Ok(())
}
