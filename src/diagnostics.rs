//! The shared diagnostics log.
//!
//! Every wrapper process that captured stderr appends one entry. Many wrappers run in parallel
//! during a build, so each append happens under an exclusive advisory lock on the log file.
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    time::Duration,
};

use anyhow::{Context, Result};
use fs2::FileExt;
use nix::errno::Errno;

pub const ENTRY_HEADER: &str = "==================COMMAND:====================\n";
pub const ENTRY_FOOTER: &str = "==============================================\n";

/// How long to wait before trying to take the log lock again.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// The executed command line, space-joined.
    pub command: String,
    /// Raw stderr of the compiler.
    pub stderr: Vec<u8>,
}

impl LogEntry {
    pub fn new(command: impl Into<String>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Render the entry as one block, including the blank separator line.
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            ENTRY_HEADER.len() + self.command.len() + self.stderr.len() + ENTRY_FOOTER.len() + 3,
        );
        out.extend_from_slice(ENTRY_HEADER.as_bytes());
        out.extend_from_slice(self.command.as_bytes());
        out.extend_from_slice(b"\n\n");
        out.extend_from_slice(&self.stderr);
        out.extend_from_slice(ENTRY_FOOTER.as_bytes());
        out.push(b'\n');
        out
    }

    /// First non-empty line of stderr, if any.
    pub fn first_diagnostic(&self) -> Option<String> {
        String::from_utf8_lossy(&self.stderr)
            .lines()
            .find(|line| !line.trim().is_empty())
            .map(str::to_owned)
    }
}

/// Holds the exclusive lock on the log file; unlocks on drop.
struct LockGuard<'a>(&'a File);

impl<'a> LockGuard<'a> {
    /// Take the lock, polling every `poll` while another writer holds it.
    fn acquire(file: &'a File, poll: Duration) -> io::Result<Self> {
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self(file)),
                Err(e) if is_contended(&e) => {
                    log::trace!("log file is locked, retrying in {poll:?}");
                    std::thread::sleep(poll);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.0);
    }
}

/// `EAGAIN`/`EWOULDBLOCK` and `EACCES` mean another process holds the lock.
fn is_contended(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error().map(Errno::from_raw),
        Some(Errno::EAGAIN | Errno::EACCES)
    )
}

/// Append `entry` to the log at `path` as a single locked write.
pub fn append_entry(path: impl AsRef<Path>, entry: &LogEntry, poll: Duration) -> Result<()> {
    let path = path.as_ref();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)
        .context(format!("opening log `{}`", path.display()))?;

    let _guard = LockGuard::acquire(&file, poll)
        .context(format!("locking log `{}`", path.display()))?;

    let mut out = &file;
    out.write_all(&entry.render())
        .context(format!("writing to log `{}`", path.display()))?;
    out.flush()?;

    Ok(())
}

/// Split the contents of a log back into entries. Incomplete trailing entries are ignored.
pub fn parse_log(contents: &[u8]) -> Vec<LogEntry> {
    let text = String::from_utf8_lossy(contents);
    let mut entries = Vec::new();
    let mut rest: &str = &text;

    while let Some(start) = rest.find(ENTRY_HEADER) {
        let body = &rest[start + ENTRY_HEADER.len()..];
        let Some((command, after_command)) = body.split_once("\n\n") else {
            break;
        };
        // the footer line is followed by the blank separator line
        let Some(footer_at) = after_command.find(&format!("{ENTRY_FOOTER}\n")) else {
            break;
        };

        entries.push(LogEntry::new(command, &after_command.as_bytes()[..footer_at]));
        rest = &after_command[footer_at + ENTRY_FOOTER.len() + 1..];
    }

    entries
}

/// Read and parse the log at `path`.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<LogEntry>> {
    let contents = std::fs::read(path.as_ref())
        .context(format!("reading log `{}`", path.as_ref().display()))?;
    Ok(parse_log(&contents))
}
