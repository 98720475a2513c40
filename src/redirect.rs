use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;

use crate::ast::{InputSource, OutputSink};
use crate::sys;

/// Mode bits for files created by output redirection.
const CREATE_MODE: u32 = 0o644;

/// A failed redirection, tagged with the syscall-level operation that failed
/// so the child can report `<op>: <error>` and exit with the errno.
#[derive(Debug)]
pub struct RedirectError {
    op: &'static str,
    err: io::Error,
}

impl RedirectError {
    fn new(op: &'static str, err: io::Error) -> Self {
        Self { op, err }
    }

    /// The exit status a child should carry for this failure.
    pub fn status(&self) -> i32 {
        self.err.raw_os_error().unwrap_or(1)
    }
}

impl fmt::Display for RedirectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op, self.err)
    }
}

/// Attach the input source to fd 0. Runs in the child, between fork and exec.
pub fn install_input(source: &InputSource) -> Result<(), RedirectError> {
    match source {
        InputSource::File(path) => {
            let file = File::open(path).map_err(|e| RedirectError::new("open", e))?;
            sys::replace_fd(file.as_raw_fd(), libc::STDIN_FILENO)
                .map_err(|e| RedirectError::new("dup2", e))
            // file drops here, closing the original descriptor.
        }
        InputSource::HereDoc(body) => {
            // An anonymous (already unlinked) temp file sidesteps the pipe
            // capacity limit for large documents; the kernel reclaims it as
            // soon as the last descriptor closes.
            let mut file = tempfile::tempfile().map_err(|e| RedirectError::new("open", e))?;
            file.write_all(body.as_bytes())
                .map_err(|e| RedirectError::new("write", e))?;
            file.seek(SeekFrom::Start(0))
                .map_err(|e| RedirectError::new("lseek", e))?;
            sys::replace_fd(file.as_raw_fd(), libc::STDIN_FILENO)
                .map_err(|e| RedirectError::new("dup2", e))
        }
    }
}

/// Attach the output sink to fd 1 (and fd 2 for the stdout+stderr form).
/// Runs in the child, between fork and exec.
pub fn install_output(sink: &OutputSink) -> Result<(), RedirectError> {
    let (path, append, include_stderr) = match sink {
        OutputSink::File(path) => (path, false, false),
        OutputSink::FileAppend(path) => (path, true, false),
        OutputSink::FileWithStderr(path) => (path, false, true),
    };

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(!append)
        .append(append)
        .mode(CREATE_MODE)
        .open(path)
        .map_err(|e| RedirectError::new("open", e))?;

    sys::replace_fd(file.as_raw_fd(), libc::STDOUT_FILENO)
        .map_err(|e| RedirectError::new("dup2", e))?;

    if include_stderr {
        // Both fds share the one open file description, as with dup2 in sh.
        sys::replace_fd(file.as_raw_fd(), libc::STDERR_FILENO)
            .map_err(|e| RedirectError::new("dup2", e))?;
    }

    Ok(())
}
