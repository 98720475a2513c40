use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;

/// Which side of a `fork` the caller landed on.
pub enum Fork {
    /// The new process. Callers must finish with `exec` or `process::exit`.
    Child,
    /// The original process, holding the child's pid.
    Parent(libc::pid_t),
}

pub fn fork() -> io::Result<Fork> {
    // SAFETY: the child runs only async-signal-safe-adjacent work — fd
    // installation, environment writes, exec — before exiting. No locks are
    // held across the fork on the executor's single thread.
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent(pid)),
    }
}

/// Blocking wait for a specific child. Returns the raw wait status.
pub fn wait_pid(pid: libc::pid_t) -> io::Result<libc::c_int> {
    let mut raw_status: libc::c_int = 0;

    loop {
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        if rc >= 0 {
            return Ok(raw_status);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Non-blocking poll for any terminated child.
///
/// Returns `Ok(Some((pid, raw_status)))` for a reaped child, `Ok(None)` when
/// no child has terminated (or none exist at all).
pub fn try_wait_any() -> io::Result<Option<(libc::pid_t, libc::c_int)>> {
    let mut raw_status: libc::c_int = 0;

    loop {
        let rc = unsafe { libc::waitpid(-1, &mut raw_status, libc::WNOHANG) };
        if rc > 0 {
            return Ok(Some((rc, raw_status)));
        }
        if rc == 0 {
            return Ok(None);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            Some(code) if code == libc::ECHILD => return Ok(None),
            _ => return Err(err),
        }
    }
}

/// Duplicate `src` onto `target` (one of fds 0/1/2). The source fd stays
/// open; callers drop its owner afterwards.
pub fn replace_fd(src: RawFd, target: RawFd) -> io::Result<()> {
    if src == target {
        return Ok(());
    }

    loop {
        let rc = unsafe { libc::dup2(src, target) };
        if rc >= 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Replace the process image via `execvp`, resolving `argv[0]` on PATH.
/// Only returns on failure.
pub fn exec(argv: &[String]) -> io::Error {
    if argv.is_empty() {
        return io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector");
    }

    let args: Vec<CString> = match argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<_, _>>()
    {
        Ok(args) => args,
        Err(_) => {
            return io::Error::new(io::ErrorKind::InvalidInput, "argument contains NUL byte");
        }
    };

    let mut arg_ptrs: Vec<*const libc::c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    arg_ptrs.push(std::ptr::null());

    // SAFETY: arg_ptrs is a NULL-terminated array of pointers into CStrings
    // that outlive the call. execvp only returns on error.
    unsafe {
        libc::execvp(arg_ptrs[0], arg_ptrs.as_ptr());
    }
    io::Error::last_os_error()
}

pub fn stdin_is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}
