/// Name of the shell variable holding the last exit status.
const LAST_STATUS_VAR: &str = "?";

/// Convert a raw `waitpid` status into shell exit-code semantics.
///
/// Normal exit maps to the exit code; termination by signal maps to
/// `128 + signal`; anything else maps to 1.
pub fn from_wait(raw_status: libc::c_int) -> i32 {
    if libc::WIFEXITED(raw_status) {
        return libc::WEXITSTATUS(raw_status);
    }

    if libc::WIFSIGNALED(raw_status) {
        return 128 + libc::WTERMSIG(raw_status);
    }

    1
}

/// Record `status` as the decimal value of the `?` shell variable.
pub fn set_last(status: i32) {
    // SAFETY: env vars are only mutated on the executor thread. The ctrlc
    // handler thread does not read or write the environment.
    unsafe { std::env::set_var(LAST_STATUS_VAR, status.to_string()) };
}

/// The current value of `?`, defaulting to 0 when unset or malformed.
pub fn last() -> i32 {
    std::env::var(LAST_STATUS_VAR)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}
