use crate::status;
use crate::sys;

/// Collect every terminated child not yet waited for, reporting each as
/// `Completed: <pid> (<status>)` on stderr. Never blocks; called on entry to
/// every `execute` so backgrounded children cannot linger as zombies.
pub fn reap_terminated() {
    loop {
        match sys::try_wait_any() {
            Ok(Some((pid, raw_status))) => {
                eprintln!("Completed: {} ({})", pid, status::from_wait(raw_status));
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("waitpid: {e}");
                break;
            }
        }
    }
}
