use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::process;

use crate::ast::{Cmd, InputSource, OutputSink, Simple, Subshell};
use crate::builtins;
use crate::dirs::DirStack;
use crate::reaper;
use crate::redirect;
use crate::status;
use crate::sys::{self, Fork};

/// The shell's command interpreter. Owns the directory stack; everything else
/// it touches (environment, `?`, child processes) is process-wide state.
/// Tests construct independent executors.
#[derive(Default)]
pub struct Executor {
    dirs: DirStack,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            dirs: DirStack::new(),
        }
    }

    /// Run one command tree and return its exit status.
    ///
    /// Every entry first collects terminated background children, and every
    /// exit records the returned status in the `?` shell variable.
    pub fn execute(&mut self, cmd: &Cmd) -> i32 {
        reaper::reap_terminated();

        let status = match cmd {
            Cmd::Simple(simple) => self.run_simple(simple),
            Cmd::Pipe(left, right) => self.run_pipe(left, right),
            Cmd::And(left, right) => {
                let left_status = self.execute(left);
                if left_status == 0 {
                    self.execute(right)
                } else {
                    left_status
                }
            }
            Cmd::Or(left, right) => {
                let left_status = self.execute(left);
                if left_status != 0 {
                    self.execute(right)
                } else {
                    0
                }
            }
            Cmd::Seq(left, right) => {
                let left_status = self.execute(left);
                match right {
                    Some(right) => self.execute(right),
                    None => left_status,
                }
            }
            Cmd::Background(left, right) => self.run_background(left, right.as_deref()),
            Cmd::Subshell(subshell) => self.run_subshell(subshell),
        };

        status::set_last(status);
        status
    }

    // ── Simple commands ──

    fn run_simple(&mut self, simple: &Simple) -> i32 {
        // Assignment-only command: the bindings apply to the shell itself.
        if simple.argv.is_empty() {
            apply_assigns(&simple.assigns);
            return 0;
        }

        if builtins::is_builtin(&simple.argv[0]) {
            // Builtins mutate the executor process directly and ignore
            // attached redirections; a subshell wrapper restores both.
            return builtins::execute(
                &simple.argv[0],
                &simple.argv[1..],
                &mut self.dirs,
                &mut io::stdout(),
                &mut io::stderr(),
            );
        }

        match sys::fork() {
            Err(e) => report_os_error("fork", &e),
            Ok(Fork::Child) => {
                install_redirections(simple.input.as_ref(), simple.output.as_ref());
                apply_assigns(&simple.assigns);

                let err = sys::exec(&simple.argv);
                eprintln!("{}: {}", simple.argv[0], err);
                process::exit(err.raw_os_error().unwrap_or(1));
            }
            Ok(Fork::Parent(pid)) => wait_foreground(pid),
        }
    }

    // ── Composition ──

    fn run_pipe(&mut self, left: &Cmd, right: &Cmd) -> i32 {
        let (reader, writer) = match os_pipe::pipe() {
            Ok(ends) => ends,
            Err(e) => return report_os_error("pipe", &e),
        };

        let left_pid = match sys::fork() {
            Err(e) => return report_os_error("fork", &e),
            Ok(Fork::Child) => {
                if let Err(e) = sys::replace_fd(writer.as_raw_fd(), libc::STDOUT_FILENO) {
                    eprintln!("dup2: {e}");
                    process::exit(e.raw_os_error().unwrap_or(1));
                }
                drop(reader);
                drop(writer);
                let code = self.execute(left);
                exit_child(code);
            }
            Ok(Fork::Parent(pid)) => pid,
        };

        let right_pid = match sys::fork() {
            Err(e) => {
                // The left child keeps running; the reaper collects it later.
                return report_os_error("fork", &e);
            }
            Ok(Fork::Child) => {
                if let Err(e) = sys::replace_fd(reader.as_raw_fd(), libc::STDIN_FILENO) {
                    eprintln!("dup2: {e}");
                    process::exit(e.raw_os_error().unwrap_or(1));
                }
                drop(reader);
                drop(writer);
                let code = self.execute(right);
                exit_child(code);
            }
            Ok(Fork::Parent(pid)) => pid,
        };

        // Both ends must close here or the right child never sees EOF.
        drop(reader);
        drop(writer);

        // The pipeline's status is the rightmost child's; the left status is
        // collected but not propagated.
        if let Err(e) = sys::wait_pid(left_pid) {
            eprintln!("waitpid: {e}");
        }
        wait_foreground(right_pid)
    }

    fn run_background(&mut self, left: &Cmd, right: Option<&Cmd>) -> i32 {
        match sys::fork() {
            Err(e) => return report_os_error("fork", &e),
            Ok(Fork::Child) => {
                let code = self.execute(left);
                exit_child(code);
            }
            Ok(Fork::Parent(pid)) => {
                eprintln!("Backgrounded: {pid}");
            }
        }

        match right {
            Some(right) => self.execute(right),
            None => 0,
        }
    }

    fn run_subshell(&mut self, subshell: &Subshell) -> i32 {
        match sys::fork() {
            Err(e) => report_os_error("fork", &e),
            Ok(Fork::Child) => {
                install_redirections(subshell.input.as_ref(), subshell.output.as_ref());
                apply_assigns(&subshell.assigns);
                let code = self.execute(&subshell.body);
                exit_child(code);
            }
            Ok(Fork::Parent(pid)) => wait_foreground(pid),
        }
    }
}

/// Install both redirections in a freshly forked child, exiting with the
/// errno on failure. Only called between fork and exec (or the subshell
/// body).
fn install_redirections(input: Option<&InputSource>, output: Option<&OutputSink>) {
    if let Some(source) = input {
        if let Err(e) = redirect::install_input(source) {
            eprintln!("{e}");
            process::exit(e.status());
        }
    }

    if let Some(sink) = output {
        if let Err(e) = redirect::install_output(sink) {
            eprintln!("{e}");
            process::exit(e.status());
        }
    }
}

fn apply_assigns(assigns: &[(String, String)]) {
    for (name, value) in assigns {
        // SAFETY: in the parent this runs on the executor's only mutating
        // thread; in a child there is exactly one thread after fork.
        unsafe { std::env::set_var(name, value) };
    }
}

/// Blocking wait for a foreground child, translated to shell status.
fn wait_foreground(pid: libc::pid_t) -> i32 {
    match sys::wait_pid(pid) {
        Ok(raw_status) => status::from_wait(raw_status),
        Err(e) => {
            eprintln!("waitpid: {e}");
            e.raw_os_error().unwrap_or(1)
        }
    }
}

fn report_os_error(op: &str, e: &io::Error) -> i32 {
    eprintln!("{op}: {e}");
    e.raw_os_error().unwrap_or(1)
}

/// Leave a forked child that ran tree code in-process. Stdout is flushed in
/// case a builtin buffered output, since `process::exit` runs no destructors.
fn exit_child(code: i32) -> ! {
    let _ = io::stdout().flush();
    process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn simple_with(
        argv: &[&str],
        assigns: &[(&str, &str)],
        input: Option<InputSource>,
        output: Option<OutputSink>,
    ) -> Cmd {
        Cmd::Simple(Simple {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            assigns: assigns
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            input,
            output,
        })
    }

    #[test]
    #[serial]
    fn simple_exit_statuses() {
        let mut exec = Executor::new();
        assert_eq!(exec.execute(&Cmd::simple(["true"])), 0);
        assert_eq!(exec.execute(&Cmd::simple(["false"])), 1);
    }

    #[test]
    #[serial]
    fn missing_program_reports_exec_failure() {
        let mut exec = Executor::new();
        let status = exec.execute(&Cmd::simple(["definitely-not-a-command-xyz"]));
        assert_eq!(status, libc::ENOENT);
    }

    #[test]
    #[serial]
    fn status_variable_tracks_last_command() {
        let mut exec = Executor::new();
        exec.execute(&Cmd::simple(["false"]));
        assert_eq!(std::env::var("?").unwrap(), "1");
        exec.execute(&Cmd::simple(["true"]));
        assert_eq!(std::env::var("?").unwrap(), "0");
    }

    #[test]
    #[serial]
    fn and_short_circuits_on_failure() {
        let mut exec = Executor::new();
        let cmd = Cmd::And(
            Box::new(Cmd::simple(["false"])),
            Box::new(Cmd::simple(["true"])),
        );
        assert_eq!(exec.execute(&cmd), 1);

        let cmd = Cmd::And(
            Box::new(Cmd::simple(["true"])),
            Box::new(Cmd::simple(["false"])),
        );
        assert_eq!(exec.execute(&cmd), 1);
    }

    #[test]
    #[serial]
    fn or_falls_back_on_failure() {
        let mut exec = Executor::new();
        let cmd = Cmd::Or(
            Box::new(Cmd::simple(["false"])),
            Box::new(Cmd::simple(["true"])),
        );
        assert_eq!(exec.execute(&cmd), 0);

        let cmd = Cmd::Or(
            Box::new(Cmd::simple(["true"])),
            Box::new(Cmd::simple(["false"])),
        );
        assert_eq!(exec.execute(&cmd), 0);
    }

    #[test]
    #[serial]
    fn seq_returns_right_status() {
        let mut exec = Executor::new();
        let cmd = Cmd::Seq(
            Box::new(Cmd::simple(["false"])),
            Some(Box::new(Cmd::simple(["true"]))),
        );
        assert_eq!(exec.execute(&cmd), 0);

        let cmd = Cmd::Seq(Box::new(Cmd::simple(["false"])), None);
        assert_eq!(exec.execute(&cmd), 1);
    }

    #[test]
    #[serial]
    fn pipe_status_is_rightmost() {
        let mut exec = Executor::new();
        let cmd = Cmd::Pipe(
            Box::new(Cmd::simple(["false"])),
            Box::new(Cmd::simple(["true"])),
        );
        assert_eq!(exec.execute(&cmd), 0);

        let cmd = Cmd::Pipe(
            Box::new(Cmd::simple(["true"])),
            Box::new(Cmd::simple(["false"])),
        );
        assert_eq!(exec.execute(&cmd), 1);
    }

    #[test]
    #[serial]
    fn background_returns_zero_without_waiting() {
        let mut exec = Executor::new();
        let cmd = Cmd::Background(Box::new(Cmd::simple(["true"])), None);
        assert_eq!(exec.execute(&cmd), 0);
        // Follow-up commands give the reaper a chance to collect the child.
        exec.execute(&Cmd::simple(["sleep", "1"]));
        exec.execute(&Cmd::simple(["true"]));
    }

    #[test]
    #[serial]
    fn background_continues_with_foreground_right_side() {
        let mut exec = Executor::new();
        let cmd = Cmd::Background(
            Box::new(Cmd::simple(["true"])),
            Some(Box::new(Cmd::simple(["false"]))),
        );
        assert_eq!(exec.execute(&cmd), 1);
        exec.execute(&Cmd::simple(["sleep", "1"]));
        exec.execute(&Cmd::simple(["true"]));
    }

    #[test]
    #[serial]
    fn local_bindings_stay_out_of_the_parent_environment() {
        let mut exec = Executor::new();
        let cmd = simple_with(&["true"], &[("MARSH_TEST_LOCAL", "leaky")], None, None);
        exec.execute(&cmd);
        assert!(std::env::var("MARSH_TEST_LOCAL").is_err());
    }

    #[test]
    #[serial]
    fn local_bindings_reach_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env.txt");
        let cmd = simple_with(
            &["printenv", "MARSH_CHILD_ONLY"],
            &[("MARSH_CHILD_ONLY", "visible")],
            None,
            Some(OutputSink::File(out.display().to_string())),
        );

        let mut exec = Executor::new();
        assert_eq!(exec.execute(&cmd), 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "visible\n");
        assert!(std::env::var("MARSH_CHILD_ONLY").is_err());
    }

    #[test]
    #[serial]
    fn assignment_only_command_binds_in_the_shell() {
        let mut exec = Executor::new();
        let cmd = simple_with(&[], &[("MARSH_SHELL_VAR", "set")], None, None);
        assert_eq!(exec.execute(&cmd), 0);
        assert_eq!(std::env::var("MARSH_SHELL_VAR").unwrap(), "set");
        // SAFETY: serialized test; no other thread touches the environment.
        unsafe { std::env::remove_var("MARSH_SHELL_VAR") };
    }

    #[test]
    #[serial]
    fn output_redirect_truncates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("t.txt");
        let path = out.display().to_string();
        let mut exec = Executor::new();

        let cmd = simple_with(&["echo", "x"], &[], None, Some(OutputSink::File(path.clone())));
        assert_eq!(exec.execute(&cmd), 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "x\n");

        let cmd = simple_with(
            &["echo", "y"],
            &[],
            None,
            Some(OutputSink::FileAppend(path.clone())),
        );
        assert_eq!(exec.execute(&cmd), 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "x\ny\n");

        // Truncate form starts over.
        let cmd = simple_with(&["echo", "z"], &[], None, Some(OutputSink::File(path)));
        assert_eq!(exec.execute(&cmd), 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "z\n");
    }

    #[test]
    #[serial]
    fn combined_sink_captures_stderr_too() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("both.txt");
        let cmd = simple_with(
            &["sh", "-c", "echo out; echo err 1>&2"],
            &[],
            None,
            Some(OutputSink::FileWithStderr(out.display().to_string())),
        );

        let mut exec = Executor::new();
        assert_eq!(exec.execute(&cmd), 0);
        let contents = std::fs::read_to_string(&out).unwrap();
        assert!(contents.contains("out"));
        assert!(contents.contains("err"));
    }

    #[test]
    #[serial]
    fn here_document_feeds_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("heredoc.txt");
        let cmd = simple_with(
            &["cat"],
            &[],
            Some(InputSource::HereDoc("hello\n".to_string())),
            Some(OutputSink::File(out.display().to_string())),
        );

        let mut exec = Executor::new();
        assert_eq!(exec.execute(&cmd), 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello\n");
    }

    #[test]
    #[serial]
    fn missing_input_file_fails_with_enoent() {
        let mut exec = Executor::new();
        let cmd = simple_with(
            &["cat"],
            &[],
            Some(InputSource::File("/definitely/not/here.txt".to_string())),
            None,
        );
        assert_eq!(exec.execute(&cmd), libc::ENOENT);
    }

    #[test]
    #[serial]
    fn pipe_moves_data_between_children() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("piped.txt");
        let right = Cmd::Simple(Simple {
            argv: vec!["cat".to_string()],
            assigns: Vec::new(),
            input: None,
            output: Some(OutputSink::File(out.display().to_string())),
        });
        let cmd = Cmd::Pipe(Box::new(Cmd::simple(["echo", "hi"])), Box::new(right));

        let mut exec = Executor::new();
        assert_eq!(exec.execute(&cmd), 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hi\n");
    }

    #[test]
    #[serial]
    fn subshell_cd_does_not_move_the_parent() {
        let before = std::env::current_dir().unwrap();
        let body = Cmd::simple(["cd", "/"]);
        let cmd = Cmd::Subshell(Subshell {
            body: Box::new(body),
            assigns: Vec::new(),
            input: None,
            output: None,
        });

        let mut exec = Executor::new();
        assert_eq!(exec.execute(&cmd), 0);
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    #[serial]
    fn subshell_bindings_stay_in_the_subshell() {
        let cmd = Cmd::Subshell(Subshell {
            body: Box::new(Cmd::simple(["true"])),
            assigns: vec![("MARSH_SUB_ONLY".to_string(), "inner".to_string())],
            input: None,
            output: None,
        });

        let mut exec = Executor::new();
        assert_eq!(exec.execute(&cmd), 0);
        assert!(std::env::var("MARSH_SUB_ONLY").is_err());
    }

    #[test]
    #[serial]
    fn subshell_redirection_applies_to_whole_body() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("sub.txt");
        let body = Cmd::Seq(
            Box::new(Cmd::simple(["echo", "one"])),
            Some(Box::new(Cmd::simple(["echo", "two"]))),
        );
        let cmd = Cmd::Subshell(Subshell {
            body: Box::new(body),
            assigns: Vec::new(),
            input: None,
            output: Some(OutputSink::File(out.display().to_string())),
        });

        let mut exec = Executor::new();
        assert_eq!(exec.execute(&cmd), 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "one\ntwo\n");
    }

    #[test]
    #[serial]
    fn signal_death_maps_to_128_plus_signal() {
        let mut exec = Executor::new();
        let cmd = Cmd::simple(["sh", "-c", "kill -TERM $$"]);
        assert_eq!(exec.execute(&cmd), 128 + libc::SIGTERM);
    }

    #[test]
    #[serial]
    fn builtin_cd_changes_the_executor_cwd() {
        let before = std::env::current_dir().unwrap();
        let mut exec = Executor::new();
        assert_eq!(exec.execute(&Cmd::simple(["cd", "/"])), 0);
        assert_eq!(std::env::current_dir().unwrap(), std::path::Path::new("/"));
        std::env::set_current_dir(before).unwrap();
    }
}
