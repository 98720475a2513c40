use std::io::{self, Write};

use crate::dirs::DirStack;

/// The list of all builtin command names.
const BUILTINS: &[&str] = &["cd", "pushd", "popd", "exit"];

/// Returns true if the command name is a shell builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Execute a builtin command, writing output to the provided streams.
/// Builtins run in the executor process — `cd`/`pushd`/`popd` mutate its
/// working directory and `dirs` stack directly. Returns the exit code.
pub fn execute(
    program: &str,
    args: &[String],
    dirs: &mut DirStack,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match program {
        "cd" => builtin_cd(args, stderr),
        "pushd" => builtin_pushd(args, dirs, stdout, stderr),
        "popd" => builtin_popd(args, dirs, stdout, stderr),
        "exit" => builtin_exit(args, stderr),
        _ => {
            let _ = writeln!(stderr, "marsh: unknown builtin: {program}");
            1
        }
    }
}

fn builtin_cd(args: &[String], stderr: &mut dyn Write) -> i32 {
    let target = match args {
        [] => match std::env::var("HOME") {
            Ok(home) => home,
            Err(_) => {
                let _ = writeln!(stderr, "cd: HOME not set");
                return 1;
            }
        },
        [dir] => dir.clone(),
        _ => {
            let _ = writeln!(stderr, "cd: too many arguments");
            return 1;
        }
    };

    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(stderr, "cd: {target}: {e}");
        return errno_status(&e);
    }

    0
}

fn builtin_pushd(
    args: &[String],
    dirs: &mut DirStack,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let [target] = args else {
        let _ = writeln!(stderr, "pushd: wrong number of arguments");
        return 1;
    };

    let previous = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            let _ = writeln!(stderr, "pushd: {e}");
            return errno_status(&e);
        }
    };

    // Change first; a failed chdir must leave the stack untouched.
    if let Err(e) = std::env::set_current_dir(target) {
        let _ = writeln!(stderr, "pushd: {target}: {e}");
        return errno_status(&e);
    }

    dirs.push(previous);
    print_dir_stack(dirs, stdout, stderr)
}

fn builtin_popd(
    args: &[String],
    dirs: &mut DirStack,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    if !args.is_empty() {
        let _ = writeln!(stderr, "popd: wrong number of arguments");
        return 1;
    }

    let Some(target) = dirs.pop() else {
        let _ = writeln!(stderr, "popd: directory stack empty");
        return 1;
    };

    // The popped entry is gone either way; a failed chdir does not restore it.
    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(stderr, "popd: {}: {e}", target.display());
        return errno_status(&e);
    }

    print_dir_stack(dirs, stdout, stderr)
}

fn builtin_exit(args: &[String], stderr: &mut dyn Write) -> i32 {
    match args.first() {
        None => std::process::exit(crate::status::last()),
        Some(s) => match s.parse::<i32>() {
            Ok(code) => std::process::exit(code),
            Err(_) => {
                let _ = writeln!(stderr, "exit: {s}: numeric argument required");
                std::process::exit(2);
            }
        },
    }
}

/// One line: the current directory followed by each stack entry from the most
/// recent push down, space-separated.
fn print_dir_stack(dirs: &DirStack, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            let _ = writeln!(stderr, "getcwd: {e}");
            return errno_status(&e);
        }
    };

    let mut line = cwd.display().to_string();
    for entry in dirs.iter_top_down() {
        line.push(' ');
        line.push_str(&entry.display().to_string());
    }
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.flush();

    0
}

fn errno_status(e: &io::Error) -> i32 {
    e.raw_os_error().unwrap_or(1)
}
