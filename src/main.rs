use std::io::{self, Write};

use marsh::executor::Executor;
use marsh::{grammar, parser, sys};

fn main() {
    ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    })
    .expect("Failed to set Ctrl-C handler");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let interactive = sys::stdin_is_tty();
    let mut executor = Executor::new();
    let mut last_exit_code: i32 = 0;

    loop {
        if interactive {
            print!("marsh> ");
            if stdout.flush().is_err() {
                break;
            }
        }

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = input.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let tokens = match parser::tokenize(trimmed) {
                    Ok(tokens) => tokens,
                    Err(msg) => {
                        eprintln!("{msg}");
                        last_exit_code = 2;
                        continue;
                    }
                };

                let tree = match grammar::parse(tokens) {
                    Ok(Some(tree)) => tree,
                    Ok(None) => continue,
                    Err(msg) => {
                        eprintln!("{msg}");
                        last_exit_code = 2;
                        continue;
                    }
                };

                last_exit_code = executor.execute(&tree);
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                continue;
            }
            Err(error) => {
                eprintln!("Error reading input: {error}");
                break;
            }
        }
    }

    std::process::exit(last_exit_code);
}
