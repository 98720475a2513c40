//! marsh — a minimal POSIX-style shell.
//!
//! The heart of the crate is [`executor::Executor`], a recursive interpreter
//! over the [`ast::Cmd`] command tree: it forks and execs simple commands,
//! wires pipelines, short-circuits `&&`/`||`, backgrounds and reaps children,
//! and runs `cd`/`pushd`/`popd` in-process. [`parser`] and [`grammar`] turn a
//! command line into that tree for the REPL binary.

pub mod ast;
pub mod builtins;
pub mod dirs;
pub mod executor;
pub mod grammar;
pub mod parser;
pub mod reaper;
pub mod redirect;
pub mod status;
pub mod sys;
