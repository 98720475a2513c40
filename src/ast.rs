/// Where a command's stdin comes from when redirected.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// `< path` — open the file read-only.
    File(String),
    /// `<<< text` — the carried string is the literal document body.
    HereDoc(String),
}

/// Where a command's stdout (and possibly stderr) goes when redirected.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSink {
    /// `> path` — create/truncate.
    File(String),
    /// `>> path` — create/append.
    FileAppend(String),
    /// `>& path` — create/truncate, attached to both stdout and stderr.
    FileWithStderr(String),
}

/// A leaf command: an argv, variable bindings applied only in the child, and
/// optional redirections. An empty argv with bindings is an assignment-only
/// command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Simple {
    pub argv: Vec<String>,
    pub assigns: Vec<(String, String)>,
    pub input: Option<InputSource>,
    pub output: Option<OutputSink>,
}

/// A parenthesized body executed in a forked child. Bindings and
/// redirections attached here apply to the whole subshell.
#[derive(Debug, Clone, PartialEq)]
pub struct Subshell {
    pub body: Box<Cmd>,
    pub assigns: Vec<(String, String)>,
    pub input: Option<InputSource>,
    pub output: Option<OutputSink>,
}

/// The command tree consumed by the executor. One variant per command shape;
/// redirections and bindings live only on `Simple` and `Subshell`, so a
/// redirected bare composite cannot be represented.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    Simple(Simple),
    /// Left's stdout feeds right's stdin.
    Pipe(Box<Cmd>, Box<Cmd>),
    /// Run right only if left succeeded.
    And(Box<Cmd>, Box<Cmd>),
    /// Run right only if left failed.
    Or(Box<Cmd>, Box<Cmd>),
    /// Run left, then right unconditionally. `a ;` leaves the right side absent.
    Seq(Box<Cmd>, Option<Box<Cmd>>),
    /// Run left detached; if present, continue with right in the foreground.
    Background(Box<Cmd>, Option<Box<Cmd>>),
    Subshell(Subshell),
}

impl Cmd {
    /// Convenience constructor for a plain argv command, used heavily in tests.
    pub fn simple<S: Into<String>>(argv: impl IntoIterator<Item = S>) -> Self {
        Cmd::Simple(Simple {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Simple::default()
        })
    }
}
