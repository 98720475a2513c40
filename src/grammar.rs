use crate::ast::{Cmd, InputSource, OutputSink, Simple, Subshell};
use crate::parser::{Op, Token};

/// Parse a token stream into a command tree. Empty input parses to `None`.
///
/// Grammar, loosest binding first:
///
/// ```text
/// sequence := and_or ((';' | '&') sequence?)?
/// and_or   := pipeline (('&&' | '||') pipeline)*
/// pipeline := command ('|' command)*
/// command  := assignment* ('(' sequence ')' redirect* | (word | redirect)+)
/// ```
pub fn parse(tokens: Vec<Token>) -> Result<Option<Cmd>, String> {
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let cmd = parser.parse_sequence()?;

    if let Some(token) = parser.peek() {
        return Err(format!(
            "marsh: syntax error near unexpected token '{}'",
            token_display(token)
        ));
    }

    Ok(Some(cmd))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.peek() == Some(&Token::Op(op)) {
            self.pos += 1;
            return true;
        }
        false
    }

    /// True when the current position cannot start another command, i.e. the
    /// right side of a trailing `;` or `&` is absent.
    fn at_sequence_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Op(Op::RParen)))
    }

    fn parse_sequence(&mut self) -> Result<Cmd, String> {
        let left = self.parse_and_or()?;

        if self.eat_op(Op::Semi) {
            let right = if self.at_sequence_end() {
                None
            } else {
                Some(Box::new(self.parse_sequence()?))
            };
            return Ok(Cmd::Seq(Box::new(left), right));
        }

        if self.eat_op(Op::Amp) {
            let right = if self.at_sequence_end() {
                None
            } else {
                Some(Box::new(self.parse_sequence()?))
            };
            return Ok(Cmd::Background(Box::new(left), right));
        }

        Ok(left)
    }

    fn parse_and_or(&mut self) -> Result<Cmd, String> {
        let mut left = self.parse_pipeline()?;

        loop {
            if self.eat_op(Op::AndIf) {
                let right = self.parse_pipeline()?;
                left = Cmd::And(Box::new(left), Box::new(right));
            } else if self.eat_op(Op::OrIf) {
                let right = self.parse_pipeline()?;
                left = Cmd::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_pipeline(&mut self) -> Result<Cmd, String> {
        let mut left = self.parse_command()?;

        while self.eat_op(Op::Pipe) {
            let right = self.parse_command()?;
            left = Cmd::Pipe(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_command(&mut self) -> Result<Cmd, String> {
        let mut assigns: Vec<(String, String)> = Vec::new();
        let mut input: Option<InputSource> = None;
        let mut output: Option<OutputSink> = None;

        // Bindings come before the command word (or the subshell opener).
        while let Some(Token::Word(word)) = self.peek() {
            match split_assignment(word) {
                Some(pair) => {
                    assigns.push(pair);
                    self.pos += 1;
                }
                None => break,
            }
        }

        if self.eat_op(Op::LParen) {
            let body = self.parse_sequence()?;
            if !self.eat_op(Op::RParen) {
                return Err("marsh: syntax error: expected ')'".to_string());
            }
            // Redirections written after the parens apply to the whole body.
            while self.parse_redirect(&mut input, &mut output)? {}
            return Ok(Cmd::Subshell(Subshell {
                body: Box::new(body),
                assigns,
                input,
                output,
            }));
        }

        let mut argv: Vec<String> = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Word(_)) => {
                    let Some(Token::Word(word)) = self.advance() else {
                        unreachable!();
                    };
                    argv.push(word);
                }
                Some(Token::Op(op)) if is_redirect_op(*op) => {
                    self.parse_redirect(&mut input, &mut output)?;
                }
                _ => break,
            }
        }

        if argv.is_empty() && assigns.is_empty() && input.is_none() && output.is_none() {
            return match self.peek() {
                Some(token) => Err(format!(
                    "marsh: syntax error near unexpected token '{}'",
                    token_display(token)
                )),
                None => Err("marsh: syntax error: unexpected end of input".to_string()),
            };
        }

        Ok(Cmd::Simple(Simple {
            argv,
            assigns,
            input,
            output,
        }))
    }

    /// Consume one redirection if the cursor sits on one. The last
    /// redirection of each direction wins.
    fn parse_redirect(
        &mut self,
        input: &mut Option<InputSource>,
        output: &mut Option<OutputSink>,
    ) -> Result<bool, String> {
        let op = match self.peek() {
            Some(Token::Op(op)) if is_redirect_op(*op) => *op,
            _ => return Ok(false),
        };
        self.pos += 1;

        let target = match self.advance() {
            Some(Token::Word(word)) => word,
            _ => {
                return Err(format!(
                    "marsh: syntax error: expected a word after '{}'",
                    op.symbol()
                ));
            }
        };

        match op {
            Op::Less => *input = Some(InputSource::File(target)),
            Op::HereString => *input = Some(InputSource::HereDoc(target + "\n")),
            Op::Great => *output = Some(OutputSink::File(target)),
            Op::DGreat => *output = Some(OutputSink::FileAppend(target)),
            Op::GreatAnd => *output = Some(OutputSink::FileWithStderr(target)),
            _ => unreachable!(),
        }

        Ok(true)
    }
}

fn is_redirect_op(op: Op) -> bool {
    matches!(
        op,
        Op::Less | Op::HereString | Op::Great | Op::DGreat | Op::GreatAnd
    )
}

/// Split `NAME=VALUE` into a binding when NAME is a valid variable name.
fn split_assignment(word: &str) -> Option<(String, String)> {
    let (name, value) = word.split_once('=')?;

    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    Some((name.to_string(), value.to_string()))
}

fn token_display(token: &Token) -> &str {
    match token {
        Token::Word(word) => word,
        Token::Op(op) => op.symbol(),
    }
}
