//! Command-line parser
//!
//! Turns one line of input into a [`CommandLine`]. The grammar is small on
//! purpose: words with quoting, pipes (`|`, `|&`), job separators (`;`, `&`)
//! and the four redirections `<`, `>`, `>>`, `>&`.

use super::command::{Command, CommandLine, OutputRedirect, Pipeline};
use std::fmt;
use std::iter::Peekable;
use std::path::PathBuf;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Pipe,
    PipeBoth,
    Background,
    Separator,
    Input,
    Output,
    Append,
    OutputBoth,
}

impl Token {
    fn describe(&self) -> &'static str {
        match self {
            Token::Word(_) => "word",
            Token::Pipe => "|",
            Token::PipeBoth => "|&",
            Token::Background => "&",
            Token::Separator => ";",
            Token::Input => "<",
            Token::Output => ">",
            Token::Append => ">>",
            Token::OutputBoth => ">&",
        }
    }
}

/// Errors produced while parsing a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnterminatedQuote(char),
    MissingRedirectTarget(&'static str),
    UnexpectedToken(&'static str),
    EmptyCommand,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnterminatedQuote(q) => write!(f, "unterminated quote ({q})"),
            ParseError::MissingRedirectTarget(op) => {
                write!(f, "missing file name after `{op}'")
            }
            ParseError::UnexpectedToken(tok) => write!(f, "unexpected token `{tok}'"),
            ParseError::EmptyCommand => write!(f, "empty command in pipeline"),
        }
    }
}

impl std::error::Error for ParseError {}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    tokens: Vec<Token>,
    word: String,
    in_word: bool,
}

impl<'a> Lexer<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            chars: line.chars().peekable(),
            tokens: Vec::new(),
            word: String::new(),
            in_word: false,
        }
    }

    fn finish_word(&mut self) {
        if self.in_word {
            self.tokens.push(Token::Word(std::mem::take(&mut self.word)));
            self.in_word = false;
        }
    }

    fn operator(&mut self, token: Token) {
        self.finish_word();
        self.tokens.push(token);
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while let Some(c) = self.chars.next() {
            match c {
                c if c.is_whitespace() => self.finish_word(),
                '#' if !self.in_word => break,
                '|' => {
                    if self.chars.next_if_eq(&'&').is_some() {
                        self.operator(Token::PipeBoth);
                    } else {
                        self.operator(Token::Pipe);
                    }
                }
                '&' => self.operator(Token::Background),
                ';' => self.operator(Token::Separator),
                '<' => self.operator(Token::Input),
                '>' => {
                    if self.chars.next_if_eq(&'>').is_some() {
                        self.operator(Token::Append);
                    } else if self.chars.next_if_eq(&'&').is_some() {
                        self.operator(Token::OutputBoth);
                    } else {
                        self.operator(Token::Output);
                    }
                }
                '\'' => {
                    self.in_word = true;
                    loop {
                        match self.chars.next() {
                            Some('\'') => break,
                            Some(ch) => self.word.push(ch),
                            None => return Err(ParseError::UnterminatedQuote('\'')),
                        }
                    }
                }
                '"' => {
                    self.in_word = true;
                    loop {
                        match self.chars.next() {
                            Some('"') => break,
                            Some('\\') => match self.chars.next_if(|&n| n == '"' || n == '\\') {
                                Some(escaped) => self.word.push(escaped),
                                None => self.word.push('\\'),
                            },
                            Some(ch) => self.word.push(ch),
                            None => return Err(ParseError::UnterminatedQuote('"')),
                        }
                    }
                }
                '\\' => {
                    self.in_word = true;
                    // A trailing backslash stands for itself.
                    self.word.push(self.chars.next().unwrap_or('\\'));
                }
                other => {
                    self.in_word = true;
                    self.word.push(other);
                }
            }
        }
        self.finish_word();
        Ok(self.tokens)
    }
}

#[derive(Default)]
struct PipelineBuilder {
    commands: Vec<Command>,
    argv: Vec<String>,
    stderr_to_stdout: bool,
    input: Option<PathBuf>,
    output: Option<OutputRedirect>,
}

impl PipelineBuilder {
    fn is_empty(&self) -> bool {
        self.commands.is_empty()
            && self.argv.is_empty()
            && self.input.is_none()
            && self.output.is_none()
    }

    fn end_command(&mut self) -> Result<(), ParseError> {
        if self.argv.is_empty() {
            return Err(ParseError::EmptyCommand);
        }
        self.commands.push(Command {
            argv: std::mem::take(&mut self.argv),
            stderr_to_stdout: std::mem::take(&mut self.stderr_to_stdout),
        });
        Ok(())
    }

    fn finish(mut self, background: bool) -> Result<Pipeline, ParseError> {
        self.end_command()?;
        Ok(Pipeline {
            commands: self.commands,
            input: self.input,
            output: self.output,
            background,
        })
    }
}

/// Parse one line of input.
///
/// An empty or comment-only line yields an empty [`CommandLine`].
pub fn parse_command_line(line: &str) -> Result<CommandLine, ParseError> {
    let tokens = Lexer::new(line).run()?;
    let mut pipelines = Vec::new();
    let mut current = PipelineBuilder::default();
    let mut tokens = tokens.into_iter();

    while let Some(token) = tokens.next() {
        match token {
            Token::Word(word) => current.argv.push(word),
            Token::Pipe | Token::PipeBoth => {
                current.stderr_to_stdout |= token == Token::PipeBoth;
                current.end_command()?;
            }
            Token::Input | Token::Output | Token::Append | Token::OutputBoth => {
                let target = match tokens.next() {
                    Some(Token::Word(word)) => PathBuf::from(word),
                    _ => return Err(ParseError::MissingRedirectTarget(token.describe())),
                };
                match token {
                    Token::Input => current.input = Some(target),
                    Token::Append => current.output = Some(OutputRedirect::Append(target)),
                    Token::OutputBoth => {
                        current.stderr_to_stdout = true;
                        current.output = Some(OutputRedirect::Truncate(target));
                    }
                    _ => current.output = Some(OutputRedirect::Truncate(target)),
                }
            }
            Token::Background | Token::Separator => {
                if current.is_empty() {
                    return Err(ParseError::UnexpectedToken(token.describe()));
                }
                let builder = std::mem::take(&mut current);
                pipelines.push(builder.finish(token == Token::Background)?);
            }
        }
    }

    if !current.is_empty() {
        pipelines.push(current.finish(false)?);
    }

    Ok(CommandLine { pipelines })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(pipeline: &Pipeline) -> Vec<Vec<&str>> {
        pipeline
            .commands
            .iter()
            .map(|c| c.argv.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_simple_command() {
        let line = parse_command_line("stty eof ^E").unwrap();
        assert_eq!(line.pipelines.len(), 1);
        assert_eq!(words(&line.pipelines[0]), vec![vec!["stty", "eof", "^E"]]);
        assert!(!line.pipelines[0].background);
    }

    #[test]
    fn test_empty_and_comment_lines() {
        assert!(parse_command_line("").unwrap().is_empty());
        assert!(parse_command_line("   \t ").unwrap().is_empty());
        assert!(parse_command_line("# just a note").unwrap().is_empty());
    }

    #[test]
    fn test_hash_inside_word_is_literal() {
        let line = parse_command_line("echo a#b # trailing").unwrap();
        assert_eq!(words(&line.pipelines[0]), vec![vec!["echo", "a#b"]]);
    }

    #[test]
    fn test_quoting() {
        let line = parse_command_line(r#"echo 'a  b' "c \"d\" \n" e\ f ""x"#).unwrap();
        assert_eq!(
            words(&line.pipelines[0]),
            vec![vec!["echo", "a  b", "c \"d\" \\n", "e f", "x"]]
        );
    }

    #[test]
    fn test_empty_quoted_word_is_kept() {
        let line = parse_command_line("printf '%s|' ''").unwrap();
        assert_eq!(words(&line.pipelines[0]), vec![vec!["printf", "%s|", ""]]);
    }

    #[test]
    fn test_unterminated_quotes() {
        assert_eq!(
            parse_command_line("echo 'abc"),
            Err(ParseError::UnterminatedQuote('\''))
        );
        assert_eq!(
            parse_command_line("echo \"abc"),
            Err(ParseError::UnterminatedQuote('"'))
        );
    }

    #[test]
    fn test_pipeline_with_stderr_pipe() {
        let line = parse_command_line("make |& grep err | wc -l").unwrap();
        let pipeline = &line.pipelines[0];
        assert_eq!(
            words(pipeline),
            vec![vec!["make"], vec!["grep", "err"], vec!["wc", "-l"]]
        );
        assert!(pipeline.commands[0].stderr_to_stdout);
        assert!(!pipeline.commands[1].stderr_to_stdout);
    }

    #[test]
    fn test_redirections() {
        let line = parse_command_line("sort < in.txt > out.txt").unwrap();
        let pipeline = &line.pipelines[0];
        assert_eq!(pipeline.input, Some(PathBuf::from("in.txt")));
        assert_eq!(
            pipeline.output,
            Some(OutputRedirect::Truncate(PathBuf::from("out.txt")))
        );

        let line = parse_command_line("echo hi >>log").unwrap();
        assert_eq!(
            line.pipelines[0].output,
            Some(OutputRedirect::Append(PathBuf::from("log")))
        );

        let line = parse_command_line("cc x.c >& errs").unwrap();
        assert!(line.pipelines[0].commands[0].stderr_to_stdout);
        assert_eq!(
            line.pipelines[0].output,
            Some(OutputRedirect::Truncate(PathBuf::from("errs")))
        );
    }

    #[test]
    fn test_missing_redirect_target() {
        assert_eq!(
            parse_command_line("cat <"),
            Err(ParseError::MissingRedirectTarget("<"))
        );
        assert_eq!(
            parse_command_line("echo > | cat"),
            Err(ParseError::MissingRedirectTarget(">"))
        );
    }

    #[test]
    fn test_background_and_separators() {
        let line = parse_command_line("sleep 10 & echo one; echo two &").unwrap();
        let flags: Vec<bool> = line.pipelines.iter().map(|p| p.background).collect();
        assert_eq!(flags, vec![true, false, true]);
        assert_eq!(words(&line.pipelines[1]), vec![vec!["echo", "one"]]);
    }

    #[test]
    fn test_trailing_separator_is_allowed() {
        let line = parse_command_line("echo a;").unwrap();
        assert_eq!(line.pipelines.len(), 1);
    }

    #[test]
    fn test_empty_commands_are_rejected() {
        assert_eq!(parse_command_line("| cat"), Err(ParseError::EmptyCommand));
        assert_eq!(parse_command_line("ls |"), Err(ParseError::EmptyCommand));
        assert_eq!(
            parse_command_line("; ls"),
            Err(ParseError::UnexpectedToken(";"))
        );
        assert_eq!(
            parse_command_line("ls ; &"),
            Err(ParseError::UnexpectedToken("&"))
        );
        assert_eq!(parse_command_line("> out"), Err(ParseError::EmptyCommand));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_never_panics(line in "\\PC{0,64}") {
                let _ = parse_command_line(&line);
            }

            /// Plain words separated by pipes parse back into the same argv.
            #[test]
            fn prop_plain_pipelines_keep_their_words(
                commands in prop::collection::vec(
                    prop::collection::vec("[a-z0-9_./-]{1,8}", 1..4),
                    1..4,
                )
            ) {
                let line = commands
                    .iter()
                    .map(|argv| argv.join(" "))
                    .collect::<Vec<_>>()
                    .join(" | ");
                let parsed = parse_command_line(&line).unwrap();
                prop_assert_eq!(parsed.pipelines.len(), 1);
                let got: Vec<Vec<String>> = parsed.pipelines[0]
                    .commands
                    .iter()
                    .map(|c| c.argv.clone())
                    .collect();
                prop_assert_eq!(got, commands);
            }
        }
    }
}
