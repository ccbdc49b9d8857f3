//! Parsed command lines
//!
//! A command line is a list of pipelines. Each pipeline is what the process
//! group controller launches as one job.

use std::fmt;
use std::path::PathBuf;

/// One program invocation inside a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Program name followed by its arguments. Never empty.
    pub argv: Vec<String>,
    /// Send this command's stderr wherever its stdout goes (`|&`, `>&`).
    pub stderr_to_stdout: bool,
}

impl Command {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            stderr_to_stdout: false,
        }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }
}

/// How the last command's stdout is redirected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRedirect {
    Truncate(PathBuf),
    Append(PathBuf),
}

impl OutputRedirect {
    pub fn path(&self) -> &PathBuf {
        match self {
            OutputRedirect::Truncate(path) | OutputRedirect::Append(path) => path,
        }
    }
}

/// What one job runs: commands connected by pipes, plus redirections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    /// `< file`, applied to the first command.
    pub input: Option<PathBuf>,
    /// `> file` / `>> file`, applied to the last command.
    pub output: Option<OutputRedirect>,
    /// Terminated by `&`.
    pub background: bool,
}

impl Pipeline {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            commands,
            input: None,
            output: None,
            background: false,
        }
    }

    /// The sole command of a single-command pipeline, if that is what this is.
    pub fn single_command(&self) -> Option<&Command> {
        match self.commands.as_slice() {
            [cmd] => Some(cmd),
            _ => None,
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cmd) in self.commands.iter().enumerate() {
            if i > 0 {
                // The previous command decides which pipe operator joined them.
                let op = if self.commands[i - 1].stderr_to_stdout {
                    "|&"
                } else {
                    "|"
                };
                write!(f, " {} ", op)?;
            }
            write!(f, "{}", cmd.argv.join(" "))?;
        }
        if let Some(input) = &self.input {
            write!(f, " < {}", input.display())?;
        }
        match &self.output {
            Some(OutputRedirect::Truncate(path)) => write!(f, " > {}", path.display())?,
            Some(OutputRedirect::Append(path)) => write!(f, " >> {}", path.display())?,
            None => {}
        }
        Ok(())
    }
}

/// Everything typed on one line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub pipelines: Vec<Pipeline>,
}

impl CommandLine {
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
