//! Commands the shell runs itself
//!
//! A builtin only runs in the shell when it is the sole command of a
//! foreground pipeline without redirections. Anywhere else the name is
//! looked up as a program.

use super::session::JobControlError;
use crate::model::command::{Command, Pipeline};
use crate::model::job::JobId;
use std::fmt;
use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    Exit(Option<i32>),
    Jobs,
    /// `None` means the current (newest) job.
    Fg(Option<JobId>),
    Bg(Option<JobId>),
    Kill(Option<JobId>),
    Stop(Option<JobId>),
    History,
    Cd(Option<String>),
    Pwd,
    /// Names in the current directory, tab-separated.
    Ls,
}

#[derive(Debug)]
pub enum BuiltinError {
    Usage {
        name: &'static str,
        usage: &'static str,
    },
    NotANumber {
        name: &'static str,
        arg: String,
    },
    NoCurrentJob {
        name: &'static str,
    },
    Job {
        name: &'static str,
        source: JobControlError,
    },
    Io {
        name: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for BuiltinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuiltinError::Usage { name, usage } => write!(f, "{}: usage: {}", name, usage),
            BuiltinError::NotANumber { name, arg } => {
                write!(f, "{}: {}: numeric argument required", name, arg)
            }
            BuiltinError::NoCurrentJob { name } => write!(f, "{}: current: no such job", name),
            BuiltinError::Job { name, source } => write!(f, "{}: {}", name, source),
            BuiltinError::Io { name, source } => write!(f, "{}: {}", name, source),
        }
    }
}

impl std::error::Error for BuiltinError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuiltinError::Job { source, .. } => Some(source),
            BuiltinError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Builtin {
    /// Recognize a builtin pipeline. `None` means "run it as a program".
    pub fn from_pipeline(pipeline: &Pipeline) -> Option<Result<Self, BuiltinError>> {
        if pipeline.background || pipeline.input.is_some() || pipeline.output.is_some() {
            return None;
        }
        let command = pipeline.single_command()?;
        if command.stderr_to_stdout {
            return None;
        }
        Self::from_command(command)
    }

    fn from_command(command: &Command) -> Option<Result<Self, BuiltinError>> {
        let args = command.args();
        let parsed = match command.program() {
            "exit" => parse_exit(args),
            "jobs" => no_args("jobs", "jobs", args).map(|()| Builtin::Jobs),
            "fg" => job_arg("fg", args).map(Builtin::Fg),
            "bg" => job_arg("bg", args).map(Builtin::Bg),
            "kill" => job_arg("kill", args).map(Builtin::Kill),
            "stop" => job_arg("stop", args).map(Builtin::Stop),
            "history" => no_args("history", "history", args).map(|()| Builtin::History),
            "cd" => match args {
                [] => Ok(Builtin::Cd(None)),
                [dir] => Ok(Builtin::Cd(Some(dir.clone()))),
                _ => Err(BuiltinError::Usage {
                    name: "cd",
                    usage: "cd [dir]",
                }),
            },
            "pwd" => no_args("pwd", "pwd", args).map(|()| Builtin::Pwd),
            "ls" => no_args("ls", "ls", args).map(|()| Builtin::Ls),
            _ => return None,
        };
        Some(parsed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Exit(_) => "exit",
            Builtin::Jobs => "jobs",
            Builtin::Fg(_) => "fg",
            Builtin::Bg(_) => "bg",
            Builtin::Kill(_) => "kill",
            Builtin::Stop(_) => "stop",
            Builtin::History => "history",
            Builtin::Cd(_) => "cd",
            Builtin::Pwd => "pwd",
            Builtin::Ls => "ls",
        }
    }
}

fn parse_exit(args: &[String]) -> Result<Builtin, BuiltinError> {
    match args {
        [] => Ok(Builtin::Exit(None)),
        [code] => code
            .parse::<i32>()
            .map(|code| Builtin::Exit(Some(code)))
            .map_err(|_| BuiltinError::NotANumber {
                name: "exit",
                arg: code.clone(),
            }),
        _ => Err(BuiltinError::Usage {
            name: "exit",
            usage: "exit [code]",
        }),
    }
}

fn no_args(name: &'static str, usage: &'static str, args: &[String]) -> Result<(), BuiltinError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(BuiltinError::Usage { name, usage })
    }
}

/// `N` or `%N`, or nothing for the current job.
fn job_arg(name: &'static str, args: &[String]) -> Result<Option<JobId>, BuiltinError> {
    match args {
        [] => Ok(None),
        [arg] => {
            let digits = arg.strip_prefix('%').unwrap_or(arg);
            match digits.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Some(JobId(n))),
                _ => Err(BuiltinError::NotANumber {
                    name,
                    arg: arg.clone(),
                }),
            }
        }
        _ => Err(BuiltinError::Usage {
            name,
            usage: match name {
                "fg" => "fg [%N]",
                "bg" => "bg [%N]",
                "kill" => "kill [%N]",
                _ => "stop [%N]",
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parser::parse_command_line;

    fn builtin(line: &str) -> Option<Result<Builtin, BuiltinError>> {
        let parsed = parse_command_line(line).unwrap();
        Builtin::from_pipeline(&parsed.pipelines[0])
    }

    #[test]
    fn test_recognizes_builtins() {
        assert!(matches!(builtin("jobs"), Some(Ok(Builtin::Jobs))));
        assert!(matches!(builtin("fg %2"), Some(Ok(Builtin::Fg(Some(JobId(2)))))));
        assert!(matches!(builtin("bg 1"), Some(Ok(Builtin::Bg(Some(JobId(1)))))));
        assert!(matches!(builtin("kill"), Some(Ok(Builtin::Kill(None)))));
        assert!(matches!(builtin("exit 3"), Some(Ok(Builtin::Exit(Some(3))))));
        assert!(matches!(builtin("cd /tmp"), Some(Ok(Builtin::Cd(Some(_))))));
        assert!(matches!(builtin("ls"), Some(Ok(Builtin::Ls))));
    }

    #[test]
    fn test_builtin_names_elsewhere_are_programs() {
        assert!(builtin("cat").is_none());
        assert!(builtin("jobs | cat").is_none());
        assert!(builtin("ls | sort").is_none());
        assert!(builtin("ls -l").is_some_and(|parsed| parsed.is_err()));
        assert!(builtin("pwd > out").is_none());
        assert!(builtin("jobs &").is_none());
    }

    #[test]
    fn test_usage_errors() {
        let err = builtin("fg x").unwrap().unwrap_err();
        assert_eq!(err.to_string(), "fg: x: numeric argument required");

        let err = builtin("stop %0").unwrap().unwrap_err();
        assert_eq!(err.to_string(), "stop: %0: numeric argument required");

        let err = builtin("jobs -l").unwrap().unwrap_err();
        assert_eq!(err.to_string(), "jobs: usage: jobs");

        let err = builtin("exit 1 2").unwrap().unwrap_err();
        assert_eq!(err.to_string(), "exit: usage: exit [code]");
    }

    #[test]
    fn test_job_errors_name_the_builtin() {
        let err = BuiltinError::Job {
            name: "kill",
            source: JobControlError::NoSuchJob(JobId(7)),
        };
        assert_eq!(err.to_string(), "kill: 7: no such job");
        assert_eq!(
            BuiltinError::NoCurrentJob { name: "fg" }.to_string(),
            "fg: current: no such job"
        );
    }
}
