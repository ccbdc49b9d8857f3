//! The read-eval loop
//!
//! Before each prompt the loop reports background jobs and makes sure the
//! shell owns the terminal. It then reads a line, parses it and runs its
//! pipelines in order. Foreground jobs are finished, terminal state
//! included, by the time [`Session::run_pipeline`] returns.

use super::builtins::{Builtin, BuiltinError};
use super::session::{Notice, Session};
use crate::config::Config;
use crate::model::job::JobId;
use crate::model::parser::parse_command_line;
use crate::services::child_status::{Reaper, SystemReaper};
use crate::services::line_editor::{History, LineEditor};
use crate::services::process_group::LaunchError;
use crate::services::tty::Terminal;
use std::io::{self, Write};
use std::path::PathBuf;

/// Exit status for a line that failed to parse.
const SYNTAX_ERROR_STATUS: i32 = 2;
/// Exit status for a program that could not be found.
const NOT_FOUND_STATUS: i32 = 127;

/// What the loop does after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(i32),
}

pub struct Shell<T: Terminal, E: LineEditor, R: Reaper = SystemReaper> {
    session: Session<T, R>,
    editor: E,
    history: History,
    config: Config,
    /// Print prompts. True when stdin is a terminal, with or without job
    /// control.
    interactive: bool,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
}

impl<T: Terminal, E: LineEditor, R: Reaper> Shell<T, E, R> {
    pub fn new(session: Session<T, R>, editor: E, config: Config) -> Self {
        Self::with_output(
            session,
            editor,
            config,
            Box::new(io::stdout()),
            Box::new(io::stderr()),
        )
    }

    pub fn with_output(
        session: Session<T, R>,
        editor: E,
        config: Config,
        out: Box<dyn Write>,
        err: Box<dyn Write>,
    ) -> Self {
        Self {
            history: History::new(config.history_size),
            interactive: session.is_interactive(),
            session,
            editor,
            config,
            out,
            err,
        }
    }

    pub fn session(&self) -> &Session<T, R> {
        &self.session
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    /// Run until end of input or `exit`. Returns the shell's exit status.
    pub fn run(&mut self) -> i32 {
        loop {
            let notices = self.session.background_notices();
            self.print_notices(&notices);
            self.session.ensure_terminal_owned();

            let prompt = self.interactive.then_some(self.config.prompt.as_str());
            match self.editor.read_line(prompt) {
                Ok(Some(line)) => {
                    if let Flow::Exit(code) = self.execute_line(&line) {
                        return code;
                    }
                }
                Ok(None) => {
                    if self.interactive {
                        let _ = writeln!(self.out);
                    }
                    return self.session.last_status();
                }
                Err(e) => {
                    tracing::error!("reading input failed: {}", e);
                    let _ = writeln!(self.err, "jsh: read error: {}", e);
                    return 1;
                }
            }
        }
    }

    /// Parse and run one command line.
    pub fn execute_line(&mut self, line: &str) -> Flow {
        self.history.push(line);
        let command_line = match parse_command_line(line) {
            Ok(command_line) => command_line,
            Err(e) => {
                let _ = writeln!(self.err, "jsh: syntax error: {}", e);
                self.session.set_last_status(SYNTAX_ERROR_STATUS);
                return Flow::Continue;
            }
        };

        for pipeline in &command_line.pipelines {
            if let Some(builtin) = Builtin::from_pipeline(pipeline) {
                let result = builtin.and_then(|builtin| self.run_builtin(builtin));
                match result {
                    Ok(Flow::Exit(code)) => return Flow::Exit(code),
                    Ok(Flow::Continue) => {}
                    Err(e) => {
                        let _ = writeln!(self.err, "{}", e);
                        self.session.set_last_status(1);
                    }
                }
                continue;
            }

            match self.session.run_pipeline(pipeline) {
                Ok(notice) => self.print_notices(notice.as_slice()),
                Err(e) => {
                    tracing::info!("launch failed: {}", e);
                    let _ = writeln!(self.err, "jsh: {}", e);
                    let status = match &e {
                        LaunchError::Spawn { source, .. }
                            if source.kind() == io::ErrorKind::NotFound =>
                        {
                            NOT_FOUND_STATUS
                        }
                        _ => 1,
                    };
                    self.session.set_last_status(status);
                }
            }
        }
        Flow::Continue
    }

    fn print_notices(&mut self, notices: &[Notice]) {
        for notice in notices {
            let _ = writeln!(self.out, "{}", notice);
        }
        let _ = self.out.flush();
    }

    fn run_builtin(&mut self, builtin: Builtin) -> Result<Flow, BuiltinError> {
        let name = builtin.name();
        tracing::debug!(?builtin, "running builtin");
        let io_err = |source| BuiltinError::Io { name, source };
        let job_err = |source| BuiltinError::Job { name, source };

        match builtin {
            Builtin::Exit(code) => {
                return Ok(Flow::Exit(code.unwrap_or(self.session.last_status())));
            }
            Builtin::Jobs => {
                for job in self.session.jobs().iter() {
                    writeln!(
                        self.out,
                        "[{}]\t{}\t\t{}",
                        job.id, job.status, job.command_line
                    )
                    .map_err(io_err)?;
                }
            }
            Builtin::Fg(arg) => {
                let id = self.resolve_job(name, arg)?;
                self.echo_command(id).map_err(io_err)?;
                let notice = self.session.resume_foreground(id).map_err(job_err)?;
                self.print_notices(notice.as_slice());
                return Ok(Flow::Continue);
            }
            Builtin::Bg(arg) => {
                let id = self.resolve_job(name, arg)?;
                self.echo_command(id).map_err(io_err)?;
                self.session.resume_background(id).map_err(job_err)?;
            }
            Builtin::Kill(arg) => {
                let id = self.resolve_job(name, arg)?;
                self.session.terminate_job(id).map_err(job_err)?;
            }
            Builtin::Stop(arg) => {
                let id = self.resolve_job(name, arg)?;
                self.session.stop_job(id).map_err(job_err)?;
            }
            Builtin::History => {
                for (n, line) in self.history.numbered() {
                    writeln!(self.out, "{}: {}", n, line).map_err(io_err)?;
                }
            }
            Builtin::Cd(dir) => {
                let target = match dir {
                    Some(dir) => PathBuf::from(dir),
                    None => dirs::home_dir().ok_or_else(|| {
                        io_err(io::Error::new(io::ErrorKind::NotFound, "HOME not set"))
                    })?,
                };
                std::env::set_current_dir(&target).map_err(|source| BuiltinError::Io {
                    name,
                    source: io::Error::new(source.kind(), format!("{}: {}", target.display(), source)),
                })?;
            }
            Builtin::Pwd => {
                let cwd = std::env::current_dir().map_err(io_err)?;
                writeln!(self.out, "{}", cwd.display()).map_err(io_err)?;
            }
            Builtin::Ls => {
                let mut names = Vec::new();
                for entry in std::fs::read_dir(".").map_err(io_err)? {
                    names.push(entry.map_err(io_err)?.file_name());
                }
                names.sort();
                for name in &names {
                    write!(self.out, "{}\t", name.to_string_lossy()).map_err(io_err)?;
                }
                writeln!(self.out).map_err(io_err)?;
            }
        }
        self.session.set_last_status(0);
        Ok(Flow::Continue)
    }

    fn resolve_job(&self, name: &'static str, arg: Option<JobId>) -> Result<JobId, BuiltinError> {
        match arg {
            Some(id) => Ok(id),
            None => self
                .session
                .current_job()
                .ok_or(BuiltinError::NoCurrentJob { name }),
        }
    }

    fn echo_command(&mut self, id: JobId) -> io::Result<()> {
        if let Some(job) = self.session.jobs().get(id) {
            writeln!(self.out, "{}", job.command_line)?;
            self.out.flush()?;
        }
        Ok(())
    }
}
