// Running the shell binary over pipes

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// A scratch directory the shell runs in, with its config and log
/// locations pointed inside it.
pub struct ShellFixture {
    temp_dir: TempDir,
}

/// What one scripted shell session produced.
pub struct ShellOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for ShellOutput {
    fn from(output: Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl ShellFixture {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            temp_dir: tempfile::tempdir()?,
        })
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir().join(name)
    }

    pub fn write_file(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let path = self.path(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    pub fn read_file(&self, name: &str) -> anyhow::Result<String> {
        Ok(fs::read_to_string(self.path(name))?)
    }

    /// A `Command` for the shell binary, isolated from the user's config.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_jsh"));
        cmd.current_dir(self.dir())
            .arg("--log-file")
            .arg(self.path("jsh.log"))
            .env("XDG_CONFIG_HOME", self.path("config"))
            .env("XDG_STATE_HOME", self.path("state"))
            .env_remove("RUST_LOG");
        cmd
    }

    /// Feed `script` to the shell on stdin and collect what it printed.
    pub fn run(&self, script: &str) -> anyhow::Result<ShellOutput> {
        self.run_with(self.command(), script)
    }

    pub fn run_with(&self, mut cmd: Command, script: &str) -> anyhow::Result<ShellOutput> {
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes())?;
        }
        Ok(child.wait_with_output()?.into())
    }
}
