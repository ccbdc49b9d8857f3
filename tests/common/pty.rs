// Driving the shell on a pseudo-terminal

use super::fixtures::ShellFixture;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::openpty;
use nix::sys::termios::{tcgetattr, Termios};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::process::CommandExt;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

const PROMPT: &str = "jsh> ";

/// The shell running as session leader on a fresh pty, with the test
/// holding the master side.
pub struct PtyShell {
    master: File,
    child: Child,
    output: String,
    consumed: usize,
}

impl PtyShell {
    pub fn spawn(fixture: &ShellFixture) -> anyhow::Result<Self> {
        let pty = openpty(None, None)?;
        fcntl(&pty.master, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;

        let mut cmd = fixture.command();
        cmd.stdin(Stdio::from(pty.slave.try_clone()?))
            .stdout(Stdio::from(pty.slave.try_clone()?))
            .stderr(Stdio::from(pty.slave));
        // SAFETY: only async-signal-safe calls between fork and exec.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() < 0 {
                    return Err(io::Error::last_os_error());
                }
                if libc::ioctl(0, libc::TIOCSCTTY as _, 0) < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        let child = cmd.spawn()?;

        Ok(Self {
            master: File::from(pty.master),
            child,
            output: String::new(),
            consumed: 0,
        })
    }

    /// Type a line at the terminal.
    pub fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.master.write_all(line.as_bytes())?;
        self.master.write_all(b"\n")?;
        Ok(())
    }

    /// Type a raw control character, e.g. `0x1a` for ^Z.
    pub fn send_control(&mut self, byte: u8) -> anyhow::Result<()> {
        self.master.write_all(&[byte])?;
        Ok(())
    }

    /// Read until `needle` shows up in output not yet consumed. Returns the
    /// text up to and including it.
    pub fn read_until(&mut self, needle: &str, timeout: Duration) -> anyhow::Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(at) = self.output[self.consumed..].find(needle) {
                let end = self.consumed + at + needle.len();
                let text = self.output[self.consumed..end].to_string();
                self.consumed = end;
                return Ok(text);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!(
                    "timed out waiting for {:?}; terminal showed {:?}",
                    needle,
                    &self.output[self.consumed..]
                );
            }
            if !self.fill(remaining)? {
                anyhow::bail!(
                    "terminal closed while waiting for {:?}; it showed {:?}",
                    needle,
                    &self.output[self.consumed..]
                );
            }
        }
    }

    pub fn expect_prompt(&mut self) -> anyhow::Result<String> {
        self.read_until(PROMPT, Duration::from_secs(10))
    }

    /// Run a line and wait for the next prompt.
    pub fn run_line(&mut self, line: &str) -> anyhow::Result<String> {
        self.send_line(line)?;
        self.expect_prompt()
    }

    /// The terminal's current modes, as any program on it would see them.
    pub fn modes(&self) -> anyhow::Result<Termios> {
        Ok(tcgetattr(self.master.as_fd())?)
    }

    /// Send `exit` and return the shell's exit status.
    pub fn exit(mut self, line: &str) -> anyhow::Result<Option<i32>> {
        self.send_line(line)?;
        // Keep draining so the shell never blocks on a full pty buffer.
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status.code());
            }
            if Instant::now() >= deadline {
                anyhow::bail!("shell did not exit");
            }
            self.fill(Duration::from_millis(50))?;
        }
    }

    /// Pull whatever the terminal has written. Returns false once the slave
    /// side is gone.
    fn fill(&mut self, timeout: Duration) -> anyhow::Result<bool> {
        let millis = timeout.as_millis().min(u16::MAX as u128) as u16;
        let ready = {
            let mut fds = [PollFd::new(self.master.as_fd(), PollFlags::POLLIN)];
            poll(&mut fds, PollTimeout::from(millis))?
        };
        if ready == 0 {
            return Ok(true);
        }
        let mut buf = [0u8; 4096];
        match self.master.read(&mut buf) {
            Ok(0) => Ok(false),
            Ok(n) => {
                self.output.push_str(&String::from_utf8_lossy(&buf[..n]));
                Ok(true)
            }
            // Linux reports a closed slave as EIO.
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for PtyShell {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
