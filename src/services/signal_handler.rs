//! Signal dispositions and terminal ownership at start-up
//!
//! An interactive shell must not be stopped or killed by the job-control
//! keys typed at its terminal; those are meant for the foreground job. It
//! also has to be the terminal's foreground group before it reads anything.

use super::tty::Terminal;
use anyhow::{Context, Result as AnyhowResult};
use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{self, Pid};

/// Signals an interactive shell ignores for itself.
const IGNORED_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// Ignore the keyboard and job-control signals.
pub fn install_interactive_dispositions() -> nix::Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    for sig in IGNORED_SIGNALS {
        // SAFETY: SIG_IGN installs no handler code.
        unsafe { signal::sigaction(sig, &ignore) }?;
    }
    Ok(())
}

/// Take over the terminal for an interactive session.
///
/// If the shell was started in the background it stops itself with SIGTTIN
/// until it is moved to the foreground. It then puts itself in its own
/// process group, ignores the job-control signals and makes its group the
/// terminal's foreground group. Returns the shell's process group.
pub fn take_terminal<T: Terminal>(tty: &T) -> AnyhowResult<Pid> {
    loop {
        let owner = tty
            .foreground_group()
            .context("stdin is a terminal but not the controlling terminal")?;
        let own_group = unistd::getpgrp();
        if owner == own_group {
            break;
        }
        tracing::info!(%owner, %own_group, "started in the background; waiting for the terminal");
        signal::killpg(own_group, Signal::SIGTTIN).context("failed to stop for SIGTTIN")?;
    }

    install_interactive_dispositions().context("failed to ignore job-control signals")?;

    let pid = unistd::getpid();
    match unistd::setpgid(pid, pid) {
        // A session leader already leads its own group and may not move.
        Ok(()) | Err(Errno::EPERM) => {}
        Err(e) => return Err(e).context("failed to create the shell's process group"),
    }
    let shell_pgid = unistd::getpgrp();
    tty.set_foreground_group(shell_pgid)
        .context("failed to make the shell the foreground process group")?;

    tracing::info!(%shell_pgid, "took control of the terminal");
    Ok(shell_pgid)
}

/// Route panics into the log file as well as stderr.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("panic: {}", info);
        default_hook(info);
    }));
}
