//! XDG-compliant log directory management
//!
//! Logs are stored in `$XDG_STATE_HOME/jsh/logs/` (typically
//! `~/.local/state/jsh/logs/`). Each shell writes a PID-named log file, so
//! nested and concurrent shells never share one. Stale logs of dead shells
//! are removed at start-up.

use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

/// Minimum age for log files to be cleaned up (24 hours)
const CLEANUP_AGE: Duration = Duration::from_secs(24 * 60 * 60);

static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Get the base log directory, creating it if necessary.
///
/// Falls back to `~/.local/state/jsh/logs/` if XDG_STATE_HOME is not set,
/// and to the system temp directory as a last resort.
pub fn log_dir() -> &'static PathBuf {
    LOG_DIR.get_or_init(|| {
        let fallback = std::env::temp_dir().join("jsh-logs");
        let dir = xdg_log_dir().unwrap_or_else(|| fallback.clone());

        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("Failed to create log directory {:?}: {}", dir, e);
            return fallback;
        }
        dir
    })
}

fn xdg_log_dir() -> Option<PathBuf> {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(state_home);
        if path.is_absolute() {
            return Some(path.join("jsh").join("logs"));
        }
    }
    dirs::home_dir().map(|home| home.join(".local").join("state").join("jsh").join("logs"))
}

/// Returns `{log_dir}/jsh-{PID}.log`
pub fn main_log_path() -> PathBuf {
    log_dir().join(format!("jsh-{}.log", std::process::id()))
}

/// Remove log files left behind by shells that are no longer running.
pub fn cleanup_stale_logs() {
    cleanup_stale_logs_in_dir(log_dir(), std::process::id());
}

fn cleanup_stale_logs_in_dir(dir: &Path, current_pid: u32) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        let Some(pid) = extract_pid_from_filename(&name) else {
            continue;
        };
        if pid == current_pid {
            continue;
        }

        if !is_process_running(pid)
            && entry.file_type().map(|t| t.is_file()).unwrap_or(false)
            && is_file_older_than(&entry.path(), CLEANUP_AGE)
        {
            if let Err(e) = fs::remove_file(entry.path()) {
                tracing::debug!("Failed to clean up stale log {:?}: {}", entry.path(), e);
            } else {
                tracing::debug!("Cleaned up stale log file: {:?}", entry.path());
            }
        }
    }
}

fn is_file_older_than(path: &Path, age: Duration) -> bool {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|elapsed| elapsed > age)
}

/// Extract the PID from a name like `jsh-12345.log`.
fn extract_pid_from_filename(name: &str) -> Option<u32> {
    let stem = name.strip_prefix("jsh-")?.strip_suffix(".log")?;
    stem.parse().ok()
}

fn is_process_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 checks for existence without delivering anything.
    match signal::kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Print the locations the shell reads from and writes to.
pub fn print_all_paths(config_path: Option<&Path>) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    let config = config_path
        .map(Path::to_path_buf)
        .or_else(crate::config_io::default_config_path)
        .unwrap_or_else(|| PathBuf::from("<unavailable>"));

    writeln!(handle, "jsh paths:")?;
    writeln!(handle)?;
    writeln!(handle, "Config:     {}", config.display())?;
    writeln!(handle, "Logs:       {}", log_dir().display())?;
    writeln!(handle, "  this run: {}", main_log_path().display())?;
    Ok(())
}
