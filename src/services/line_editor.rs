//! Reading command lines, and the history of what was read
//!
//! The editor runs while the shell owns the terminal. It is free to change
//! terminal modes while reading; the shell never inspects them.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsFd;

pub trait LineEditor {
    /// Read one line, without its newline. `Ok(None)` means end of input.
    fn read_line(&mut self, prompt: Option<&str>) -> io::Result<Option<String>>;
}

/// Reads stdin one byte at a time, in whatever mode the terminal is in.
///
/// Reading byte-wise leaves everything after the newline in the kernel, so
/// jobs that read the shell's stdin see exactly the input meant for them.
#[derive(Debug)]
pub struct StdinLineEditor {
    input: File,
}

impl StdinLineEditor {
    pub fn new() -> io::Result<Self> {
        let fd = io::stdin().as_fd().try_clone_to_owned()?;
        Ok(Self {
            input: File::from(fd),
        })
    }
}

impl LineEditor for StdinLineEditor {
    fn read_line(&mut self, prompt: Option<&str>) -> io::Result<Option<String>> {
        if let Some(prompt) = prompt {
            let mut stdout = io::stdout().lock();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;
        }
        read_line_from(&mut self.input)
    }
}

fn read_line_from(input: &mut impl Read) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) if line.is_empty() => return Ok(None),
            Ok(0) => break,
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => line.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// Command history with a fixed capacity. Oldest entries fall off first.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
    /// Number of entries ever dropped, so numbering stays stable.
    base: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            base: 0,
        }
    }

    /// Record a line; blank lines are skipped.
    pub fn push(&mut self, line: &str) {
        if line.trim().is_empty() || self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.base += 1;
        }
        self.entries.push_back(line.to_string());
    }

    /// Entries with their 1-based numbers.
    pub fn numbered(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries
            .iter()
            .enumerate()
            .map(move |(i, line)| (self.base + i + 1, line.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
