//! Terminal state store
//!
//! Holds the single last-known-good snapshot of the controlling terminal's
//! attributes. Snapshots are replaced wholesale; a failed capture or restore
//! leaves the stored snapshot exactly as it was.

use super::tty::{Terminal, TerminalError};

/// A byte-exact capture of a terminal's attributes. Immutable once taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSnapshot<A> {
    attrs: A,
}

impl<A> TerminalSnapshot<A> {
    pub fn attributes(&self) -> &A {
        &self.attrs
    }
}

#[derive(Debug)]
pub struct TermStateStore<A> {
    snapshot: Option<TerminalSnapshot<A>>,
}

impl<A> Default for TermStateStore<A> {
    fn default() -> Self {
        Self { snapshot: None }
    }
}

impl<A: Clone> TermStateStore<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the terminal's attributes and make them the new snapshot.
    pub fn capture<T>(&mut self, tty: &T) -> Result<&TerminalSnapshot<A>, TerminalError>
    where
        T: Terminal<Attributes = A>,
    {
        let attrs = tty.attributes()?;
        Ok(&*self.snapshot.insert(TerminalSnapshot { attrs }))
    }

    /// Write the stored snapshot back onto the terminal.
    ///
    /// Returns `Ok(false)` without touching the device when nothing has been
    /// captured yet.
    pub fn restore<T>(&self, tty: &T) -> Result<bool, TerminalError>
    where
        T: Terminal<Attributes = A>,
    {
        match &self.snapshot {
            Some(snapshot) => {
                tty.set_attributes(&snapshot.attrs)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn snapshot(&self) -> Option<&TerminalSnapshot<A>> {
        self.snapshot.as_ref()
    }
}
