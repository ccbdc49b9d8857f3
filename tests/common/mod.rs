// Common test utilities

#[cfg(test)]
#[allow(dead_code)]
pub mod fixtures;
#[cfg(test)]
#[allow(dead_code)]
pub mod pty;
#[cfg(test)]
#[allow(dead_code)]
pub mod tracing;
