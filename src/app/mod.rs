//! The shell proper: session state, builtins and the read-eval loop

pub mod builtins;
pub mod session;
pub mod shell;

pub use session::{Notice, Session};
pub use shell::{Flow, Shell};
