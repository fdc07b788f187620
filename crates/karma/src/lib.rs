//! Karma bot console front end
//!
//! Reads `<user id> <text>` lines, turns them into workflow events for the
//! engine, and renders prompts and notices as plain text.

pub mod args;
pub mod command;
pub mod console;

pub use args::Args;
pub use command::{parse_line, Input, Line, ParseError};
pub use console::{run, ConsoleTransport};
