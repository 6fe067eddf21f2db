#[allow(clippy::module_inception)]
mod cli;

pub use cli::{Command, CommandArgs, GraceUpdateArgs, ServeArgs};
