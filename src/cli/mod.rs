pub mod args;

pub use args::{Cli, Commands, NamesArgs, RunArgs, ShowArgs};
