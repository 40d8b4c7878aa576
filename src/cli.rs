//! CLI domain: parse, route and output only.
//! No storage logic here; every command goes through [`crate::ContentRepository`].

mod output;
mod parse;
mod route;

pub use output::{format_entries_json, format_entries_text, map_error};
pub use parse::{Cli, Commands};
pub use route::RunContext;
