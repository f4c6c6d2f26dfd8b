//! Engine module: CLI plumbing and shared helpers

pub mod arg_parser;
pub mod cli;
pub mod hashing;
pub mod progress;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::{Cli, Commands, CommonArgs};
pub use cli::handle_run;
pub use hashing::{digest_bytes, digest_file};
pub use tools::{glob_match, valid_name_from_filename};
