//! Infrastructure shared by the library and the CLI.

pub mod lock;
pub mod output;
