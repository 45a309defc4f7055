#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

pub mod camara;
pub mod config;
pub mod env;
pub mod flatten;
pub mod logging;
pub mod pagination;
pub mod pipeline;
pub mod sink;
pub mod summary;
pub mod table;
