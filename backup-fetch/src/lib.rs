pub mod cli;
pub mod load_config;
pub mod logging;
pub mod s3;

pub use cli::{run, run_with_dispatch, Cli, Commands};
