pub mod cli;
pub mod host;
pub mod load_config;
pub mod store;

pub use cli::{run, Cli, Commands};
pub use host::{HostState, LocalHost, ResourceRecord};
