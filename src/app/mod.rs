pub mod cli;
pub mod command_handlers;
pub mod command_support;

pub use command_handlers::run_cli;
pub use command_support::AppContext;
