pub mod app;
pub mod backend;
pub mod config;
pub mod launcher;
pub mod logging;
pub mod ownership;
pub mod shared;
pub mod state;
pub mod wait;
