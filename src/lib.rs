//! SweetNest admin dashboard library exports.

pub mod app;
pub mod cli;
pub mod config;
pub mod debounce;
pub mod event;
pub mod gateway;
pub mod logging;
pub mod query;
pub mod resources;
pub mod ui;
