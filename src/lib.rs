pub mod app;
pub mod audio;
pub mod config;
pub mod fetch;
pub mod grid;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod query;
pub mod scheduler;
pub mod session;
pub mod ui;
