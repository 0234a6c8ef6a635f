pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod report;
pub mod walker;
