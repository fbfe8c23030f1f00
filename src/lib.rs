pub mod alert;
pub mod baseline;
pub mod blend;
pub mod config;
pub mod drift;
pub mod governor;
pub mod output;
pub mod regime;
pub mod report;
pub mod server;
pub mod store;
