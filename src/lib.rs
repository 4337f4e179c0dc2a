pub mod api;
pub mod config;
pub mod crossing;
pub mod error;
pub mod eta;
pub mod feed;
pub mod publish;
pub mod state;
pub mod stats;
pub mod timestamp;
