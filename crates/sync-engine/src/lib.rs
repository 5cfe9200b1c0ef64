pub mod batcher;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mapper;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod state;
pub mod summary;
