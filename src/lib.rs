pub mod cli;
pub mod config;
pub mod crawl;
pub mod db;
pub mod error;
pub mod models;
pub mod storage;
pub mod utils;

pub use config::CrawlerConfig;
pub use crawl::{Crawler, NodePool, Peer};
pub use error::AppError;
pub use storage::{MemoryStorage, Storage};
