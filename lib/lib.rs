pub mod build_info;
pub mod cli;
pub mod config;
pub mod db;
pub mod hn_client;
pub mod ingest;
pub mod logging;
pub mod server;
pub mod state;
