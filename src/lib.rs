pub mod args;
pub mod assemble;
pub mod config;
pub mod flatten_advanced;
pub mod flatten_basic;
pub mod games;
pub mod http_client;
pub mod join;
pub mod lines;
pub mod logging;
pub mod normalize;
pub mod pairs;
pub mod provider;
pub mod run_log;
pub mod table;
pub mod table_store;
