pub mod config;
pub mod config_list;
pub mod environment;
pub mod step;
