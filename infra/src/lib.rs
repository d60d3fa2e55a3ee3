pub mod archive;
pub mod blob;
pub mod config;
pub mod container;
pub mod run_info;
pub mod run_meta;
