pub mod activity;
pub mod data;
pub mod runner;
