pub mod modules;
pub mod workflow;
