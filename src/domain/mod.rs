pub mod access_processor;
pub mod action;
pub mod adaptor;
pub mod checkpoint;
pub mod data;
pub mod job;
pub mod resource;
pub mod runtime;
pub mod scheduler;
pub mod simulator;
pub mod task;
pub mod utils;
