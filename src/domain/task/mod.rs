pub mod implementation;
pub mod outcome;
pub mod parameter;
pub mod task;
