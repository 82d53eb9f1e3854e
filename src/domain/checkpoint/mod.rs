pub mod manager;
pub mod policy;
pub mod record;
