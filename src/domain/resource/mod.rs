pub mod resource_description;
pub mod resource_update;
pub mod worker;
