pub mod data_info;
pub mod data_info_provider;
pub mod data_instance;
pub mod data_location;
