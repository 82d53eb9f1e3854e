pub mod storage_backend;
pub mod worker_adaptor;
