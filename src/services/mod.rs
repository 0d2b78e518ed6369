pub mod attachment;
pub mod reclaim;
pub mod scheduler;
pub mod storage;
pub mod sweep;
pub mod upload_store;
