pub mod backend_api;
pub mod cache_invalidation;
pub mod status_stream;
pub mod storage_upload;
