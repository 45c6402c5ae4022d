pub mod gateway_service;
pub mod meta_authority;
pub mod meta_client;
pub mod metadata_service;
pub mod naming;
pub mod placement;
pub mod shard_client;
pub mod storage_service;
