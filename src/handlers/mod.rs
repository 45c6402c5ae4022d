pub mod gateway_handlers;
pub mod health_handlers;
pub mod meta_handlers;
pub mod shard_handlers;
pub mod stats_handlers;
