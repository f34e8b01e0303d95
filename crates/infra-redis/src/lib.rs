// Playlist Import Infrastructure - Redis Adapter
// Implements: JobQueue (reliable list queue + pub/sub events)

mod connection;
mod job_queue;

pub use connection::{connect_with_retry, RedisSettings};
pub use job_queue::{QueueKeys, RedisJobQueue};

// Note: redis::RedisError is mapped to QueueError in connection::map_redis_error
// (orphan rules keep the From impl out of core)
