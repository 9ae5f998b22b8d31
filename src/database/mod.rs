/*
* External connections: the PostgreSQL pool and the Redis cache.
*/

pub mod postgres_service;
pub mod redis_manager;

pub use postgres_service::DatabaseService;
pub use redis_manager::RedisCache;
