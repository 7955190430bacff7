pub mod connection_pool;
pub mod database; // MySQL and PostgreSQL adapters behind one contract
pub mod gateway;
pub mod prompts;
pub mod query_cache; // Tool response cache with TTL

pub use connection_pool::*;
pub use database::{DatabaseAdapter, DatabaseType, MySQLAdapter, PostgreSQLAdapter};
pub use gateway::QueryGateway;
pub use prompts::BuiltinPrompt;
pub use query_cache::*;
