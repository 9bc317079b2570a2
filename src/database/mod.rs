pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repositories;
pub mod repository;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use repository::{CountResult, FindResults, Repository, RepositoryOptions};
pub use store::DocumentStore;
