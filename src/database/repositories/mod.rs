//! Collection specific queries, as inherent methods on `Repository<Model>`

pub mod logs;
pub mod notifications;
pub mod organizations;
pub mod tokens;
pub mod users;
