use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("Invalid field name: {0}")]
    InvalidField(String),

    #[error("Invalid search term: {0}")]
    InvalidTerm(String),

    #[error("Unbalanced quotes in search: {0}")]
    UnbalancedQuotes(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
}
