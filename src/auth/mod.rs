pub mod password;
pub mod principal;
pub mod roles;

pub use principal::Principal;
