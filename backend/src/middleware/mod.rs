//! Request middleware

pub mod auth;

pub use auth::{auth_middleware, check_permission, encode_jwt, AuthUser, Claims, CurrentUser};
