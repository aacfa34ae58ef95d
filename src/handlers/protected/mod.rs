// handlers/protected/mod.rs - endpoints behind `jwt_auth_middleware`
//
// Handlers read the caller from the `AuthUser` request extension.

pub mod account;

pub use account::{logout_post, me_get, password_put};
