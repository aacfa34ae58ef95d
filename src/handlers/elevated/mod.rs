// handlers/elevated/mod.rs - organization administration
//
// Routed behind `jwt_auth_middleware` and `require_admin_middleware`; every
// operation is scoped to the admin's own organization.

pub mod auth_config;
pub mod users;

pub use auth_config::{auth_config_get, auth_config_put};
pub use users::{user_unblock_post, users_post};
