// handlers/public/mod.rs - endpoints that need no access token
//
// Login, password recovery and organization signup. Every input is untrusted.

pub mod auth;
pub mod org;

pub use org::org_post;
