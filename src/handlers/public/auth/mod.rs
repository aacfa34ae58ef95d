// handlers/public/auth/mod.rs - login flow and token acquisition

pub mod login;
pub mod otp;
pub mod password;
pub mod refresh;

pub use login::{authenticate_post, init_auth_post};
pub use otp::otp_generate_post;
pub use password::{password_forgot_post, password_reset_post};
pub use refresh::refresh_token_post;
