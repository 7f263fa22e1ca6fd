//! Authentication: password hashing, JWT tokens and request extractors

pub mod extractor;
pub mod jwt;
pub mod password;

pub use extractor::{AdminUser, CurrentUser};
pub use jwt::{Claims, JwtService};
pub use password::{hash_password, verify_password, MIN_PASSWORD_LEN};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token expired")]
    ExpiredToken,
    #[error("token generation failed: {0}")]
    GenerationFailed(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
}
