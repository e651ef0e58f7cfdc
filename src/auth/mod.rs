//! Authentication: password hashing, random tokens and session resolution

pub mod password;
pub mod session;
pub mod token;

pub use password::{hash_password, verify_password};
pub use session::{Identity, IssuedSession, Resolution, SessionResolver};
pub use token::{generate_token, normalize_token, TOKEN_BYTES};
