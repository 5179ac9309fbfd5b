//! Credential primitives library
//!
//! Provides the cryptographic building blocks for the account engine:
//! - Password hashing (PBKDF2-HMAC-SHA256, salt embedded in the stored value)
//! - JWT access-token encoding and validation (HS256)
//!
//! The engine defines its own ports and claim layout on top of these
//! primitives; this crate stays free of persistence and account logic.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::new();
//! let hash = hasher.hash("my_password").unwrap();
//! let is_valid = hasher.verify("my_password", &hash).unwrap();
//! assert!(is_valid);
//! ```
//!
//! ## JWT Tokens
//! ```
//! use auth::{JwtHandler, Claims};
//! use chrono::{Duration, Utc};
//!
//! let handler = JwtHandler::new(b"secret_key_at_least_32_bytes_long!");
//! let claims = Claims::new()
//!     .with_subject("42")
//!     .with_expiration((Utc::now() + Duration::minutes(30)).timestamp());
//! let token = handler.encode(&claims).unwrap();
//! let decoded: Claims = handler.decode(&token).unwrap();
//! ```

pub mod jwt;
pub mod password;

// Re-export commonly used items
pub use jwt::Claims;
pub use jwt::JwtError;
pub use jwt::JwtHandler;
pub use password::PasswordError;
pub use password::PasswordHasher;
