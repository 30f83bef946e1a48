//! `tollgate-auth` — session credentials and authorization rules.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod capability;
pub mod claims;
pub mod issuer;
pub mod password;
pub mod roles;

pub use authorize::{AuthzError, authorize};
pub use capability::Capability;
pub use claims::{ExpiryPolicy, SessionClaims, TokenKind, TokenValidationError, validate_claims};
pub use issuer::{KeyError, SessionIssuer, SigningError, VerifyError, generate_private_key_pem};
pub use password::{PasswordError, hash_password, verify_password};
pub use roles::Role;
