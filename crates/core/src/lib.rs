//! `tollgate-core` — identity and application building blocks.
//!
//! This crate contains **pure** value types shared by the authority (no IO).

pub mod application;
pub mod error;
pub mod id;
pub mod identity;

pub use application::{AppKey, Origin, RegisteredApplication, parse_redirect_target};
pub use error::{DomainError, DomainResult};
pub use id::{ApplicationId, RoleId, UserId};
pub use identity::UserIdentity;
