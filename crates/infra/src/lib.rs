//! Infrastructure layer: config, directories, ticket storage, handoff orchestration.

pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod sso;
pub mod tickets;

pub use config::TollgateConfig;
pub use sso::{HandoffRedirect, IssuedSession, ScopedToken, SsoError, SsoOrchestrator};
