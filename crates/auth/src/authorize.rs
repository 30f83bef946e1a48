use thiserror::Error;

use crate::{Capability, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthorized: missing capability '{0}'")]
    Unauthorized(String),
}

/// Decide whether a resolved role set carries a capability.
///
/// - No IO
/// - No panics
/// - An empty role set never authorizes anything
pub fn authorize(roles: &[Role], required: &Capability) -> Result<(), AuthzError> {
    if required.is_granted_by(roles) {
        Ok(())
    } else {
        Err(AuthzError::Unauthorized(required.as_str().to_string()))
    }
}
