use std::borrow::Cow;

use crate::Role;

/// A named privilege an operation requires.
///
/// Each capability names the role that grants it. Role resolution stays
/// capability-agnostic; this is the only place the mapping lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability {
    name: Cow<'static, str>,
    granted_by: Role,
}

impl Capability {
    /// Manage users, role assignments and registered applications.
    pub const ADMINISTRATOR: Capability = Capability {
        name: Cow::Borrowed("administrator"),
        granted_by: Role::ADMIN,
    };

    pub fn new(name: impl Into<Cow<'static, str>>, granted_by: Role) -> Self {
        Self {
            name: name.into(),
            granted_by,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn is_granted_by(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| role == &self.granted_by)
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}
