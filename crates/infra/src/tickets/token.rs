use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;

/// Length of an exchange ticket token.
pub const TICKET_TOKEN_LEN: usize = 32;

/// Length of a generated application key.
pub const APP_KEY_LEN: usize = 20;

/// `len` characters drawn uniformly from `[0-9A-Za-z]` using the OS CSPRNG.
pub fn random_alphanumeric(len: usize) -> String {
    OsRng.sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

/// Opaque ticket token handed to the browser.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TicketToken(String);

impl TicketToken {
    pub fn generate() -> Self {
        Self(random_alphanumeric(TICKET_TOKEN_LEN))
    }

    /// Cheap shape check before touching storage.
    pub fn is_well_formed(raw: &str) -> bool {
        raw.len() == TICKET_TOKEN_LEN && raw.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TicketToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::fmt::Debug for TicketToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "TicketToken({}…)", &self.0[..4.min(self.0.len())])
    }
}
