//! RS256 session token issuance and verification.
//!
//! The issuer is built once at startup from an RSA private key and shared
//! read-only afterwards. Verification is pinned to RS256: a token whose header
//! names any other algorithm is rejected before its signature is looked at.
//! Every token carries its [`TokenKind`] as the audience; [`SessionIssuer::verify_session`]
//! accepts only session tokens.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use thiserror::Error;

use crate::claims::{SessionClaims, TokenKind, TokenValidationError, validate_claims};

const ALGORITHM: Algorithm = Algorithm::RS256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid RSA private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid RSA public key: {0}")]
    InvalidPublicKey(String),

    #[error("key generation failed: {0}")]
    Generation(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("refusing to sign, expiry not in the future: {0}")]
    ExpiryNotInFuture(#[from] TokenValidationError),

    #[error("signing key unusable: {0}")]
    Key(String),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed token")]
    MalformedToken,

    #[error("invalid token signature")]
    SignatureInvalid,

    #[error("token expired")]
    Expired,

    #[error("token is not of the expected kind")]
    WrongKind,
}

pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    any_kind: Validation,
    session_only: Validation,
}

impl core::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("algorithm", &ALGORITHM)
            .field("leeway_secs", &self.any_kind.leeway)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    /// Load a PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`) PEM.
    ///
    /// The verification key is derived from the private key.
    pub fn from_private_key_pem(pem: &str) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;

        let private_der = private
            .to_pkcs1_der()
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
        let public_der = private
            .to_public_key()
            .to_pkcs1_der()
            .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;

        Ok(Self {
            encoding: EncodingKey::from_rsa_der(private_der.as_bytes()),
            decoding: DecodingKey::from_rsa_der(public_der.as_bytes()),
            any_kind: pinned_validation(0, &[TokenKind::Session, TokenKind::Scoped]),
            session_only: pinned_validation(0, &[TokenKind::Session]),
        })
    }

    /// Verify against an explicitly supplied public key instead of the derived one.
    pub fn with_public_key_pem(mut self, pem: &str) -> Result<Self, KeyError> {
        self.decoding = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;
        Ok(self)
    }

    /// Clock skew tolerated on `exp`, in seconds.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.any_kind = pinned_validation(leeway_secs, &[TokenKind::Session, TokenKind::Scoped]);
        self.session_only = pinned_validation(leeway_secs, &[TokenKind::Session]);
        self
    }

    pub fn sign(&self, claims: &SessionClaims) -> Result<String, SigningError> {
        self.sign_at(claims, Utc::now())
    }

    /// Sign `claims`, refusing any whose expiry is not after `now`.
    pub fn sign_at(&self, claims: &SessionClaims, now: DateTime<Utc>) -> Result<String, SigningError> {
        validate_claims(claims, now)?;
        jsonwebtoken::encode(&Header::new(ALGORITHM), claims, &self.encoding)
            .map_err(|e| SigningError::Key(e.to_string()))
    }

    /// Verify a token of either kind.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, VerifyError> {
        self.decode(token, &self.any_kind)
    }

    /// Verify a central session token; scoped tokens are `WrongKind`.
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims, VerifyError> {
        self.decode(token, &self.session_only)
    }

    fn decode(&self, token: &str, validation: &Validation) -> Result<SessionClaims, VerifyError> {
        let result = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, validation)
            .map(|data| data.claims)
            .map_err(|e| classify(e.kind()));

        if let Err(kind) = &result {
            tracing::warn!(reason = %kind, "session token rejected");
        }
        result
    }
}

fn pinned_validation(leeway_secs: u64, kinds: &[TokenKind]) -> Validation {
    let mut validation = Validation::new(ALGORITHM);
    validation.leeway = leeway_secs;
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "sub", "aud"]);
    validation.set_audience(&kinds.iter().map(|kind| kind.as_str()).collect::<Vec<_>>());
    validation
}

fn classify(kind: &ErrorKind) -> VerifyError {
    match kind {
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            VerifyError::SignatureInvalid
        }
        ErrorKind::InvalidAudience => VerifyError::WrongKind,
        _ => VerifyError::MalformedToken,
    }
}

/// Generate a fresh RSA private key, PKCS#1 PEM encoded.
pub fn generate_private_key_pem(bits: usize) -> Result<String, KeyError> {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    let pem = key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    Ok(pem.to_string())
}
