//! Decode and protocol errors raised by the framework.

use std::fmt;

use thiserror::Error;

/// Classification of framework-internal failures.
///
/// Everything here is either a BER/LDAP decoding problem or a TLS state
/// problem on the connection. LDAP result codes sent on the wire are a
/// separate plane, see [`crate::result::ResultCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    IntegerTooLarge,
    InvalidBoolean,
    InvalidLdapMessage,
    InvalidMessageId,
    InvalidOid,
    TlsAlreadySetUp,
    TlsNotAvailable,
    TlsClientHello,
    WrongElementType,
    WrongSequenceLength,
}

impl ErrorKind {
    fn message(self) -> &'static str {
        match self {
            ErrorKind::IntegerTooLarge => "integer too large",
            ErrorKind::InvalidBoolean => "invalid boolean data",
            ErrorKind::InvalidLdapMessage => "invalid LDAP message",
            ErrorKind::InvalidMessageId => "invalid message ID",
            ErrorKind::InvalidOid => "invalid OID",
            ErrorKind::TlsAlreadySetUp => "TLS already set up",
            ErrorKind::TlsNotAvailable => "TLS not available",
            ErrorKind::TlsClientHello => "TLS client hello against cleartext server",
            ErrorKind::WrongElementType => "wrong element type",
            ErrorKind::WrongSequenceLength => "wrong sequence length",
        }
    }

    /// Build an [`LdapError`] of this kind carrying a `key = value`
    /// diagnostic pair.
    pub fn with_info(self, key: &'static str, value: impl fmt::Display) -> LdapError {
        LdapError {
            kind: self,
            info: Some((key, value.to_string())),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Error type for decode and protocol failures.
///
/// Carries an [`ErrorKind`] plus an optional diagnostic pair naming the
/// offending field and its value, e.g.
/// `wrong element type: LDAPMessage messageID type = 0x04`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render(.kind, .info))]
pub struct LdapError {
    kind: ErrorKind,
    info: Option<(&'static str, String)>,
}

fn render(kind: &ErrorKind, info: &Option<(&'static str, String)>) -> String {
    match info {
        Some((key, value)) => format!("{}: {} = {}", kind, key, value),
        None => kind.to_string(),
    }
}

impl LdapError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The diagnostic pair, if one was attached.
    pub fn info(&self) -> Option<(&'static str, &str)> {
        self.info.as_ref().map(|(k, v)| (*k, v.as_str()))
    }
}

impl From<ErrorKind> for LdapError {
    fn from(kind: ErrorKind) -> Self {
        LdapError { kind, info: None }
    }
}

impl From<LdapError> for std::io::Error {
    fn from(e: LdapError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_info() {
        let err = LdapError::from(ErrorKind::InvalidBoolean);
        assert_eq!(err.to_string(), "invalid boolean data");
        assert_eq!(err.kind(), ErrorKind::InvalidBoolean);
        assert!(err.info().is_none());
    }

    #[test]
    fn test_display_with_info() {
        let err = ErrorKind::IntegerTooLarge.with_info("size length", 5);
        assert_eq!(err.to_string(), "integer too large: size length = 5");
        assert_eq!(err.kind(), ErrorKind::IntegerTooLarge);
        assert_eq!(err.info(), Some(("size length", "5")));
    }

    #[test]
    fn test_kind_matches_regardless_of_info() {
        let bare = LdapError::from(ErrorKind::WrongElementType);
        let with_info = ErrorKind::WrongElementType.with_info("tag", "0x16");
        assert_eq!(bare.kind(), with_info.kind());
        assert_ne!(bare, with_info);
    }

    #[test]
    fn test_io_error_conversion() {
        let err = ErrorKind::InvalidMessageId.with_info("LDAPMessage messageID", -1);
        let io_err: std::io::Error = err.into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::InvalidData);
    }
}
