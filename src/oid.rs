//! Numeric OID validation and well-known OIDs.
//!
//! LDAPOID ::= OCTET STRING -- Constrained to <numericoid> [RFC4512]
//! numericoid = number 1*( DOT number )

use crate::error::{ErrorKind, LdapError};

/// StartTLS extended operation (RFC 4511).
pub const START_TLS: &str = "1.3.6.1.4.1.1466.20037";
/// Notice of Disconnection unsolicited notification (RFC 4511).
pub const NOTICE_OF_DISCONNECTION: &str = "1.3.6.1.4.1.1466.20036";
/// Password Modify extended operation (RFC 3062).
pub const PASSWORD_MODIFY: &str = "1.3.6.1.4.1.4203.1.11.1";
/// "Who am I?" extended operation (RFC 4532).
pub const WHO_AM_I: &str = "1.3.6.1.4.1.4203.1.11.3";

/// Make sure the OID conforms to the numericoid grammar.
pub fn validate(oid: &str) -> Result<(), LdapError> {
    let valid = !oid.is_empty()
        && oid
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        Err(ErrorKind::InvalidOid.with_info("oid", oid))
    }
}
