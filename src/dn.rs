//! RFC 4514 distinguished names and structural predicates.
//!
//! A [`Dn`] is stored root-first: `uid=jdoe,ou=users,dc=example,dc=com`
//! parses to `[{dc=com}, {dc=example}, {ou=users}, {uid=jdoe}]`. The wire
//! string form is leaf-first, so parsing and formatting both reverse.

use std::fmt;
use std::str::FromStr;

use crate::ber::{self, BerTag};
use crate::error::{ErrorKind, LdapError};
use crate::oid;

/// One `type=value` pair within an RDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdnAttribute {
    pub attr_type: String,
    pub value: String,
}

/// A relative distinguished name: one or more attributes joined with `+`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rdn(pub Vec<RdnAttribute>);

/// A distinguished name as an ordered sequence of RDNs from root to leaf.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dn(pub Vec<Rdn>);

impl Dn {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when `child` is exactly one level below this DN.
    pub fn is_parent(&self, child: &Dn) -> bool {
        child.0.len() == self.0.len() + 1 && child.0[..self.0.len()] == self.0[..]
    }

    /// True when this DN is exactly one level below `parent`.
    pub fn is_child(&self, parent: &Dn) -> bool {
        parent.is_parent(self)
    }

    /// True when `inferior` is anywhere strictly below this DN.
    pub fn is_superior(&self, inferior: &Dn) -> bool {
        inferior.0.len() > self.0.len() && inferior.0[..self.0.len()] == self.0[..]
    }

    /// True when this DN is anywhere strictly below `superior`.
    pub fn is_subordinate(&self, superior: &Dn) -> bool {
        superior.is_superior(self)
    }

    /// True when both DNs have the same length and the same parent.
    pub fn is_sibling(&self, other: &Dn) -> bool {
        self.0.len() == other.0.len()
            && self.0[..self.0.len().saturating_sub(1)]
                == other.0[..other.0.len().saturating_sub(1)]
    }

    /// The deepest DN that is a prefix of both. Empty when either is
    /// empty or the roots differ.
    pub fn common_superior(&self, other: &Dn) -> Dn {
        let mut common = Vec::new();
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            if a != b {
                break;
            }
            common.push(a.clone());
        }
        Dn(common)
    }
}

impl FromStr for Dn {
    type Err = LdapError;

    fn from_str(s: &str) -> Result<Dn, LdapError> {
        let mut rdns = Vec::new();
        for rdn_str in split_unescaped(s, b',').into_iter().rev() {
            let mut attrs = Vec::new();
            for attr_str in split_unescaped(rdn_str, b'+') {
                let (attr_type, raw_value) = attr_str.split_once('=').ok_or_else(|| {
                    ErrorKind::InvalidLdapMessage.with_info("RDN attribute", attr_str.to_string())
                })?;
                attrs.push(RdnAttribute {
                    attr_type: attr_type.to_string(),
                    value: decode_attribute_value(raw_value)?,
                });
            }
            rdns.push(Rdn(attrs));
        }
        Ok(Dn(rdns))
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.0.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attr) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}", attr)?;
        }
        Ok(())
    }
}

impl fmt::Display for RdnAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if oid::validate(&self.attr_type).is_ok() {
            // Numeric-OID types carry a hex-encoded BER octet string.
            write!(f, "{}=#", self.attr_type)?;
            for b in ber::encode_octet_string(self.value.as_bytes()) {
                write!(f, "{:02X}", b)?;
            }
            Ok(())
        } else {
            write!(f, "{}={}", self.attr_type, escape_attribute_value(&self.value))
        }
    }
}

/// Split on an unescaped separator byte; a separator preceded by an odd
/// number of backslashes is part of the value.
fn split_unescaped(s: &str, sep: u8) -> Vec<&str> {
    if s.is_empty() {
        return Vec::new();
    }
    let bytes = s.as_bytes();
    let mut parts = Vec::with_capacity(1);
    let mut start = 0;
    for i in 0..bytes.len() {
        if bytes[i] == sep {
            let mut backslashes = 0;
            while backslashes < i - start && bytes[i - 1 - backslashes] == b'\\' {
                backslashes += 1;
            }
            if backslashes % 2 == 0 {
                parts.push(&s[start..i]);
                start = i + 1;
            }
        }
    }
    parts.push(&s[start..]);
    parts
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|v| v as u8)
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    Some(hex_digit(hi)? << 4 | hex_digit(lo)?)
}

/// Undo RFC 4514 escaping, or decode the `#`-prefixed hex form carrying a
/// BER octet string.
fn decode_attribute_value(s: &str) -> Result<String, LdapError> {
    if s.is_empty() {
        return Ok(String::new());
    }
    let bytes = s.as_bytes();
    if bytes[0] == b'#' {
        let hex = &bytes[1..];
        if hex.len() % 2 != 0 {
            return Err(
                ErrorKind::InvalidLdapMessage.with_info("hex-encoded RDN value", s.to_string())
            );
        }
        let mut buf = Vec::with_capacity(hex.len() / 2);
        for pair in hex.chunks_exact(2) {
            let b = hex_pair(pair[0], pair[1]).ok_or_else(|| {
                ErrorKind::InvalidLdapMessage.with_info("hex-encoded RDN value", s.to_string())
            })?;
            buf.push(b);
        }
        let mut cursor = buf.as_slice();
        let element = ber::read_element(&mut cursor)?;
        if element.tag != BerTag::OCTET_STRING {
            return Err(ErrorKind::WrongElementType.with_info("RDNAttribute type", element.tag));
        }
        return Ok(ber::get_string(&element.data));
    }

    let mut buf = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' {
            buf.push(b);
            i += 1;
            continue;
        }
        if i + 1 >= bytes.len() {
            // Dangling escape at the end of the value.
            break;
        }
        match bytes[i + 1] {
            c @ (b'"' | b'+' | b',' | b';' | b'<' | b'>' | b' ' | b'\\' | b'=' | b'#') => {
                buf.push(c);
                i += 2;
            }
            _ => {
                if i + 2 < bytes.len() {
                    if let Some(v) = hex_pair(bytes[i + 1], bytes[i + 2]) {
                        buf.push(v);
                        i += 3;
                        continue;
                    }
                }
                buf.push(b);
                i += 1;
            }
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn escape_attribute_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b' ' => {
                if i == 0 || i == bytes.len() - 1 {
                    out.extend_from_slice(b"\\ ");
                } else {
                    out.push(b);
                }
            }
            b'#' => {
                if i == 0 {
                    out.extend_from_slice(b"\\#");
                } else {
                    out.push(b);
                }
            }
            b'"' | b'+' | b',' | b';' | b'<' | b'>' | b'\\' | b'=' => {
                out.push(b'\\');
                out.push(b);
            }
            0x00..=0x1f | 0x7f => {
                out.extend_from_slice(format!("\\{:02X}", b).as_bytes());
            }
            _ => out.push(b),
        }
    }
    // Only ASCII escapes were inserted, so this stays valid UTF-8.
    String::from_utf8_lossy(&out).into_owned()
}
