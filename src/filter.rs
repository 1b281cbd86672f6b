//! Search filter tree: decoding, encoding and the RFC 4515 string form.
//!
//! ```text
//! Filter ::= CHOICE {
//!     and             [0] SET SIZE (1..MAX) OF filter Filter,
//!     or              [1] SET SIZE (1..MAX) OF filter Filter,
//!     not             [2] Filter,
//!     equalityMatch   [3] AttributeValueAssertion,
//!     substrings      [4] SubstringFilter,
//!     greaterOrEqual  [5] AttributeValueAssertion,
//!     lessOrEqual     [6] AttributeValueAssertion,
//!     present         [7] AttributeDescription,
//!     approxMatch     [8] AttributeValueAssertion,
//!     extensibleMatch [9] MatchingRuleAssertion,
//!     ...  }
//! ```

use std::fmt;

use crate::ber::{self, BerTag, RawElement};
use crate::error::{ErrorKind, LdapError};
use crate::proto::AttributeValueAssertion;

/// SubstringFilter ::= SEQUENCE {
///     type           AttributeDescription,
///     substrings     SEQUENCE SIZE (1..MAX) OF substring CHOICE {
///         initial [0] AssertionValue,  -- can occur at most once
///         any     [1] AssertionValue,
///         final   [2] AssertionValue } -- can occur at most once
///     }
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubstringFilter {
    pub attribute: String,
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub final_: Option<Vec<u8>>,
}

/// MatchingRuleAssertion ::= SEQUENCE {
///     matchingRule    [1] MatchingRuleId OPTIONAL,
///     type            [2] AttributeDescription OPTIONAL,
///     matchValue      [3] AssertionValue,
///     dnAttributes    [4] BOOLEAN DEFAULT FALSE }
///
/// At least one of matchingRule and type must be present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchingRuleAssertion {
    pub matching_rule: Option<String>,
    pub attribute: Option<String>,
    pub value: Vec<u8>,
    pub dn_attributes: bool,
}

/// A decoded search filter. The empty and/or forms are surfaced as the
/// distinct absolute-true and absolute-false sentinels. Context tags
/// beyond 9 are preserved raw for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal(AttributeValueAssertion),
    Substrings(SubstringFilter),
    GreaterOrEqual(AttributeValueAssertion),
    LessOrEqual(AttributeValueAssertion),
    Present(String),
    ApproxMatch(AttributeValueAssertion),
    ExtensibleMatch(MatchingRuleAssertion),
    AbsoluteTrue,
    AbsoluteFalse,
    Raw(RawElement),
}

impl Filter {
    /// Decode a filter from its raw element.
    pub fn decode(raw: &RawElement) -> Result<Filter, LdapError> {
        if raw.tag.class() != BerTag::CLASS_CONTEXT_SPECIFIC {
            return Err(ErrorKind::WrongElementType.with_info("Filter type", raw.tag));
        }
        match raw.tag.tag_number() {
            0 => {
                let children = decode_children(&raw.data)?;
                if children.is_empty() {
                    Ok(Filter::AbsoluteTrue)
                } else {
                    Ok(Filter::And(children))
                }
            }
            1 => {
                let children = decode_children(&raw.data)?;
                if children.is_empty() {
                    Ok(Filter::AbsoluteFalse)
                } else {
                    Ok(Filter::Or(children))
                }
            }
            2 => {
                let mut cursor = raw.data.as_slice();
                let inner = ber::read_element(&mut cursor)?;
                if !cursor.is_empty() {
                    return Err(ErrorKind::WrongSequenceLength
                        .with_info("Not filter trailing bytes", cursor.len()));
                }
                Ok(Filter::Not(Box::new(Filter::decode(&inner)?)))
            }
            3 => Ok(Filter::Equal(AttributeValueAssertion::decode(&raw.data)?)),
            4 => Ok(Filter::Substrings(decode_substrings(&raw.data)?)),
            5 => Ok(Filter::GreaterOrEqual(AttributeValueAssertion::decode(&raw.data)?)),
            6 => Ok(Filter::LessOrEqual(AttributeValueAssertion::decode(&raw.data)?)),
            7 => Ok(Filter::Present(ber::get_string(&raw.data))),
            8 => Ok(Filter::ApproxMatch(AttributeValueAssertion::decode(&raw.data)?)),
            9 => Ok(Filter::ExtensibleMatch(decode_matching_rule_assertion(&raw.data)?)),
            _ => Ok(Filter::Raw(raw.clone())),
        }
    }

    /// BER-encode the filter, element header included.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Filter::And(children) => encode_children(0, children),
            Filter::Or(children) => encode_children(1, children),
            Filter::Not(child) => {
                ber::encode_element(BerTag::context_specific(2, true), &child.encode())
            }
            Filter::Equal(ava) => encode_assertion(3, ava),
            Filter::Substrings(sf) => {
                let mut items = Vec::new();
                if let Some(initial) = &sf.initial {
                    items.extend_from_slice(&ber::encode_element(
                        BerTag::context_specific(0, false),
                        initial,
                    ));
                }
                for any in &sf.any {
                    items.extend_from_slice(&ber::encode_element(
                        BerTag::context_specific(1, false),
                        any,
                    ));
                }
                if let Some(final_) = &sf.final_ {
                    items.extend_from_slice(&ber::encode_element(
                        BerTag::context_specific(2, false),
                        final_,
                    ));
                }
                let mut data = ber::encode_octet_string(sf.attribute.as_bytes());
                data.extend_from_slice(&ber::encode_sequence(&items));
                ber::encode_element(BerTag::context_specific(4, true), &data)
            }
            Filter::GreaterOrEqual(ava) => encode_assertion(5, ava),
            Filter::LessOrEqual(ava) => encode_assertion(6, ava),
            Filter::Present(attribute) => {
                ber::encode_element(BerTag::context_specific(7, false), attribute.as_bytes())
            }
            Filter::ApproxMatch(ava) => encode_assertion(8, ava),
            Filter::ExtensibleMatch(m) => {
                let mut data = Vec::new();
                if let Some(rule) = &m.matching_rule {
                    data.extend_from_slice(&ber::encode_element(
                        BerTag::context_specific(1, false),
                        rule.as_bytes(),
                    ));
                }
                if let Some(attribute) = &m.attribute {
                    data.extend_from_slice(&ber::encode_element(
                        BerTag::context_specific(2, false),
                        attribute.as_bytes(),
                    ));
                }
                data.extend_from_slice(&ber::encode_element(
                    BerTag::context_specific(3, false),
                    &m.value,
                ));
                if m.dn_attributes {
                    data.extend_from_slice(&ber::encode_element(
                        BerTag::context_specific(4, false),
                        &[0xff],
                    ));
                }
                ber::encode_element(BerTag::context_specific(9, true), &data)
            }
            Filter::AbsoluteTrue => ber::encode_element(BerTag::context_specific(0, true), &[]),
            Filter::AbsoluteFalse => ber::encode_element(BerTag::context_specific(1, true), &[]),
            Filter::Raw(raw) => ber::encode_element(raw.tag, &raw.data),
        }
    }
}

fn decode_children(data: &[u8]) -> Result<Vec<Filter>, LdapError> {
    let mut children = Vec::new();
    for raw in ber::get_set(data)? {
        children.push(Filter::decode(&raw)?);
    }
    Ok(children)
}

fn encode_children(tag_number: u8, children: &[Filter]) -> Vec<u8> {
    let mut data = Vec::new();
    for child in children {
        data.extend_from_slice(&child.encode());
    }
    ber::encode_element(BerTag::context_specific(tag_number, true), &data)
}

fn encode_assertion(tag_number: u8, ava: &AttributeValueAssertion) -> Vec<u8> {
    ber::encode_element(BerTag::context_specific(tag_number, true), &ava.encode_members())
}

fn decode_substrings(data: &[u8]) -> Result<SubstringFilter, LdapError> {
    let seq = ber::get_sequence(data)?;
    if seq.len() != 2 {
        return Err(
            ErrorKind::WrongSequenceLength.with_info("SubstringFilter sequence length", seq.len())
        );
    }
    if seq[0].tag != BerTag::OCTET_STRING {
        return Err(ErrorKind::WrongElementType.with_info("SubstringFilter type type", seq[0].tag));
    }
    let mut sf = SubstringFilter {
        attribute: ber::get_string(&seq[0].data),
        ..Default::default()
    };
    if seq[1].tag != BerTag::SEQUENCE {
        return Err(
            ErrorKind::WrongElementType.with_info("SubstringFilter substrings type", seq[1].tag)
        );
    }
    let items = ber::get_sequence(&seq[1].data)?;
    for (i, item) in items.iter().enumerate() {
        if item.tag.class() != BerTag::CLASS_CONTEXT_SPECIFIC {
            return Err(
                ErrorKind::WrongElementType.with_info("SubstringFilter substring type", item.tag)
            );
        }
        match item.tag.tag_number() {
            0 => {
                // initial may appear at most once, and only first.
                if sf.initial.is_some() || i != 0 {
                    return Err(ErrorKind::WrongElementType
                        .with_info("SubstringFilter initial position", i));
                }
                sf.initial = Some(ber::get_octet_string(&item.data));
            }
            1 => {
                if sf.final_.is_some() {
                    return Err(ErrorKind::WrongElementType
                        .with_info("SubstringFilter any after final", i));
                }
                sf.any.push(ber::get_octet_string(&item.data));
            }
            2 => {
                if sf.final_.is_some() {
                    return Err(ErrorKind::WrongElementType
                        .with_info("Multiple final substrings", ber::get_string(&item.data)));
                }
                sf.final_ = Some(ber::get_octet_string(&item.data));
            }
            _ => {
                return Err(ErrorKind::WrongElementType
                    .with_info("SubstringFilter substring type", item.tag))
            }
        }
    }
    Ok(sf)
}

fn decode_matching_rule_assertion(data: &[u8]) -> Result<MatchingRuleAssertion, LdapError> {
    let seq = ber::get_sequence(data)?;
    let mut m = MatchingRuleAssertion::default();
    let mut i = 0;
    if seq.len() > i && seq[i].tag == BerTag::context_specific(1, false) {
        m.matching_rule = Some(ber::get_string(&seq[i].data));
        i += 1;
    }
    if seq.len() > i && seq[i].tag == BerTag::context_specific(2, false) {
        m.attribute = Some(ber::get_string(&seq[i].data));
        i += 1;
    }
    if m.matching_rule.is_none() && m.attribute.is_none() {
        return Err(ErrorKind::WrongSequenceLength
            .with_info("MatchingRuleAssertion", "matchingRule and type both absent"));
    }
    if seq.len() <= i || seq.len() > i + 2 {
        return Err(ErrorKind::WrongSequenceLength
            .with_info("MatchingRuleAssertion sequence length", seq.len()));
    }
    if seq[i].tag != BerTag::context_specific(3, false) {
        return Err(ErrorKind::WrongElementType
            .with_info("MatchingRuleAssertion matchValue type", seq[i].tag));
    }
    m.value = ber::get_octet_string(&seq[i].data);
    i += 1;
    if i < seq.len() {
        if seq[i].tag != BerTag::context_specific(4, false) {
            return Err(ErrorKind::WrongElementType
                .with_info("MatchingRuleAssertion dnAttributes type", seq[i].tag));
        }
        m.dn_attributes = ber::get_boolean(&seq[i].data)?;
    }
    Ok(m)
}

/// Escape an assertion value for the RFC 4515 string form.
fn escape_value(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\x00', "\\00")
}

impl fmt::Display for Filter {
    /// RFC 4515 string form, e.g. `(&(objectClass=person)(uid=jdoe))`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(children) => {
                f.write_str("(&")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            Filter::Or(children) => {
                f.write_str("(|")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            Filter::Not(child) => write!(f, "(!{})", child),
            Filter::Equal(ava) => {
                write!(f, "({}={})", ava.description, escape_value(&ava.value))
            }
            Filter::Substrings(sf) => {
                write!(f, "({}=", sf.attribute)?;
                let mut segments = Vec::with_capacity(sf.any.len() + 2);
                segments.push(sf.initial.as_deref().map(escape_value).unwrap_or_default());
                for any in &sf.any {
                    segments.push(escape_value(any));
                }
                segments.push(sf.final_.as_deref().map(escape_value).unwrap_or_default());
                write!(f, "{})", segments.join("*"))
            }
            Filter::GreaterOrEqual(ava) => {
                write!(f, "({}>={})", ava.description, escape_value(&ava.value))
            }
            Filter::LessOrEqual(ava) => {
                write!(f, "({}<={})", ava.description, escape_value(&ava.value))
            }
            Filter::Present(attribute) => write!(f, "({}=*)", attribute),
            Filter::ApproxMatch(ava) => {
                write!(f, "({}~={})", ava.description, escape_value(&ava.value))
            }
            Filter::ExtensibleMatch(m) => {
                f.write_str("(")?;
                if let Some(attribute) = &m.attribute {
                    f.write_str(attribute)?;
                }
                if m.dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = &m.matching_rule {
                    write!(f, ":{}", rule)?;
                }
                write!(f, ":={})", escape_value(&m.value))
            }
            Filter::AbsoluteTrue => f.write_str("(&)"),
            Filter::AbsoluteFalse => f.write_str("(|)"),
            Filter::Raw(raw) => write!(f, "(<unparsed filter {}>)", raw.tag),
        }
    }
}
