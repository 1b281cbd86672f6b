//! LDAP result codes and result-bearing response payloads.

use crate::ber::{self, BerTag, RawElement};
use crate::error::{ErrorKind, LdapError};
use crate::message::Encodable;
use crate::oid;

/// An RFC 4511 result code. Modeled as a newtype rather than an enum so
/// codes from future extensions survive a decode/encode round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);
    pub const OPERATIONS_ERROR: ResultCode = ResultCode(1);
    pub const PROTOCOL_ERROR: ResultCode = ResultCode(2);
    pub const TIME_LIMIT_EXCEEDED: ResultCode = ResultCode(3);
    pub const SIZE_LIMIT_EXCEEDED: ResultCode = ResultCode(4);
    pub const COMPARE_FALSE: ResultCode = ResultCode(5);
    pub const COMPARE_TRUE: ResultCode = ResultCode(6);
    pub const AUTH_METHOD_NOT_SUPPORTED: ResultCode = ResultCode(7);
    pub const STRONGER_AUTH_REQUIRED: ResultCode = ResultCode(8);
    // 9 reserved
    pub const REFERRAL: ResultCode = ResultCode(10);
    pub const ADMIN_LIMIT_EXCEEDED: ResultCode = ResultCode(11);
    pub const UNAVAILABLE_CRITICAL_EXTENSION: ResultCode = ResultCode(12);
    pub const CONFIDENTIALITY_REQUIRED: ResultCode = ResultCode(13);
    pub const SASL_BIND_IN_PROGRESS: ResultCode = ResultCode(14);
    pub const NO_SUCH_ATTRIBUTE: ResultCode = ResultCode(16);
    pub const UNDEFINED_ATTRIBUTE_TYPE: ResultCode = ResultCode(17);
    pub const INAPPROPRIATE_MATCHING: ResultCode = ResultCode(18);
    pub const CONSTRAINT_VIOLATION: ResultCode = ResultCode(19);
    pub const ATTRIBUTE_OR_VALUE_EXISTS: ResultCode = ResultCode(20);
    pub const INVALID_ATTRIBUTE_SYNTAX: ResultCode = ResultCode(21);
    // 22-31 unused
    pub const NO_SUCH_OBJECT: ResultCode = ResultCode(32);
    pub const ALIAS_PROBLEM: ResultCode = ResultCode(33);
    pub const INVALID_DN_SYNTAX: ResultCode = ResultCode(34);
    // 35 reserved
    pub const ALIAS_DEREFERENCING_PROBLEM: ResultCode = ResultCode(36);
    // 37-47 unused
    pub const INAPPROPRIATE_AUTHENTICATION: ResultCode = ResultCode(48);
    pub const INVALID_CREDENTIALS: ResultCode = ResultCode(49);
    pub const INSUFFICIENT_ACCESS_RIGHTS: ResultCode = ResultCode(50);
    pub const BUSY: ResultCode = ResultCode(51);
    pub const UNAVAILABLE: ResultCode = ResultCode(52);
    pub const UNWILLING_TO_PERFORM: ResultCode = ResultCode(53);
    pub const LOOP_DETECT: ResultCode = ResultCode(54);
    // 55-63 unused
    pub const NAMING_VIOLATION: ResultCode = ResultCode(64);
    pub const OBJECT_CLASS_VIOLATION: ResultCode = ResultCode(65);
    pub const NOT_ALLOWED_ON_NON_LEAF: ResultCode = ResultCode(66);
    pub const NOT_ALLOWED_ON_RDN: ResultCode = ResultCode(67);
    pub const ENTRY_ALREADY_EXISTS: ResultCode = ResultCode(68);
    pub const OBJECT_CLASS_MODS_PROHIBITED: ResultCode = ResultCode(69);
    // 70 reserved
    pub const AFFECTS_MULTIPLE_DSAS: ResultCode = ResultCode(71);
    // 72-79 unused
    pub const OTHER: ResultCode = ResultCode(80);

    /// Build an [`LdapResult`] with this code and a diagnostic message.
    pub fn as_result(self, diagnostic_message: impl Into<String>) -> LdapResult {
        LdapResult {
            result_code: self,
            matched_dn: String::new(),
            diagnostic_message: diagnostic_message.into(),
            referral: Vec::new(),
        }
    }
}

/// LDAPResult ::= SEQUENCE {
///     resultCode         ENUMERATED { ... },
///     matchedDN          LDAPDN,
///     diagnosticMessage  LDAPString,
///     referral           [3] Referral OPTIONAL }
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LdapResult {
    pub result_code: ResultCode,
    pub matched_dn: String,
    pub diagnostic_message: String,
    pub referral: Vec<String>,
}

impl Default for ResultCode {
    fn default() -> Self {
        ResultCode::SUCCESS
    }
}

impl LdapResult {
    /// Result sent when a request cannot be understood.
    pub fn protocol_error() -> LdapResult {
        ResultCode::PROTOCOL_ERROR.as_result("the server could not understand the request")
    }

    /// Result sent for requests the server does not support.
    pub fn unwilling_to_perform() -> LdapResult {
        ResultCode::UNWILLING_TO_PERFORM
            .as_result("the operation requested is not supported by the server")
    }

    /// Result sent when the client lacks access to the target.
    pub fn insufficient_access_rights() -> LdapResult {
        ResultCode::INSUFFICIENT_ACCESS_RIGHTS
            .as_result("client has insufficient access rights to the requested resource")
    }

    /// Decode a result from op payload bytes.
    pub fn decode(data: &[u8]) -> Result<LdapResult, LdapError> {
        let seq = ber::get_sequence(data)?;
        let (result, consumed) = parse_result_members(&seq)?;
        if consumed != seq.len() {
            return Err(
                ErrorKind::WrongSequenceLength.with_info("LDAPResult sequence length", seq.len())
            );
        }
        Ok(result)
    }
}

/// Parse the shared LDAPResult members off the front of a decoded
/// sequence, returning how many elements were consumed. Response types
/// that extend LDAPResult (BindResult, ExtendedResult) continue from
/// there.
fn parse_result_members(seq: &[RawElement]) -> Result<(LdapResult, usize), LdapError> {
    if seq.len() < 3 {
        return Err(ErrorKind::WrongSequenceLength.with_info("LDAPResult sequence length", seq.len()));
    }
    if seq[0].tag != BerTag::ENUMERATED {
        return Err(ErrorKind::WrongElementType.with_info("LDAPResult result code type", seq[0].tag));
    }
    let code = ber::get_enumerated(&seq[0].data)?;
    let code = u32::try_from(code)
        .map_err(|_| ErrorKind::IntegerTooLarge.with_info("LDAPResult result code", code))?;
    if seq[1].tag != BerTag::OCTET_STRING {
        return Err(ErrorKind::WrongElementType.with_info("LDAPResult matched DN type", seq[1].tag));
    }
    let matched_dn = ber::get_string(&seq[1].data);
    if seq[2].tag != BerTag::OCTET_STRING {
        return Err(ErrorKind::WrongElementType
            .with_info("LDAPResult diagnostic message type", seq[2].tag));
    }
    let diagnostic_message = ber::get_string(&seq[2].data);

    let mut referral = Vec::new();
    let mut consumed = 3;
    if seq.len() > 3
        && seq[3].tag.class() == BerTag::CLASS_CONTEXT_SPECIFIC
        && seq[3].tag.tag_number() == 3
    {
        for uri in ber::get_sequence(&seq[3].data)? {
            referral.push(ber::get_string(&uri.data));
        }
        consumed = 4;
    }
    Ok((
        LdapResult {
            result_code: ResultCode(code),
            matched_dn,
            diagnostic_message,
            referral,
        },
        consumed,
    ))
}

impl Encodable for LdapResult {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&ber::encode_enumerated(i64::from(self.result_code.0)));
        out.extend_from_slice(&ber::encode_octet_string(self.matched_dn.as_bytes()));
        out.extend_from_slice(&ber::encode_octet_string(self.diagnostic_message.as_bytes()));
        if !self.referral.is_empty() {
            let mut referrals = Vec::new();
            for uri in &self.referral {
                referrals.extend_from_slice(&ber::encode_octet_string(uri.as_bytes()));
            }
            out.extend_from_slice(&ber::encode_element(
                BerTag::context_specific(3, true),
                &referrals,
            ));
        }
        out
    }
}

/// BindResult ::= [APPLICATION 1] SEQUENCE {
///     COMPONENTS OF LDAPResult,
///     serverSaslCreds    [7] OCTET STRING OPTIONAL }
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindResult {
    pub result: LdapResult,
    pub server_sasl_creds: Option<Vec<u8>>,
}

impl BindResult {
    pub fn decode(data: &[u8]) -> Result<BindResult, LdapError> {
        let seq = ber::get_sequence(data)?;
        let (result, mut consumed) = parse_result_members(&seq)?;
        let mut server_sasl_creds = None;
        if consumed < seq.len() {
            let creds = &seq[consumed];
            if creds.tag != BerTag::context_specific(7, false) {
                return Err(ErrorKind::WrongElementType
                    .with_info("BindResult serverSaslCreds type", creds.tag));
            }
            server_sasl_creds = Some(ber::get_octet_string(&creds.data));
            consumed += 1;
        }
        if consumed != seq.len() {
            return Err(
                ErrorKind::WrongSequenceLength.with_info("BindResult sequence length", seq.len())
            );
        }
        Ok(BindResult {
            result,
            server_sasl_creds,
        })
    }
}

impl Encodable for BindResult {
    fn encode(&self) -> Vec<u8> {
        let mut out = self.result.encode();
        if let Some(creds) = &self.server_sasl_creds {
            out.extend_from_slice(&ber::encode_element(BerTag::context_specific(7, false), creds));
        }
        out
    }
}

/// ExtendedResponse ::= [APPLICATION 24] SEQUENCE {
///     COMPONENTS OF LDAPResult,
///     responseName     [10] LDAPOID OPTIONAL,
///     responseValue    [11] OCTET STRING OPTIONAL }
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtendedResult {
    pub result: LdapResult,
    pub response_name: Option<String>,
    pub response_value: Option<Vec<u8>>,
}

impl ExtendedResult {
    pub fn decode(data: &[u8]) -> Result<ExtendedResult, LdapError> {
        let seq = ber::get_sequence(data)?;
        let (result, mut consumed) = parse_result_members(&seq)?;
        let mut response_name = None;
        let mut response_value = None;
        if consumed < seq.len() && seq[consumed].tag == BerTag::context_specific(10, false) {
            let name = ber::get_string(&seq[consumed].data);
            oid::validate(&name)?;
            response_name = Some(name);
            consumed += 1;
        }
        if consumed < seq.len() && seq[consumed].tag == BerTag::context_specific(11, false) {
            response_value = Some(ber::get_octet_string(&seq[consumed].data));
            consumed += 1;
        }
        if consumed != seq.len() {
            return Err(ErrorKind::WrongElementType
                .with_info("ExtendedResponse member type", seq[consumed].tag));
        }
        Ok(ExtendedResult {
            result,
            response_name,
            response_value,
        })
    }
}

impl Encodable for ExtendedResult {
    fn encode(&self) -> Vec<u8> {
        let mut out = self.result.encode();
        if let Some(name) = &self.response_name {
            out.extend_from_slice(&ber::encode_element(
                BerTag::context_specific(10, false),
                name.as_bytes(),
            ));
        }
        if let Some(value) = &self.response_value {
            out.extend_from_slice(&ber::encode_element(
                BerTag::context_specific(11, false),
                value,
            ));
        }
        out
    }
}

/// IntermediateResponse ::= [APPLICATION 25] SEQUENCE {
///     responseName     [0] LDAPOID OPTIONAL,
///     responseValue    [1] OCTET STRING OPTIONAL }
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntermediateResponse {
    pub name: Option<String>,
    pub value: Option<Vec<u8>>,
}

impl IntermediateResponse {
    pub fn decode(data: &[u8]) -> Result<IntermediateResponse, LdapError> {
        let seq = ber::get_sequence(data)?;
        let mut name = None;
        let mut value = None;
        let mut consumed = 0;
        if consumed < seq.len() && seq[consumed].tag == BerTag::context_specific(0, false) {
            name = Some(ber::get_string(&seq[consumed].data));
            consumed += 1;
        }
        if consumed < seq.len() && seq[consumed].tag == BerTag::context_specific(1, false) {
            value = Some(ber::get_octet_string(&seq[consumed].data));
            consumed += 1;
        }
        if consumed != seq.len() {
            return Err(ErrorKind::WrongElementType
                .with_info("IntermediateResponse member type", seq[consumed].tag));
        }
        Ok(IntermediateResponse { name, value })
    }
}

impl Encodable for IntermediateResponse {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(name) = &self.name {
            out.extend_from_slice(&ber::encode_element(
                BerTag::context_specific(0, false),
                name.as_bytes(),
            ));
        }
        if let Some(value) = &self.value {
            out.extend_from_slice(&ber::encode_element(
                BerTag::context_specific(1, false),
                value,
            ));
        }
        out
    }
}
