//! Operation records: typed request and response payloads.
//!
//! Each record decodes from the protocol-op payload of a [`Message`] and
//! encodes back through [`Encodable`]. The element tag identifying the
//! operation lives on the envelope, see the `TAG_*` constants.
//!
//! [`Message`]: crate::message::Message
//! [`Encodable`]: crate::message::Encodable

use crate::ber::{self, BerTag, MAX_INT};
use crate::error::{ErrorKind, LdapError};
use crate::filter::Filter;
use crate::message::{Encodable, MessageId};
use crate::oid;

pub const TAG_BIND_REQUEST: BerTag = BerTag(0b0110_0000);
pub const TAG_BIND_RESPONSE: BerTag = BerTag(0b0110_0001);
pub const TAG_UNBIND_REQUEST: BerTag = BerTag(0b0100_0010);
pub const TAG_SEARCH_REQUEST: BerTag = BerTag(0b0110_0011);
pub const TAG_SEARCH_RESULT_ENTRY: BerTag = BerTag(0b0110_0100);
pub const TAG_SEARCH_RESULT_DONE: BerTag = BerTag(0b0110_0101);
pub const TAG_MODIFY_REQUEST: BerTag = BerTag(0b0110_0110);
pub const TAG_MODIFY_RESPONSE: BerTag = BerTag(0b0110_0111);
pub const TAG_ADD_REQUEST: BerTag = BerTag(0b0110_1000);
pub const TAG_ADD_RESPONSE: BerTag = BerTag(0b0110_1001);
pub const TAG_DELETE_REQUEST: BerTag = BerTag(0b0100_1010);
pub const TAG_DELETE_RESPONSE: BerTag = BerTag(0b0110_1011);
pub const TAG_MODIFY_DN_REQUEST: BerTag = BerTag(0b0110_1100);
pub const TAG_MODIFY_DN_RESPONSE: BerTag = BerTag(0b0110_1101);
pub const TAG_COMPARE_REQUEST: BerTag = BerTag(0b0110_1110);
pub const TAG_COMPARE_RESPONSE: BerTag = BerTag(0b0110_1111);
pub const TAG_ABANDON_REQUEST: BerTag = BerTag(0b0101_0000);
pub const TAG_SEARCH_RESULT_REFERENCE: BerTag = BerTag(0b0111_0011);
pub const TAG_EXTENDED_REQUEST: BerTag = BerTag(0b0111_0111);
pub const TAG_EXTENDED_RESPONSE: BerTag = BerTag(0b0111_1000);
pub const TAG_INTERMEDIATE_RESPONSE: BerTag = BerTag(0b0111_1001);

/// PartialAttribute ::= SEQUENCE {
///     type       AttributeDescription,
///     vals       SET OF value AttributeValue }
///
/// Value order is preserved as received even though the wire form is a
/// set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attribute {
    pub description: String,
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    /// Decode from the members of a partial-attribute sequence.
    pub fn decode(data: &[u8]) -> Result<Attribute, LdapError> {
        let seq = ber::get_sequence(data)?;
        if seq.len() < 2 {
            return Err(
                ErrorKind::WrongSequenceLength.with_info("LDAPAttribute sequence length", seq.len())
            );
        }
        if seq[0].tag != BerTag::OCTET_STRING {
            return Err(
                ErrorKind::WrongElementType.with_info("LDAPAttribute description type", seq[0].tag)
            );
        }
        let description = ber::get_string(&seq[0].data);
        if description.is_empty() {
            return Err(ErrorKind::InvalidLdapMessage.with_info("LDAPAttribute description", "empty"));
        }
        if seq[1].tag != BerTag::SET {
            return Err(ErrorKind::WrongElementType.with_info("LDAPAttribute vals type", seq[1].tag));
        }
        let mut values = Vec::new();
        for v in ber::get_set(&seq[1].data)? {
            if v.tag != BerTag::OCTET_STRING {
                return Err(ErrorKind::WrongElementType.with_info("AttributeValue type", v.tag));
            }
            values.push(ber::get_octet_string(&v.data));
        }
        Ok(Attribute {
            description,
            values,
        })
    }

    /// Encode the sequence members (without the sequence header).
    pub fn encode_members(&self) -> Vec<u8> {
        let mut out = ber::encode_octet_string(self.description.as_bytes());
        let mut vals = Vec::new();
        for v in &self.values {
            vals.extend_from_slice(&ber::encode_octet_string(v));
        }
        out.extend_from_slice(&ber::encode_set(&vals));
        out
    }
}

/// AttributeValueAssertion ::= SEQUENCE {
///     attributeDesc   AttributeDescription,
///     assertionValue  AssertionValue }
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeValueAssertion {
    pub description: String,
    pub value: Vec<u8>,
}

impl AttributeValueAssertion {
    pub fn decode(data: &[u8]) -> Result<AttributeValueAssertion, LdapError> {
        let seq = ber::get_sequence(data)?;
        if seq.len() != 2 {
            return Err(ErrorKind::WrongSequenceLength
                .with_info("AttributeValueAssertion sequence length", seq.len()));
        }
        if seq[0].tag != BerTag::OCTET_STRING {
            return Err(ErrorKind::WrongElementType
                .with_info("AttributeValueAssertion attributeDesc type", seq[0].tag));
        }
        if seq[1].tag != BerTag::OCTET_STRING {
            return Err(ErrorKind::WrongElementType
                .with_info("AttributeValueAssertion assertionValue type", seq[1].tag));
        }
        Ok(AttributeValueAssertion {
            description: ber::get_string(&seq[0].data),
            value: ber::get_octet_string(&seq[1].data),
        })
    }

    pub fn encode_members(&self) -> Vec<u8> {
        let mut out = ber::encode_octet_string(self.description.as_bytes());
        out.extend_from_slice(&ber::encode_octet_string(&self.value));
        out
    }
}

/// AuthenticationChoice ::= CHOICE {
///     simple  [0] OCTET STRING,
///             -- 1 and 2 reserved
///     sasl    [3] SaslCredentials,
///     ...  }
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindCredentials {
    Simple(String),
    Sasl {
        mechanism: String,
        credentials: Option<Vec<u8>>,
    },
}

/// BindRequest ::= [APPLICATION 0] SEQUENCE {
///     version         INTEGER (1 ..  127),
///     name            LDAPDN,
///     authentication  AuthenticationChoice }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub version: u8,
    pub name: String,
    pub credentials: BindCredentials,
}

impl BindRequest {
    pub fn decode(data: &[u8]) -> Result<BindRequest, LdapError> {
        let seq = ber::get_sequence(data)?;
        if seq.len() != 3 {
            return Err(
                ErrorKind::WrongSequenceLength.with_info("BindRequest sequence length", seq.len())
            );
        }
        if seq[0].tag != BerTag::INTEGER {
            return Err(ErrorKind::WrongElementType.with_info("BindRequest version type", seq[0].tag));
        }
        let version = ber::get_integer(&seq[0].data)?;
        if !(1..=127).contains(&version) {
            return Err(ErrorKind::InvalidLdapMessage.with_info("BindRequest version", version));
        }
        if seq[1].tag != BerTag::OCTET_STRING {
            return Err(ErrorKind::WrongElementType.with_info("BindRequest name type", seq[1].tag));
        }
        let name = ber::get_string(&seq[1].data);
        if seq[2].tag.class() != BerTag::CLASS_CONTEXT_SPECIFIC {
            return Err(ErrorKind::WrongElementType
                .with_info("BindRequest authentication type", seq[2].tag));
        }
        let credentials = match seq[2].tag.tag_number() {
            0 => BindCredentials::Simple(ber::get_string(&seq[2].data)),
            3 => {
                let s_seq = ber::get_sequence(&seq[2].data)?;
                if s_seq.is_empty() || s_seq.len() > 2 {
                    return Err(ErrorKind::WrongSequenceLength
                        .with_info("SaslCredentials sequence length", s_seq.len()));
                }
                if s_seq[0].tag != BerTag::OCTET_STRING {
                    return Err(ErrorKind::WrongElementType
                        .with_info("SaslCredentials mechanism type", s_seq[0].tag));
                }
                let mut credentials = None;
                if s_seq.len() == 2 {
                    if s_seq[1].tag != BerTag::OCTET_STRING {
                        return Err(ErrorKind::WrongElementType
                            .with_info("SaslCredentials credentials type", s_seq[1].tag));
                    }
                    credentials = Some(ber::get_octet_string(&s_seq[1].data));
                }
                BindCredentials::Sasl {
                    mechanism: ber::get_string(&s_seq[0].data),
                    credentials,
                }
            }
            other => {
                return Err(ErrorKind::WrongElementType
                    .with_info("BindRequest authentication choice", other))
            }
        };
        Ok(BindRequest {
            version: version as u8,
            name,
            credentials,
        })
    }
}

impl Encodable for BindRequest {
    fn encode(&self) -> Vec<u8> {
        let mut out = ber::encode_integer(i64::from(self.version));
        out.extend_from_slice(&ber::encode_octet_string(self.name.as_bytes()));
        match &self.credentials {
            BindCredentials::Simple(password) => {
                out.extend_from_slice(&ber::encode_element(
                    BerTag::context_specific(0, false),
                    password.as_bytes(),
                ));
            }
            BindCredentials::Sasl {
                mechanism,
                credentials,
            } => {
                let mut sasl = ber::encode_octet_string(mechanism.as_bytes());
                if let Some(credentials) = credentials {
                    sasl.extend_from_slice(&ber::encode_octet_string(credentials));
                }
                out.extend_from_slice(&ber::encode_element(
                    BerTag::context_specific(3, true),
                    &sasl,
                ));
            }
        }
        out
    }
}

/// AddRequest ::= [APPLICATION 8] SEQUENCE {
///     entry           LDAPDN,
///     attributes      AttributeList }
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddRequest {
    pub entry: String,
    pub attributes: Vec<Attribute>,
}

impl AddRequest {
    pub fn decode(data: &[u8]) -> Result<AddRequest, LdapError> {
        let seq = ber::get_sequence(data)?;
        if seq.len() != 2 {
            return Err(
                ErrorKind::WrongSequenceLength.with_info("AddRequest sequence length", seq.len())
            );
        }
        if seq[0].tag != BerTag::OCTET_STRING {
            return Err(ErrorKind::WrongElementType.with_info("AddRequest entry type", seq[0].tag));
        }
        let entry = ber::get_string(&seq[0].data);
        if seq[1].tag != BerTag::SEQUENCE {
            return Err(
                ErrorKind::WrongElementType.with_info("AddRequest attributes type", seq[1].tag)
            );
        }
        let mut attributes = Vec::new();
        for raw in ber::get_sequence(&seq[1].data)? {
            if raw.tag != BerTag::SEQUENCE {
                return Err(ErrorKind::WrongElementType.with_info("LDAPAttribute type", raw.tag));
            }
            attributes.push(Attribute::decode(&raw.data)?);
        }
        Ok(AddRequest { entry, attributes })
    }
}

impl Encodable for AddRequest {
    fn encode(&self) -> Vec<u8> {
        let mut out = ber::encode_octet_string(self.entry.as_bytes());
        let mut attrs = Vec::new();
        for attr in &self.attributes {
            attrs.extend_from_slice(&ber::encode_sequence(&attr.encode_members()));
        }
        out.extend_from_slice(&ber::encode_sequence(&attrs));
        out
    }
}

/// Modification type for one change in a ModifyRequest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Add = 0,
    Delete = 1,
    Replace = 2,
}

impl TryFrom<i64> for ModifyOperation {
    type Error = LdapError;

    fn try_from(value: i64) -> Result<Self, LdapError> {
        match value {
            0 => Ok(ModifyOperation::Add),
            1 => Ok(ModifyOperation::Delete),
            2 => Ok(ModifyOperation::Replace),
            other => {
                Err(ErrorKind::InvalidLdapMessage.with_info("ModifyRequest change operation", other))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyChange {
    pub operation: ModifyOperation,
    pub modification: Attribute,
}

/// ModifyRequest ::= [APPLICATION 6] SEQUENCE {
///     object   LDAPDN,
///     changes  SEQUENCE OF change SEQUENCE {
///         operation ENUMERATED { add (0), delete (1), replace (2) },
///         modification Attribute } }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    pub object: String,
    pub changes: Vec<ModifyChange>,
}

impl ModifyRequest {
    pub fn decode(data: &[u8]) -> Result<ModifyRequest, LdapError> {
        let seq = ber::get_sequence(data)?;
        if seq.len() != 2 {
            return Err(
                ErrorKind::WrongSequenceLength.with_info("ModifyRequest sequence length", seq.len())
            );
        }
        if seq[0].tag != BerTag::OCTET_STRING {
            return Err(ErrorKind::WrongElementType.with_info("ModifyRequest object type", seq[0].tag));
        }
        let object = ber::get_string(&seq[0].data);
        if seq[1].tag != BerTag::SEQUENCE {
            return Err(
                ErrorKind::WrongElementType.with_info("ModifyRequest changes type", seq[1].tag)
            );
        }
        let mut changes = Vec::new();
        for c in ber::get_sequence(&seq[1].data)? {
            if c.tag != BerTag::SEQUENCE {
                return Err(ErrorKind::WrongElementType.with_info("ModifyRequest change type", c.tag));
            }
            let c_seq = ber::get_sequence(&c.data)?;
            if c_seq.len() != 2 {
                return Err(ErrorKind::WrongSequenceLength
                    .with_info("ModifyRequest change sequence length", c_seq.len()));
            }
            if c_seq[0].tag != BerTag::ENUMERATED {
                return Err(ErrorKind::WrongElementType
                    .with_info("ModifyRequest change operation type", c_seq[0].tag));
            }
            let operation = ModifyOperation::try_from(ber::get_enumerated(&c_seq[0].data)?)?;
            if c_seq[1].tag != BerTag::SEQUENCE {
                return Err(ErrorKind::WrongElementType
                    .with_info("ModifyRequest change modification type", c_seq[1].tag));
            }
            changes.push(ModifyChange {
                operation,
                modification: Attribute::decode(&c_seq[1].data)?,
            });
        }
        Ok(ModifyRequest { object, changes })
    }
}

impl Encodable for ModifyRequest {
    fn encode(&self) -> Vec<u8> {
        let mut out = ber::encode_octet_string(self.object.as_bytes());
        let mut changes = Vec::new();
        for change in &self.changes {
            let mut c = ber::encode_enumerated(change.operation as i64);
            c.extend_from_slice(&ber::encode_sequence(&change.modification.encode_members()));
            changes.extend_from_slice(&ber::encode_sequence(&c));
        }
        out.extend_from_slice(&ber::encode_sequence(&changes));
        out
    }
}

/// ModifyDNRequest ::= [APPLICATION 12] SEQUENCE {
///     entry        LDAPDN,
///     newrdn       RelativeLDAPDN,
///     deleteoldrdn BOOLEAN,
///     newSuperior  [0] LDAPDN OPTIONAL }
///
/// A present newSuperior moves the entry; an absent one is a rename in
/// place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyDnRequest {
    pub entry: String,
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    pub new_superior: Option<String>,
}

impl ModifyDnRequest {
    pub fn decode(data: &[u8]) -> Result<ModifyDnRequest, LdapError> {
        let seq = ber::get_sequence(data)?;
        if seq.len() != 3 && seq.len() != 4 {
            return Err(ErrorKind::WrongSequenceLength
                .with_info("ModifyDNRequest sequence length", seq.len()));
        }
        if seq[0].tag != BerTag::OCTET_STRING {
            return Err(ErrorKind::WrongElementType.with_info("ModifyDNRequest entry type", seq[0].tag));
        }
        let entry = ber::get_string(&seq[0].data);
        if seq[1].tag != BerTag::OCTET_STRING {
            return Err(
                ErrorKind::WrongElementType.with_info("ModifyDNRequest new RDN type", seq[1].tag)
            );
        }
        let new_rdn = ber::get_string(&seq[1].data);
        if seq[2].tag != BerTag::BOOLEAN {
            return Err(ErrorKind::WrongElementType
                .with_info("ModifyDNRequest delete old RDN type", seq[2].tag));
        }
        let delete_old_rdn = ber::get_boolean(&seq[2].data)?;
        let mut new_superior = None;
        if seq.len() == 4 {
            if seq[3].tag != BerTag::context_specific(0, false) {
                return Err(ErrorKind::WrongElementType
                    .with_info("ModifyDNRequest new superior type", seq[3].tag));
            }
            new_superior = Some(ber::get_string(&seq[3].data));
        }
        Ok(ModifyDnRequest {
            entry,
            new_rdn,
            delete_old_rdn,
            new_superior,
        })
    }
}

impl Encodable for ModifyDnRequest {
    fn encode(&self) -> Vec<u8> {
        let mut out = ber::encode_octet_string(self.entry.as_bytes());
        out.extend_from_slice(&ber::encode_octet_string(self.new_rdn.as_bytes()));
        out.extend_from_slice(&ber::encode_boolean(self.delete_old_rdn));
        if let Some(new_superior) = &self.new_superior {
            out.extend_from_slice(&ber::encode_element(
                BerTag::context_specific(0, false),
                new_superior.as_bytes(),
            ));
        }
        out
    }
}

/// CompareRequest ::= [APPLICATION 14] SEQUENCE {
///     entry   LDAPDN,
///     ava     AttributeValueAssertion }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    pub entry: String,
    pub ava: AttributeValueAssertion,
}

impl CompareRequest {
    pub fn decode(data: &[u8]) -> Result<CompareRequest, LdapError> {
        let seq = ber::get_sequence(data)?;
        if seq.len() != 2 {
            return Err(
                ErrorKind::WrongSequenceLength.with_info("CompareRequest sequence length", seq.len())
            );
        }
        if seq[0].tag != BerTag::OCTET_STRING {
            return Err(ErrorKind::WrongElementType.with_info("CompareRequest entry type", seq[0].tag));
        }
        let entry = ber::get_string(&seq[0].data);
        if seq[1].tag != BerTag::SEQUENCE {
            return Err(ErrorKind::WrongElementType.with_info("CompareRequest ava type", seq[1].tag));
        }
        Ok(CompareRequest {
            entry,
            ava: AttributeValueAssertion::decode(&seq[1].data)?,
        })
    }
}

impl Encodable for CompareRequest {
    fn encode(&self) -> Vec<u8> {
        let mut out = ber::encode_octet_string(self.entry.as_bytes());
        out.extend_from_slice(&ber::encode_sequence(&self.ava.encode_members()));
        out
    }
}

/// Decode the DN carried directly in a DelRequest op payload.
/// DelRequest ::= [APPLICATION 10] LDAPDN
pub fn decode_delete_request(data: &[u8]) -> String {
    ber::get_string(data)
}

/// Decode the message ID carried in an AbandonRequest op payload.
/// AbandonRequest ::= [APPLICATION 16] MessageID
pub fn decode_abandon_request(data: &[u8]) -> Result<MessageId, LdapError> {
    let id = ber::get_integer(data)?;
    if !(0..=MAX_INT).contains(&id) {
        return Err(ErrorKind::InvalidMessageId.with_info("AbandonRequest messageID", id));
    }
    Ok(id as MessageId)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    BaseObject = 0,
    SingleLevel = 1,
    WholeSubtree = 2,
    /// Defined in a draft, not always supported.
    SubordinateSubtree = 3,
}

impl TryFrom<i64> for SearchScope {
    type Error = LdapError;

    fn try_from(value: i64) -> Result<Self, LdapError> {
        match value {
            0 => Ok(SearchScope::BaseObject),
            1 => Ok(SearchScope::SingleLevel),
            2 => Ok(SearchScope::WholeSubtree),
            3 => Ok(SearchScope::SubordinateSubtree),
            other => Err(ErrorKind::InvalidLdapMessage.with_info("SearchRequest scope", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefAliases {
    Never = 0,
    InSearching = 1,
    FindingBaseObject = 2,
    Always = 3,
}

impl TryFrom<i64> for DerefAliases {
    type Error = LdapError;

    fn try_from(value: i64) -> Result<Self, LdapError> {
        match value {
            0 => Ok(DerefAliases::Never),
            1 => Ok(DerefAliases::InSearching),
            2 => Ok(DerefAliases::FindingBaseObject),
            3 => Ok(DerefAliases::Always),
            other => {
                Err(ErrorKind::InvalidLdapMessage.with_info("SearchRequest derefAliases", other))
            }
        }
    }
}

/// SearchRequest ::= [APPLICATION 3] SEQUENCE {
///     baseObject      LDAPDN,
///     scope           ENUMERATED { ... },
///     derefAliases    ENUMERATED { ... },
///     sizeLimit       INTEGER (0 ..  maxInt),
///     timeLimit       INTEGER (0 ..  maxInt),
///     typesOnly       BOOLEAN,
///     filter          Filter,
///     attributes      AttributeSelection }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_object: String,
    pub scope: SearchScope,
    pub deref_aliases: DerefAliases,
    pub size_limit: u32,
    pub time_limit: u32,
    pub types_only: bool,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn decode(data: &[u8]) -> Result<SearchRequest, LdapError> {
        let seq = ber::get_sequence(data)?;
        if seq.len() != 8 {
            return Err(
                ErrorKind::WrongSequenceLength.with_info("SearchRequest sequence length", seq.len())
            );
        }
        if seq[0].tag != BerTag::OCTET_STRING {
            return Err(
                ErrorKind::WrongElementType.with_info("SearchRequest baseObject type", seq[0].tag)
            );
        }
        let base_object = ber::get_string(&seq[0].data);
        if seq[1].tag != BerTag::ENUMERATED {
            return Err(ErrorKind::WrongElementType.with_info("SearchRequest scope type", seq[1].tag));
        }
        let scope = SearchScope::try_from(ber::get_enumerated(&seq[1].data)?)?;
        if seq[2].tag != BerTag::ENUMERATED {
            return Err(
                ErrorKind::WrongElementType.with_info("SearchRequest derefAliases type", seq[2].tag)
            );
        }
        let deref_aliases = DerefAliases::try_from(ber::get_enumerated(&seq[2].data)?)?;
        if seq[3].tag != BerTag::INTEGER {
            return Err(
                ErrorKind::WrongElementType.with_info("SearchRequest sizeLimit type", seq[3].tag)
            );
        }
        let size_limit = ber::get_integer(&seq[3].data)?;
        if !(0..=MAX_INT).contains(&size_limit) {
            return Err(ErrorKind::IntegerTooLarge.with_info("SearchRequest sizeLimit", size_limit));
        }
        if seq[4].tag != BerTag::INTEGER {
            return Err(
                ErrorKind::WrongElementType.with_info("SearchRequest timeLimit type", seq[4].tag)
            );
        }
        let time_limit = ber::get_integer(&seq[4].data)?;
        if !(0..=MAX_INT).contains(&time_limit) {
            return Err(ErrorKind::IntegerTooLarge.with_info("SearchRequest timeLimit", time_limit));
        }
        if seq[5].tag != BerTag::BOOLEAN {
            return Err(
                ErrorKind::WrongElementType.with_info("SearchRequest typesOnly type", seq[5].tag)
            );
        }
        let types_only = ber::get_boolean(&seq[5].data)?;
        let filter = Filter::decode(&seq[6])?;
        if seq[7].tag != BerTag::SEQUENCE {
            return Err(
                ErrorKind::WrongElementType.with_info("SearchRequest attributes type", seq[7].tag)
            );
        }
        let mut attributes = Vec::new();
        for a in ber::get_sequence(&seq[7].data)? {
            if a.tag != BerTag::OCTET_STRING {
                return Err(
                    ErrorKind::WrongElementType.with_info("SearchRequest attribute type", a.tag)
                );
            }
            attributes.push(ber::get_string(&a.data));
        }
        Ok(SearchRequest {
            base_object,
            scope,
            deref_aliases,
            size_limit: size_limit as u32,
            time_limit: time_limit as u32,
            types_only,
            filter,
            attributes,
        })
    }
}

impl Encodable for SearchRequest {
    fn encode(&self) -> Vec<u8> {
        let mut out = ber::encode_octet_string(self.base_object.as_bytes());
        out.extend_from_slice(&ber::encode_enumerated(self.scope as i64));
        out.extend_from_slice(&ber::encode_enumerated(self.deref_aliases as i64));
        out.extend_from_slice(&ber::encode_integer(i64::from(self.size_limit)));
        out.extend_from_slice(&ber::encode_integer(i64::from(self.time_limit)));
        out.extend_from_slice(&ber::encode_boolean(self.types_only));
        out.extend_from_slice(&self.filter.encode());
        let mut attrs = Vec::new();
        for a in &self.attributes {
            attrs.extend_from_slice(&ber::encode_octet_string(a.as_bytes()));
        }
        out.extend_from_slice(&ber::encode_sequence(&attrs));
        out
    }
}

/// ExtendedRequest ::= [APPLICATION 23] SEQUENCE {
///     requestName     [0] LDAPOID,
///     requestValue    [1] OCTET STRING OPTIONAL }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedRequest {
    pub name: String,
    pub value: Option<Vec<u8>>,
}

impl ExtendedRequest {
    pub fn decode(data: &[u8]) -> Result<ExtendedRequest, LdapError> {
        let seq = ber::get_sequence(data)?;
        if seq.is_empty() || seq.len() > 2 {
            return Err(
                ErrorKind::WrongSequenceLength.with_info("ExtendedRequest sequence length", seq.len())
            );
        }
        if seq[0].tag.class() != BerTag::CLASS_CONTEXT_SPECIFIC || seq[0].tag.tag_number() != 0 {
            return Err(ErrorKind::WrongElementType.with_info("ExtendedRequest name type", seq[0].tag));
        }
        let name = ber::get_string(&seq[0].data);
        oid::validate(&name)?;
        let mut value = None;
        if seq.len() == 2 {
            if seq[1].tag.class() != BerTag::CLASS_CONTEXT_SPECIFIC || seq[1].tag.tag_number() != 1 {
                return Err(
                    ErrorKind::WrongElementType.with_info("ExtendedRequest value type", seq[1].tag)
                );
            }
            value = Some(ber::get_octet_string(&seq[1].data));
        }
        Ok(ExtendedRequest { name, value })
    }
}

impl Encodable for ExtendedRequest {
    fn encode(&self) -> Vec<u8> {
        let mut out = ber::encode_element(BerTag::context_specific(0, false), self.name.as_bytes());
        if let Some(value) = &self.value {
            out.extend_from_slice(&ber::encode_element(BerTag::context_specific(1, false), value));
        }
        out
    }
}

/// SearchResultEntry ::= [APPLICATION 4] SEQUENCE {
///     objectName      LDAPDN,
///     attributes      PartialAttributeList }
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchResultEntry {
    pub object_name: String,
    pub attributes: Vec<Attribute>,
}

impl SearchResultEntry {
    pub fn decode(data: &[u8]) -> Result<SearchResultEntry, LdapError> {
        let seq = ber::get_sequence(data)?;
        if seq.len() != 2 {
            return Err(ErrorKind::WrongSequenceLength
                .with_info("SearchResultEntry sequence length", seq.len()));
        }
        if seq[0].tag != BerTag::OCTET_STRING {
            return Err(
                ErrorKind::WrongElementType.with_info("SearchResultEntry objectName type", seq[0].tag)
            );
        }
        let object_name = ber::get_string(&seq[0].data);
        if seq[1].tag != BerTag::SEQUENCE {
            return Err(
                ErrorKind::WrongElementType.with_info("SearchResultEntry attributes type", seq[1].tag)
            );
        }
        let mut attributes = Vec::new();
        for raw in ber::get_sequence(&seq[1].data)? {
            if raw.tag != BerTag::SEQUENCE {
                return Err(ErrorKind::WrongElementType.with_info("PartialAttribute type", raw.tag));
            }
            attributes.push(Attribute::decode(&raw.data)?);
        }
        Ok(SearchResultEntry {
            object_name,
            attributes,
        })
    }
}

impl Encodable for SearchResultEntry {
    fn encode(&self) -> Vec<u8> {
        let mut out = ber::encode_octet_string(self.object_name.as_bytes());
        let mut attrs = Vec::new();
        for attr in &self.attributes {
            attrs.extend_from_slice(&ber::encode_sequence(&attr.encode_members()));
        }
        out.extend_from_slice(&ber::encode_sequence(&attrs));
        out
    }
}

/// SearchResultReference ::= [APPLICATION 19] SEQUENCE SIZE (1..MAX) OF uri URI
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchResultReference(pub Vec<String>);

impl SearchResultReference {
    pub fn decode(data: &[u8]) -> Result<SearchResultReference, LdapError> {
        let mut uris = Vec::new();
        for uri in ber::get_sequence(data)? {
            if uri.tag != BerTag::OCTET_STRING {
                return Err(
                    ErrorKind::WrongElementType.with_info("SearchResultReference URI type", uri.tag)
                );
            }
            uris.push(ber::get_string(&uri.data));
        }
        Ok(SearchResultReference(uris))
    }
}

impl Encodable for SearchResultReference {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for uri in &self.0 {
            out.extend_from_slice(&ber::encode_octet_string(uri.as_bytes()));
        }
        out
    }
}
