//! LDAPMessage envelope: message ID, undecoded protocol op, controls.
//!
//! ```text
//! LDAPMessage ::= SEQUENCE {
//!     messageID       MessageID,
//!     protocolOp      CHOICE { ... },
//!     controls        [0] Controls OPTIONAL }
//! ```
//!
//! The protocol op is retained as a raw element at this layer; the
//! per-operation decoders in [`crate::proto`] consume its payload based on
//! the tag.

use crate::ber::{self, BerTag, RawElement, MAX_INT};
use crate::error::{ErrorKind, LdapError};
use crate::oid;

/// MessageID ::= INTEGER (0 .. maxInt). Zero is reserved for unsolicited
/// notifications from the server.
pub type MessageId = u32;

/// Types that encode themselves as a protocol-op payload (without the
/// element header). Pass these to [`crate::conn::Conn::send_result`].
pub trait Encodable: Sync {
    fn encode(&self) -> Vec<u8>;
}

/// Control ::= SEQUENCE {
///     controlType      LDAPOID,
///     criticality      BOOLEAN DEFAULT FALSE,
///     controlValue     OCTET STRING OPTIONAL }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub oid: String,
    pub criticality: bool,
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub op: RawElement,
    pub controls: Vec<Control>,
}

impl Message {
    /// Decode a message from complete element bytes. The protocol op is
    /// not parsed beyond its tag.
    pub fn decode(data: &[u8]) -> Result<Message, LdapError> {
        let mut cursor = data;
        let raw = ber::read_element(&mut cursor)?;
        Message::from_element(raw)
    }

    /// Decode an already-framed raw element as a message.
    pub fn from_element(raw: RawElement) -> Result<Message, LdapError> {
        if raw.tag != BerTag::SEQUENCE {
            // TLS client hello starts with 0x16 0x03; surface it as an
            // operational hint rather than a generic type mismatch.
            if raw.tag.0 == 0x16 && raw.data.len() == 3 {
                return Err(ErrorKind::TlsClientHello.into());
            }
            return Err(ErrorKind::WrongElementType.with_info("LDAPMessage type", raw.tag));
        }
        let mut seq = ber::get_sequence(&raw.data)?;
        if seq.len() != 2 && seq.len() != 3 {
            return Err(ErrorKind::WrongSequenceLength
                .with_info("LDAPMessage sequence length", seq.len()));
        }
        if seq[0].tag != BerTag::INTEGER {
            return Err(ErrorKind::WrongElementType
                .with_info("LDAPMessage messageID type", seq[0].tag));
        }
        let id = ber::get_integer(&seq[0].data)?;
        if !(0..=MAX_INT).contains(&id) {
            return Err(ErrorKind::InvalidMessageId.with_info("LDAPMessage messageID", id));
        }

        let controls = if seq.len() == 3 {
            decode_controls(&seq[2])?
        } else {
            Vec::new()
        };
        let op = seq.swap_remove(1);

        Ok(Message {
            id: id as MessageId,
            op,
            controls,
        })
    }

    /// BER-encode the message, element header included.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&ber::encode_integer(i64::from(self.id)));
        data.extend_from_slice(&ber::encode_element(self.op.tag, &self.op.data));
        if !self.controls.is_empty() {
            let mut cs = Vec::new();
            for ctrl in &self.controls {
                let mut c = Vec::new();
                c.extend_from_slice(&ber::encode_octet_string(ctrl.oid.as_bytes()));
                if ctrl.criticality {
                    c.extend_from_slice(&ber::encode_boolean(true));
                }
                if let Some(value) = &ctrl.value {
                    c.extend_from_slice(&ber::encode_octet_string(value));
                }
                cs.extend_from_slice(&ber::encode_sequence(&c));
            }
            data.extend_from_slice(&ber::encode_element(
                BerTag::context_specific(0, true),
                &cs,
            ));
        }
        ber::encode_sequence(&data)
    }
}

fn decode_controls(raw: &RawElement) -> Result<Vec<Control>, LdapError> {
    if raw.tag != BerTag::context_specific(0, true) {
        return Err(ErrorKind::WrongElementType.with_info("LDAPControl type", raw.tag));
    }
    let mut controls = Vec::new();
    for c in ber::get_sequence(&raw.data)? {
        if c.tag != BerTag::SEQUENCE {
            return Err(ErrorKind::WrongElementType.with_info("LDAPControl type", c.tag));
        }
        let parts = ber::get_sequence(&c.data)?;
        if parts.is_empty() || parts.len() > 3 {
            return Err(ErrorKind::WrongSequenceLength
                .with_info("LDAPControl sequence length", parts.len()));
        }
        if parts[0].tag != BerTag::OCTET_STRING {
            return Err(ErrorKind::WrongElementType.with_info("LDAPControl OID type", parts[0].tag));
        }
        let oid = ber::get_string(&parts[0].data);
        oid::validate(&oid)?;

        // criticality BOOLEAN DEFAULT FALSE. When it is absent the next
        // member is the control value (an octet string).
        let mut criticality = false;
        let mut value_index = 2;
        if parts.len() > 1 && parts[1].tag != BerTag::OCTET_STRING {
            if parts[1].tag != BerTag::BOOLEAN {
                return Err(ErrorKind::WrongElementType
                    .with_info("LDAPControl criticality type", parts[1].tag));
            }
            criticality = ber::get_boolean(&parts[1].data)?;
        } else {
            value_index = 1;
        }
        let mut value = None;
        if parts.len() == value_index + 1 {
            if parts[value_index].tag != BerTag::OCTET_STRING {
                return Err(ErrorKind::WrongElementType
                    .with_info("LDAPControl control value type", parts[value_index].tag));
            }
            value = Some(ber::get_octet_string(&parts[value_index].data));
        }
        controls.push(Control {
            oid,
            criticality,
            value,
        });
    }
    Ok(controls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_delete_request_with_control() {
        let delete_request = [
            0x30, 0x35, 0x02, 0x01, 0x05, 0x4a, 0x11, 0x64, 0x63, 0x3d, 0x65, 0x78, 0x61, 0x6d,
            0x70, 0x6c, 0x65, 0x2c, 0x64, 0x63, 0x3d, 0x63, 0x6f, 0x6d, 0xa0, 0x1d, 0x30, 0x1b,
            0x04, 0x16, 0x31, 0x2e, 0x32, 0x2e, 0x38, 0x34, 0x30, 0x2e, 0x31, 0x31, 0x33, 0x35,
            0x35, 0x36, 0x2e, 0x31, 0x2e, 0x34, 0x2e, 0x38, 0x30, 0x35, 0x01, 0x01, 0xff,
        ];
        let m = Message::decode(&delete_request).unwrap();
        assert_eq!(m.id, 5);
        assert_eq!(m.op.tag, BerTag(0x4a));
        assert_eq!(m.op.data, b"dc=example,dc=com");
        assert_eq!(m.controls.len(), 1);
        assert_eq!(m.controls[0].oid, "1.2.840.113556.1.4.805");
        assert!(m.controls[0].criticality);
        assert_eq!(m.controls[0].value, None);
    }

    #[test]
    fn test_decode_add_response_envelope() {
        let empty_success = [
            0x30, 0x0c, 0x02, 0x01, 0x03, 0x69, 0x07, 0x0a, 0x01, 0x00, 0x04, 0x00, 0x04, 0x00,
        ];
        let m = Message::decode(&empty_success).unwrap();
        assert_eq!(m.id, 3);
        assert_eq!(m.op.tag, BerTag(0x69));
        assert!(m.controls.is_empty());
    }

    #[test]
    fn test_decode_abandon_request() {
        let abandon_request = [0x30, 0x06, 0x02, 0x01, 0x06, 0x50, 0x01, 0x05];
        let m = Message::decode(&abandon_request).unwrap();
        assert_eq!(m.id, 6);
        assert_eq!(m.op.tag, BerTag(0x50));
        assert_eq!(ber::get_integer(&m.op.data).unwrap(), 5);
    }

    #[test]
    fn test_decode_tls_client_hello() {
        // TLS 1.x record header: ContentType handshake, version, length.
        let hello = [0x16, 0x03, 0x01, 0x02, 0x00];
        let err = Message::decode(&hello).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TlsClientHello);
    }

    #[test]
    fn test_decode_wrong_top_level_tag() {
        let err = Message::decode(&[0x04, 0x02, 0x61, 0x62]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongElementType);
    }

    #[test]
    fn test_decode_wrong_sequence_length() {
        // SEQUENCE with only the message ID.
        let err = Message::decode(&[0x30, 0x03, 0x02, 0x01, 0x01]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongSequenceLength);
    }

    #[test]
    fn test_decode_negative_message_id() {
        let err = Message::decode(&[0x30, 0x05, 0x02, 0x01, 0xff, 0x42, 0x00]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMessageId);
    }

    #[test]
    fn test_decode_control_value_without_criticality() {
        // Control ::= { OID "1.2.3", value "abc" } -- criticality absent.
        let msg = [
            0x30, 0x15, 0x02, 0x01, 0x01, 0x42, 0x00, 0xa0, 0x0e, 0x30, 0x0c, 0x04, 0x05, 0x31,
            0x2e, 0x32, 0x2e, 0x33, 0x04, 0x03, 0x61, 0x62, 0x63,
        ];
        let m = Message::decode(&msg).unwrap();
        assert_eq!(m.controls.len(), 1);
        assert_eq!(m.controls[0].oid, "1.2.3");
        assert!(!m.controls[0].criticality);
        assert_eq!(m.controls[0].value.as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn test_decode_control_invalid_oid() {
        let msg = [
            0x30, 0x10, 0x02, 0x01, 0x01, 0x42, 0x00, 0xa0, 0x09, 0x30, 0x07, 0x04, 0x05, 0x68,
            0x65, 0x6c, 0x6c, 0x6f,
        ];
        let err = Message::decode(&msg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOid);
    }

    #[test]
    fn test_encode_round_trip_without_controls() {
        let m = Message {
            id: 9,
            op: RawElement {
                tag: BerTag(0x42),
                data: Vec::new(),
            },
            controls: Vec::new(),
        };
        let encoded = m.encode();
        assert_eq!(Message::decode(&encoded).unwrap(), m);
    }

    #[test]
    fn test_encode_round_trip_with_controls() {
        let m = Message {
            id: 7,
            op: RawElement {
                tag: BerTag(0x4a),
                data: b"dc=example,dc=com".to_vec(),
            },
            controls: vec![
                Control {
                    oid: "1.2.840.113556.1.4.805".to_string(),
                    criticality: true,
                    value: None,
                },
                Control {
                    oid: "1.2.840.113556.1.4.319".to_string(),
                    criticality: false,
                    value: Some(vec![0x30, 0x00]),
                },
            ],
        };
        let encoded = m.encode();
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, m);
    }
}
