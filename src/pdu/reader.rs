//! PDU decoding: pure functions from wire bytes to [`Pdu`] values.
//!
//! [`decode_pdu`] is total over any byte slice: malformed input yields an
//! [`Error`], never a panic. [`read_pdu`] layers blocking I/O on top of it,
//! reading exactly the 6-byte common header and then exactly `length` more
//! bytes before attempting to decode.

use std::io::{Cursor, Read};

use byteordered::byteorder::{BigEndian, ReadBytesExt};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use tracing::warn;

use crate::{
    ae_title::AeTitle,
    pdu::*,
    uid::Uid,
};

pub use crate::pdu::{DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE, MINIMUM_PDU_SIZE, PDU_HEADER_SIZE};

/// Hard ceiling on a declared PDU length, independent of any negotiated
/// maximum. Bodies larger than the negotiated maximum P-DATA size are
/// accepted per the standard (the maximum applies to fragments, not
/// encoded PDUs) -- this bound exists only to avoid an unbounded
/// allocation from a corrupt or hostile length field.
const HARD_PDU_LENGTH_CEILING: u32 = 256 * 1024 * 1024;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("could not read PDU header"))]
    ReadHeader {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not read {} bytes of PDU body", length))]
    ReadBody {
        length: u32,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("declared PDU length {} exceeds the hard ceiling of {}", length, HARD_PDU_LENGTH_CEILING))]
    PduTooLarge { length: u32, backtrace: Backtrace },

    #[snafu(display("unexpected end of PDU data, needed {} more byte(s)", needed))]
    ShortRead { needed: usize, backtrace: Backtrace },

    #[snafu(display("invalid item length {} (must be >= {})", length, min))]
    InvalidItemLength { length: u32, min: u32 },

    #[snafu(display("invalid value for field `{}`", field))]
    InvalidField {
        field: &'static str,
        backtrace: Backtrace,
    },

    #[snafu(display("invalid AE title"))]
    BadAeTitle {
        source: crate::ae_title::InvalidAeTitle,
        backtrace: Backtrace,
    },

    #[snafu(display("invalid UID"))]
    BadUid {
        source: crate::uid::InvalidUid,
        backtrace: Backtrace,
    },

    #[snafu(display("invalid UTF-8 text in field `{}`", field))]
    BadText {
        field: &'static str,
        source: std::string::FromUtf8Error,
    },

    #[snafu(display("top-level item tag {:#04x} is unrecognised", tag))]
    UnrecognisedTopLevelItem { tag: u8 },

    #[snafu(display("required item `{}` is missing", item))]
    MissingItem { item: &'static str },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Read exactly one PDU from a blocking reader.
///
/// Reads the 6-byte common header to determine the body length, then
/// reads exactly that many additional bytes before dispatching to
/// [`decode_pdu`].
pub fn read_pdu<R: Read>(reader: &mut R) -> Result<Pdu> {
    let mut header = [0u8; PDU_HEADER_SIZE as usize];
    reader.read_exact(&mut header).context(ReadHeaderSnafu)?;

    let pdu_type = header[0];
    let length = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
    ensure!(length <= HARD_PDU_LENGTH_CEILING, PduTooLargeSnafu { length });

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body).context(ReadBodySnafu { length })?;

    decode_body(pdu_type, &body)
}

/// Decode a full PDU (header plus body) from an in-memory byte slice.
pub fn decode_pdu(bytes: &[u8]) -> Result<Pdu> {
    ensure!(
        bytes.len() >= PDU_HEADER_SIZE as usize,
        ShortReadSnafu {
            needed: PDU_HEADER_SIZE as usize - bytes.len()
        }
    );
    let pdu_type = bytes[0];
    let length = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let body = &bytes[PDU_HEADER_SIZE as usize..];
    ensure!(
        body.len() >= length as usize,
        ShortReadSnafu {
            needed: length as usize - body.len()
        }
    );
    decode_body(pdu_type, &body[..length as usize])
}

fn decode_body(pdu_type: u8, body: &[u8]) -> Result<Pdu> {
    match pdu_type {
        0x01 => decode_associate_rq(body).map(Pdu::AssociationRQ),
        0x02 => decode_associate_ac(body).map(Pdu::AssociationAC),
        0x03 => decode_associate_rj(body).map(Pdu::AssociationRJ),
        0x04 => decode_pdata(body).map(Pdu::PData),
        0x05 => Ok(Pdu::ReleaseRQ),
        0x06 => Ok(Pdu::ReleaseRP),
        0x07 => decode_abort(body).map(Pdu::Abort),
        _ => Ok(Pdu::Unknown {
            pdu_type,
            data: body.to_vec(),
        }),
    }
}

/// A raw, tag-addressed variable item as read off the wire: a type tag
/// plus its value slice, with no further interpretation applied.
struct RawItem<'a> {
    tag: u8,
    value: &'a [u8],
}

/// Iterate over the 4-byte-header items (`tag(1) reserved(1) length(2 BE)`)
/// packed into `buf`, yielding each `(tag, value)` pair until the slice is
/// exhausted. The sum of `4 + length` over all yielded items always equals
/// `buf.len()` when this iterator runs to completion without error.
fn iter_items(buf: &[u8]) -> impl Iterator<Item = Result<RawItem<'_>>> {
    let mut cursor = Cursor::new(buf);
    std::iter::from_fn(move || {
        let remaining = buf.len() as u64 - cursor.position();
        if remaining == 0 {
            return None;
        }
        if remaining < 4 {
            return Some(
                ShortReadSnafu {
                    needed: (4 - remaining) as usize,
                }
                .fail(),
            );
        }
        let tag = match cursor.read_u8() {
            Ok(v) => v,
            Err(e) => return Some(Err(e).context(ReadHeaderSnafu)),
        };
        if cursor.read_u8().is_err() {
            return Some(
                ShortReadSnafu { needed: 1 }.fail(),
            );
        }
        let length = match cursor.read_u16::<BigEndian>() {
            Ok(v) => v as u32,
            Err(_) => return Some(ShortReadSnafu { needed: 2 }.fail()),
        };
        let start = cursor.position() as usize;
        let end = start + length as usize;
        if end > buf.len() {
            return Some(
                ShortReadSnafu {
                    needed: end - buf.len(),
                }
                .fail(),
            );
        }
        cursor.set_position(end as u64);
        Some(Ok(RawItem {
            tag,
            value: &buf[start..end],
        }))
    })
}

fn ae_title_from_field(raw: &[u8], field: &'static str) -> Result<AeTitle> {
    ensure!(raw.len() == crate::ae_title::AE_TITLE_LEN, InvalidFieldSnafu { field });
    let mut arr = [0u8; crate::ae_title::AE_TITLE_LEN];
    arr.copy_from_slice(raw);
    AeTitle::from_wire_bytes(arr).context(BadAeTitleSnafu)
}

fn uid_from_bytes(raw: &[u8]) -> Result<Uid> {
    let s = String::from_utf8(raw.to_vec()).context(BadTextSnafu { field: "uid" })?;
    Uid::new(s).context(BadUidSnafu)
}

fn decode_associate_rq(body: &[u8]) -> Result<AssociationRQ> {
    ensure!(body.len() >= 68, ShortReadSnafu { needed: 68usize.saturating_sub(body.len()) });
    let mut cur = Cursor::new(body);
    let protocol_version = cur.read_u16::<BigEndian>().context(ReadHeaderSnafu)?;
    cur.read_u16::<BigEndian>().context(ReadHeaderSnafu)?; // reserved
    let called = ae_title_from_field(&body[4..20], "called_ae_title")?;
    let calling = ae_title_from_field(&body[20..36], "calling_ae_title")?;
    // 32 reserved bytes at [36..68)

    let mut application_context_name = None;
    let mut presentation_contexts = Vec::new();
    let mut user_variables = Vec::new();

    for item in iter_items(&body[68..]) {
        let item = item?;
        match item.tag {
            0x10 => application_context_name = Some(uid_from_bytes(item.value)?),
            0x20 => presentation_contexts.push(decode_presentation_context_rq(item.value)?),
            0x50 => user_variables = decode_user_information(item.value)?,
            other => return UnrecognisedTopLevelItemSnafu { tag: other }.fail(),
        }
    }

    Ok(AssociationRQ {
        protocol_version,
        calling_ae_title: calling,
        called_ae_title: called,
        application_context_name: application_context_name
            .context(MissingItemSnafu { item: "application context" })?,
        presentation_contexts,
        user_variables,
    })
}

fn decode_associate_ac(body: &[u8]) -> Result<AssociationAC> {
    ensure!(body.len() >= 68, ShortReadSnafu { needed: 68usize.saturating_sub(body.len()) });
    let mut cur = Cursor::new(body);
    let protocol_version = cur.read_u16::<BigEndian>().context(ReadHeaderSnafu)?;
    cur.read_u16::<BigEndian>().context(ReadHeaderSnafu)?; // reserved
    // AC echoes the two AE titles verbatim; do not interpret their content
    // as an access-control signal, just preserve the bytes.
    let called = ae_title_from_field(&body[4..20], "called_ae_title")?;
    let calling = ae_title_from_field(&body[20..36], "calling_ae_title")?;

    let mut application_context_name = None;
    let mut presentation_contexts = Vec::new();
    let mut user_variables = Vec::new();

    for item in iter_items(&body[68..]) {
        let item = item?;
        match item.tag {
            0x10 => application_context_name = Some(uid_from_bytes(item.value)?),
            0x21 => presentation_contexts.push(decode_presentation_context_ac(item.value)?),
            0x50 => user_variables = decode_user_information(item.value)?,
            other => return UnrecognisedTopLevelItemSnafu { tag: other }.fail(),
        }
    }

    Ok(AssociationAC {
        protocol_version,
        calling_ae_title: calling,
        called_ae_title: called,
        application_context_name: application_context_name
            .context(MissingItemSnafu { item: "application context" })?,
        presentation_contexts,
        user_variables,
    })
}

fn decode_presentation_context_rq(value: &[u8]) -> Result<PresentationContextProposed> {
    ensure!(value.len() >= 4, ShortReadSnafu { needed: 4usize.saturating_sub(value.len()) });
    let id = value[0];
    // value[1..4] reserved
    let mut abstract_syntax = None;
    let mut transfer_syntaxes = Vec::new();
    for item in iter_items(&value[4..]) {
        let item = item?;
        match item.tag {
            0x30 => abstract_syntax = Some(uid_from_bytes(item.value)?),
            0x40 => transfer_syntaxes.push(uid_from_bytes(item.value)?),
            other => return UnrecognisedTopLevelItemSnafu { tag: other }.fail(),
        }
    }
    Ok(PresentationContextProposed {
        id,
        abstract_syntax: abstract_syntax.context(MissingItemSnafu { item: "abstract syntax" })?,
        transfer_syntaxes,
    })
}

fn decode_presentation_context_ac(value: &[u8]) -> Result<PresentationContextResult> {
    ensure!(value.len() >= 4, ShortReadSnafu { needed: 4usize.saturating_sub(value.len()) });
    let id = value[0];
    let reason = match value[2] {
        0 => PresentationContextResultReason::Acceptance,
        1 => PresentationContextResultReason::UserRejection,
        2 => PresentationContextResultReason::NoReason,
        3 => PresentationContextResultReason::AbstractSyntaxNotSupported,
        4 => PresentationContextResultReason::TransferSyntaxesNotSupported,
        _ => return InvalidFieldSnafu { field: "presentation context result reason" }.fail(),
    };
    let mut transfer_syntax = None;
    for item in iter_items(&value[4..]) {
        let item = item?;
        match item.tag {
            0x40 => transfer_syntax = Some(uid_from_bytes(item.value)?),
            other => return UnrecognisedTopLevelItemSnafu { tag: other }.fail(),
        }
    }
    Ok(PresentationContextResult {
        id,
        reason,
        // A rejected or still-pending context has an undefined transfer
        // syntax; any echoed value is kept verbatim but must not be
        // inspected by callers.
        transfer_syntax: transfer_syntax.unwrap_or_else(|| Uid::new("0").unwrap()),
    })
}

fn decode_user_information(buf: &[u8]) -> Result<Vec<UserVariableItem>> {
    let mut out = Vec::new();
    for item in iter_items(buf) {
        let item = item?;
        match item.tag {
            0x51 => {
                ensure!(item.value.len() == 4, InvalidItemLengthSnafu { length: item.value.len() as u32, min: 4u32 });
                out.push(UserVariableItem::MaxLength(u32::from_be_bytes(
                    item.value.try_into().unwrap(),
                )));
            }
            0x52 => out.push(UserVariableItem::ImplementationClassUid(uid_from_bytes(item.value)?)),
            0x55 => {
                let s = String::from_utf8(item.value.to_vec())
                    .context(BadTextSnafu { field: "implementation version name" })?;
                out.push(UserVariableItem::ImplementationVersionName(s));
            }
            0x53 => {
                ensure!(item.value.len() == 4, InvalidItemLengthSnafu { length: item.value.len() as u32, min: 4u32 });
                out.push(UserVariableItem::AsyncOperationsWindow(AsyncOperationsWindow {
                    max_operations_invoked: u16::from_be_bytes([item.value[0], item.value[1]]),
                    max_operations_performed: u16::from_be_bytes([item.value[2], item.value[3]]),
                }));
            }
            0x54 => out.push(UserVariableItem::RoleSelection(decode_role_selection(item.value)?)),
            0x56 => out.push(UserVariableItem::SopClassExtendedNegotiation(
                decode_sop_class_extended_negotiation(item.value)?,
            )),
            0x57 => out.push(UserVariableItem::SopClassCommonExtendedNegotiation(
                decode_sop_class_common_extended_negotiation(item.value)?,
            )),
            0x58 => out.push(UserVariableItem::UserIdentityRq(decode_user_identity_rq(item.value)?)),
            0x59 => out.push(UserVariableItem::UserIdentityAc(UserIdentityAc {
                server_response: item.value.to_vec(),
            })),
            other => {
                warn!(tag = format!("{:#04x}", other), "skipping unrecognised User Information item");
                out.push(UserVariableItem::Unknown(other, item.value.to_vec()));
            }
        }
    }
    Ok(out)
}

fn decode_role_selection(value: &[u8]) -> Result<RoleSelection> {
    ensure!(value.len() >= 2, ShortReadSnafu { needed: 2usize.saturating_sub(value.len()) });
    let uid_len = u16::from_be_bytes([value[0], value[1]]) as usize;
    ensure!(value.len() >= 2 + uid_len + 2, ShortReadSnafu { needed: (2 + uid_len + 2).saturating_sub(value.len()) });
    let sop_class_uid = uid_from_bytes(&value[2..2 + uid_len])?;
    let scu_role = value[2 + uid_len] != 0;
    let scp_role = value[2 + uid_len + 1] != 0;
    Ok(RoleSelection {
        sop_class_uid,
        scu_role,
        scp_role,
    })
}

fn decode_sop_class_extended_negotiation(value: &[u8]) -> Result<SopClassExtendedNegotiation> {
    ensure!(value.len() >= 2, ShortReadSnafu { needed: 2usize.saturating_sub(value.len()) });
    let uid_len = u16::from_be_bytes([value[0], value[1]]) as usize;
    ensure!(value.len() >= 2 + uid_len, ShortReadSnafu { needed: (2 + uid_len).saturating_sub(value.len()) });
    let sop_class_uid = uid_from_bytes(&value[2..2 + uid_len])?;
    let service_class_application_info = value[2 + uid_len..].to_vec();
    Ok(SopClassExtendedNegotiation {
        sop_class_uid,
        service_class_application_info,
    })
}

fn decode_sop_class_common_extended_negotiation(value: &[u8]) -> Result<SopClassCommonExtendedNegotiation> {
    ensure!(value.len() >= 2, ShortReadSnafu { needed: 2usize.saturating_sub(value.len()) });
    let mut pos = 0usize;
    let sop_len = u16::from_be_bytes([value[pos], value[pos + 1]]) as usize;
    pos += 2;
    ensure!(value.len() >= pos + sop_len, ShortReadSnafu { needed: (pos + sop_len).saturating_sub(value.len()) });
    let sop_class_uid = uid_from_bytes(&value[pos..pos + sop_len])?;
    pos += sop_len;

    ensure!(value.len() >= pos + 2, ShortReadSnafu { needed: (pos + 2).saturating_sub(value.len()) });
    let svc_len = u16::from_be_bytes([value[pos], value[pos + 1]]) as usize;
    pos += 2;
    ensure!(value.len() >= pos + svc_len, ShortReadSnafu { needed: (pos + svc_len).saturating_sub(value.len()) });
    let service_class_uid = uid_from_bytes(&value[pos..pos + svc_len])?;
    pos += svc_len;

    let mut related_general_sop_class_uids = Vec::new();
    if value.len() > pos {
        ensure!(value.len() >= pos + 2, ShortReadSnafu { needed: (pos + 2).saturating_sub(value.len()) });
        let related_len = u16::from_be_bytes([value[pos], value[pos + 1]]) as usize;
        pos += 2;
        ensure!(value.len() >= pos + related_len, ShortReadSnafu { needed: (pos + related_len).saturating_sub(value.len()) });
        let mut remaining = &value[pos..pos + related_len];
        while !remaining.is_empty() {
            ensure!(remaining.len() >= 2, ShortReadSnafu { needed: 2usize });
            let len = u16::from_be_bytes([remaining[0], remaining[1]]) as usize;
            ensure!(remaining.len() >= 2 + len, ShortReadSnafu { needed: (2 + len).saturating_sub(remaining.len()) });
            related_general_sop_class_uids.push(uid_from_bytes(&remaining[2..2 + len])?);
            remaining = &remaining[2 + len..];
        }
    }

    Ok(SopClassCommonExtendedNegotiation {
        sop_class_uid,
        service_class_uid,
        related_general_sop_class_uids,
    })
}

fn decode_user_identity_rq(value: &[u8]) -> Result<UserIdentityRq> {
    ensure!(value.len() >= 4, ShortReadSnafu { needed: 4usize.saturating_sub(value.len()) });
    let identity_type = UserIdentityType::from_wire(value[0])
        .context(InvalidFieldSnafu { field: "user identity type" })?;
    let positive_response_requested = value[1] != 0;
    let primary_len = u16::from_be_bytes([value[2], value[3]]) as usize;
    ensure!(value.len() >= 4 + primary_len + 2, ShortReadSnafu { needed: (4 + primary_len + 2).saturating_sub(value.len()) });
    let primary_field = value[4..4 + primary_len].to_vec();
    let pos = 4 + primary_len;
    let secondary_len = u16::from_be_bytes([value[pos], value[pos + 1]]) as usize;
    ensure!(value.len() >= pos + 2 + secondary_len, ShortReadSnafu { needed: (pos + 2 + secondary_len).saturating_sub(value.len()) });
    let secondary_field = value[pos + 2..pos + 2 + secondary_len].to_vec();

    if identity_type == UserIdentityType::UsernamePasscode {
        ensure!(!secondary_field.is_empty(), InvalidFieldSnafu { field: "user identity secondary field" });
    }

    Ok(UserIdentityRq {
        identity_type,
        positive_response_requested,
        primary_field,
        secondary_field,
    })
}

fn decode_associate_rj(body: &[u8]) -> Result<AssociationRJ> {
    ensure!(body.len() == 4, ShortReadSnafu { needed: 4usize.saturating_sub(body.len()) });
    let result = match body[1] {
        1 => AssociationRJResult::Permanent,
        2 => AssociationRJResult::Transient,
        _ => return InvalidFieldSnafu { field: "association rj result" }.fail(),
    };
    let source = match body[2] {
        1 => AssociationRJSource::ServiceUser(match body[3] {
            1 => AssociationRJServiceUserReason::NoReasonGiven,
            2 => AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
            3 => AssociationRJServiceUserReason::CallingAeTitleNotRecognized,
            7 => AssociationRJServiceUserReason::CalledAeTitleNotRecognized,
            other => AssociationRJServiceUserReason::Reserved(other),
        }),
        2 => AssociationRJSource::ServiceProviderAcse(match body[3] {
            1 => AssociationRJServiceProviderAcseReason::NoReasonGiven,
            2 => AssociationRJServiceProviderAcseReason::ProtocolVersionNotSupported,
            _ => return InvalidFieldSnafu { field: "association rj acse reason" }.fail(),
        }),
        3 => AssociationRJSource::ServiceProviderPresentation(match body[3] {
            1 => AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
            2 => AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
            other => AssociationRJServiceProviderPresentationReason::Reserved(other),
        }),
        _ => return InvalidFieldSnafu { field: "association rj source" }.fail(),
    };
    Ok(AssociationRJ { result, source })
}

fn decode_pdata(body: &[u8]) -> Result<PDataTf> {
    let mut values = Vec::new();
    let mut cur = Cursor::new(body);
    while (cur.position() as usize) < body.len() {
        let remaining = body.len() - cur.position() as usize;
        ensure!(remaining >= 4, ShortReadSnafu { needed: 4 - remaining });
        let length = cur.read_u32::<BigEndian>().context(ReadHeaderSnafu)? as usize;
        ensure!(length >= 2, InvalidItemLengthSnafu { length: length as u32, min: 2u32 });
        let start = cur.position() as usize;
        let end = start + length;
        ensure!(end <= body.len(), ShortReadSnafu { needed: end - body.len() });

        let presentation_context_id = body[start];
        let control_header = body[start + 1];
        let data = body[start + 2..end].to_vec();
        values.push(PresentationDataValue {
            presentation_context_id,
            is_command: control_header & 0x01 != 0,
            is_last: control_header & 0x02 != 0,
            data,
        });
        cur.set_position(end as u64);
    }
    Ok(PDataTf { values })
}

fn decode_abort(body: &[u8]) -> Result<AbortRq> {
    ensure!(body.len() == 4, ShortReadSnafu { needed: 4usize.saturating_sub(body.len()) });
    let source = match body[2] {
        0 => AbortRqSource::ServiceUser,
        2 => AbortRqSource::ServiceProvider,
        _ => return InvalidFieldSnafu { field: "abort source" }.fail(),
    };
    let reason = match body[3] {
        0 => AbortRqReason::ReasonNotSpecified,
        1 => AbortRqReason::UnrecognizedPdu,
        2 => AbortRqReason::UnexpectedPdu,
        4 => AbortRqReason::UnrecognizedPduParameter,
        5 => AbortRqReason::UnexpectedPduParameter,
        6 => AbortRqReason::InvalidPduParameterValue,
        _ => return InvalidFieldSnafu { field: "abort reason" }.fail(),
    };
    Ok(AbortRq { source, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::writer::encode_pdu;

    #[test]
    fn decodes_canonical_rj_body() {
        // S6: `00 01 01 01` => permanent, service-user, no-reason-given
        let body = [0x00u8, 0x01, 0x01, 0x01];
        let rj = decode_associate_rj(&body).unwrap();
        assert_eq!(rj.result, AssociationRJResult::Permanent);
        assert_eq!(
            rj.source,
            AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::NoReasonGiven)
        );
    }

    #[test]
    fn unknown_pdu_type_is_not_an_error() {
        let mut bytes = vec![0x99u8, 0x00, 0x00, 0x00, 0x00, 0x02];
        bytes.extend_from_slice(&[0xAB, 0xCD]);
        let pdu = decode_pdu(&bytes).unwrap();
        match pdu {
            Pdu::Unknown { pdu_type, data } => {
                assert_eq!(pdu_type, 0x99);
                assert_eq!(data, vec![0xAB, 0xCD]);
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn short_read_is_reported() {
        let bytes = [0x05u8, 0x00, 0x00, 0x00, 0x00, 0x04];
        let err = decode_pdu(&bytes).unwrap_err();
        assert!(matches!(err, Error::ShortRead { .. }));
    }

    #[test]
    fn round_trip_release_rq() {
        let pdu = Pdu::ReleaseRQ;
        let bytes = encode_pdu(&pdu);
        assert_eq!(decode_pdu(&bytes).unwrap(), pdu);
    }
}
