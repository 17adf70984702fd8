//! Protocol Data Units of the DICOM Upper Layer protocol.
//!
//! A [`Pdu`] is a pure value: building one never touches a socket.
//! [`reader::decode_pdu`]/[`writer::encode_pdu`] are the pure codec
//! functions; [`reader::read_pdu`]/[`writer::write_pdu`] layer blocking
//! I/O on top of them.

use crate::{ae_title::AeTitle, uid::Uid};

pub mod reader;
pub mod writer;

cfg_if::cfg_if! {
    if #[cfg(feature = "async")] {
        pub mod nonblocking;
    }
}

pub use reader::{decode_pdu, read_pdu};
pub use writer::{encode_pdu, write_pdu};

/// The default maximum PDU size a node will accept, absent negotiation.
pub const DEFAULT_MAX_PDU: u32 = 16_384;

/// The minimum PDU size permitted by the standard.
pub const MINIMUM_PDU_SIZE: u32 = 4_096;

/// The maximum PDU size permitted by the standard.
pub const MAXIMUM_PDU_SIZE: u32 = 131_072;

/// Size in bytes of the common PDU header: type(1) + reserved(1) + length(4).
pub const PDU_HEADER_SIZE: u32 = 6;

/// A single Upper Layer Protocol Data Unit.
///
/// This is a tagged union over the seven PDU variants defined by the
/// standard, plus an `Unknown` catch-all for a type tag outside
/// `0x01..=0x07` (decoding one is always a protocol error, never a panic).
#[derive(Clone, PartialEq, Debug)]
pub enum Pdu {
    AssociationRQ(AssociationRQ),
    AssociationAC(AssociationAC),
    AssociationRJ(AssociationRJ),
    PData(PDataTf),
    ReleaseRQ,
    ReleaseRP,
    Abort(AbortRq),
    Unknown { pdu_type: u8, data: Vec<u8> },
}

impl Pdu {
    /// The one-byte wire type tag for this PDU, or `None` for `Unknown`
    /// values whose tag did not match a known variant.
    pub fn type_tag(&self) -> Option<u8> {
        match self {
            Pdu::AssociationRQ(_) => Some(0x01),
            Pdu::AssociationAC(_) => Some(0x02),
            Pdu::AssociationRJ(_) => Some(0x03),
            Pdu::PData(_) => Some(0x04),
            Pdu::ReleaseRQ => Some(0x05),
            Pdu::ReleaseRP => Some(0x06),
            Pdu::Abort(_) => Some(0x07),
            Pdu::Unknown { .. } => None,
        }
    }

    /// A short, human-readable description of the PDU kind, for logging.
    pub fn short_description(&self) -> &'static str {
        match self {
            Pdu::AssociationRQ(_) => "A-ASSOCIATE-RQ",
            Pdu::AssociationAC(_) => "A-ASSOCIATE-AC",
            Pdu::AssociationRJ(_) => "A-ASSOCIATE-RJ",
            Pdu::PData(_) => "P-DATA-TF",
            Pdu::ReleaseRQ => "A-RELEASE-RQ",
            Pdu::ReleaseRP => "A-RELEASE-RP",
            Pdu::Abort(_) => "A-ABORT",
            Pdu::Unknown { .. } => "unknown PDU",
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct AssociationRQ {
    pub protocol_version: u16,
    pub calling_ae_title: AeTitle,
    pub called_ae_title: AeTitle,
    pub application_context_name: Uid,
    pub presentation_contexts: Vec<PresentationContextProposed>,
    pub user_variables: Vec<UserVariableItem>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct AssociationAC {
    pub protocol_version: u16,
    /// Echoed verbatim from the request; must not be interpreted.
    pub calling_ae_title: AeTitle,
    /// Echoed verbatim from the request; must not be interpreted.
    pub called_ae_title: AeTitle,
    pub application_context_name: Uid,
    pub presentation_contexts: Vec<PresentationContextResult>,
    pub user_variables: Vec<UserVariableItem>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AssociationRJ {
    pub result: AssociationRJResult,
    pub source: AssociationRJSource,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationRJResult {
    Permanent,
    Transient,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationRJSource {
    ServiceUser(AssociationRJServiceUserReason),
    ServiceProviderAcse(AssociationRJServiceProviderAcseReason),
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationRJServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAeTitleNotRecognized,
    CalledAeTitleNotRecognized,
    Reserved(u8),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationRJServiceProviderAcseReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationRJServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PDataTf {
    pub values: Vec<PresentationDataValue>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PresentationDataValue {
    pub presentation_context_id: u8,
    /// `true` for a DIMSE command fragment, `false` for a data-set fragment.
    pub is_command: bool,
    /// `true` if this is the last fragment of the message.
    pub is_last: bool,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct AbortRq {
    pub source: AbortRqSource,
    pub reason: AbortRqReason,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AbortRqSource {
    ServiceUser,
    ServiceProvider,
}

/// Reasons for a provider-sourced abort, Part 8 Table 9-26.
/// Only meaningful when `source` is the service provider.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AbortRqReason {
    ReasonNotSpecified,
    UnrecognizedPdu,
    UnexpectedPdu,
    UnrecognizedPduParameter,
    UnexpectedPduParameter,
    InvalidPduParameterValue,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PresentationContextProposed {
    pub id: u8,
    pub abstract_syntax: Uid,
    pub transfer_syntaxes: Vec<Uid>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PresentationContextResult {
    pub id: u8,
    pub reason: PresentationContextResultReason,
    pub transfer_syntax: Uid,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum PresentationContextResultReason {
    Acceptance,
    UserRejection,
    NoReason,
    AbstractSyntaxNotSupported,
    TransferSyntaxesNotSupported,
}

/// User Information sub-items, items `0x51`-`0x59` nested inside the
/// User Information item (`0x50`) of an A-ASSOCIATE-RQ/AC.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum UserVariableItem {
    MaxLength(u32),
    ImplementationClassUid(Uid),
    ImplementationVersionName(String),
    AsyncOperationsWindow(AsyncOperationsWindow),
    RoleSelection(RoleSelection),
    SopClassExtendedNegotiation(SopClassExtendedNegotiation),
    SopClassCommonExtendedNegotiation(SopClassCommonExtendedNegotiation),
    UserIdentityRq(UserIdentityRq),
    UserIdentityAc(UserIdentityAc),
    Unknown(u8, Vec<u8>),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct AsyncOperationsWindow {
    /// Maximum number of operations invoked, 0 meaning unlimited.
    pub max_operations_invoked: u16,
    /// Maximum number of operations performed, 0 meaning unlimited.
    pub max_operations_performed: u16,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RoleSelection {
    pub sop_class_uid: Uid,
    pub scu_role: bool,
    pub scp_role: bool,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SopClassExtendedNegotiation {
    pub sop_class_uid: Uid,
    pub service_class_application_info: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SopClassCommonExtendedNegotiation {
    pub sop_class_uid: Uid,
    pub service_class_uid: Uid,
    pub related_general_sop_class_uids: Vec<Uid>,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum UserIdentityType {
    Username,
    UsernamePasscode,
    Kerberos,
    Saml,
    Jwt,
}

impl UserIdentityType {
    pub(crate) fn from_wire(value: u8) -> Option<Self> {
        Some(match value {
            1 => UserIdentityType::Username,
            2 => UserIdentityType::UsernamePasscode,
            3 => UserIdentityType::Kerberos,
            4 => UserIdentityType::Saml,
            5 => UserIdentityType::Jwt,
            _ => return None,
        })
    }

    pub(crate) fn to_wire(self) -> u8 {
        match self {
            UserIdentityType::Username => 1,
            UserIdentityType::UsernamePasscode => 2,
            UserIdentityType::Kerberos => 3,
            UserIdentityType::Saml => 4,
            UserIdentityType::Jwt => 5,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct UserIdentityRq {
    pub identity_type: UserIdentityType,
    pub positive_response_requested: bool,
    pub primary_field: Vec<u8>,
    /// Required non-empty when `identity_type` is `UsernamePasscode`.
    pub secondary_field: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct UserIdentityAc {
    pub server_response: Vec<u8>,
}
