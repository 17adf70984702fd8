//! The service primitives exchanged between the upper layer (DUL) and the
//! application layer that sits above it (ACSE/DIMSE).
//!
//! These types are wire-neutral: they hide the PDU encoding entirely and
//! expose only the fields the standard assigns semantic meaning to. The
//! [`crate::fsm`] module converts between primitives and [`crate::pdu::Pdu`]
//! values as it drives the state machine; application code normally only
//! ever sees primitives.

use snafu::{ensure, Snafu};

use crate::{
    ae_title::AeTitle,
    pdu::{RoleSelection, SopClassCommonExtendedNegotiation, SopClassExtendedNegotiation},
    uid::Uid,
};

#[derive(Debug, Snafu, Eq, PartialEq, Clone)]
#[non_exhaustive]
pub enum InvalidArgument {
    #[snafu(display("invalid UID: {}", source))]
    Uid { source: crate::uid::InvalidUid },

    #[snafu(display("invalid AE title: {}", source))]
    AeTitle { source: crate::ae_title::InvalidAeTitle },

    #[snafu(display("SCP/SCU role selection must grant at least one role"))]
    NoRoleGranted,

    #[snafu(display("user identity type 2 (username/passcode) requires a non-empty secondary field"))]
    MissingSecondaryField,
}

impl From<crate::uid::InvalidUid> for InvalidArgument {
    fn from(source: crate::uid::InvalidUid) -> Self {
        InvalidArgument::Uid { source }
    }
}

impl From<crate::ae_title::InvalidAeTitle> for InvalidArgument {
    fn from(source: crate::ae_title::InvalidAeTitle) -> Self {
        InvalidArgument::AeTitle { source }
    }
}

/// Fixed attribute values mandated by the standard for every association,
/// Part 8 Table 7-1.
pub const MODE_NORMAL: &str = "normal";
pub const PRESENTATION_REQUIREMENTS: &str = "Presentation Kernel";
pub const SESSION_REQUIREMENTS: &str = "";

/// A negotiated presentation context, as seen by the upper layer after
/// negotiation is complete.
///
/// Unlike the raw wire items in [`crate::pdu`], this carries the one
/// agreed role as well as the one selected transfer syntax -- there is
/// nothing left for the consumer to interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContext {
    pub id: u8,
    pub abstract_syntax: Uid,
    /// All transfer syntaxes proposed for this context, in proposal order.
    pub transfer_syntaxes: Vec<Uid>,
    pub role: PresentationContextRole,
    pub result: Option<PresentationContextResultReason>,
}

impl PresentationContext {
    /// The single selected transfer syntax, if this context was accepted.
    ///
    /// Returns `None` for a rejected or still-pending context: per the
    /// standard its transfer syntax is undefined and must not be
    /// inspected.
    pub fn accepted_transfer_syntax(&self) -> Option<&Uid> {
        match self.result {
            Some(PresentationContextResultReason::Acceptance) => self.transfer_syntaxes.first(),
            _ => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.result, Some(PresentationContextResultReason::Acceptance))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresentationContextRole {
    pub scu: bool,
    pub scp: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationContextResultReason {
    Acceptance,
    UserRejection,
    NoReason,
    AbstractSyntaxNotSupported,
    TransferSyntaxesNotSupported,
}

/// Result/source/diagnostic of an A-ASSOCIATE response, present only on
/// the confirmation primitive (absent on a request/indication).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociateResult {
    Accepted,
    RejectedPermanent,
    RejectedTransient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociateResultSource {
    ServiceUser,
    ServiceProviderAcse,
    ServiceProviderPresentation,
}

/// The A-ASSOCIATE primitive, serving indifferently as request,
/// indication, response, or confirmation; the variant is disambiguated by
/// the caller's use site and by whether `result` is populated.
#[derive(Debug, Clone)]
pub struct AssociateServiceParameters {
    pub application_context_name: Uid,
    pub calling_ae_title: AeTitle,
    pub called_ae_title: AeTitle,
    /// Proposed contexts (request) or the authoritative negotiated table
    /// (response/confirmation), depending on use site.
    pub presentation_contexts: Vec<PresentationContext>,
    pub user_information: UserInformation,
    /// `None` on a request/indication; populated on response/confirmation.
    pub result: Option<AssociateResult>,
    pub result_source: Option<AssociateResultSource>,
    pub diagnostic: Option<String>,
    pub calling_presentation_address: Option<std::net::SocketAddr>,
    pub called_presentation_address: Option<std::net::SocketAddr>,
    pub mode: &'static str,
    pub presentation_requirements: &'static str,
    pub session_requirements: &'static str,
}

impl AssociateServiceParameters {
    pub fn new_request(
        application_context_name: Uid,
        calling_ae_title: AeTitle,
        called_ae_title: AeTitle,
        presentation_contexts: Vec<PresentationContext>,
        user_information: UserInformation,
    ) -> Self {
        AssociateServiceParameters {
            application_context_name,
            calling_ae_title,
            called_ae_title,
            presentation_contexts,
            user_information,
            result: None,
            result_source: None,
            diagnostic: None,
            calling_presentation_address: None,
            called_presentation_address: None,
            mode: MODE_NORMAL,
            presentation_requirements: PRESENTATION_REQUIREMENTS,
            session_requirements: SESSION_REQUIREMENTS,
        }
    }
}

/// The collection of User Information sub-primitives attached to an
/// A-ASSOCIATE request or response.
#[derive(Debug, Clone, Default)]
pub struct UserInformation {
    pub max_pdu_length: MaximumLength,
    pub implementation_class_uid: Option<Uid>,
    pub implementation_version_name: Option<String>,
    pub async_ops_window: Option<AsyncOperationsWindow>,
    pub role_selection: Vec<RoleSelection>,
    pub sop_class_extended_negotiation: Vec<SopClassExtendedNegotiation>,
    pub sop_class_common_extended_negotiation: Vec<SopClassCommonExtendedNegotiation>,
    pub user_identity: Option<UserIdentity>,
}

/// Maximum length of a P-DATA fragment the sender is prepared to receive.
/// `0` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaximumLength(pub u32);

impl Default for MaximumLength {
    fn default() -> Self {
        MaximumLength(crate::pdu::DEFAULT_MAX_PDU)
    }
}

impl MaximumLength {
    /// `true` if this value imposes no limit on fragment size.
    pub fn is_unlimited(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncOperationsWindow {
    /// 0 means unlimited.
    pub invoked: u16,
    /// 0 means unlimited.
    pub performed: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdentity {
    Request(UserIdentityRequest),
    Accept { server_response: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdentityType {
    Username,
    UsernamePasscode,
    Kerberos,
    Saml,
    Jwt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentityRequest {
    pub identity_type: UserIdentityType,
    pub positive_response_requested: bool,
    pub primary_field: Vec<u8>,
    pub secondary_field: Vec<u8>,
}

impl UserIdentityRequest {
    pub fn new(
        identity_type: UserIdentityType,
        positive_response_requested: bool,
        primary_field: Vec<u8>,
        secondary_field: Vec<u8>,
    ) -> Result<Self, InvalidArgument> {
        if identity_type == UserIdentityType::UsernamePasscode {
            ensure!(!secondary_field.is_empty(), MissingSecondaryFieldSnafu);
        }
        Ok(UserIdentityRequest {
            identity_type,
            positive_response_requested,
            primary_field,
            secondary_field,
        })
    }

    /// The textual form of `positive_response_requested`, as it would be
    /// shown in a diagnostic dump. The wire-level User Identity item
    /// encodes this as a single boolean byte -- this helper exists only
    /// so that any human-readable rendering consistently says "No" for a
    /// request not asking for a positive response, never the literal
    /// string "None".
    pub fn positive_response_requested_display(&self) -> &'static str {
        if self.positive_response_requested {
            "Yes"
        } else {
            "No"
        }
    }
}

pub fn role_selection(
    sop_class_uid: Uid,
    scu_role: bool,
    scp_role: bool,
) -> Result<RoleSelection, InvalidArgument> {
    ensure!(scu_role || scp_role, NoRoleGrantedSnafu);
    Ok(RoleSelection {
        sop_class_uid,
        scu_role,
        scp_role,
    })
}

/// The A-RELEASE primitive. `result` is `None` on a request/indication
/// and `Some(())` (the only defined value, "affirmative") on a
/// response/confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseServiceParameters {
    pub result: Option<ReleaseResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseResult {
    Affirmative,
}

/// The A-ABORT primitive, issued by the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortServiceParameters {
    pub source: AbortSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortSource {
    ServiceUser,
    ServiceProvider,
}

/// The A-P-ABORT indication, raised by the provider itself (never by the
/// peer's application layer) when a protocol or transport failure forces
/// the association down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PAbortServiceParameters {
    pub provider_reason: PAbortReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PAbortReason {
    ReasonNotSpecified = 0,
    UnrecognizedPdu = 1,
    UnexpectedPdu = 2,
    UnexpectedSequence = 4,
    UnrecognizedPduParameter = 5,
    UnexpectedPduParameter = 6,
}

/// The P-DATA primitive: an ordered sequence of presentation data values,
/// each scoped to a negotiated presentation context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PDataServiceParameters {
    pub presentation_data_value_list: Vec<(u8, Vec<u8>)>,
}

/// Any of the five service primitives the upper layer can hand to the
/// provider via `send_primitive`, or receive back via `receive_primitive`.
#[derive(Debug, Clone)]
pub enum ServiceParameters {
    Associate(Box<AssociateServiceParameters>),
    Release(ReleaseServiceParameters),
    Abort(AbortServiceParameters),
    PAbort(PAbortServiceParameters),
    PData(PDataServiceParameters),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_response_requested_renders_yes_no_never_none() {
        let req = UserIdentityRequest::new(UserIdentityType::Username, false, b"bob".to_vec(), vec![])
            .unwrap();
        assert_eq!(req.positive_response_requested_display(), "No");

        let req = UserIdentityRequest::new(UserIdentityType::Username, true, b"bob".to_vec(), vec![])
            .unwrap();
        assert_eq!(req.positive_response_requested_display(), "Yes");
    }

    #[test]
    fn username_passcode_requires_secondary_field() {
        let err = UserIdentityRequest::new(UserIdentityType::UsernamePasscode, false, b"bob".to_vec(), vec![])
            .unwrap_err();
        assert_eq!(err, InvalidArgument::MissingSecondaryField);
    }

    #[test]
    fn role_selection_requires_a_granted_role() {
        let uid = Uid::new("1.2.840.10008.1.1").unwrap();
        assert_eq!(
            role_selection(uid, false, false).unwrap_err(),
            InvalidArgument::NoRoleGranted
        );
    }

    #[test]
    fn maximum_length_zero_is_unlimited() {
        assert!(MaximumLength(0).is_unlimited());
        assert!(!MaximumLength::default().is_unlimited());
    }
}
