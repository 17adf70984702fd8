//! Association requestor (service class user) module.

use std::{
    borrow::Cow,
    net::{TcpStream, ToSocketAddrs},
};

use snafu::{ensure, ResultExt, Snafu};
use tracing::{debug, warn};

use crate::{
    ae_title::AeTitle,
    fsm::{self, ArtimTimer},
    negotiation,
    pdu::{
        self, reader::read_pdu, writer::write_pdu, AbortRq, AbortRqReason, AbortRqSource,
        AssociationAC, AssociationRJ, AssociationRJSource, AssociationRQ, Pdu,
        PresentationContextProposed, UserIdentityRq, UserVariableItem,
    },
    primitives::{PresentationContext, UserIdentityRequest},
    uid::Uid,
};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// missing abstract syntax to begin negotiation
    MissingAbstractSyntax,

    /// invalid application entity title or UID in the request
    InvalidArgument { source: crate::primitives::InvalidArgument },

    /// could not connect to server
    Connect { source: std::io::Error },

    /// failed to send a PDU
    Send { source: crate::pdu::writer::Error },

    /// failed to receive a PDU
    Receive { source: crate::pdu::reader::Error },

    #[snafu(display("unexpected PDU from acceptor: {}", pdu.short_description()))]
    UnexpectedResponse { pdu: Pdu },

    #[snafu(display("protocol version mismatch: expected {}, got {}", expected, got))]
    ProtocolVersionMismatch { expected: u16, got: u16 },

    #[snafu(display("association rejected by acceptor: {:?} / {:?}", result, source))]
    Rejected {
        result: crate::pdu::AssociationRJResult,
        source: AssociationRJSource,
    },

    /// no presentation context was accepted by the acceptor
    NoAcceptedPresentationContexts,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A DICOM association builder for the requestor (SCU) side.
///
/// The final outcome is a [`ClientAssociation`].
///
/// # Example
///
/// ```no_run
/// # use dicom_ul::association::client::ClientAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let association = ClientAssociationOptions::new()
///    .with_abstract_syntax("1.2.840.10008.1.1")
///    .with_transfer_syntax("1.2.840.10008.1.2.1")
///    .establish("127.0.0.1:104")?;
/// # Ok(())
/// # }
/// ```
///
/// The SCU admits, by default, the transfer syntaxes _Implicit VR Little
/// Endian_ and _Explicit VR Little Endian_ for every proposed abstract
/// syntax; other transfer syntaxes can be added via `with_transfer_syntax`.
#[derive(Debug, Clone)]
pub struct ClientAssociationOptions {
    calling_ae_title: Cow<'static, str>,
    called_ae_title: Cow<'static, str>,
    application_context_name: Cow<'static, str>,
    abstract_syntax_uids: Vec<Cow<'static, str>>,
    transfer_syntax_uids: Vec<Cow<'static, str>>,
    user_identity: Option<UserIdentityRequest>,
    protocol_version: u16,
    max_pdu_length: u32,
}

impl Default for ClientAssociationOptions {
    fn default() -> Self {
        ClientAssociationOptions {
            calling_ae_title: "THIS-SCU".into(),
            called_ae_title: "ANY-SCP".into(),
            application_context_name: "1.2.840.10008.3.1.1.1".into(),
            abstract_syntax_uids: Vec::new(),
            transfer_syntax_uids: Vec::new(),
            user_identity: None,
            protocol_version: 1,
            max_pdu_length: pdu::DEFAULT_MAX_PDU,
        }
    }
}

impl ClientAssociationOptions {
    /// Create a new set of options for establishing an association.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the calling application entity title, referring to this node.
    /// Default is `THIS-SCU`.
    pub fn calling_ae_title<T>(mut self, calling_ae_title: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.calling_ae_title = calling_ae_title.into();
        self
    }

    /// Define the called application entity title, referring to the target
    /// node. Default is `ANY-SCP`.
    pub fn called_ae_title<T>(mut self, called_ae_title: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.called_ae_title = called_ae_title.into();
        self
    }

    /// Include this abstract syntax in the list of proposed presentation
    /// contexts.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.abstract_syntax_uids.push(abstract_syntax_uid.into());
        self
    }

    /// Include this transfer syntax in every proposed presentation context.
    pub fn with_transfer_syntax<T>(mut self, transfer_syntax_uid: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.transfer_syntax_uids.push(transfer_syntax_uid.into());
        self
    }

    /// Attach a User Identity sub-item to the request.
    pub fn user_identity(mut self, identity: UserIdentityRequest) -> Self {
        self.user_identity = Some(identity);
        self
    }

    /// Override the maximum PDU length this node is willing to receive.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Open the TCP connection and drive the association state machine
    /// through establishment (Sta1 -> Sta4 -> Sta5 -> Sta6).
    pub fn establish<A: ToSocketAddrs>(self, address: A) -> Result<ClientAssociation> {
        ensure!(!self.abstract_syntax_uids.is_empty(), MissingAbstractSyntaxSnafu);

        let mut transfer_syntax_uids = self.transfer_syntax_uids.clone();
        if transfer_syntax_uids.is_empty() {
            transfer_syntax_uids.push("1.2.840.10008.1.2.1".into()); // Explicit VR LE
            transfer_syntax_uids.push("1.2.840.10008.1.2".into()); // Implicit VR LE
        }

        let calling_ae_title: AeTitle =
            self.calling_ae_title.parse().context(InvalidArgumentSnafu)?;
        let called_ae_title: AeTitle =
            self.called_ae_title.parse().context(InvalidArgumentSnafu)?;
        let application_context_name =
            Uid::new(self.application_context_name.as_ref()).context(InvalidArgumentSnafu)?;

        let transfer_syntaxes: Vec<Uid> = transfer_syntax_uids
            .iter()
            .map(|s| Uid::new(s.as_ref()))
            .collect::<std::result::Result<_, _>>()
            .context(InvalidArgumentSnafu)?;

        // Presentation context ids are odd and assigned solely by the
        // requestor, Part 8 §7.1.1.13.
        let presentation_contexts: Vec<PresentationContextProposed> = self
            .abstract_syntax_uids
            .iter()
            .enumerate()
            .map(|(i, uid)| {
                Ok(PresentationContextProposed {
                    id: (2 * i + 1) as u8,
                    abstract_syntax: Uid::new(uid.as_ref())?,
                    transfer_syntaxes: transfer_syntaxes.clone(),
                })
            })
            .collect::<std::result::Result<_, crate::uid::InvalidUid>>()
            .map_err(crate::primitives::InvalidArgument::from)
            .context(InvalidArgumentSnafu)?;

        let mut user_variables = vec![
            UserVariableItem::MaxLength(self.max_pdu_length),
            UserVariableItem::ImplementationClassUid(
                Uid::new(crate::IMPLEMENTATION_CLASS_UID).expect("built-in UID is valid"),
            ),
            UserVariableItem::ImplementationVersionName(
                crate::IMPLEMENTATION_VERSION_NAME.to_string(),
            ),
        ];
        if let Some(identity) = &self.user_identity {
            user_variables.push(UserVariableItem::UserIdentityRq(UserIdentityRq {
                identity_type: match identity.identity_type {
                    crate::primitives::UserIdentityType::Username => pdu::UserIdentityType::Username,
                    crate::primitives::UserIdentityType::UsernamePasscode => {
                        pdu::UserIdentityType::UsernamePasscode
                    }
                    crate::primitives::UserIdentityType::Kerberos => pdu::UserIdentityType::Kerberos,
                    crate::primitives::UserIdentityType::Saml => pdu::UserIdentityType::Saml,
                    crate::primitives::UserIdentityType::Jwt => pdu::UserIdentityType::Jwt,
                },
                positive_response_requested: identity.positive_response_requested,
                primary_field: identity.primary_field.clone(),
                secondary_field: identity.secondary_field.clone(),
            }));
        }

        let request = AssociationRQ {
            protocol_version: self.protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts: presentation_contexts.clone(),
            user_variables,
        };

        let mut artim = ArtimTimer::new();
        let mut socket = TcpStream::connect(address).context(ConnectSnafu)?;
        debug!("Sta1 -> Sta4: opening transport connection");

        write_pdu(&mut socket, &Pdu::AssociationRQ(request)).context(SendSnafu)?;
        debug!("Sta4 -> Sta5: sent A-ASSOCIATE-RQ");
        artim.arm();

        let response = read_pdu(&mut socket).context(ReceiveSnafu)?;
        artim.disarm();

        match response {
            Pdu::AssociationAC(AssociationAC {
                protocol_version: protocol_version_acceptor,
                presentation_contexts: results,
                user_variables: acceptor_variables,
                ..
            }) => {
                ensure!(
                    self.protocol_version == protocol_version_acceptor,
                    ProtocolVersionMismatchSnafu {
                        expected: self.protocol_version,
                        got: protocol_version_acceptor,
                    }
                );

                let negotiated = negotiation::negotiate_as_requestor(&presentation_contexts, &results);
                ensure!(
                    negotiated.iter().any(PresentationContext::is_accepted),
                    NoAcceptedPresentationContextsSnafu
                );

                let max_pdu_length = acceptor_variables
                    .iter()
                    .find_map(|v| match v {
                        UserVariableItem::MaxLength(n) => Some(*n),
                        _ => None,
                    })
                    .unwrap_or(pdu::DEFAULT_MAX_PDU);

                debug!("Sta5 -> Sta6: association established");

                Ok(ClientAssociation {
                    presentation_contexts: negotiated,
                    max_pdu_length,
                    socket,
                    state: fsm::State::Established,
                    artim,
                })
            }
            Pdu::AssociationRJ(AssociationRJ { result, source }) => {
                debug!("Sta5 -> Sta1: received A-ASSOCIATE-RJ");
                RejectedSnafu { result, source }.fail()
            }
            other => {
                warn!(pdu = other.short_description(), "unexpected PDU awaiting association response");
                let _ = write_pdu(
                    &mut socket,
                    &Pdu::Abort(AbortRq {
                        source: AbortRqSource::ServiceUser,
                        reason: AbortRqReason::UnexpectedPdu,
                    }),
                );
                UnexpectedResponseSnafu { pdu: other }.fail()
            }
        }
    }
}

/// A DICOM upper layer association from the requestor's perspective.
#[derive(Debug)]
pub struct ClientAssociation {
    /// The authoritative negotiated presentation context table.
    presentation_contexts: Vec<PresentationContext>,
    /// The maximum P-DATA fragment length the acceptor declared.
    max_pdu_length: u32,
    socket: TcpStream,
    state: fsm::State,
    artim: ArtimTimer,
}

impl ClientAssociation {
    /// The negotiated presentation contexts, in the order proposed.
    pub fn presentation_contexts(&self) -> &[PresentationContext] {
        &self.presentation_contexts
    }

    /// Find the accepted context for a given abstract syntax, if any.
    pub fn find_presentation_context(&self, abstract_syntax: &str) -> Option<&PresentationContext> {
        self.presentation_contexts
            .iter()
            .find(|pc| pc.is_accepted() && pc.abstract_syntax.as_str() == abstract_syntax)
    }

    /// The maximum length of a single P-DATA fragment the acceptor will
    /// receive.
    pub fn max_pdu_length(&self) -> u32 {
        self.max_pdu_length
    }

    /// Send a PDU message to the acceptor. Only valid while established.
    pub fn send(&mut self, msg: &Pdu) -> Result<()> {
        ensure!(self.state.is_established(), UnexpectedResponseSnafu { pdu: msg.clone() });
        write_pdu(&mut self.socket, msg).context(SendSnafu)
    }

    /// Read a PDU message from the acceptor.
    pub fn receive(&mut self) -> Result<Pdu> {
        read_pdu(&mut self.socket).context(ReceiveSnafu)
    }

    /// Gracefully release the association (Sta6 -> Sta7 -> Sta1).
    pub fn release(&mut self) -> Result<()> {
        if self.state != fsm::State::Established {
            return Ok(());
        }
        write_pdu(&mut self.socket, &Pdu::ReleaseRQ).context(SendSnafu)?;
        self.state = fsm::State::AwaitingReleaseRp;
        debug!("Sta6 -> Sta7: sent A-RELEASE-RQ");

        let pdu = read_pdu(&mut self.socket).context(ReceiveSnafu)?;
        match pdu {
            Pdu::ReleaseRP => {
                debug!("Sta7 -> Sta1: received A-RELEASE-RP");
                self.state = fsm::State::Idle;
            }
            Pdu::ReleaseRQ => {
                // release collision: both peers requested release at once.
                debug!("release collision detected, resolving as requestor");
                write_pdu(&mut self.socket, &Pdu::ReleaseRP).context(SendSnafu)?;
                let pdu = read_pdu(&mut self.socket).context(ReceiveSnafu)?;
                ensure!(matches!(pdu, Pdu::ReleaseRP), UnexpectedResponseSnafu { pdu });
                self.state = fsm::State::Idle;
            }
            other => return UnexpectedResponseSnafu { pdu: other }.fail(),
        }
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        Ok(())
    }

    /// Abort the association unconditionally (any state -> Sta13 -> Sta1).
    pub fn abort(&mut self) -> Result<()> {
        let _ = write_pdu(
            &mut self.socket,
            &Pdu::Abort(AbortRq {
                source: AbortRqSource::ServiceUser,
                reason: AbortRqReason::ReasonNotSpecified,
            }),
        );
        self.state = fsm::State::Idle;
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        Ok(())
    }
}

impl Drop for ClientAssociation {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn establish_requires_at_least_one_abstract_syntax() {
        let err = ClientAssociationOptions::new()
            .establish("127.0.0.1:1")
            .unwrap_err();
        assert!(matches!(err, Error::MissingAbstractSyntax));
    }
}
