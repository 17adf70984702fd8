//! Association acceptor (service class provider) module.

use std::{borrow::Cow, fmt, net::TcpStream};

use snafu::{ensure, ResultExt, Snafu};
use tracing::{debug, warn};

use crate::{
    ae_title::AeTitle,
    fsm::{self, ArtimTimer},
    negotiation::{self, SupportedAbstractSyntax},
    pdu::{
        self, reader::read_pdu, writer::write_pdu, AbortRq, AbortRqReason, AbortRqSource,
        AssociationAC, AssociationRJ, AssociationRJResult, AssociationRJServiceUserReason,
        AssociationRJSource, AssociationRQ, Pdu, PresentationContextResult,
        PresentationContextResultReason as WireReason, RoleSelection, UserVariableItem,
    },
    primitives::{PresentationContext, PresentationContextRole},
    uid::Uid,
};

use super::pdata::PDataWriter;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// failed to receive a PDU
    Receive { source: crate::pdu::reader::Error },

    /// failed to send a PDU
    Send { source: crate::pdu::writer::Error },

    #[snafu(display("unexpected PDU from requestor: {}", pdu.short_description()))]
    UnexpectedRequest { pdu: Pdu },

    /// invalid application entity title or UID in the request
    InvalidArgument { source: crate::primitives::InvalidArgument },

    #[snafu(display("association rejected: no presentation context could be negotiated"))]
    NoAcceptedPresentationContexts,

    #[snafu(display("association request rejected: {:?}", reason))]
    Rejected { reason: AssociationRJServiceUserReason },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Decides whether an incoming association request is allowed to proceed,
/// consulted after the request is parsed but before negotiation begins.
pub trait AccessControl: fmt::Debug {
    /// Whether a request naming this calling AE title and this called
    /// AE title should be admitted.
    fn check_access(&self, calling_ae_title: &AeTitle, called_ae_title: &AeTitle) -> bool;
}

/// Admits every request unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAny;

impl AccessControl for AcceptAny {
    fn check_access(&self, _calling_ae_title: &AeTitle, _called_ae_title: &AeTitle) -> bool {
        true
    }
}

/// Admits a request only if its called AE title (the title the requestor
/// dialed) matches one of a fixed set -- useful for a provider that hosts
/// several AE titles behind a single port and must refuse traffic
/// addressed to an AE title it does not serve.
#[derive(Debug, Clone)]
pub struct AcceptCalledAeTitle {
    allowed: Vec<AeTitle>,
}

impl AcceptCalledAeTitle {
    pub fn new(allowed: Vec<AeTitle>) -> Self {
        AcceptCalledAeTitle { allowed }
    }
}

impl AccessControl for AcceptCalledAeTitle {
    fn check_access(&self, _calling_ae_title: &AeTitle, called_ae_title: &AeTitle) -> bool {
        self.allowed.iter().any(|ae| ae == called_ae_title)
    }
}

/// A DICOM association builder for the acceptor (SCP) side.
///
/// The final outcome is a [`ServerAssociation`], built by driving the
/// upper layer state machine through establishment over an already
/// accepted transport connection (Sta2 -> Sta3 -> Sta6).
///
/// # Example
///
/// ```no_run
/// # use dicom_ul::association::server::ServerAssociationOptions;
/// # use std::net::TcpListener;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let listener = TcpListener::bind("127.0.0.1:104")?;
/// let (socket, _addr) = listener.accept()?;
/// let association = ServerAssociationOptions::new()
///     .with_abstract_syntax("1.2.840.10008.1.1")
///     .establish(socket)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ServerAssociationOptions<A = AcceptAny> {
    ae_title: Cow<'static, str>,
    application_context_name: Cow<'static, str>,
    supported_abstract_syntaxes: Vec<SupportedAbstractSyntax>,
    transfer_syntax_uids: Vec<Cow<'static, str>>,
    access_control: A,
    max_pdu_length: u32,
    promiscuous: bool,
}

impl Default for ServerAssociationOptions<AcceptAny> {
    fn default() -> Self {
        ServerAssociationOptions {
            ae_title: "THIS-SCP".into(),
            application_context_name: "1.2.840.10008.3.1.1.1".into(),
            supported_abstract_syntaxes: Vec::new(),
            transfer_syntax_uids: Vec::new(),
            access_control: AcceptAny,
            max_pdu_length: pdu::DEFAULT_MAX_PDU,
            promiscuous: false,
        }
    }
}

impl ServerAssociationOptions<AcceptAny> {
    /// Create a new set of options for accepting associations.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<A> ServerAssociationOptions<A>
where
    A: AccessControl,
{
    /// Define this node's own AE title. Not validated against the request
    /// by default; supply an [`AccessControl`] policy for that.
    pub fn ae_title<T>(mut self, ae_title: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.ae_title = ae_title.into();
        self
    }

    /// Declare support for an abstract syntax, granting it the acceptor
    /// (SCP) role by default.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.supported_abstract_syntaxes.push(SupportedAbstractSyntax {
            abstract_syntax: placeholder_uid(abstract_syntax_uid.into()),
            transfer_syntaxes: Vec::new(),
            role: PresentationContextRole { scu: false, scp: true },
        });
        self
    }

    /// Declare support for an abstract syntax with an explicit role,
    /// consulted only when the requestor proposes role selection for it.
    pub fn with_supported_abstract_syntax_and_role<T>(
        mut self,
        abstract_syntax_uid: T,
        role: PresentationContextRole,
    ) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.supported_abstract_syntaxes.push(SupportedAbstractSyntax {
            abstract_syntax: placeholder_uid(abstract_syntax_uid.into()),
            transfer_syntaxes: Vec::new(),
            role,
        });
        self
    }

    /// Include this transfer syntax in the set accepted for every
    /// declared abstract syntax.
    pub fn with_transfer_syntax<T>(mut self, transfer_syntax_uid: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.transfer_syntax_uids.push(transfer_syntax_uid.into());
        self
    }

    /// Accept every proposed abstract syntax, regardless of whether it
    /// was declared with [`with_abstract_syntax`](Self::with_abstract_syntax).
    /// Still subject to transfer syntax negotiation.
    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    /// Override the maximum PDU length this node is willing to receive.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Replace the access control policy used to admit requests.
    pub fn access_control<A2>(self, access_control: A2) -> ServerAssociationOptions<A2>
    where
        A2: AccessControl,
    {
        ServerAssociationOptions {
            ae_title: self.ae_title,
            application_context_name: self.application_context_name,
            supported_abstract_syntaxes: self.supported_abstract_syntaxes,
            transfer_syntax_uids: self.transfer_syntax_uids,
            access_control,
            max_pdu_length: self.max_pdu_length,
            promiscuous: self.promiscuous,
        }
    }

    /// Drive the association state machine through establishment over an
    /// already accepted transport connection (Sta2 -> Sta3 -> Sta6).
    pub fn establish(self, mut socket: TcpStream) -> Result<ServerAssociation> {
        let mut artim = ArtimTimer::new();
        artim.arm();
        debug!("Sta1 -> Sta2: transport connection accepted, ARTIM armed");

        let request = match read_pdu(&mut socket).context(ReceiveSnafu)? {
            Pdu::AssociationRQ(rq) => rq,
            other => {
                warn!(pdu = other.short_description(), "unexpected PDU awaiting association request");
                return UnexpectedRequestSnafu { pdu: other }.fail();
            }
        };
        artim.disarm();
        debug!("Sta2 -> Sta3: received A-ASSOCIATE-RQ");

        let application_context_name =
            Uid::new(self.application_context_name.as_ref()).context(InvalidArgumentSnafu)?;

        let context_mismatch = request.application_context_name != application_context_name;
        let access_denied =
            !self.access_control.check_access(&request.calling_ae_title, &request.called_ae_title);

        if context_mismatch || access_denied {
            let reason = if context_mismatch {
                AssociationRJServiceUserReason::ApplicationContextNameNotSupported
            } else {
                AssociationRJServiceUserReason::CalledAeTitleNotRecognized
            };
            debug!("Sta3 -> Sta13: rejecting association request");
            write_pdu(
                &mut socket,
                &Pdu::AssociationRJ(AssociationRJ {
                    result: AssociationRJResult::Permanent,
                    source: AssociationRJSource::ServiceUser(reason),
                }),
            )
            .context(SendSnafu)?;
            return RejectedSnafu { reason }.fail();
        }

        let role_requests: Vec<RoleSelection> = request
            .user_variables
            .iter()
            .filter_map(|v| match v {
                UserVariableItem::RoleSelection(rs) => Some(rs.clone()),
                _ => None,
            })
            .collect();

        let supported = self.resolve_supported_abstract_syntaxes(&request);

        let negotiated = negotiation::negotiate_as_acceptor(
            &request.presentation_contexts,
            &supported,
            &role_requests,
        );

        if negotiation::all_contexts_rejected(&negotiated) {
            debug!("Sta3 -> Sta13: no presentation context could be negotiated");
            write_pdu(
                &mut socket,
                &Pdu::AssociationRJ(AssociationRJ {
                    result: AssociationRJResult::Permanent,
                    source: AssociationRJSource::ServiceUser(
                        AssociationRJServiceUserReason::NoReasonGiven,
                    ),
                }),
            )
            .context(SendSnafu)?;
            return NoAcceptedPresentationContextsSnafu.fail();
        }

        let presentation_contexts: Vec<PresentationContextResult> = negotiated
            .iter()
            .map(|pc| PresentationContextResult {
                id: pc.id,
                reason: to_wire_reason(pc.result.expect("negotiated contexts always carry a result")),
                transfer_syntax: pc
                    .transfer_syntaxes
                    .first()
                    .cloned()
                    .unwrap_or_else(|| pc.abstract_syntax.clone()),
            })
            .collect();

        let role_replies = negotiation::role_selection_replies(&role_requests, &supported);

        let mut user_variables = vec![
            UserVariableItem::MaxLength(self.max_pdu_length),
            UserVariableItem::ImplementationClassUid(
                Uid::new(crate::IMPLEMENTATION_CLASS_UID).expect("built-in UID is valid"),
            ),
            UserVariableItem::ImplementationVersionName(
                crate::IMPLEMENTATION_VERSION_NAME.to_string(),
            ),
        ];
        user_variables.extend(role_replies.into_iter().map(UserVariableItem::RoleSelection));

        let requestor_max_pdu_length = request
            .user_variables
            .iter()
            .find_map(|v| match v {
                UserVariableItem::MaxLength(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(pdu::DEFAULT_MAX_PDU);

        let response = AssociationAC {
            protocol_version: request.protocol_version,
            calling_ae_title: request.calling_ae_title,
            called_ae_title: request.called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        };

        write_pdu(&mut socket, &Pdu::AssociationAC(response)).context(SendSnafu)?;
        debug!("Sta3 -> Sta6: sent A-ASSOCIATE-AC, association established");

        Ok(ServerAssociation {
            presentation_contexts: negotiated,
            max_pdu_length: requestor_max_pdu_length,
            socket,
            state: fsm::State::Established,
            artim,
        })
    }

    fn resolve_supported_abstract_syntaxes(
        &self,
        request: &AssociationRQ,
    ) -> Vec<SupportedAbstractSyntax> {
        let mut transfer_syntax_uids: Vec<Cow<'static, str>> = self.transfer_syntax_uids.clone();
        if transfer_syntax_uids.is_empty() {
            transfer_syntax_uids.push("1.2.840.10008.1.2.1".into()); // Explicit VR LE
            transfer_syntax_uids.push("1.2.840.10008.1.2".into()); // Implicit VR LE
        }
        let transfer_syntaxes: Vec<Uid> = transfer_syntax_uids
            .iter()
            .filter_map(|s| Uid::new(s.as_ref()).ok())
            .collect();

        let mut supported: Vec<SupportedAbstractSyntax> = self
            .supported_abstract_syntaxes
            .iter()
            .cloned()
            .map(|mut s| {
                if s.transfer_syntaxes.is_empty() {
                    s.transfer_syntaxes = transfer_syntaxes.clone();
                }
                s
            })
            .collect();

        if self.promiscuous {
            for pc in &request.presentation_contexts {
                if !supported.iter().any(|s| s.abstract_syntax == pc.abstract_syntax) {
                    supported.push(SupportedAbstractSyntax {
                        abstract_syntax: pc.abstract_syntax.clone(),
                        transfer_syntaxes: transfer_syntaxes.clone(),
                        role: PresentationContextRole { scu: false, scp: true },
                    });
                }
            }
        }

        supported
    }
}

/// Placeholder used while building [`SupportedAbstractSyntax`] entries
/// from possibly-invalid caller input; an entry built from an invalid
/// UID simply never matches during negotiation, rather than panicking
/// deep inside a builder chain.
fn placeholder_uid(uid: Cow<'static, str>) -> Uid {
    Uid::new(uid.as_ref())
        .unwrap_or_else(|_| Uid::new("0").expect("'0' is a syntactically valid, if meaningless, UID"))
}

fn to_wire_reason(reason: crate::primitives::PresentationContextResultReason) -> WireReason {
    use crate::primitives::PresentationContextResultReason as P;
    match reason {
        P::Acceptance => WireReason::Acceptance,
        P::UserRejection => WireReason::UserRejection,
        P::NoReason => WireReason::NoReason,
        P::AbstractSyntaxNotSupported => WireReason::AbstractSyntaxNotSupported,
        P::TransferSyntaxesNotSupported => WireReason::TransferSyntaxesNotSupported,
    }
}

/// A DICOM upper layer association from the acceptor's perspective.
#[derive(Debug)]
pub struct ServerAssociation {
    presentation_contexts: Vec<PresentationContext>,
    max_pdu_length: u32,
    socket: TcpStream,
    state: fsm::State,
    artim: ArtimTimer,
}

impl ServerAssociation {
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

    /// The maximum length of a single P-DATA fragment the requestor will
    /// receive.
    pub fn max_pdu_length(&self) -> u32 {
        self.max_pdu_length
    }

    /// Send a PDU message to the requestor. Only valid while established.
    pub fn send(&mut self, msg: &Pdu) -> Result<()> {
        ensure!(self.state.is_established(), UnexpectedRequestSnafu { pdu: msg.clone() });
        write_pdu(&mut self.socket, msg).context(SendSnafu)
    }

    /// Obtain a writer that fragments and sends P-DATA values for the
    /// given presentation context.
    pub fn send_pdata(
        &mut self,
        presentation_context_id: u8,
        is_command: bool,
    ) -> PDataWriter<&mut TcpStream> {
        PDataWriter::new(&mut self.socket, presentation_context_id, is_command, self.max_pdu_length)
    }

    /// Read a PDU message from the requestor.
    ///
    /// A release request is answered transparently with A-RELEASE-RP
    /// before being handed back to the caller, since an affirmative
    /// response is the only one the standard defines.
    pub fn receive(&mut self) -> Result<Pdu> {
        let pdu = read_pdu(&mut self.socket).context(ReceiveSnafu)?;
        match &pdu {
            Pdu::ReleaseRQ => {
                debug!("Sta6 -> Sta8 -> Sta1: received A-RELEASE-RQ, replying with A-RELEASE-RP");
                write_pdu(&mut self.socket, &Pdu::ReleaseRP).context(SendSnafu)?;
                self.state = fsm::State::Idle;
                let _ = self.socket.shutdown(std::net::Shutdown::Both);
            }
            Pdu::Abort(_) => {
                debug!("association aborted by requestor");
                self.state = fsm::State::Idle;
            }
            _ => {}
        }
        Ok(pdu)
    }

    /// Abort the association unconditionally (any state -> Sta13 -> Sta1).
    pub fn abort(&mut self) -> Result<()> {
        let _ = write_pdu(
            &mut self.socket,
            &Pdu::Abort(AbortRq {
                source: AbortRqSource::ServiceProvider,
                reason: AbortRqReason::ReasonNotSpecified,
            }),
        );
        self.state = fsm::State::Idle;
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        Ok(())
    }
}

impl Drop for ServerAssociation {
    fn drop(&mut self) {
        if self.state.is_established() {
            let _ = self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_called_ae_title_matches_exactly() {
        let ac = AcceptCalledAeTitle::new(vec![AeTitle::new("ANY-SCP").unwrap()]);
        let calling = AeTitle::new("SOME-SCU").unwrap();
        assert!(ac.check_access(&calling, &AeTitle::new("ANY-SCP").unwrap()));
        assert!(!ac.check_access(&calling, &AeTitle::new("OTHER-SCP").unwrap()));
    }

    #[test]
    fn accept_any_always_passes() {
        let calling = AeTitle::new("SOME-SCU").unwrap();
        let called = AeTitle::new("ANY-SCP").unwrap();
        assert!(AcceptAny.check_access(&calling, &called));
    }
}
