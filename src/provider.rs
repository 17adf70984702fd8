//! The transport-owning DUL service provider: a long-running task that
//! reads PDUs off the wire, classifies them into [`fsm::Event`]s, drains
//! a send-queue of primitives from the upper layer, drives [`fsm`], and
//! delivers decoded primitives back upward.
//!
//! Unlike [`crate::association::client`]/[`crate::association::server`],
//! which speak directly in PDUs over a borrowed socket, this module
//! exposes the primitive-oriented interface of `send_primitive` /
//! `receive_primitive` over bounded queues, with the provider task
//! running on its own thread. A `std::net::TcpStream` cannot be
//! `select`-ed alongside a channel, so the socket read is delegated to a
//! dedicated reader thread; the provider's own loop multiplexes the
//! resulting transport-event channel against the send-queue with
//! `crossbeam_channel::Select`, polling ARTIM on every wakeup. Once the
//! state machine reaches a terminal state the provider shuts its socket
//! down before returning, which unblocks the reader thread's pending
//! read so it can be joined rather than left running past the
//! association's lifetime.

use std::{
    collections::VecDeque,
    io,
    net::TcpStream,
    thread::JoinHandle,
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, Select, Sender};
use tracing::{debug, error, trace, warn};

use crate::{
    fsm::{self, Action, ArtimTimer, Event, State},
    negotiation,
    pdu::{
        self, reader::read_pdu, writer::write_pdu, AbortRq, AbortRqReason, AbortRqSource,
        AssociationAC, AssociationRJ, AssociationRJResult, AssociationRJSource,
        AssociationRJServiceProviderAcseReason, AssociationRJServiceProviderPresentationReason,
        AssociationRJServiceUserReason, AssociationRQ, AsyncOperationsWindow, PDataTf, Pdu,
        PresentationContextProposed, PresentationContextResult,
        PresentationContextResultReason as WireReason, PresentationDataValue, UserIdentityAc,
        UserIdentityRq, UserVariableItem,
    },
    primitives::{
        AbortServiceParameters, AbortSource, AssociateResult, AssociateResultSource,
        AssociateServiceParameters, MaximumLength, PAbortReason, PAbortServiceParameters,
        PDataServiceParameters, PresentationContext, PresentationContextRole, ReleaseResult,
        ReleaseServiceParameters, ServiceParameters, UserIdentity, UserIdentityRequest,
        UserInformation,
    },
};

/// How often the provider loop wakes up even with nothing in either
/// queue, so that ARTIM expiry is always observed well within the
/// one-second bound.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Depth of the bounded queues linking the provider task to its caller.
const QUEUE_DEPTH: usize = 16;

/// An occurrence on the transport, classified by the reader thread.
enum TransportEvent {
    Pdu(Pdu),
    /// The peer closed the connection, or reset it.
    Closed,
    /// A malformed PDU could not be decoded at all.
    Malformed,
    /// Any other I/O failure.
    IoError,
}

/// An event queued for dispatch, carrying the owned primitive that
/// produced it when it came from the upper layer rather than the wire.
/// `execute` needs the original [`ServiceParameters`] to encode the
/// outbound PDU for actions AE-7/AE-8/DT-1; a bare [`Event`] has already
/// thrown that payload away.
enum QueuedEvent {
    FromTransport(Event),
    FromCaller(Event, ServiceParameters),
}

/// Spawn a thread that blocks on `read_pdu` in a loop, forwarding each
/// outcome as a [`TransportEvent`]. Exits as soon as the connection is
/// no longer usable or the channel's other end is dropped.
fn spawn_reader(mut socket: TcpStream, tx: Sender<TransportEvent>) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        match read_pdu(&mut socket) {
            Ok(pdu) => {
                if tx.send(TransportEvent::Pdu(pdu)).is_err() {
                    return;
                }
            }
            Err(err) => {
                let event = classify_read_error(&err);
                let _ = tx.send(event);
                return;
            }
        }
    })
}

fn classify_read_error(err: &crate::pdu::reader::Error) -> TransportEvent {
    use crate::pdu::reader::Error as E;
    let io_source = match err {
        E::ReadHeader { source, .. } | E::ReadBody { source, .. } => Some(source),
        _ => None,
    };
    match io_source {
        Some(source)
            if matches!(
                source.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ) =>
        {
            TransportEvent::Closed
        }
        Some(_) => TransportEvent::IoError,
        None => TransportEvent::Malformed,
    }
}

/// A handle used by the upper layer to drive a running provider task.
pub struct ProviderHandle {
    to_provider: Sender<ServiceParameters>,
    from_provider: Receiver<ServiceParameters>,
    join: Option<JoinHandle<()>>,
}

impl ProviderHandle {
    /// Enqueue a primitive for the provider to classify and act on.
    /// Never blocks the caller on network I/O: only the bounded queue.
    pub fn send_primitive(&self, primitive: ServiceParameters) -> Result<(), ServiceParameters> {
        self.to_provider.send(primitive).map_err(|e| e.into_inner())
    }

    /// Block until the provider delivers the next decoded primitive, or
    /// it returns `None` once the provider has shut down and its queue
    /// is drained.
    pub fn receive_primitive(&self) -> Option<ServiceParameters> {
        self.from_provider.recv().ok()
    }

    /// Same as [`receive_primitive`](Self::receive_primitive), but gives
    /// up after `timeout` rather than blocking indefinitely.
    pub fn receive_primitive_timeout(&self, timeout: Duration) -> Option<ServiceParameters> {
        self.from_provider.recv_timeout(timeout).ok()
    }

    /// Request an immediate abort and wait for the provider task to
    /// finish tearing down the connection.
    pub fn kill(mut self) {
        let _ = self.send_primitive(ServiceParameters::Abort(AbortServiceParameters {
            source: AbortSource::ServiceUser,
        }));
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// The provider task's own state: the FSM state, its ARTIM timer, the
/// socket it owns for writes, and the pending-event queue described by
/// spec.md's main loop.
struct Provider {
    state: State,
    artim: ArtimTimer,
    socket: TcpStream,
    is_requestor: bool,
    events: VecDeque<QueuedEvent>,
    to_caller: Sender<ServiceParameters>,
    /// The most recently classified inbound PDU, held until its event is
    /// dispatched so the matching `deliver_*` call can read its payload.
    pending_pdu: Option<Pdu>,
    /// The requestor's own A-ASSOCIATE-RQ, kept so the AE-3/AE-4 confirmation
    /// can be built against it (the AC only echoes AE titles and the
    /// application context name; the RJ carries neither).
    requested: Option<AssociationRQ>,
    /// Join handle for the reader thread, taken and joined once the
    /// provider shuts the socket down on reaching a terminal state.
    reader_join: Option<JoinHandle<()>>,
}

/// Start a provider task for the requestor side, over a socket that is
/// already connected. Sends A-ASSOCIATE-RQ immediately (action AE-2) and
/// enters Sta5.
pub fn spawn_requestor(socket: TcpStream, request: Pdu) -> io::Result<ProviderHandle> {
    spawn(socket, true, State::AwaitingAssociateResponse, Some(request))
}

/// Start a provider task for the acceptor side, over a socket that has
/// just been accepted. ARTIM is armed immediately (action AE-5) and the
/// task enters Sta2, awaiting A-ASSOCIATE-RQ.
pub fn spawn_acceptor(socket: TcpStream) -> io::Result<ProviderHandle> {
    spawn(socket, false, State::AwaitingAssociateRq, None)
}

fn spawn(
    socket: TcpStream,
    is_requestor: bool,
    initial_state: State,
    initial_pdu: Option<Pdu>,
) -> io::Result<ProviderHandle> {
    let reader_socket = socket.try_clone()?;
    let writer_socket = socket;

    let (transport_tx, transport_rx) = bounded(QUEUE_DEPTH);
    let (to_provider, from_caller) = bounded::<ServiceParameters>(QUEUE_DEPTH);
    let (to_caller, from_provider) = bounded::<ServiceParameters>(QUEUE_DEPTH);

    let reader_join = spawn_reader(reader_socket, transport_tx);

    let mut provider = Provider {
        state: initial_state,
        artim: ArtimTimer::new(),
        socket: writer_socket,
        is_requestor,
        events: VecDeque::new(),
        to_caller,
        pending_pdu: None,
        requested: None,
        reader_join: Some(reader_join),
    };

    if is_requestor {
        provider.artim.arm();
        if let Some(pdu) = initial_pdu {
            if let Pdu::AssociationRQ(rq) = &pdu {
                provider.requested = Some(rq.clone());
            }
            if let Err(err) = write_pdu(&mut provider.socket, &pdu) {
                warn!(error = %err, "failed to send initial A-ASSOCIATE-RQ");
            } else {
                debug!("Sta4 -> Sta5: sent A-ASSOCIATE-RQ");
            }
        }
    } else {
        provider.artim.arm();
        debug!("Sta1 -> Sta2: transport connection accepted, ARTIM armed");
    }

    let join = std::thread::spawn(move || provider.run(transport_rx, from_caller));

    Ok(ProviderHandle {
        to_provider,
        from_provider,
        join: Some(join),
    })
}

impl Provider {
    fn run(mut self, transport_rx: Receiver<TransportEvent>, from_caller: Receiver<ServiceParameters>) {
        loop {
            // 1. drain at most one inbound transport occurrence
            if let Ok(transport_event) = transport_rx.try_recv() {
                let event = self.classify_transport(transport_event);
                self.events.push_back(QueuedEvent::FromTransport(event));
            } else {
                // 2. drain at most one queued primitive from the caller
                if let Ok(primitive) = from_caller.try_recv() {
                    let event = classify_primitive(&primitive);
                    self.events.push_back(QueuedEvent::FromCaller(event, primitive));
                }
            }

            // 3. ARTIM expiry always takes priority over waiting further
            if self.artim.has_expired() {
                warn!("ARTIM timer expired");
                self.events.push_back(QueuedEvent::FromTransport(Event::ArtimExpired));
                self.artim.disarm();
            }

            // 4. dispatch at most one event per iteration
            if let Some(queued) = self.events.pop_front() {
                if self.dispatch(queued) {
                    self.shutdown_reader();
                    return;
                }
                continue;
            }

            // Nothing to do right now: block on whichever source wakes
            // first, bounded so ARTIM is still polled regularly.
            let mut select = Select::new();
            let transport_idx = select.recv(&transport_rx);
            let caller_idx = select.recv(&from_caller);
            match select.ready_timeout(POLL_INTERVAL) {
                Ok(idx) if idx == transport_idx => {
                    if let Ok(transport_event) = transport_rx.try_recv() {
                        let event = self.classify_transport(transport_event);
                        self.events.push_back(QueuedEvent::FromTransport(event));
                    }
                }
                Ok(idx) if idx == caller_idx => {
                    if let Ok(primitive) = from_caller.try_recv() {
                        let event = classify_primitive(&primitive);
                        self.events.push_back(QueuedEvent::FromCaller(event, primitive));
                    }
                }
                _ => {
                    // timed out: loop back around to re-check ARTIM
                }
            }
        }
    }

    /// Shuts the socket down so the reader thread's blocked `read_pdu`
    /// call returns (as a transport-closed error), then joins it. Called
    /// exactly once, right before `run` returns.
    fn shutdown_reader(&mut self) {
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        if let Some(join) = self.reader_join.take() {
            let _ = join.join();
        }
    }

    fn classify_transport(&mut self, event: TransportEvent) -> Event {
        match event {
            TransportEvent::Pdu(pdu) => {
                trace!(pdu = pdu.short_description(), "received PDU");
                let classified = classify_pdu(&pdu);
                self.pending_pdu = Some(pdu);
                classified
            }
            TransportEvent::Closed => Event::TransportClosed,
            TransportEvent::Malformed => Event::InvalidPdu,
            TransportEvent::IoError => Event::TransportClosed,
        }
    }

    /// Returns `true` once the task should exit (association returned to
    /// Sta1, or the caller's channel is gone).
    fn dispatch(&mut self, queued: QueuedEvent) -> bool {
        let (event, primitive) = match queued {
            QueuedEvent::FromTransport(event) => (event, None),
            QueuedEvent::FromCaller(event, primitive) => (event, Some(primitive)),
        };
        let (action, next) = fsm::resolve(self.state, event);
        trace!(?self.state, ?event, ?action, ?next, "FSM transition");
        self.state = next;
        self.execute(action, event, primitive);
        // Idle (Sta1) is reachable only by returning from an active
        // association (acceptance never starts there); every path into
        // it ends this task's reason to keep running.
        self.state == State::Idle
    }

    fn execute(&mut self, action: Action, event: Event, primitive: Option<ServiceParameters>) {
        use Action::*;
        match action {
            Ae1 | Ae2 => {
                // handled at spawn time for this implementation: the
                // socket is already connected before the task starts.
            }
            Ae3 | Ae4 => self.deliver_associate(),
            Ae5 => self.artim.arm(),
            Ae6 => {
                self.artim.disarm();
                self.deliver_associate();
            }
            Ae7 => {
                if let Some(ServiceParameters::Associate(params)) = primitive {
                    self.write(build_associate_ac(&params));
                } else {
                    warn!("AE-7 fired with no queued A-ASSOCIATE response primitive");
                }
            }
            Ae8 => {
                if let Some(ServiceParameters::Associate(params)) = primitive {
                    self.write(build_associate_rj(&params));
                } else {
                    warn!("AE-8 fired with no queued A-ASSOCIATE response primitive");
                }
                self.artim.arm();
            }
            Dt1 => {
                if let Some(ServiceParameters::PData(params)) = primitive {
                    self.write(build_pdata(&params));
                } else {
                    warn!("DT-1 fired with no queued P-DATA primitive");
                }
            }
            Dt2 => self.deliver_pdata(),
            Ar1 => self.write(Pdu::ReleaseRQ),
            Ar2 => self.deliver_release(None),
            Ar3 => self.deliver_release(Some(ReleaseResult::Affirmative)),
            Ar4 => {
                self.write(Pdu::ReleaseRP);
                self.artim.arm();
            }
            Ar5 => self.artim.disarm(),
            Ar6 => self.deliver_pdata(),
            Ar7 => {}
            Ar8 => self.deliver_release(None),
            Ar9 => self.write(Pdu::ReleaseRP),
            Ar10 => self.deliver_release(Some(ReleaseResult::Affirmative)),
            Aa1 => {
                self.write(Pdu::Abort(AbortRq {
                    source: AbortRqSource::ServiceUser,
                    reason: AbortRqReason::ReasonNotSpecified,
                }));
                self.artim.arm();
            }
            Aa2 => self.artim.disarm(),
            Aa3 => {
                if self.is_requestor {
                    self.deliver_pabort(PAbortReason::ReasonNotSpecified);
                }
            }
            Aa4 => self.deliver_pabort(PAbortReason::ReasonNotSpecified),
            Aa5 => self.artim.disarm(),
            Aa6 => {}
            Aa7 => self.write(Pdu::Abort(AbortRq {
                source: AbortRqSource::ServiceProvider,
                reason: AbortRqReason::UnexpectedPdu,
            })),
            Aa8 => {
                error!("protocol violation, forcing association down");
                // Evt19 (InvalidPdu) is an unrecognized/malformed PDU,
                // Part 8 Table 9-26 reason 0x01; any other event reaching
                // this fallback is a recognized PDU received out of
                // sequence, reason 0x02.
                let (pabort_reason, abort_reason) = if event == Event::InvalidPdu {
                    (PAbortReason::UnrecognizedPdu, AbortRqReason::UnrecognizedPdu)
                } else {
                    (PAbortReason::UnexpectedPdu, AbortRqReason::UnexpectedPdu)
                };
                self.deliver_pabort(pabort_reason);
                self.write(Pdu::Abort(AbortRq {
                    source: AbortRqSource::ServiceProvider,
                    reason: abort_reason,
                }));
                self.artim.arm();
            }
        }
    }

    fn write(&mut self, pdu: Pdu) {
        if let Err(err) = write_pdu(&mut self.socket, &pdu) {
            warn!(error = %err, "failed to write PDU, association likely already down");
        }
    }

    /// Delivers the A-ASSOCIATE indication (AE-6, acceptor just received
    /// the RQ) or confirmation (AE-3 accept / AE-4 reject, requestor just
    /// received the AC/RJ), built from whichever PDU is pending.
    fn deliver_associate(&mut self) {
        let params = match self.pending_pdu.take() {
            Some(Pdu::AssociationRQ(rq)) => AssociateServiceParameters::new_request(
                rq.application_context_name,
                rq.calling_ae_title,
                rq.called_ae_title,
                proposed_to_primitive_contexts(&rq.presentation_contexts),
                decode_user_information(&rq.user_variables),
            ),
            Some(Pdu::AssociationAC(ac)) => {
                let requested: &[PresentationContextProposed] = self
                    .requested
                    .as_ref()
                    .map(|rq| rq.presentation_contexts.as_slice())
                    .unwrap_or(&[]);
                let mut params = AssociateServiceParameters::new_request(
                    ac.application_context_name,
                    ac.calling_ae_title,
                    ac.called_ae_title,
                    negotiation::negotiate_as_requestor(requested, &ac.presentation_contexts),
                    decode_user_information(&ac.user_variables),
                );
                params.result = Some(AssociateResult::Accepted);
                params
            }
            Some(Pdu::AssociationRJ(rj)) => {
                let Some(requested) = self.requested.clone() else {
                    warn!("A-ASSOCIATE-RJ delivered with no matching request on file");
                    return;
                };
                let mut params = AssociateServiceParameters::new_request(
                    requested.application_context_name,
                    requested.calling_ae_title,
                    requested.called_ae_title,
                    proposed_to_primitive_contexts(&requested.presentation_contexts),
                    UserInformation::default(),
                );
                params.result = Some(match rj.result {
                    AssociationRJResult::Permanent => AssociateResult::RejectedPermanent,
                    AssociationRJResult::Transient => AssociateResult::RejectedTransient,
                });
                params.result_source = Some(match rj.source {
                    AssociationRJSource::ServiceUser(_) => AssociateResultSource::ServiceUser,
                    AssociationRJSource::ServiceProviderAcse(_) => {
                        AssociateResultSource::ServiceProviderAcse
                    }
                    AssociationRJSource::ServiceProviderPresentation(_) => {
                        AssociateResultSource::ServiceProviderPresentation
                    }
                });
                params.diagnostic = Some(format!("{:?}", rj.source));
                params
            }
            other => {
                warn!(?other, "associate delivery fired with no matching pending PDU");
                return;
            }
        };
        let _ = self
            .to_caller
            .try_send(ServiceParameters::Associate(Box::new(params)));
    }

    fn deliver_release(&self, result: Option<ReleaseResult>) {
        let _ = self
            .to_caller
            .try_send(ServiceParameters::Release(ReleaseServiceParameters { result }));
    }

    fn deliver_pdata(&mut self) {
        let values = match self.pending_pdu.take() {
            Some(Pdu::PData(pdata)) => pdata
                .values
                .into_iter()
                .map(|pdv| (pdv.presentation_context_id, pdv.data))
                .collect(),
            _ => Vec::new(),
        };
        let _ = self.to_caller.try_send(ServiceParameters::PData(PDataServiceParameters {
            presentation_data_value_list: values,
        }));
    }

    fn deliver_pabort(&self, reason: PAbortReason) {
        let _ = self
            .to_caller
            .try_send(ServiceParameters::PAbort(PAbortServiceParameters { provider_reason: reason }));
    }
}

/// Builds the wire A-ASSOCIATE-AC PDU for action AE-7 out of the local
/// user's queued (accepted) associate response primitive.
fn build_associate_ac(params: &AssociateServiceParameters) -> Pdu {
    let presentation_contexts: Vec<PresentationContextResult> = params
        .presentation_contexts
        .iter()
        .map(|pc| {
            let reason = match pc
                .result
                .expect("a context carried in an AE-7 response always has a negotiated result")
            {
                crate::primitives::PresentationContextResultReason::Acceptance => WireReason::Acceptance,
                crate::primitives::PresentationContextResultReason::UserRejection => {
                    WireReason::UserRejection
                }
                crate::primitives::PresentationContextResultReason::NoReason => WireReason::NoReason,
                crate::primitives::PresentationContextResultReason::AbstractSyntaxNotSupported => {
                    WireReason::AbstractSyntaxNotSupported
                }
                crate::primitives::PresentationContextResultReason::TransferSyntaxesNotSupported => {
                    WireReason::TransferSyntaxesNotSupported
                }
            };
            PresentationContextResult {
                id: pc.id,
                reason,
                transfer_syntax: pc
                    .transfer_syntaxes
                    .first()
                    .cloned()
                    .unwrap_or_else(|| pc.abstract_syntax.clone()),
            }
        })
        .collect();

    Pdu::AssociationAC(AssociationAC {
        protocol_version: 1,
        calling_ae_title: params.calling_ae_title.clone(),
        called_ae_title: params.called_ae_title.clone(),
        application_context_name: params.application_context_name.clone(),
        presentation_contexts,
        user_variables: encode_user_information(&params.user_information),
    })
}

/// Builds the wire A-ASSOCIATE-RJ PDU for action AE-8 out of the local
/// user's queued (rejected) associate response primitive.
fn build_associate_rj(params: &AssociateServiceParameters) -> Pdu {
    let result = match params.result {
        Some(AssociateResult::RejectedTransient) => AssociationRJResult::Transient,
        _ => AssociationRJResult::Permanent,
    };
    let source = match params.result_source {
        Some(AssociateResultSource::ServiceProviderAcse) => {
            AssociationRJSource::ServiceProviderAcse(AssociationRJServiceProviderAcseReason::NoReasonGiven)
        }
        Some(AssociateResultSource::ServiceProviderPresentation) => {
            AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
            )
        }
        _ => AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::NoReasonGiven),
    };
    Pdu::AssociationRJ(AssociationRJ { result, source })
}

/// Builds the wire P-DATA-TF PDU for action DT-1 out of the local user's
/// queued P-DATA primitive. The primitive carries one already-assembled
/// fragment per presentation context; a caller wanting to stream a
/// larger message should fragment it with
/// [`crate::association::pdata::PDataWriter`] instead.
fn build_pdata(params: &PDataServiceParameters) -> Pdu {
    Pdu::PData(PDataTf {
        values: params
            .presentation_data_value_list
            .iter()
            .map(|(presentation_context_id, data)| PresentationDataValue {
                presentation_context_id: *presentation_context_id,
                is_command: false,
                is_last: true,
                data: data.clone(),
            })
            .collect(),
    })
}

fn encode_user_information(info: &UserInformation) -> Vec<UserVariableItem> {
    let mut vars = vec![UserVariableItem::MaxLength(info.max_pdu_length.0)];

    if let Some(uid) = &info.implementation_class_uid {
        vars.push(UserVariableItem::ImplementationClassUid(uid.clone()));
    }
    if let Some(name) = &info.implementation_version_name {
        vars.push(UserVariableItem::ImplementationVersionName(name.clone()));
    }
    if let Some(window) = info.async_ops_window {
        vars.push(UserVariableItem::AsyncOperationsWindow(AsyncOperationsWindow {
            max_operations_invoked: window.invoked,
            max_operations_performed: window.performed,
        }));
    }
    vars.extend(info.role_selection.iter().cloned().map(UserVariableItem::RoleSelection));
    vars.extend(
        info.sop_class_extended_negotiation
            .iter()
            .cloned()
            .map(UserVariableItem::SopClassExtendedNegotiation),
    );
    vars.extend(
        info.sop_class_common_extended_negotiation
            .iter()
            .cloned()
            .map(UserVariableItem::SopClassCommonExtendedNegotiation),
    );
    match &info.user_identity {
        Some(UserIdentity::Request(req)) => {
            vars.push(UserVariableItem::UserIdentityRq(UserIdentityRq {
                identity_type: to_wire_identity_type(req.identity_type),
                positive_response_requested: req.positive_response_requested,
                primary_field: req.primary_field.clone(),
                secondary_field: req.secondary_field.clone(),
            }));
        }
        Some(UserIdentity::Accept { server_response }) => {
            vars.push(UserVariableItem::UserIdentityAc(UserIdentityAc {
                server_response: server_response.clone(),
            }));
        }
        None => {}
    }
    vars
}

fn to_wire_identity_type(t: crate::primitives::UserIdentityType) -> pdu::UserIdentityType {
    use crate::primitives::UserIdentityType as P;
    match t {
        P::Username => pdu::UserIdentityType::Username,
        P::UsernamePasscode => pdu::UserIdentityType::UsernamePasscode,
        P::Kerberos => pdu::UserIdentityType::Kerberos,
        P::Saml => pdu::UserIdentityType::Saml,
        P::Jwt => pdu::UserIdentityType::Jwt,
    }
}

fn from_wire_identity_type(t: pdu::UserIdentityType) -> crate::primitives::UserIdentityType {
    use crate::primitives::UserIdentityType as P;
    match t {
        pdu::UserIdentityType::Username => P::Username,
        pdu::UserIdentityType::UsernamePasscode => P::UsernamePasscode,
        pdu::UserIdentityType::Kerberos => P::Kerberos,
        pdu::UserIdentityType::Saml => P::Saml,
        pdu::UserIdentityType::Jwt => P::Jwt,
    }
}

/// Turns the wire proposal into the upper layer's own presentation
/// context type, with no result yet -- the mirror of what
/// `negotiation::negotiate_as_requestor`/`negotiate_as_acceptor` produce
/// once a result is known.
fn proposed_to_primitive_contexts(
    contexts: &[PresentationContextProposed],
) -> Vec<PresentationContext> {
    contexts
        .iter()
        .map(|pc| PresentationContext {
            id: pc.id,
            abstract_syntax: pc.abstract_syntax.clone(),
            transfer_syntaxes: pc.transfer_syntaxes.clone(),
            role: PresentationContextRole::default(),
            result: None,
        })
        .collect()
}

/// The inverse of `encode_user_information`, used to turn a peer's wire
/// User Information items back into the upper layer's own primitive.
fn decode_user_information(vars: &[UserVariableItem]) -> UserInformation {
    let mut info = UserInformation::default();
    for var in vars {
        match var {
            UserVariableItem::MaxLength(n) => info.max_pdu_length = MaximumLength(*n),
            UserVariableItem::ImplementationClassUid(uid) => {
                info.implementation_class_uid = Some(uid.clone())
            }
            UserVariableItem::ImplementationVersionName(name) => {
                info.implementation_version_name = Some(name.clone())
            }
            UserVariableItem::AsyncOperationsWindow(w) => {
                info.async_ops_window = Some(crate::primitives::AsyncOperationsWindow {
                    invoked: w.max_operations_invoked,
                    performed: w.max_operations_performed,
                })
            }
            UserVariableItem::RoleSelection(rs) => info.role_selection.push(rs.clone()),
            UserVariableItem::SopClassExtendedNegotiation(sc) => {
                info.sop_class_extended_negotiation.push(sc.clone())
            }
            UserVariableItem::SopClassCommonExtendedNegotiation(sc) => {
                info.sop_class_common_extended_negotiation.push(sc.clone())
            }
            UserVariableItem::UserIdentityRq(id) => {
                info.user_identity = Some(UserIdentity::Request(UserIdentityRequest {
                    identity_type: from_wire_identity_type(id.identity_type),
                    positive_response_requested: id.positive_response_requested,
                    primary_field: id.primary_field.clone(),
                    secondary_field: id.secondary_field.clone(),
                }));
            }
            UserVariableItem::UserIdentityAc(id) => {
                info.user_identity = Some(UserIdentity::Accept {
                    server_response: id.server_response.clone(),
                });
            }
            UserVariableItem::Unknown(tag, _) => {
                warn!(
                    tag = format!("{:#04x}", tag),
                    "skipping unrecognised User Information item while decoding a primitive"
                );
            }
        }
    }
    info
}

fn classify_pdu(pdu: &Pdu) -> Event {
    match pdu {
        Pdu::AssociationRQ(_) => Event::ReceivedAssociateRq,
        Pdu::AssociationAC(_) => Event::ReceivedAssociateAc,
        Pdu::AssociationRJ(_) => Event::ReceivedAssociateRj,
        Pdu::PData(_) => Event::ReceivedPData,
        Pdu::ReleaseRQ => Event::ReceivedReleaseRq,
        Pdu::ReleaseRP => Event::ReceivedReleaseRp,
        Pdu::Abort(_) => Event::ReceivedAbort,
        Pdu::Unknown { .. } => Event::InvalidPdu,
    }
}

fn classify_primitive(primitive: &ServiceParameters) -> Event {
    match primitive {
        ServiceParameters::Associate(params) => match params.result {
            None => Event::AssociateRequest,
            Some(AssociateResult::Accepted) => Event::LocalAssociateAccept,
            Some(_) => Event::LocalAssociateReject,
        },
        ServiceParameters::Release(params) => match params.result {
            None => Event::ReleaseRequest,
            Some(_) => Event::LocalReleaseResponse,
        },
        ServiceParameters::Abort(_) | ServiceParameters::PAbort(_) => Event::AbortRequest,
        ServiceParameters::PData(_) => Event::PDataRequest,
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;
    use crate::{
        ae_title::AeTitle,
        pdu::reader::decode_pdu,
        primitives::{PresentationContext, PresentationContextResultReason, PresentationContextRole},
        uid::Uid,
    };

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn test_provider(socket: TcpStream) -> Provider {
        Provider {
            state: State::Established,
            artim: ArtimTimer::new(),
            socket,
            is_requestor: false,
            events: VecDeque::new(),
            to_caller: bounded(1).0,
            pending_pdu: None,
            requested: None,
            reader_join: None,
        }
    }

    /// Like `test_provider`, but keeps the receiving end of `to_caller` so
    /// a test can observe what a `deliver_*` call actually enqueues.
    fn test_provider_with_caller(socket: TcpStream) -> (Provider, Receiver<ServiceParameters>) {
        let (to_caller, from_provider) = bounded(QUEUE_DEPTH);
        let provider = Provider {
            state: State::Established,
            artim: ArtimTimer::new(),
            socket,
            is_requestor: false,
            events: VecDeque::new(),
            to_caller,
            pending_pdu: None,
            requested: None,
            reader_join: None,
        };
        (provider, from_provider)
    }

    #[test]
    fn classify_primitive_distinguishes_request_from_response() {
        let request = ServiceParameters::Release(ReleaseServiceParameters { result: None });
        assert_eq!(classify_primitive(&request), Event::ReleaseRequest);

        let response = ServiceParameters::Release(ReleaseServiceParameters {
            result: Some(ReleaseResult::Affirmative),
        });
        assert_eq!(classify_primitive(&response), Event::LocalReleaseResponse);
    }

    #[test]
    fn classify_pdu_maps_every_known_variant() {
        assert_eq!(classify_pdu(&Pdu::ReleaseRQ), Event::ReceivedReleaseRq);
        assert_eq!(classify_pdu(&Pdu::ReleaseRP), Event::ReceivedReleaseRp);
        assert_eq!(
            classify_pdu(&Pdu::Unknown { pdu_type: 0xff, data: vec![] }),
            Event::InvalidPdu
        );
    }

    #[test]
    fn ae7_writes_a_real_associate_ac_pdu() {
        let (mut peer, socket) = loopback_pair();
        let mut provider = test_provider(socket);

        let params = AssociateServiceParameters::new_request(
            Uid::new("1.2.840.10008.3.1.1.1").unwrap(),
            AeTitle::new("ECHOSCU").unwrap(),
            AeTitle::new("ANY-SCP").unwrap(),
            vec![PresentationContext {
                id: 1,
                abstract_syntax: Uid::new("1.2.840.10008.1.1").unwrap(),
                transfer_syntaxes: vec![Uid::new("1.2.840.10008.1.2").unwrap()],
                role: PresentationContextRole { scu: true, scp: false },
                result: Some(PresentationContextResultReason::Acceptance),
            }],
            Default::default(),
        );

        provider.execute(
            Action::Ae7,
            Event::LocalAssociateAccept,
            Some(ServiceParameters::Associate(Box::new(params))),
        );

        let pdu = read_pdu(&mut peer).unwrap();
        match pdu {
            Pdu::AssociationAC(ac) => {
                assert_eq!(ac.presentation_contexts.len(), 1);
                assert_eq!(ac.presentation_contexts[0].transfer_syntax.as_str(), "1.2.840.10008.1.2");
            }
            other => panic!("expected A-ASSOCIATE-AC, got {:?}", other),
        }
    }

    #[test]
    fn ae8_writes_a_real_associate_rj_pdu() {
        let (mut peer, socket) = loopback_pair();
        let mut provider = test_provider(socket);

        let mut params = AssociateServiceParameters::new_request(
            Uid::new("1.2.840.10008.3.1.1.1").unwrap(),
            AeTitle::new("ECHOSCU").unwrap(),
            AeTitle::new("ANY-SCP").unwrap(),
            vec![],
            Default::default(),
        );
        params.result = Some(AssociateResult::RejectedPermanent);

        provider.execute(
            Action::Ae8,
            Event::LocalAssociateReject,
            Some(ServiceParameters::Associate(Box::new(params))),
        );

        let pdu = read_pdu(&mut peer).unwrap();
        assert!(matches!(pdu, Pdu::AssociationRJ(_)));
    }

    #[test]
    fn dt1_writes_a_real_pdata_pdu() {
        let (mut peer, socket) = loopback_pair();
        let mut provider = test_provider(socket);

        let params = PDataServiceParameters {
            presentation_data_value_list: vec![(1, b"hello".to_vec())],
        };

        provider.execute(Action::Dt1, Event::PDataRequest, Some(ServiceParameters::PData(params)));

        let bytes = {
            use std::io::Read;
            let mut buf = [0u8; 1024];
            let n = peer.read(&mut buf).unwrap();
            buf[..n].to_vec()
        };
        let pdu = decode_pdu(&bytes).unwrap();
        match pdu {
            Pdu::PData(pdata) => {
                assert_eq!(pdata.values.len(), 1);
                assert_eq!(pdata.values[0].data, b"hello".to_vec());
                assert!(pdata.values[0].is_last);
            }
            other => panic!("expected P-DATA-TF, got {:?}", other),
        }
    }

    #[test]
    fn ae7_without_a_queued_primitive_does_not_panic() {
        let (_peer, socket) = loopback_pair();
        let mut provider = test_provider(socket);
        provider.execute(Action::Ae7, Event::LocalAssociateAccept, None);
    }

    #[test]
    fn aa8_on_invalid_pdu_aborts_with_unrecognized_reason() {
        let (mut peer, socket) = loopback_pair();
        let mut provider = test_provider(socket);

        provider.execute(Action::Aa8, Event::InvalidPdu, None);

        let pdu = read_pdu(&mut peer).unwrap();
        match pdu {
            Pdu::Abort(abort) => {
                assert_eq!(abort.source, AbortRqSource::ServiceProvider);
                assert_eq!(abort.reason, AbortRqReason::UnrecognizedPdu);
            }
            other => panic!("expected A-ABORT, got {:?}", other),
        }
    }

    #[test]
    fn aa8_on_out_of_sequence_pdu_aborts_with_unexpected_reason() {
        let (mut peer, socket) = loopback_pair();
        let mut provider = test_provider(socket);

        provider.execute(Action::Aa8, Event::ReceivedAssociateRq, None);

        let pdu = read_pdu(&mut peer).unwrap();
        match pdu {
            Pdu::Abort(abort) => {
                assert_eq!(abort.source, AbortRqSource::ServiceProvider);
                assert_eq!(abort.reason, AbortRqReason::UnexpectedPdu);
            }
            other => panic!("expected A-ABORT, got {:?}", other),
        }
    }

    #[test]
    fn ae6_delivers_an_associate_indication_to_the_caller() {
        let (_peer, socket) = loopback_pair();
        let (mut provider, from_provider) = test_provider_with_caller(socket);

        provider.pending_pdu = Some(Pdu::AssociationRQ(AssociationRQ {
            protocol_version: 1,
            calling_ae_title: AeTitle::new("ECHOSCU").unwrap(),
            called_ae_title: AeTitle::new("ANY-SCP").unwrap(),
            application_context_name: Uid::new("1.2.840.10008.3.1.1.1").unwrap(),
            presentation_contexts: vec![PresentationContextProposed {
                id: 1,
                abstract_syntax: Uid::new("1.2.840.10008.1.1").unwrap(),
                transfer_syntaxes: vec![Uid::new("1.2.840.10008.1.2").unwrap()],
            }],
            user_variables: vec![UserVariableItem::MaxLength(16384)],
        }));

        provider.execute(Action::Ae6, Event::ReceivedAssociateRq, None);

        match from_provider.try_recv().expect("AE-6 should deliver an indication") {
            ServiceParameters::Associate(params) => {
                assert_eq!(params.calling_ae_title, AeTitle::new("ECHOSCU").unwrap());
                assert_eq!(params.presentation_contexts.len(), 1);
                assert_eq!(params.presentation_contexts[0].id, 1);
                assert!(params.result.is_none());
            }
            other => panic!("expected an A-ASSOCIATE indication, got {:?}", other),
        }
    }

    #[test]
    fn ae3_delivers_a_negotiated_associate_confirmation() {
        let (_peer, socket) = loopback_pair();
        let (mut provider, from_provider) = test_provider_with_caller(socket);

        provider.requested = Some(AssociationRQ {
            protocol_version: 1,
            calling_ae_title: AeTitle::new("ECHOSCU").unwrap(),
            called_ae_title: AeTitle::new("ANY-SCP").unwrap(),
            application_context_name: Uid::new("1.2.840.10008.3.1.1.1").unwrap(),
            presentation_contexts: vec![PresentationContextProposed {
                id: 1,
                abstract_syntax: Uid::new("1.2.840.10008.1.1").unwrap(),
                transfer_syntaxes: vec![Uid::new("1.2.840.10008.1.2").unwrap()],
            }],
            user_variables: vec![UserVariableItem::MaxLength(16384)],
        });
        provider.pending_pdu = Some(Pdu::AssociationAC(AssociationAC {
            protocol_version: 1,
            calling_ae_title: AeTitle::new("ECHOSCU").unwrap(),
            called_ae_title: AeTitle::new("ANY-SCP").unwrap(),
            application_context_name: Uid::new("1.2.840.10008.3.1.1.1").unwrap(),
            presentation_contexts: vec![PresentationContextResult {
                id: 1,
                reason: WireReason::Acceptance,
                transfer_syntax: Uid::new("1.2.840.10008.1.2").unwrap(),
            }],
            user_variables: vec![UserVariableItem::MaxLength(16384)],
        }));

        provider.execute(Action::Ae3, Event::ReceivedAssociateAc, None);

        match from_provider.try_recv().expect("AE-3 should deliver a confirmation") {
            ServiceParameters::Associate(params) => {
                assert_eq!(params.result, Some(AssociateResult::Accepted));
                assert_eq!(params.presentation_contexts.len(), 1);
                assert!(params.presentation_contexts[0].is_accepted());
                assert_eq!(
                    params.presentation_contexts[0].accepted_transfer_syntax().unwrap().as_str(),
                    "1.2.840.10008.1.2"
                );
            }
            other => panic!("expected an A-ASSOCIATE confirmation, got {:?}", other),
        }
    }

    #[test]
    fn ae4_delivers_a_rejection_confirmation_with_the_wire_reason() {
        let (_peer, socket) = loopback_pair();
        let (mut provider, from_provider) = test_provider_with_caller(socket);

        provider.requested = Some(AssociationRQ {
            protocol_version: 1,
            calling_ae_title: AeTitle::new("ECHOSCU").unwrap(),
            called_ae_title: AeTitle::new("ANY-SCP").unwrap(),
            application_context_name: Uid::new("1.2.840.10008.3.1.1.1").unwrap(),
            presentation_contexts: vec![],
            user_variables: vec![],
        });
        provider.pending_pdu = Some(Pdu::AssociationRJ(AssociationRJ {
            result: AssociationRJResult::Transient,
            source: AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
            ),
        }));

        provider.execute(Action::Ae4, Event::ReceivedAssociateRj, None);

        match from_provider.try_recv().expect("AE-4 should deliver a confirmation") {
            ServiceParameters::Associate(params) => {
                assert_eq!(params.result, Some(AssociateResult::RejectedTransient));
                assert_eq!(
                    params.result_source,
                    Some(AssociateResultSource::ServiceProviderPresentation)
                );
            }
            other => panic!("expected an A-ASSOCIATE confirmation, got {:?}", other),
        }
    }
}
