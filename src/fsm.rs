//! The DUL finite-state machine, Part 8 §9.2: 13 states, 19 events, and
//! the fixed transition table connecting them.
//!
//! This module owns no I/O. [`transition`] is a pure lookup; the actions
//! it names are executed by [`crate::association`]'s transport provider,
//! which is the only thing that touches a socket. Keeping the table here
//! as data (rather than as branching control flow spread across the
//! provider) is what lets [`transition`] be exhaustively tested for
//! totality: every `(State, Event)` pair not present in the map is,
//! deterministically, a protocol error that drives action `Aa8`.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use once_cell::sync::Lazy;

/// One of the 13 named states of PS3.8 §9.2 Table 9-10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Sta1: idle.
    Idle,
    /// Sta2: transport connection open, awaiting A-ASSOCIATE-RQ (acceptor).
    AwaitingAssociateRq,
    /// Sta3: awaiting local A-ASSOCIATE response primitive (acceptor).
    AwaitingLocalAssociateResponse,
    /// Sta4: awaiting transport connection to complete (requestor).
    AwaitingTransportConnection,
    /// Sta5: awaiting A-ASSOCIATE-AC/RJ (requestor).
    AwaitingAssociateResponse,
    /// Sta6: association established.
    Established,
    /// Sta7: awaiting A-RELEASE-RP.
    AwaitingReleaseRp,
    /// Sta8: awaiting local A-RELEASE response primitive (acceptor got RQ).
    AwaitingLocalReleaseResponse,
    /// Sta9: release collision, requestor role, awaiting local response.
    CollisionRequestorAwaitingLocalResponse,
    /// Sta10: release collision, acceptor role, awaiting local response.
    CollisionAcceptorAwaitingLocalResponse,
    /// Sta11: release collision, requestor role, awaiting peer's RP.
    CollisionRequestorAwaitingRp,
    /// Sta12: release collision, acceptor role, awaiting peer's RP.
    CollisionAcceptorAwaitingRp,
    /// Sta13: awaiting transport connection close, after issuing abort.
    AwaitingTransportClose,
}

/// One of the 19 events of PS3.8 §9.2 Table 9-9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Evt1: A-ASSOCIATE request primitive (local user).
    AssociateRequest,
    /// Evt2: transport connect confirmation.
    TransportConnected,
    /// Evt3: A-ASSOCIATE-AC PDU received.
    ReceivedAssociateAc,
    /// Evt4: A-ASSOCIATE-RJ PDU received.
    ReceivedAssociateRj,
    /// Evt5: transport connect indication (server accept).
    TransportIndication,
    /// Evt6: A-ASSOCIATE-RQ PDU received.
    ReceivedAssociateRq,
    /// Evt7: local A-ASSOCIATE response primitive, accept.
    LocalAssociateAccept,
    /// Evt8: local A-ASSOCIATE response primitive, reject.
    LocalAssociateReject,
    /// Evt9: P-DATA request primitive (local user).
    PDataRequest,
    /// Evt10: P-DATA-TF PDU received.
    ReceivedPData,
    /// Evt11: A-RELEASE request primitive (local user).
    ReleaseRequest,
    /// Evt12: A-RELEASE-RQ PDU received.
    ReceivedReleaseRq,
    /// Evt13: local A-RELEASE response primitive.
    LocalReleaseResponse,
    /// Evt14: A-RELEASE-RP PDU received.
    ReceivedReleaseRp,
    /// Evt15: A-ABORT request primitive (local user).
    AbortRequest,
    /// Evt16: A-ABORT PDU received.
    ReceivedAbort,
    /// Evt17: transport connection closed.
    TransportClosed,
    /// Evt18: ARTIM timer expired.
    ArtimExpired,
    /// Evt19: unrecognized or invalid PDU received.
    InvalidPdu,
}

/// An action code from PS3.8 §9.2 Table 9-10, abridged. Each is a
/// deterministic instruction to the provider: send a PDU, raise a
/// primitive, (dis)arm ARTIM, or close the socket -- never more than one
/// of each per action, but some actions combine two of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Open the transport connection.
    Ae1,
    /// Send A-ASSOCIATE-RQ.
    Ae2,
    /// Deliver A-ASSOCIATE confirmation (accepted).
    Ae3,
    /// Deliver A-ASSOCIATE confirmation (rejected).
    Ae4,
    /// Accept the transport connection, arm ARTIM.
    Ae5,
    /// Disarm ARTIM; deliver A-ASSOCIATE indication, or reject if unacceptable.
    Ae6,
    /// Send A-ASSOCIATE-AC.
    Ae7,
    /// Send A-ASSOCIATE-RJ, arm ARTIM.
    Ae8,
    /// Send P-DATA-TF.
    Dt1,
    /// Deliver P-DATA indication.
    Dt2,
    /// Send A-RELEASE-RQ.
    Ar1,
    /// Deliver A-RELEASE indication.
    Ar2,
    /// Deliver A-RELEASE confirmation, close transport.
    Ar3,
    /// Send A-RELEASE-RP, arm ARTIM.
    Ar4,
    /// Disarm ARTIM.
    Ar5,
    /// Deliver P-DATA indication (while awaiting local release response).
    Ar6,
    /// Send queued P-DATA-TF (while awaiting local release response).
    Ar7,
    /// Deliver A-RELEASE indication (release collision detected).
    Ar8,
    /// Send A-RELEASE-RP (release collision resolution).
    Ar9,
    /// Deliver A-RELEASE confirmation (release collision resolution).
    Ar10,
    /// Send A-ABORT, arm ARTIM.
    Aa1,
    /// Disarm ARTIM, close transport.
    Aa2,
    /// Close transport; deliver A-P-ABORT indication if we are the requestor.
    Aa3,
    /// Deliver A-P-ABORT indication.
    Aa4,
    /// Disarm ARTIM.
    Aa5,
    /// Ignore the PDU.
    Aa6,
    /// Send A-ABORT.
    Aa7,
    /// Deliver A-P-ABORT indication; send A-ABORT; arm ARTIM.
    Aa8,
}

/// ARTIM's coarse granularity -- sub-second precision is not required by
/// the standard, but the event loop must observe an expiry within one
/// second (spec.md §5).
pub const ARTIM_TIMEOUT: Duration = Duration::from_secs(30);

/// The Association Request Timer: a single per-association monotonic
/// deadline, armed by actions that enter a waiting state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtimTimer {
    deadline: Option<Instant>,
}

impl ArtimTimer {
    pub fn new() -> Self {
        ArtimTimer { deadline: None }
    }

    pub fn arm(&mut self) {
        self.arm_for(ARTIM_TIMEOUT);
    }

    pub fn arm_for(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// `true` if the timer is armed and its deadline has passed.
    pub fn has_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

type Table = HashMap<(State, Event), (Action, State)>;

static TRANSITIONS: Lazy<Table> = Lazy::new(build_table);

fn build_table() -> Table {
    use Action::*;
    use Event::*;
    use State::*;

    let rows: &[(State, Event, Action, State)] = &[
        // --- Association establishment ---
        (Idle, AssociateRequest, Ae1, AwaitingTransportConnection),
        (Idle, TransportIndication, Ae5, AwaitingAssociateRq),
        (AwaitingAssociateRq, ReceivedAssociateRq, Ae6, AwaitingLocalAssociateResponse),
        (AwaitingAssociateRq, TransportClosed, Aa5, Idle),
        (AwaitingLocalAssociateResponse, LocalAssociateAccept, Ae7, Established),
        (AwaitingLocalAssociateResponse, LocalAssociateReject, Ae8, AwaitingTransportClose),
        (AwaitingTransportConnection, TransportConnected, Ae2, AwaitingAssociateResponse),
        (AwaitingTransportConnection, TransportClosed, Aa4, Idle),
        (AwaitingAssociateResponse, ReceivedAssociateAc, Ae3, Established),
        (AwaitingAssociateResponse, ReceivedAssociateRj, Ae4, Idle),
        (AwaitingAssociateResponse, TransportClosed, Aa4, Idle),
        // --- Data transfer ---
        (Established, PDataRequest, Dt1, Established),
        (Established, ReceivedPData, Dt2, Established),
        // --- Release ---
        (Established, ReleaseRequest, Ar1, AwaitingReleaseRp),
        (Established, ReceivedReleaseRq, Ar2, AwaitingLocalReleaseResponse),
        (Established, ReceivedAbort, Aa3, Idle),
        (Established, TransportClosed, Aa4, Idle),
        (AwaitingReleaseRp, ReceivedReleaseRp, Ar3, Idle),
        (AwaitingReleaseRp, ReceivedReleaseRq, Ar8, CollisionRequestorAwaitingLocalResponse),
        (AwaitingReleaseRp, ReceivedAbort, Aa3, Idle),
        (AwaitingReleaseRp, TransportClosed, Aa4, Idle),
        (AwaitingLocalReleaseResponse, PDataRequest, Ar7, AwaitingLocalReleaseResponse),
        (AwaitingLocalReleaseResponse, ReceivedPData, Ar6, AwaitingLocalReleaseResponse),
        (AwaitingLocalReleaseResponse, LocalReleaseResponse, Ar4, Idle),
        (AwaitingLocalReleaseResponse, ReceivedAbort, Aa3, Idle),
        (AwaitingLocalReleaseResponse, TransportClosed, Aa4, Idle),
        // release collision, requestor role
        (
            CollisionRequestorAwaitingLocalResponse,
            LocalReleaseResponse,
            Ar9,
            CollisionRequestorAwaitingRp,
        ),
        (CollisionRequestorAwaitingLocalResponse, TransportClosed, Aa4, Idle),
        (CollisionRequestorAwaitingRp, ReceivedReleaseRp, Ar10, Idle),
        (CollisionRequestorAwaitingRp, TransportClosed, Aa4, Idle),
        // release collision, acceptor role
        (Established, ReceivedReleaseRq, Ar2, AwaitingLocalReleaseResponse),
        (
            AwaitingLocalReleaseResponse,
            ReceivedReleaseRq,
            Ar8,
            CollisionAcceptorAwaitingLocalResponse,
        ),
        (
            CollisionAcceptorAwaitingLocalResponse,
            LocalReleaseResponse,
            Ar9,
            CollisionAcceptorAwaitingRp,
        ),
        (CollisionAcceptorAwaitingLocalResponse, TransportClosed, Aa4, Idle),
        (CollisionAcceptorAwaitingRp, ReceivedReleaseRp, Ar10, Idle),
        (CollisionAcceptorAwaitingRp, TransportClosed, Aa4, Idle),
        // --- Abort, reachable from every waiting/established state ---
        (Idle, AbortRequest, Aa6, Idle),
        (AwaitingAssociateRq, AbortRequest, Aa1, AwaitingTransportClose),
        (AwaitingLocalAssociateResponse, AbortRequest, Aa1, AwaitingTransportClose),
        (AwaitingLocalAssociateResponse, TransportClosed, Aa4, Idle),
        (AwaitingTransportConnection, AbortRequest, Aa2, Idle),
        (AwaitingAssociateResponse, AbortRequest, Aa1, AwaitingTransportClose),
        (Established, AbortRequest, Aa1, AwaitingTransportClose),
        (AwaitingReleaseRp, AbortRequest, Aa1, AwaitingTransportClose),
        (AwaitingLocalReleaseResponse, AbortRequest, Aa1, AwaitingTransportClose),
        (CollisionRequestorAwaitingLocalResponse, AbortRequest, Aa1, AwaitingTransportClose),
        (CollisionRequestorAwaitingRp, AbortRequest, Aa1, AwaitingTransportClose),
        (CollisionAcceptorAwaitingLocalResponse, AbortRequest, Aa1, AwaitingTransportClose),
        (CollisionAcceptorAwaitingRp, AbortRequest, Aa1, AwaitingTransportClose),
        // peer abort, reachable wherever a PDU can arrive
        (AwaitingAssociateRq, ReceivedAbort, Aa3, Idle),
        (AwaitingLocalAssociateResponse, ReceivedAbort, Aa3, Idle),
        (AwaitingAssociateResponse, ReceivedAbort, Aa3, Idle),
        (CollisionRequestorAwaitingLocalResponse, ReceivedAbort, Aa3, Idle),
        (CollisionRequestorAwaitingRp, ReceivedAbort, Aa3, Idle),
        (CollisionAcceptorAwaitingLocalResponse, ReceivedAbort, Aa3, Idle),
        (CollisionAcceptorAwaitingRp, ReceivedAbort, Aa3, Idle),
        // ARTIM expiry finalizes the abort path
        (AwaitingAssociateRq, ArtimExpired, Aa2, Idle),
        (AwaitingTransportClose, ArtimExpired, Aa2, Idle),
        (AwaitingTransportClose, TransportClosed, Aa2, Idle),
        (AwaitingTransportClose, ReceivedAbort, Aa6, AwaitingTransportClose),
        (AwaitingTransportClose, InvalidPdu, Aa6, AwaitingTransportClose),
    ];

    rows.iter().map(|&(s, e, a, s2)| ((s, e), (a, s2))).collect()
}

/// Look up the action and next state for `(state, event)`.
///
/// Returns `None` when the pair has no defined transition -- by
/// PS3.8 §9.2, this is itself the protocol error path: the caller should
/// treat a `None` as `Aa8` (send A-ABORT, go to `Sta13`) rather than as
/// an exceptional condition requiring special handling. Every reachable
/// `(state, event)` pair therefore has exactly one outcome, whether or
/// not it appears explicitly in the table.
pub fn transition(state: State, event: Event) -> Option<(Action, State)> {
    TRANSITIONS.get(&(state, event)).copied()
}

/// The default outcome for an event unmatched by any row: send an
/// A-ABORT with a provider source and go to `Sta13`.
pub const DEFAULT_ACTION: Action = Action::Aa8;
pub const DEFAULT_NEXT_STATE: State = State::AwaitingTransportClose;

/// Resolve `(state, event)` against the table, falling back to the
/// default protocol-error outcome when no row matches.
pub fn resolve(state: State, event: Event) -> (Action, State) {
    transition(state, event).unwrap_or((DEFAULT_ACTION, DEFAULT_NEXT_STATE))
}

impl State {
    /// `true` for `Sta6`, the only state in which P-DATA may be
    /// delivered to the upper layer.
    pub fn is_established(self) -> bool {
        matches!(self, State::Established)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn totality_every_pair_resolves_deterministically() {
        let states = [
            State::Idle,
            State::AwaitingAssociateRq,
            State::AwaitingLocalAssociateResponse,
            State::AwaitingTransportConnection,
            State::AwaitingAssociateResponse,
            State::Established,
            State::AwaitingReleaseRp,
            State::AwaitingLocalReleaseResponse,
            State::CollisionRequestorAwaitingLocalResponse,
            State::CollisionAcceptorAwaitingLocalResponse,
            State::CollisionRequestorAwaitingRp,
            State::CollisionAcceptorAwaitingRp,
            State::AwaitingTransportClose,
        ];
        let events = [
            Event::AssociateRequest,
            Event::TransportConnected,
            Event::ReceivedAssociateAc,
            Event::ReceivedAssociateRj,
            Event::TransportIndication,
            Event::ReceivedAssociateRq,
            Event::LocalAssociateAccept,
            Event::LocalAssociateReject,
            Event::PDataRequest,
            Event::ReceivedPData,
            Event::ReleaseRequest,
            Event::ReceivedReleaseRq,
            Event::LocalReleaseResponse,
            Event::ReceivedReleaseRp,
            Event::AbortRequest,
            Event::ReceivedAbort,
            Event::TransportClosed,
            Event::ArtimExpired,
            Event::InvalidPdu,
        ];

        for &s in &states {
            for &e in &events {
                // `resolve` must never panic and always yields exactly
                // one (action, next_state) pair, whether from the table
                // or from the default abort fallback.
                let (_action, _next) = resolve(s, e);
            }
        }
    }

    #[rstest]
    #[case(State::Idle, Event::AssociateRequest, Action::Ae1, State::AwaitingTransportConnection)]
    #[case(State::AwaitingTransportConnection, Event::TransportConnected, Action::Ae2, State::AwaitingAssociateResponse)]
    #[case(State::AwaitingAssociateResponse, Event::ReceivedAssociateAc, Action::Ae3, State::Established)]
    #[case(State::Established, Event::PDataRequest, Action::Dt1, State::Established)]
    #[case(State::Established, Event::ReceivedPData, Action::Dt2, State::Established)]
    fn named_transitions_match_the_standard_table(
        #[case] state: State,
        #[case] event: Event,
        #[case] action: Action,
        #[case] next: State,
    ) {
        assert_eq!(transition(state, event), Some((action, next)));
    }

    #[test]
    fn unreachable_pair_drives_the_abort_path() {
        // S4: an unrecognized PDU (Evt19) while established has no
        // explicit row and must resolve to Aa8 / Sta13.
        assert_eq!(
            resolve(State::Established, Event::InvalidPdu),
            (Action::Aa8, State::AwaitingTransportClose)
        );
    }

    #[test]
    fn s5_release_collision_both_sides_exit_to_idle_exactly_once() {
        // Requestor role: Sta7 -> (peer RQ) -> Sta9 -> (local response) -> Sta11 -> (peer RP) -> Sta1
        let (a1, s1) = resolve(State::AwaitingReleaseRp, Event::ReceivedReleaseRq);
        assert_eq!((a1, s1), (Action::Ar8, State::CollisionRequestorAwaitingLocalResponse));
        let (a2, s2) = resolve(s1, Event::LocalReleaseResponse);
        assert_eq!((a2, s2), (Action::Ar9, State::CollisionRequestorAwaitingRp));
        let (a3, s3) = resolve(s2, Event::ReceivedReleaseRp);
        assert_eq!((a3, s3), (Action::Ar10, State::Idle));

        // Acceptor role: Sta8 -> (peer RQ) -> Sta10 -> (local response) -> Sta12 -> (peer RP) -> Sta1
        let (b1, t1) = resolve(State::AwaitingLocalReleaseResponse, Event::ReceivedReleaseRq);
        assert_eq!((b1, t1), (Action::Ar8, State::CollisionAcceptorAwaitingLocalResponse));
        let (b2, t2) = resolve(t1, Event::LocalReleaseResponse);
        assert_eq!((b2, t2), (Action::Ar9, State::CollisionAcceptorAwaitingRp));
        let (b3, t3) = resolve(t2, Event::ReceivedReleaseRp);
        assert_eq!((b3, t3), (Action::Ar10, State::Idle));
    }

    #[test]
    fn pdata_outside_established_is_never_a_defined_transition() {
        // No row delivers Dt2 (P-DATA indication) from any state other
        // than Established -- the invariant "no P-DATA outside Sta6" is
        // therefore a property of the table itself, not of the caller.
        let states = [
            State::Idle,
            State::AwaitingAssociateRq,
            State::AwaitingLocalAssociateResponse,
            State::AwaitingTransportConnection,
            State::AwaitingAssociateResponse,
            State::AwaitingReleaseRp,
            State::AwaitingTransportClose,
        ];
        for &s in &states {
            assert_ne!(transition(s, Event::ReceivedPData), Some((Action::Dt2, s)));
        }
    }

    #[test]
    fn artim_timer_expires_after_its_deadline() {
        let mut timer = ArtimTimer::new();
        assert!(!timer.has_expired());
        timer.arm_for(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.has_expired());
        timer.disarm();
        assert!(!timer.has_expired());
    }
}
