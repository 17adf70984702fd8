//! Byte-for-byte and outcome assertions for the six canonical scenarios.

use dicom_ul::pdu::{
    decode_pdu, encode_pdu, AbortRq, AbortRqReason, AbortRqSource, AssociationRJ,
    AssociationRJResult, AssociationRJServiceUserReason, AssociationRJSource, AssociationRQ,
    Pdu, PresentationContextProposed, UserVariableItem,
};
use dicom_ul::primitives::{PresentationContextResultReason, PresentationContextRole};
use dicom_ul::{AeTitle, Uid};
use dicom_ul::fsm::{self, Action, Event, State};
use dicom_ul::negotiation::{negotiate_as_acceptor, SupportedAbstractSyntax};

const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";
const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
const EXPLICIT_VR_BE: &str = "1.2.840.10008.1.2.2";

/// S1: the exact 215-byte A-ASSOCIATE-RQ produced for a single proposed
/// context, calling AET "ECHOSCU", called AET "ANY-SCP". The 50-byte
/// Implementation Class UID below is sized so the total comes out to the
/// canonical 215 bytes quoted by the scenario.
#[rustfmt::skip]
const S1_BYTES: [u8; 215] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0xd1, 0x00, 0x01, 0x00, 0x00,
    0x41, 0x4e, 0x59, 0x2d, 0x53, 0x43, 0x50, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20,
    0x45, 0x43, 0x48, 0x4f, 0x53, 0x43, 0x55, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x10, 0x00, 0x00, 0x15,
    0x31, 0x2e, 0x32, 0x2e, 0x38, 0x34, 0x30, 0x2e, 0x31, 0x30, 0x30, 0x30, 0x38, 0x2e, 0x33, 0x2e, 0x31, 0x2e, 0x31, 0x2e, 0x31,
    0x20, 0x00, 0x00, 0x2e,
    0x01, 0x00, 0x00, 0x00,
    0x30, 0x00, 0x00, 0x11,
    0x31, 0x2e, 0x32, 0x2e, 0x38, 0x34, 0x30, 0x2e, 0x31, 0x30, 0x30, 0x30, 0x38, 0x2e, 0x31, 0x2e, 0x31,
    0x40, 0x00, 0x00, 0x11,
    0x31, 0x2e, 0x32, 0x2e, 0x38, 0x34, 0x30, 0x2e, 0x31, 0x30, 0x30, 0x30, 0x38, 0x2e, 0x31, 0x2e, 0x32,
    0x50, 0x00, 0x00, 0x3e,
    0x51, 0x00, 0x00, 0x04, 0x00, 0x00, 0x40, 0x00,
    0x52, 0x00, 0x00, 0x32,
    0x31, 0x2e, 0x32, 0x2e, 0x38, 0x32, 0x36, 0x2e, 0x30, 0x2e, 0x31, 0x2e, 0x33, 0x36, 0x38, 0x30, 0x30, 0x34, 0x33, 0x2e, 0x32,
    0x2e, 0x31, 0x31, 0x34, 0x33, 0x2e, 0x31, 0x30, 0x37, 0x2e, 0x31, 0x30, 0x34, 0x2e, 0x31, 0x30, 0x33, 0x2e, 0x31, 0x31,
    0x35, 0x2e, 0x32, 0x2e, 0x31, 0x39, 0x2e, 0x33, 0x30,
];

const S1_IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.2.1143.107.104.103.115.2.19.30";

#[test]
fn s1_associate_rq_matches_the_canonical_byte_sequence() {
    let rq = AssociationRQ {
        protocol_version: 1,
        calling_ae_title: AeTitle::new("ECHOSCU").unwrap(),
        called_ae_title: AeTitle::new("ANY-SCP").unwrap(),
        application_context_name: Uid::new("1.2.840.10008.3.1.1.1").unwrap(),
        presentation_contexts: vec![PresentationContextProposed {
            id: 1,
            abstract_syntax: Uid::new(VERIFICATION_SOP_CLASS).unwrap(),
            transfer_syntaxes: vec![Uid::new(IMPLICIT_VR_LE).unwrap()],
        }],
        user_variables: vec![
            UserVariableItem::MaxLength(16384),
            UserVariableItem::ImplementationClassUid(Uid::new(S1_IMPLEMENTATION_CLASS_UID).unwrap()),
        ],
    };

    let bytes = encode_pdu(&Pdu::AssociationRQ(rq.clone()));
    assert_eq!(bytes.len(), 215);
    assert_eq!(bytes, S1_BYTES.to_vec());
    assert_eq!(decode_pdu(&bytes).unwrap(), Pdu::AssociationRQ(rq));
}

/// S2: the acceptor supports the proposed abstract syntax with two
/// transfer syntaxes; negotiation must select the one the requestor
/// actually proposed.
#[test]
fn s2_acceptor_selects_the_single_matching_context() {
    let proposed = vec![PresentationContextProposed {
        id: 1,
        abstract_syntax: Uid::new(VERIFICATION_SOP_CLASS).unwrap(),
        transfer_syntaxes: vec![Uid::new(IMPLICIT_VR_LE).unwrap()],
    }];
    let supported = vec![SupportedAbstractSyntax {
        abstract_syntax: Uid::new(VERIFICATION_SOP_CLASS).unwrap(),
        transfer_syntaxes: vec![
            Uid::new(IMPLICIT_VR_LE).unwrap(),
            Uid::new(EXPLICIT_VR_LE).unwrap(),
        ],
        role: PresentationContextRole { scu: false, scp: true },
    }];

    let result = negotiate_as_acceptor(&proposed, &supported, &[]);

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].id, 1);
    assert_eq!(result[0].result, Some(PresentationContextResultReason::Acceptance));
    assert_eq!(result[0].transfer_syntaxes, vec![Uid::new(IMPLICIT_VR_LE).unwrap()]);
}

/// S3: three contexts proposed for the same abstract syntax, each with a
/// single distinct transfer syntax; the acceptor supports all three, and
/// each context is accepted with its own proposed transfer syntax.
#[test]
fn s3_three_contexts_same_abstract_syntax_each_accepted_independently() {
    let proposed = vec![
        PresentationContextProposed {
            id: 1,
            abstract_syntax: Uid::new(VERIFICATION_SOP_CLASS).unwrap(),
            transfer_syntaxes: vec![Uid::new(IMPLICIT_VR_LE).unwrap()],
        },
        PresentationContextProposed {
            id: 3,
            abstract_syntax: Uid::new(VERIFICATION_SOP_CLASS).unwrap(),
            transfer_syntaxes: vec![Uid::new(EXPLICIT_VR_LE).unwrap()],
        },
        PresentationContextProposed {
            id: 5,
            abstract_syntax: Uid::new(VERIFICATION_SOP_CLASS).unwrap(),
            transfer_syntaxes: vec![Uid::new(EXPLICIT_VR_BE).unwrap()],
        },
    ];
    let supported = vec![SupportedAbstractSyntax {
        abstract_syntax: Uid::new(VERIFICATION_SOP_CLASS).unwrap(),
        transfer_syntaxes: vec![
            Uid::new(IMPLICIT_VR_LE).unwrap(),
            Uid::new(EXPLICIT_VR_LE).unwrap(),
            Uid::new(EXPLICIT_VR_BE).unwrap(),
        ],
        role: PresentationContextRole { scu: false, scp: true },
    }];

    let result = negotiate_as_acceptor(&proposed, &supported, &[]);

    assert_eq!(result.len(), 3);
    let expected = [
        (1u8, IMPLICIT_VR_LE),
        (3u8, EXPLICIT_VR_LE),
        (5u8, EXPLICIT_VR_BE),
    ];
    for (pc, (id, ts)) in result.iter().zip(expected.iter()) {
        assert_eq!(pc.id, *id);
        assert_eq!(pc.result, Some(PresentationContextResultReason::Acceptance));
        assert_eq!(pc.transfer_syntaxes, vec![Uid::new(*ts).unwrap()]);
    }
}

/// S4: a PDU with an unrecognized type tag (0x99) decodes to
/// `Pdu::Unknown` rather than an error; classifying it while established
/// drives the FSM to the abort path with a service-provider A-ABORT
/// (source=2, reason=1, "unrecognized PDU").
#[test]
fn s4_unrecognized_pdu_type_drives_the_abort_path() {
    let bytes = vec![0x99u8, 0x00, 0x00, 0x00, 0x00, 0x02, 0xAB, 0xCD];
    let pdu = decode_pdu(&bytes).unwrap();
    assert!(matches!(pdu, Pdu::Unknown { pdu_type: 0x99, .. }));

    let (action, next) = fsm::resolve(State::Established, Event::InvalidPdu);
    assert_eq!(action, Action::Aa8);
    assert_eq!(next, State::AwaitingTransportClose);

    let abort = Pdu::Abort(AbortRq {
        source: AbortRqSource::ServiceProvider,
        reason: AbortRqReason::UnrecognizedPdu,
    });
    let abort_bytes = encode_pdu(&abort);
    // source=2, reason=1 per Part 8 Table 9-26.
    assert_eq!(&abort_bytes[6..10], &[0x00, 0x00, 0x02, 0x01]);
}

/// S5: both peers issue A-RELEASE-RQ at the same instant. Each side's
/// FSM walks its own collision sub-sequence and both exit to Sta1
/// exactly once, with no transition re-entering the collision states.
#[test]
fn s5_release_collision_both_sides_exit_to_idle_exactly_once() {
    // Requestor role: Sta7 -> (peer RQ) -> Sta9 -> (local response) -> Sta11 -> (peer RP) -> Sta1
    let (a1, s1) = fsm::resolve(State::AwaitingReleaseRp, Event::ReceivedReleaseRq);
    assert_eq!(a1, Action::Ar8);
    let (a2, s2) = fsm::resolve(s1, Event::LocalReleaseResponse);
    assert_eq!(a2, Action::Ar9);
    let (a3, s3) = fsm::resolve(s2, Event::ReceivedReleaseRp);
    assert_eq!((a3, s3), (Action::Ar10, State::Idle));

    // Acceptor role: Sta8 -> (peer RQ) -> Sta10 -> (local response) -> Sta12 -> (peer RP) -> Sta1
    let (b1, t1) = fsm::resolve(State::AwaitingLocalReleaseResponse, Event::ReceivedReleaseRq);
    assert_eq!(b1, Action::Ar8);
    let (b2, t2) = fsm::resolve(t1, Event::LocalReleaseResponse);
    assert_eq!(b2, Action::Ar9);
    let (b3, t3) = fsm::resolve(t2, Event::ReceivedReleaseRp);
    assert_eq!((b3, t3), (Action::Ar10, State::Idle));
}

/// S6: the canonical A-ASSOCIATE-RJ body decodes to the documented
/// primitive and re-encoding it reproduces the same four bytes.
#[test]
fn s6_associate_rj_canonical_body_round_trips() {
    const CANONICAL: [u8; 4] = [0x00, 0x01, 0x01, 0x01];

    let pdu = decode_pdu(&{
        let mut bytes = vec![0x03u8, 0x00, 0x00, 0x00, 0x00, 0x04];
        bytes.extend_from_slice(&CANONICAL);
        bytes
    })
    .unwrap();

    let rj = match pdu {
        Pdu::AssociationRJ(ref rj) => rj.clone(),
        other => panic!("expected A-ASSOCIATE-RJ, got {:?}", other),
    };
    assert_eq!(rj.result, AssociationRJResult::Permanent);
    assert_eq!(
        rj.source,
        AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::NoReasonGiven)
    );

    let re_encoded = encode_pdu(&Pdu::AssociationRJ(rj));
    assert_eq!(&re_encoded[6..10], &CANONICAL);
}
