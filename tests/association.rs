//! Integration tests driving a client and server association over an
//! actual loopback TCP connection.

use std::net::TcpListener;
use std::thread;

use dicom_ul::association::server::{AcceptCalledAeTitle, ServerAssociationOptions};
use dicom_ul::{AeTitle, ClientAssociationOptions, Pdu};

const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";
const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";

fn bind_any() -> (TcpListener, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("can bind to an ephemeral port");
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[test]
fn establish_and_release_roundtrip() {
    let (listener, addr) = bind_any();

    let server = thread::spawn(move || {
        let (socket, _peer) = listener.accept().unwrap();
        let mut association = ServerAssociationOptions::new()
            .with_abstract_syntax(VERIFICATION_SOP_CLASS)
            .establish(socket)
            .unwrap();
        assert!(association.find_presentation_context(VERIFICATION_SOP_CLASS).is_some());
        // The requestor releases; `receive` answers the A-RELEASE-RQ
        // transparently and hands the PDU back to the caller.
        let pdu = association.receive().unwrap();
        assert!(matches!(pdu, Pdu::ReleaseRQ));
    });

    let mut client = ClientAssociationOptions::new()
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .with_transfer_syntax(IMPLICIT_VR_LE)
        .establish(addr)
        .unwrap();

    assert!(client.find_presentation_context(VERIFICATION_SOP_CLASS).is_some());
    client.release().unwrap();

    server.join().unwrap();
}

#[test]
fn rejects_unsupported_abstract_syntax() {
    let (listener, addr) = bind_any();

    let server = thread::spawn(move || {
        let (socket, _peer) = listener.accept().unwrap();
        // Only declares a different abstract syntax; the client's proposal
        // has no matching supported entry and promiscuous mode is off.
        let result = ServerAssociationOptions::new()
            .with_abstract_syntax("1.2.840.10008.5.1.4.1.1.7")
            .establish(socket);
        assert!(result.is_err());
    });

    let result = ClientAssociationOptions::new()
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .establish(addr);

    assert!(result.is_err());
    server.join().unwrap();
}

#[test]
fn promiscuous_server_accepts_any_proposal() {
    let (listener, addr) = bind_any();

    let server = thread::spawn(move || {
        let (socket, _peer) = listener.accept().unwrap();
        let mut association = ServerAssociationOptions::new()
            .promiscuous(true)
            .establish(socket)
            .unwrap();
        assert!(association.find_presentation_context(VERIFICATION_SOP_CLASS).is_some());
        let _ = association.receive();
    });

    let mut client = ClientAssociationOptions::new()
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .establish(addr)
        .unwrap();
    assert!(client.find_presentation_context(VERIFICATION_SOP_CLASS).is_some());
    client.release().unwrap();

    server.join().unwrap();
}

#[test]
fn access_control_rejects_unrecognized_called_ae_title() {
    let (listener, addr) = bind_any();

    let server = thread::spawn(move || {
        let (socket, _peer) = listener.accept().unwrap();
        let allowed = AeTitle::new("SOME-OTHER-SCP").unwrap();
        let result = ServerAssociationOptions::new()
            .with_abstract_syntax(VERIFICATION_SOP_CLASS)
            .access_control(AcceptCalledAeTitle::new(vec![allowed]))
            .establish(socket);
        assert!(result.is_err());
    });

    // Default called AE title is "ANY-SCP", which is not in the allow-list.
    let result = ClientAssociationOptions::new()
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .establish(addr);

    assert!(result.is_err());
    server.join().unwrap();
}

#[test]
fn pdata_exchange_after_establishment() {
    let (listener, addr) = bind_any();

    let server = thread::spawn(move || {
        let (socket, _peer) = listener.accept().unwrap();
        let mut association = ServerAssociationOptions::new()
            .with_abstract_syntax(VERIFICATION_SOP_CLASS)
            .establish(socket)
            .unwrap();

        let pdu = association.receive().unwrap();
        let values = match pdu {
            Pdu::PData(pdata) => pdata.values,
            other => panic!("expected P-DATA, got {:?}", other),
        };
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].data, b"ECHO-RQ".to_vec());

        let reply = association.receive().unwrap();
        assert!(matches!(reply, Pdu::ReleaseRQ));
    });

    let mut client = ClientAssociationOptions::new()
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .establish(addr)
        .unwrap();

    let pc_id = client
        .find_presentation_context(VERIFICATION_SOP_CLASS)
        .unwrap()
        .id;

    use dicom_ul::pdu::{PDataTf, PresentationDataValue};
    client
        .send(&Pdu::PData(PDataTf {
            values: vec![PresentationDataValue {
                presentation_context_id: pc_id,
                is_command: true,
                is_last: true,
                data: b"ECHO-RQ".to_vec(),
            }],
        }))
        .unwrap();

    client.release().unwrap();
    server.join().unwrap();
}
