//! End-to-end scenarios from spec.md §8, driven directly against the DIMSE
//! service functions over in-process channel endpoints (the same harness
//! each service module uses for its own unit tests, reused here to exercise
//! a full SCU/SCP pair per scenario rather than a single call).

use std::sync::mpsc::{channel, Receiver, Sender};

use dicom_core::{dicom_value, DataElement, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::entries;

use dicom_ul::dimse::{Endpoint, Provider};
use dicom_ul::pdu::commands::Priority;
use dicom_ul::pdu::Pdu;
use dicom_ul::service::qr_move::{run_sub_operations, SubOpYield};
use dicom_ul::service::status::StatusKind;
use dicom_ul::service::storage::{self, send_c_store};
use dicom_ul::service::verification::{handle_c_echo, send_c_echo};

struct ChannelEndpoint {
    tx: Sender<Pdu>,
    rx: Receiver<Pdu>,
}

impl Endpoint for ChannelEndpoint {
    fn send_pdu(&mut self, pdu: &Pdu) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.tx.send(pdu.clone()).unwrap();
        Ok(())
    }

    fn receive_pdu(&mut self) -> Result<Pdu, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.rx.recv().unwrap())
    }

    fn max_pdu_length(&self) -> u32 {
        16_384
    }
}

fn channel_pair() -> (Provider<ChannelEndpoint>, Provider<ChannelEndpoint>) {
    let (tx_a, rx_a) = channel();
    let (tx_b, rx_b) = channel();
    (
        Provider::new(ChannelEndpoint { tx: tx_a, rx: rx_b }),
        Provider::new(ChannelEndpoint { tx: tx_b, rx: rx_a }),
    )
}

/// S1. Echo success: MessageID=1 round-trips Status 0x0000.
#[test]
fn s1_echo_success() {
    let (mut scu, mut scp) = channel_pair();

    let scp_handle = std::thread::spawn(move || {
        let request = scp.receive_message().unwrap();
        assert_eq!(request.message_id(), Some(1));
        handle_c_echo(&mut scp, request.presentation_context_id, uids::VERIFICATION, 1, || Ok(0x0000)).unwrap();
    });

    let status = send_c_echo(&mut scu, 1, uids::VERIFICATION, 1).unwrap();
    assert_eq!(status, StatusKind::Success);
    scp_handle.join().unwrap();
}

/// S3. Store with a mismatched transfer syntax is rejected before any PDU
/// is sent: the accepted context is Implicit VR Little Endian, but the
/// dataset was produced in JPEG Baseline.
#[test]
fn s3_store_mismatched_transfer_syntax_sends_nothing() {
    let (mut scu, _scp) = channel_pair();
    let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();

    let dataset = InMemDicomObject::from_element_iter([DataElement::new(
        tags::PATIENT_NAME,
        VR::PN,
        dicom_value!(Str, "Doe^John"),
    )]);

    let err = send_c_store(
        &mut scu,
        1,
        &ts,
        1,
        uids::CT_IMAGE_STORAGE,
        "1.2.3.4",
        Priority::Medium,
        None,
        "1.2.840.10008.1.2.4.50",
        &dataset,
    )
    .unwrap_err();

    assert!(matches!(err, storage::Error::NoAcceptableContext { .. }));
}

/// S4. Move with 2 sub-operations, both fail at the destination Store-SCP
/// (which always responds 0xA700): final status is Failure (0xA702) with
/// zero completed, two failed, and a non-empty FailedSOPInstanceUIDList.
#[test]
fn s4_move_two_suboperations_both_fail() {
    let (mut move_provider, _move_peer) = channel_pair();
    let (mut store_endpoint, mut dest_scp) = channel_pair();

    let dest_handle = std::thread::spawn(move || {
        for _ in 0..2 {
            let request = dest_scp.receive_message().unwrap();
            storage::handle_c_store(
                &mut dest_scp,
                request.presentation_context_id,
                uids::CT_IMAGE_STORAGE,
                "1.2.3.4",
                request.message_id().unwrap(),
                || Ok(0xA700),
            )
            .unwrap();
        }
    });

    let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
    let ds = InMemDicomObject::from_element_iter([DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        dicom_value!(Str, "1.2.3.4"),
    )]);

    let sub_ops = vec![
        SubOpYield { status: StatusKind::Pending, dataset: Some(ds.clone()) },
        SubOpYield { status: StatusKind::Pending, dataset: Some(ds) },
    ];

    let outcome = run_sub_operations(
        &mut move_provider,
        1,
        1,
        uids::CT_IMAGE_STORAGE,
        &mut store_endpoint,
        1,
        &ts,
        "MOVE-SCU",
        2,
        sub_ops.into_iter(),
        || false,
    )
    .unwrap();

    assert_eq!(outcome.final_status, 0xA702);
    assert_eq!(outcome.counts.completed, 0);
    assert_eq!(outcome.counts.failed, 2);
    dest_handle.join().unwrap();
}
