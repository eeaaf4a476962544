//! Storage service class (PS3.4 Annex B) — C-STORE.

use dicom_encoding::TransferSyntax;
use dicom_object::InMemDicomObject;
use snafu::{ResultExt, Snafu};

use crate::dimse::{Endpoint, Provider};
use crate::pdu::commands::{DatasetForbiddenCommand, Priority};
use crate::pdu::generated::{CStoreRq, CStoreRsp};
use crate::service::command_message;
use crate::service::status::{classify, StatusKind, STORAGE_STATUS};

impl<'a> DatasetForbiddenCommand for CStoreRsp<'a> {}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("DIMSE provider failed while exchanging C-STORE"))]
    Dimse { source: crate::dimse::Error },

    #[snafu(display("could not encode the data set to send"))]
    Encode { source: Box<dicom_object::WriteError> },

    #[snafu(display("could not decode the received data set"))]
    Decode { source: crate::dimse::message::Error },

    #[snafu(display("peer sent a C-STORE-RSP for a different message id"))]
    MismatchedResponse,

    #[snafu(display("no data set accompanied the C-STORE-RQ"))]
    MissingDataset,

    #[snafu(display(
        "data set transfer syntax `{}` does not match the accepted presentation context `{}`",
        dataset_ts,
        accepted_ts
    ))]
    NoAcceptableContext { dataset_ts: String, accepted_ts: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Status coerced onto a C-STORE-RSP when the handler raises instead of
/// returning a status (spec.md §7).
pub const DEFAULT_FAILURE: u16 = 0xC211;

/// Send a single C-STORE sub-operation, returning its classified status
/// (spec.md §4.5.2). `move_originator` carries `(AE title, Message ID)`
/// when this store is a Move/Get sub-operation (spec.md §4.5.4/§4.5.5).
///
/// `source_ts` is the transfer syntax UID `dataset` was produced/decoded
/// in (e.g. a loaded file's meta group); it is checked against the
/// presentation context's accepted `ts` before anything is sent (spec.md
/// §8 scenario S3). Internal callers that already hold a dataset decoded
/// with `ts` itself (e.g. the Move/Get sub-operation engines) pass
/// `ts.uid()`, which trivially matches.
#[allow(clippy::too_many_arguments)]
pub fn send_c_store<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    ts: &TransferSyntax,
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    priority: Priority,
    move_originator: Option<(&str, u16)>,
    source_ts: &str,
    dataset: &InMemDicomObject,
) -> Result<StatusKind> {
    let source_ts = source_ts.trim_end_matches('\0');
    if source_ts != ts.uid() {
        return NoAcceptableContextSnafu {
            dataset_ts: source_ts.to_string(),
            accepted_ts: ts.uid().to_string(),
        }
        .fail();
    }

    let mut data = Vec::new();
    dataset
        .write_dataset_with_ts(&mut data, ts)
        .map_err(Box::from)
        .context(EncodeSnafu)?;

    let rq = CStoreRq::builder()
        .message_id(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .affected_sop_instance_uid(sop_instance_uid)
        .priority(priority)
        .maybe_move_originator_application_entity_title(move_originator.map(|(ae, _)| ae))
        .maybe_move_originator_message_id(move_originator.map(|(_, id)| id))
        .build();

    provider
        .send_message(command_message(&rq, presentation_context_id, Some(data)))
        .context(DimseSnafu)?;

    let response = provider.receive_message().context(DimseSnafu)?;
    if response.message_id_being_responded_to() != Some(message_id) {
        return MismatchedResponseSnafu.fail();
    }

    Ok(classify(STORAGE_STATUS, response.status().unwrap_or(0xC211)))
}

/// Decode the data set of an inbound C-STORE-RQ message.
pub fn dataset_of(message: &crate::dimse::DimseMessage, ts: &TransferSyntax) -> Result<InMemDicomObject> {
    message
        .data_set(ts)
        .context(DecodeSnafu)?
        .context(MissingDatasetSnafu)
}

/// Run `handler` to decide the C-STORE-RSP status and send it, coercing a
/// handler error to [`DEFAULT_FAILURE`] (spec.md §4.5.2, §7).
pub fn handle_c_store<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    message_id: u16,
    handler: impl FnOnce() -> std::result::Result<u16, Box<dyn std::error::Error + Send + Sync>>,
) -> Result<()> {
    let status = handler().unwrap_or(DEFAULT_FAILURE);
    let rsp = CStoreRsp::builder()
        .message_id_being_responded_to(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .affected_sop_instance_uid(sop_instance_uid)
        .status(status)
        .build();

    provider
        .send_message(command_message(&rsp, presentation_context_id, None))
        .context(DimseSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{dicom_value, DataElement, VR};
    use dicom_dictionary_std::{tags, uids};
    use dicom_transfer_syntax_registry::entries;
    use std::sync::mpsc::channel;

    struct ChannelEndpoint {
        tx: std::sync::mpsc::Sender<crate::pdu::Pdu>,
        rx: std::sync::mpsc::Receiver<crate::pdu::Pdu>,
    }

    impl Endpoint for ChannelEndpoint {
        fn send_pdu(
            &mut self,
            pdu: &crate::pdu::Pdu,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.tx.send(pdu.clone()).unwrap();
            Ok(())
        }

        fn receive_pdu(
            &mut self,
        ) -> std::result::Result<crate::pdu::Pdu, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.rx.recv().unwrap())
        }

        fn max_pdu_length(&self) -> u32 {
            16_384
        }
    }

    #[test]
    fn store_round_trip_reports_success() {
        let (tx_a, rx_a) = channel();
        let (tx_b, rx_b) = channel();
        let mut scu = Provider::new(ChannelEndpoint { tx: tx_a, rx: rx_b });
        let mut scp = Provider::new(ChannelEndpoint { tx: tx_b, rx: rx_a });

        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
        let dataset = InMemDicomObject::from_element_iter([DataElement::new(
            tags::PATIENT_NAME,
            VR::PN,
            dicom_value!(Str, "Doe^John"),
        )]);

        let scp_handle = std::thread::spawn(move || {
            let request = scp.receive_message().unwrap();
            let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
            let _ds = dataset_of(&request, &ts).unwrap();
            handle_c_store(
                &mut scp,
                request.presentation_context_id,
                uids::CT_IMAGE_STORAGE,
                "1.2.3.4",
                request.message_id().unwrap(),
                || Ok(0x0000),
            )
            .unwrap();
        });

        let status = send_c_store(
            &mut scu,
            1,
            &ts,
            1,
            uids::CT_IMAGE_STORAGE,
            "1.2.3.4",
            Priority::Medium,
            None,
            ts.uid(),
            &InMemDicomObject::from_element_iter([DataElement::new(
                tags::PATIENT_NAME,
                VR::PN,
                dicom_value!(Str, "Doe^John"),
            )]),
        )
        .unwrap();
        assert_eq!(status, StatusKind::Success);
        scp_handle.join().unwrap();
    }

    #[test]
    fn rejects_mismatched_transfer_syntax_without_sending() {
        let (tx_a, rx_a) = channel();
        let (_tx_b, rx_b) = channel();
        let mut scu = Provider::new(ChannelEndpoint { tx: tx_a, rx: rx_b });
        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();

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
            &InMemDicomObject::from_element_iter([DataElement::new(
                tags::PATIENT_NAME,
                VR::PN,
                dicom_value!(Str, "Doe^John"),
            )]),
        )
        .unwrap_err();

        assert!(matches!(err, Error::NoAcceptableContext { .. }));
        // nothing was ever sent: the receiver would have nothing to drain.
        drop(rx_a);
    }
}
