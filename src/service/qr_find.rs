//! Query/Retrieve — Find service class (PS3.4 Annex C), spec.md §4.5.3.
//!
//! The reference design models the handler as a multi-yield generator; here
//! it is an `Iterator<Item = (u16, Option<InMemDicomObject>)>` (spec.md §9,
//! "Generator handlers → iterators + state object").

use dicom_encoding::TransferSyntax;
use dicom_object::InMemDicomObject;
use snafu::{ResultExt, Snafu};

use crate::dimse::{Endpoint, Provider};
use crate::pdu::commands::Priority;
use crate::pdu::generated::{CFindRq, CFindRsp};
use crate::service::command_message;
use crate::service::status::{classify, StatusKind, QR_FIND_STATUS};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("DIMSE provider failed while exchanging C-FIND"))]
    Dimse { source: crate::dimse::Error },

    #[snafu(display("could not encode the identifier to send"))]
    Encode { source: Box<dicom_object::WriteError> },

    #[snafu(display("could not decode a received identifier"))]
    Decode { source: crate::dimse::message::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One response of a C-FIND exchange: its classified status and, for
/// `Pending` statuses, the matched identifier.
#[derive(Debug, Clone)]
pub struct FindResult {
    pub status: StatusKind,
    pub raw_status: u16,
    pub identifier: Option<InMemDicomObject>,
}

/// Send a C-FIND-RQ and return an iterator of [`FindResult`]s, one per
/// Pending response followed by the terminal response (spec.md §4.5.3,
/// invariant 6).
pub fn send_c_find<'p, E: Endpoint>(
    provider: &'p mut Provider<E>,
    presentation_context_id: u8,
    ts: &'p TransferSyntax,
    message_id: u16,
    sop_class_uid: &str,
    priority: Priority,
    identifier: &InMemDicomObject,
) -> Result<FindResponses<'p, E>> {
    let mut data = Vec::new();
    identifier
        .write_dataset_with_ts(&mut data, ts)
        .map_err(Box::from)
        .context(EncodeSnafu)?;

    let rq = CFindRq::builder()
        .message_id(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .priority(priority)
        .build();

    provider
        .send_message(command_message(&rq, presentation_context_id, Some(data)))
        .context(DimseSnafu)?;

    Ok(FindResponses {
        provider,
        ts,
        message_id,
        done: false,
    })
}

/// Lazily drains C-FIND-RSP messages for one request, terminating after the
/// first non-Pending status (spec.md §5 "ordering guarantees").
pub struct FindResponses<'p, E> {
    provider: &'p mut Provider<E>,
    ts: &'p TransferSyntax,
    message_id: u16,
    done: bool,
}

impl<'p, E: Endpoint> Iterator for FindResponses<'p, E> {
    type Item = Result<FindResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        Some(self.next_inner())
    }
}

impl<'p, E: Endpoint> FindResponses<'p, E> {
    fn next_inner(&mut self) -> Result<FindResult> {
        let response = self.provider.receive_message().context(DimseSnafu)?;
        let raw_status = response.status().unwrap_or(0xC310);
        let status = classify(QR_FIND_STATUS, raw_status);

        let identifier = if status == StatusKind::Pending {
            response.data_set(self.ts).context(DecodeSnafu)?
        } else {
            self.done = true;
            None
        };

        debug_assert_eq!(response.message_id_being_responded_to(), Some(self.message_id));

        Ok(FindResult { status, raw_status, identifier })
    }
}

/// Build and send the C-FIND-RSP carrying a Pending match.
pub fn send_pending<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    ts: &TransferSyntax,
    message_id: u16,
    sop_class_uid: &str,
    cancelled: bool,
    identifier: &InMemDicomObject,
) -> Result<()> {
    let mut data = Vec::new();
    identifier
        .write_dataset_with_ts(&mut data, ts)
        .map_err(Box::from)
        .context(EncodeSnafu)?;

    let status = if cancelled { 0xFE00 } else { 0xFF00 };
    let rsp = CFindRsp::builder()
        .message_id_being_responded_to(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .status(status)
        .build();

    provider
        .send_message(command_message(&rsp, presentation_context_id, Some(data)))
        .context(DimseSnafu)
}

/// Build and send the terminal (non-Pending) C-FIND-RSP, with no identifier.
pub fn send_terminal<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    message_id: u16,
    status: u16,
) -> Result<()> {
    let rsp = CFindRsp::builder()
        .message_id_being_responded_to(message_id)
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
    fn yields_pending_then_success() {
        let (tx_a, rx_a) = channel();
        let (tx_b, rx_b) = channel();
        let mut scu = Provider::new(ChannelEndpoint { tx: tx_a, rx: rx_b });
        let mut scp = Provider::new(ChannelEndpoint { tx: tx_b, rx: rx_a });
        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();

        let scp_handle = std::thread::spawn(move || {
            let request = scp.receive_message().unwrap();
            let ds = InMemDicomObject::from_element_iter([DataElement::new(
                tags::PATIENT_NAME,
                VR::PN,
                dicom_value!(Str, "Doe^John"),
            )]);
            send_pending(
                &mut scp,
                request.presentation_context_id,
                &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased(),
                request.message_id().unwrap(),
                uids::PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND,
                false,
                &ds,
            )
            .unwrap();
            send_terminal(
                &mut scp,
                request.presentation_context_id,
                request.message_id().unwrap(),
                0x0000,
            )
            .unwrap();
        });

        let identifier = InMemDicomObject::from_element_iter([DataElement::new(
            tags::PATIENT_ID,
            VR::LO,
            dicom_value!(Str, "123"),
        )]);
        let results: Vec<_> = send_c_find(
            &mut scu,
            1,
            &ts,
            1,
            uids::PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND,
            Priority::Medium,
            &identifier,
        )
        .unwrap()
        .collect::<Result<Vec<_>>>()
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, StatusKind::Pending);
        assert!(results[0].identifier.is_some());
        assert_eq!(results[1].status, StatusKind::Success);
        assert!(results[1].identifier.is_none());

        scp_handle.join().unwrap();
    }
}
