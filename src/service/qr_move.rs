//! Query/Retrieve — Move service class (PS3.4 Annex C), spec.md §4.5.4.
//!
//! This is the richest interaction in the crate: a C-STORE fan-out over a
//! secondary association, multiplexed with a streaming C-MOVE-RSP back to
//! the original requestor. The handler is modeled as an iterator yielding
//! `(status, dataset)` sub-operation results, matching the generator
//! protocol described by spec.md §4.5.4 and §9's "iterators + state object"
//! redesign note.

use dicom_core::value::{PrimitiveValue, Value};
use dicom_core::{DataElement, VR};
use dicom_dictionary_std::tags;
use dicom_encoding::TransferSyntax;
use dicom_object::InMemDicomObject;
use snafu::{ResultExt, Snafu};

use crate::dimse::{DimseMessage, Endpoint, Provider};
use crate::pdu::commands::Priority;
use crate::pdu::generated::CMoveRsp;
use crate::service::status::{classify, StatusKind, QR_MOVE_STATUS};
use crate::service::{command_message, storage, sub_op_message_id, SubOpCounts};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("DIMSE provider failed while exchanging C-MOVE"))]
    Dimse { source: crate::dimse::Error },

    #[snafu(display("a C-STORE sub-operation failed"))]
    SubOperation { source: storage::Error },

    #[snafu(display("could not encode the failed SOP instance UID list"))]
    Encode { source: Box<dicom_object::WriteError> },

    #[snafu(display("could not decode the C-MOVE-RQ identifier"))]
    Decode { source: crate::dimse::message::Error },

    #[snafu(display("the C-MOVE-RQ carried no identifier"))]
    MissingIdentifier,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Status sent when the C-MOVE-RQ's identifier could not be decoded, before
/// the handler is ever invoked (spec.md §4.5.4 step 1, §7).
pub const DECODE_FAILURE: u16 = 0xC510;
/// Status sent when the handler raised before yielding any sub-operation
/// result (spec.md §4.5.4 step 2, §7).
pub const HANDLER_FAILURE: u16 = 0xC511;
/// Status sent when the requested Move destination AE title does not
/// resolve to a known secondary association (spec.md §4.5.4 step 3, §7).
pub const UNKNOWN_DESTINATION: u16 = 0xA801;
/// Status sent when the handler reported a sub-operation count that cannot
/// be carried out (spec.md §4.5.4 step 4, §7): currently, a declared total
/// of zero, since a handler with nothing to move should answer
/// [`MoveHandlerOutcome::Refused`] instead of `Proceed { total: 0, .. }`.
pub const MALFORMED_COUNT: u16 = 0xC513;

/// One sub-operation to dispatch: the status the handler yielded and, for
/// `Pending`, the dataset to store.
pub struct SubOpYield {
    pub status: StatusKind,
    pub dataset: Option<InMemDicomObject>,
}

/// What a C-MOVE handler decided after being given the request identifier.
pub enum MoveHandlerOutcome<I> {
    /// Refuse the request outright, before any sub-operation is attempted
    /// (spec.md §4.5.4 step 2): e.g. the identifier did not match any
    /// known study/series.
    Refused(u16),
    /// Proceed with `total` sub-operations, produced lazily by `sub_ops`.
    Proceed { total: u16, sub_ops: I },
}

/// Resolves a Move destination AE title to a connectable secondary
/// association (spec.md §4.5.4 step 3), so [`handle_c_move`] can open it
/// itself instead of requiring the caller to have guessed right in advance.
pub trait MoveDestination<S: Endpoint> {
    /// Resolve `ae_title` to a store endpoint, its negotiated presentation
    /// context id, and the transfer syntax accorded for it. `None` means
    /// the destination is not known to this node.
    fn resolve(&mut self, ae_title: &str) -> Option<(Provider<S>, u8, TransferSyntax)>;
}

/// Final outcome of a Move engine run, used by the caller to emit
/// diagnostics or tests (spec.md §8 invariant 8, scenario S4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub final_status: u16,
    pub counts: SubOpCounts,
}

/// Drive a Move sub-operation loop: for each yield from `sub_ops`, dispatch
/// a C-STORE over `store_endpoint` and emit a Pending C-MOVE-RSP over
/// `move_provider`, following spec.md §4.5.4's numbered algorithm.
///
/// `sub_ops` is already truncated/terminated by the caller at `total`
/// Pending yields or a terminal status; this function does not itself
/// enforce the yield-count protocol described in spec.md's table (steps
/// 1-4), which is the caller's responsibility before invoking the engine.
pub fn run_sub_operations<E, S>(
    move_provider: &mut Provider<E>,
    move_presentation_context_id: u8,
    move_message_id: u16,
    sop_class_uid: &str,
    store_endpoint: &mut Provider<S>,
    store_presentation_context_id: u8,
    store_ts: &TransferSyntax,
    originator_ae: &str,
    total: u16,
    mut sub_ops: impl Iterator<Item = SubOpYield>,
    mut is_cancelled: impl FnMut() -> bool,
) -> Result<MoveOutcome>
where
    E: Endpoint,
    S: Endpoint,
{
    let mut counts = SubOpCounts::new(total);
    let mut failed_uids: Vec<String> = Vec::new();
    let mut k: u32 = 0;

    while !counts.is_done() {
        if is_cancelled() {
            let status = 0xFE00;
            send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, status, counts, &failed_uids, store_ts)?;
            return Ok(MoveOutcome { final_status: status, counts });
        }

        let Some(next) = sub_ops.next() else { break };
        match next.status {
            StatusKind::Cancel => {
                let status = 0xFE00;
                send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, status, counts, &failed_uids, store_ts)?;
                return Ok(MoveOutcome { final_status: status, counts });
            }
            StatusKind::Failure | StatusKind::Warning => {
                counts.failed += counts.remaining;
                counts.remaining = 0;
                let status = if next.status == StatusKind::Warning { 0xB000 } else { 0xA702 };
                send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, status, counts, &failed_uids, store_ts)?;
                return Ok(MoveOutcome { final_status: status, counts });
            }
            StatusKind::Success => {
                let status = final_status(counts);
                send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, status, counts, &failed_uids, store_ts)?;
                return Ok(MoveOutcome { final_status: status, counts });
            }
            StatusKind::Pending => {
                let Some(dataset) = next.dataset else {
                    counts.record_failure();
                    continue;
                };

                k += 1;
                let sub_op_id = sub_op_message_id(move_message_id, k);
                let sop_instance_uid = dataset
                    .element_by_name("SOPInstanceUID")
                    .ok()
                    .and_then(|e| e.value().to_str().ok().map(|s| s.into_owned()))
                    .unwrap_or_default();

                let store_status = storage::send_c_store(
                    store_endpoint,
                    store_presentation_context_id,
                    store_ts,
                    sub_op_id,
                    sop_class_uid,
                    &sop_instance_uid,
                    Priority::Medium,
                    Some((originator_ae, move_message_id)),
                    store_ts.uid(),
                    &dataset,
                );

                match store_status {
                    Ok(StatusKind::Success) => counts.record_success(),
                    Ok(StatusKind::Warning) => {
                        counts.record_warning();
                        failed_uids.push(sop_instance_uid);
                    }
                    _ => {
                        counts.record_failure();
                        failed_uids.push(sop_instance_uid);
                    }
                }

                send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, 0xFF00, counts, &failed_uids, store_ts)?;
            }
        }
    }

    let status = final_status(counts);
    send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, status, counts, &failed_uids, store_ts)?;
    Ok(MoveOutcome { final_status: status, counts })
}

/// Entry point for a C-MOVE-RQ: decodes the identifier, runs `handler` to
/// decide whether to proceed, resolves the Move destination, validates the
/// declared sub-operation count, and only then hands off to
/// [`run_sub_operations`] — enforcing the four-step protocol that engine's
/// own documentation says it does not (spec.md §4.5.4 steps 1-4, §7):
///
/// 1. identifier decode failure -> [`DECODE_FAILURE`]
/// 2. handler raises before yielding anything -> [`HANDLER_FAILURE`]
/// 3. unknown Move destination -> [`UNKNOWN_DESTINATION`], no secondary
///    association is opened
/// 4. a malformed declared sub-operation count -> [`MALFORMED_COUNT`]
#[allow(clippy::too_many_arguments)]
pub fn handle_c_move<E, S, D, I>(
    move_provider: &mut Provider<E>,
    request: &DimseMessage,
    request_ts: &TransferSyntax,
    move_message_id: u16,
    sop_class_uid: &str,
    move_destination_ae: &str,
    destinations: &mut D,
    store_ts: &TransferSyntax,
    originator_ae: &str,
    is_cancelled: impl FnMut() -> bool,
    handler: impl FnOnce(InMemDicomObject) -> std::result::Result<MoveHandlerOutcome<I>, Box<dyn std::error::Error + Send + Sync>>,
) -> Result<MoveOutcome>
where
    E: Endpoint,
    S: Endpoint,
    D: MoveDestination<S>,
    I: Iterator<Item = SubOpYield>,
{
    let move_presentation_context_id = request.presentation_context_id;
    let empty = SubOpCounts::new(0);

    let identifier = match request.data_set(request_ts) {
        Ok(Some(identifier)) => identifier,
        Ok(None) | Err(_) => {
            send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, DECODE_FAILURE, empty, &[], store_ts)?;
            return Ok(MoveOutcome { final_status: DECODE_FAILURE, counts: empty });
        }
    };

    let outcome = match handler(identifier) {
        Ok(outcome) => outcome,
        Err(_) => {
            send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, HANDLER_FAILURE, empty, &[], store_ts)?;
            return Ok(MoveOutcome { final_status: HANDLER_FAILURE, counts: empty });
        }
    };

    let (total, sub_ops) = match outcome {
        MoveHandlerOutcome::Refused(status) => {
            send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, status, empty, &[], store_ts)?;
            return Ok(MoveOutcome { final_status: status, counts: empty });
        }
        MoveHandlerOutcome::Proceed { total, sub_ops } => (total, sub_ops),
    };

    if total == 0 {
        send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, MALFORMED_COUNT, empty, &[], store_ts)?;
        return Ok(MoveOutcome { final_status: MALFORMED_COUNT, counts: empty });
    }

    let Some((mut store_endpoint, store_presentation_context_id, store_ts_negotiated)) = destinations.resolve(move_destination_ae) else {
        send_move_response(move_provider, move_presentation_context_id, move_message_id, sop_class_uid, UNKNOWN_DESTINATION, empty, &[], store_ts)?;
        return Ok(MoveOutcome { final_status: UNKNOWN_DESTINATION, counts: empty });
    };

    run_sub_operations(
        move_provider,
        move_presentation_context_id,
        move_message_id,
        sop_class_uid,
        &mut store_endpoint,
        store_presentation_context_id,
        &store_ts_negotiated,
        originator_ae,
        total,
        sub_ops,
        is_cancelled,
    )
}

/// Build and send a C-MOVE-RSP, attaching a data set carrying
/// `FailedSOPInstanceUIDList` whenever `failed_uids` is non-empty (PS3.7
/// C.4.2.1.5, spec.md §8 scenario S4).
#[allow(clippy::too_many_arguments)]
fn send_move_response<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    message_id: u16,
    sop_class_uid: &str,
    status: u16,
    counts: SubOpCounts,
    failed_uids: &[String],
    ts: &TransferSyntax,
) -> Result<()> {
    let rsp = CMoveRsp::builder()
        .message_id_being_responded_to(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .status(status)
        .number_of_remaining_suboperations(counts.remaining)
        .number_of_completed_suboperations(counts.completed)
        .number_of_failed_suboperations(counts.failed)
        .number_of_warning_suboperations(counts.warning)
        .build();

    let data = if failed_uids.is_empty() {
        None
    } else {
        let dataset = InMemDicomObject::from_element_iter([DataElement::new(
            tags::FAILED_SOP_INSTANCE_UID_LIST,
            VR::UI,
            Value::Primitive(PrimitiveValue::Strs(failed_uids.to_vec().into())),
        )]);
        let mut buf = Vec::new();
        dataset
            .write_dataset_with_ts(&mut buf, ts)
            .map_err(Box::from)
            .context(EncodeSnafu)?;
        Some(buf)
    };

    provider
        .send_message(command_message(&rsp, presentation_context_id, data))
        .context(DimseSnafu)
}

/// Classify a C-MOVE-RSP's raw status.
pub fn classify_move_status(status: u16) -> StatusKind {
    classify(QR_MOVE_STATUS, status)
}

/// Pick the terminal C-MOVE-RSP status once all sub-operations have been
/// dispatched (PS3.7 C.4.2.1.5): Failure when nothing completed and at
/// least one sub-operation failed, Warning when some but not all
/// succeeded, Success otherwise (spec.md §8 scenario S4).
fn final_status(counts: SubOpCounts) -> u16 {
    if counts.failed == 0 && counts.warning == 0 {
        0x0000
    } else if counts.completed == 0 {
        0xA702
    } else {
        0xB000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{dicom_value, DataElement, VR};
    use dicom_dictionary_std::tags;
    use dicom_transfer_syntax_registry::entries;
    use std::sync::mpsc::channel;

    struct ChannelEndpoint {
        tx: std::sync::mpsc::Sender<crate::pdu::Pdu>,
        rx: std::sync::mpsc::Receiver<crate::pdu::Pdu>,
    }

    impl Endpoint for ChannelEndpoint {
        fn send_pdu(&mut self, pdu: &crate::pdu::Pdu) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.tx.send(pdu.clone()).unwrap();
            Ok(())
        }

        fn receive_pdu(&mut self) -> std::result::Result<crate::pdu::Pdu, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.rx.recv().unwrap())
        }

        fn max_pdu_length(&self) -> u32 {
            16_384
        }
    }

    fn pair() -> (Provider<ChannelEndpoint>, Provider<ChannelEndpoint>) {
        let (tx_a, rx_a) = channel();
        let (tx_b, rx_b) = channel();
        (
            Provider::new(ChannelEndpoint { tx: tx_a, rx: rx_b }),
            Provider::new(ChannelEndpoint { tx: tx_b, rx: rx_a }),
        )
    }

    struct NoDestinations;
    impl MoveDestination<ChannelEndpoint> for NoDestinations {
        fn resolve(&mut self, _ae_title: &str) -> Option<(Provider<ChannelEndpoint>, u8, TransferSyntax)> {
            None
        }
    }

    fn identifier_message(data: Option<Vec<u8>>) -> DimseMessage {
        DimseMessage {
            presentation_context_id: 1,
            command: InMemDicomObject::command_from_element_iter([]),
            data,
        }
    }

    fn encoded_identifier(ts: &TransferSyntax) -> Vec<u8> {
        let ds = InMemDicomObject::from_element_iter([DataElement::new(
            tags::QUERY_RETRIEVE_LEVEL,
            VR::CS,
            dicom_value!(Str, "STUDY"),
        )]);
        let mut buf = Vec::new();
        ds.write_dataset_with_ts(&mut buf, ts).unwrap();
        buf
    }

    #[test]
    fn decode_failure_reports_without_invoking_handler() {
        let (mut move_provider, mut move_peer) = pair();
        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
        let request = identifier_message(None);
        let mut destinations = NoDestinations;

        let outcome = handle_c_move::<_, ChannelEndpoint, _, std::vec::IntoIter<SubOpYield>>(
            &mut move_provider,
            &request,
            &ts,
            1,
            "CT_STORAGE",
            "SOME-DEST",
            &mut destinations,
            &ts,
            "MOVE-SCU",
            || false,
            |_identifier| panic!("handler must not run after a decode failure"),
        )
        .unwrap();

        assert_eq!(outcome.final_status, DECODE_FAILURE);
        let response = move_peer.receive_message().unwrap();
        assert_eq!(response.status(), Some(DECODE_FAILURE));
    }

    #[test]
    fn handler_failure_before_any_yield_is_reported() {
        let (mut move_provider, mut move_peer) = pair();
        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
        let request = identifier_message(Some(encoded_identifier(&ts)));
        let mut destinations = NoDestinations;

        let outcome = handle_c_move::<_, ChannelEndpoint, _, std::vec::IntoIter<SubOpYield>>(
            &mut move_provider,
            &request,
            &ts,
            1,
            "CT_STORAGE",
            "SOME-DEST",
            &mut destinations,
            &ts,
            "MOVE-SCU",
            || false,
            |_identifier| Err("no matches available".into()),
        )
        .unwrap();

        assert_eq!(outcome.final_status, HANDLER_FAILURE);
        let response = move_peer.receive_message().unwrap();
        assert_eq!(response.status(), Some(HANDLER_FAILURE));
    }

    #[test]
    fn zero_total_is_treated_as_malformed() {
        let (mut move_provider, mut move_peer) = pair();
        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
        let request = identifier_message(Some(encoded_identifier(&ts)));
        let mut destinations = NoDestinations;

        let outcome = handle_c_move(
            &mut move_provider,
            &request,
            &ts,
            1,
            "CT_STORAGE",
            "SOME-DEST",
            &mut destinations,
            &ts,
            "MOVE-SCU",
            || false,
            |_identifier| Ok(MoveHandlerOutcome::Proceed { total: 0, sub_ops: Vec::<SubOpYield>::new().into_iter() }),
        )
        .unwrap();

        assert_eq!(outcome.final_status, MALFORMED_COUNT);
        let response = move_peer.receive_message().unwrap();
        assert_eq!(response.status(), Some(MALFORMED_COUNT));
    }

    #[test]
    fn unknown_destination_stops_before_opening_a_secondary_association() {
        let (mut move_provider, mut move_peer) = pair();
        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
        let request = identifier_message(Some(encoded_identifier(&ts)));
        let mut destinations = NoDestinations;

        let outcome = handle_c_move(
            &mut move_provider,
            &request,
            &ts,
            1,
            "CT_STORAGE",
            "SOME-DEST",
            &mut destinations,
            &ts,
            "MOVE-SCU",
            || false,
            |_identifier| {
                Ok(MoveHandlerOutcome::Proceed {
                    total: 1,
                    sub_ops: vec![SubOpYield { status: StatusKind::Pending, dataset: None }].into_iter(),
                })
            },
        )
        .unwrap();

        assert_eq!(outcome.final_status, UNKNOWN_DESTINATION);
        let response = move_peer.receive_message().unwrap();
        assert_eq!(response.status(), Some(UNKNOWN_DESTINATION));
    }

    #[test]
    fn classifies_pending_and_failure() {
        assert_eq!(classify_move_status(0xFF00), StatusKind::Pending);
        assert_eq!(classify_move_status(0xA801), StatusKind::Failure);
    }

    #[test]
    fn final_status_is_failure_when_nothing_completed() {
        let mut counts = SubOpCounts::new(2);
        counts.record_failure();
        counts.record_failure();
        assert_eq!(final_status(counts), 0xA702);
    }

    #[test]
    fn final_status_is_warning_when_partially_successful() {
        let mut counts = SubOpCounts::new(2);
        counts.record_success();
        counts.record_failure();
        assert_eq!(final_status(counts), 0xB000);
    }

    #[test]
    fn final_status_is_success_when_all_completed() {
        let mut counts = SubOpCounts::new(2);
        counts.record_success();
        counts.record_success();
        assert_eq!(final_status(counts), 0x0000);
    }
}
