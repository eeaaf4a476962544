//! Query/Retrieve — Get service class (PS3.4 Annex C), spec.md §4.5.5.
//!
//! Same shape as [`crate::service::qr_move`] but the C-STORE sub-operations
//! run over the same association as the C-GET exchange itself, and a
//! "Composite Instance Retrieve Without Bulk Data" abstract syntax strips
//! bulk-data elements from each dispatched dataset.

use dicom_encoding::TransferSyntax;
use dicom_object::InMemDicomObject;
use snafu::{ResultExt, Snafu};

use crate::dimse::{Endpoint, Provider};
use crate::pdu::commands::Priority;
use crate::pdu::generated::CGetRsp;
use crate::service::status::StatusKind;
use crate::service::{command_message, storage, strip_bulk_data_elements, sub_op_message_id, SubOpCounts};

/// SOP Class UID for "Composite Instance Retrieve Without Bulk Data"
/// (PS3.4 Annex Z), which triggers bulk-data stripping (spec.md §4.5.5).
pub const COMPOSITE_INSTANCE_RETRIEVE_WITHOUT_BULK_DATA: &str = "1.2.840.10008.5.1.4.1.2.5.3";

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("DIMSE provider failed while exchanging C-GET"))]
    Dimse { source: crate::dimse::Error },

    #[snafu(display("a C-STORE sub-operation failed"))]
    SubOperation { source: storage::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub struct SubOpYield {
    pub status: StatusKind,
    pub dataset: Option<InMemDicomObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOutcome {
    pub final_status: u16,
    pub counts: SubOpCounts,
}

/// Drive a Get sub-operation loop over a single association, following the
/// same state machine as [`crate::service::qr_move::run_sub_operations`]
/// minus the secondary-association wrinkle (spec.md §4.5.5).
#[allow(clippy::too_many_arguments)]
pub fn run_sub_operations<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    get_message_id: u16,
    requested_sop_class_uid: &str,
    store_presentation_context_id: u8,
    store_ts: &TransferSyntax,
    total: u16,
    mut sub_ops: impl Iterator<Item = SubOpYield>,
    mut is_cancelled: impl FnMut() -> bool,
) -> Result<GetOutcome> {
    let strip_bulk_data = requested_sop_class_uid == COMPOSITE_INSTANCE_RETRIEVE_WITHOUT_BULK_DATA;
    let mut counts = SubOpCounts::new(total);
    let mut k: u32 = 0;

    while !counts.is_done() {
        if is_cancelled() {
            let status = 0xFE00;
            send_get_response(provider, presentation_context_id, get_message_id, requested_sop_class_uid, status, counts)?;
            return Ok(GetOutcome { final_status: status, counts });
        }

        let Some(next) = sub_ops.next() else { break };
        match next.status {
            StatusKind::Cancel => {
                let status = 0xFE00;
                send_get_response(provider, presentation_context_id, get_message_id, requested_sop_class_uid, status, counts)?;
                return Ok(GetOutcome { final_status: status, counts });
            }
            StatusKind::Failure | StatusKind::Warning => {
                counts.failed += counts.remaining;
                counts.remaining = 0;
                let status = if next.status == StatusKind::Warning { 0xB000 } else { 0xA702 };
                send_get_response(provider, presentation_context_id, get_message_id, requested_sop_class_uid, status, counts)?;
                return Ok(GetOutcome { final_status: status, counts });
            }
            StatusKind::Success => {
                let status = if counts.failed > 0 || counts.warning > 0 { 0xB000 } else { 0x0000 };
                send_get_response(provider, presentation_context_id, get_message_id, requested_sop_class_uid, status, counts)?;
                return Ok(GetOutcome { final_status: status, counts });
            }
            StatusKind::Pending => {
                let Some(mut dataset) = next.dataset else {
                    counts.record_failure();
                    continue;
                };
                if strip_bulk_data {
                    strip_bulk_data_elements(&mut dataset);
                }

                k += 1;
                let sub_op_id = sub_op_message_id(get_message_id, k);
                let sop_class_uid = dataset
                    .element_by_name("SOPClassUID")
                    .ok()
                    .and_then(|e| e.value().to_str().ok().map(|s| s.into_owned()))
                    .unwrap_or_else(|| requested_sop_class_uid.to_string());
                let sop_instance_uid = dataset
                    .element_by_name("SOPInstanceUID")
                    .ok()
                    .and_then(|e| e.value().to_str().ok().map(|s| s.into_owned()))
                    .unwrap_or_default();

                let store_status = storage::send_c_store(
                    provider,
                    store_presentation_context_id,
                    store_ts,
                    sub_op_id,
                    &sop_class_uid,
                    &sop_instance_uid,
                    Priority::Medium,
                    None,
                    store_ts.uid(),
                    &dataset,
                );

                match store_status {
                    Ok(StatusKind::Success) => counts.record_success(),
                    Ok(StatusKind::Warning) => counts.record_warning(),
                    _ => counts.record_failure(),
                }

                send_get_response(provider, presentation_context_id, get_message_id, requested_sop_class_uid, 0xFF00, counts)?;
            }
        }
    }

    let status = if counts.failed == 0 && counts.warning == 0 { 0x0000 } else { 0xB000 };
    send_get_response(provider, presentation_context_id, get_message_id, requested_sop_class_uid, status, counts)?;
    Ok(GetOutcome { final_status: status, counts })
}

fn send_get_response<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    message_id: u16,
    sop_class_uid: &str,
    status: u16,
    counts: SubOpCounts,
) -> Result<()> {
    let rsp = CGetRsp::builder()
        .message_id_being_responded_to(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .status(status)
        .number_of_remaining_suboperations(counts.remaining)
        .number_of_completed_suboperations(counts.completed)
        .number_of_failed_suboperations(counts.failed)
        .number_of_warning_suboperations(counts.warning)
        .build();

    provider
        .send_message(command_message(&rsp, presentation_context_id, None))
        .context(DimseSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_retrieve_constant_matches_annex_z() {
        assert_eq!(
            COMPOSITE_INSTANCE_RETRIEVE_WITHOUT_BULK_DATA,
            "1.2.840.10008.5.1.4.1.2.5.3"
        );
    }
}
