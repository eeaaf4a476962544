//! Normalized N-services (PS3.7 §10.1): N-EVENT-REPORT, N-GET, N-SET,
//! N-ACTION, N-CREATE, N-DELETE (spec.md §4.5.6).
//!
//! Each service has a uniform request → handler → response shape; dataset
//! encode failures and handler exceptions both coerce the response status
//! to `0x0110` (spec.md §4.5.6, §7).

use dicom_encoding::TransferSyntax;
use dicom_object::InMemDicomObject;
use snafu::{ResultExt, Snafu};

use crate::dimse::{DimseMessage, Endpoint, Provider};
use crate::pdu::commands::DatasetForbiddenCommand;
use crate::pdu::generated::{
    NActionRsp, NCreateRsp, NDeleteRsp, NEventReportRsp, NGetRsp, NSetRsp,
};
use crate::service::command_message;
use crate::service::status::{classify, StatusKind, N_SERVICE_STATUS};

impl<'a> DatasetForbiddenCommand for NDeleteRsp<'a> {}

/// Status coerced onto an N-service response when the handler fails or the
/// data set cannot be encoded (spec.md §4.5.6).
pub const PROCESSING_FAILURE: u16 = 0x0110;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("DIMSE provider failed while exchanging an N-service message"))]
    Dimse { source: crate::dimse::Error },

    #[snafu(display("could not encode the response data set"))]
    Encode { source: Box<dicom_object::WriteError> },

    #[snafu(display("could not decode the request data set"))]
    Decode { source: crate::dimse::message::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classify a raw N-service status code.
pub fn classify_status(status: u16) -> StatusKind {
    classify(N_SERVICE_STATUS, status)
}

/// Decode the data set of an inbound N-service request, if any.
pub fn request_dataset(message: &DimseMessage, ts: &TransferSyntax) -> Result<Option<InMemDicomObject>> {
    message.data_set(ts).context(DecodeSnafu)
}

fn encode(dataset: &InMemDicomObject, ts: &TransferSyntax) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    dataset
        .write_dataset_with_ts(&mut buf, ts)
        .map_err(Box::from)
        .context(EncodeSnafu)?;
    Ok(buf)
}

/// Run `handler` to decide the N-EVENT-REPORT-RSP status and data set, then
/// send it, coercing a handler error to [`PROCESSING_FAILURE`] with no data
/// set (spec.md §4.5.6, §7).
#[allow(clippy::too_many_arguments)]
pub fn handle_n_event_report<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    event_type_id: u16,
    ts: &TransferSyntax,
    handler: impl FnOnce() -> std::result::Result<(u16, Option<InMemDicomObject>), Box<dyn std::error::Error + Send + Sync>>,
) -> Result<()> {
    let (status, dataset) = handler().unwrap_or((PROCESSING_FAILURE, None));
    let data = dataset.as_ref().map(|ds| encode(ds, ts)).transpose()?;
    let rsp = NEventReportRsp::builder()
        .message_id_being_responded_to(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .affected_sop_instance_uid(sop_instance_uid)
        .event_type_id(event_type_id)
        .status(status)
        .build();
    provider
        .send_message(command_message(&rsp, presentation_context_id, data))
        .context(DimseSnafu)
}

/// Run `handler` to decide the N-GET-RSP status and data set, then send it,
/// coercing a handler error to [`PROCESSING_FAILURE`] with no data set
/// (spec.md §4.5.6, §7).
pub fn handle_n_get<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    ts: &TransferSyntax,
    handler: impl FnOnce() -> std::result::Result<(u16, Option<InMemDicomObject>), Box<dyn std::error::Error + Send + Sync>>,
) -> Result<()> {
    let (status, dataset) = handler().unwrap_or((PROCESSING_FAILURE, None));
    let data = dataset.as_ref().map(|ds| encode(ds, ts)).transpose()?;
    let rsp = NGetRsp::builder()
        .message_id_being_responded_to(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .affected_sop_instance_uid(sop_instance_uid)
        .status(status)
        .build();
    provider
        .send_message(command_message(&rsp, presentation_context_id, data))
        .context(DimseSnafu)
}

/// Run `handler` to decide the N-SET-RSP status and data set, then send it,
/// coercing a handler error to [`PROCESSING_FAILURE`] with no data set
/// (spec.md §4.5.6, §7).
pub fn handle_n_set<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    ts: &TransferSyntax,
    handler: impl FnOnce() -> std::result::Result<(u16, Option<InMemDicomObject>), Box<dyn std::error::Error + Send + Sync>>,
) -> Result<()> {
    let (status, dataset) = handler().unwrap_or((PROCESSING_FAILURE, None));
    let data = dataset.as_ref().map(|ds| encode(ds, ts)).transpose()?;
    let rsp = NSetRsp::builder()
        .message_id_being_responded_to(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .affected_sop_instance_uid(sop_instance_uid)
        .status(status)
        .build();
    provider
        .send_message(command_message(&rsp, presentation_context_id, data))
        .context(DimseSnafu)
}

/// Run `handler` to decide the N-ACTION-RSP status and data set, then send
/// it, coercing a handler error to [`PROCESSING_FAILURE`] with no data set
/// (spec.md §4.5.6, §7).
#[allow(clippy::too_many_arguments)]
pub fn handle_n_action<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    action_type_id: u16,
    ts: &TransferSyntax,
    handler: impl FnOnce() -> std::result::Result<(u16, Option<InMemDicomObject>), Box<dyn std::error::Error + Send + Sync>>,
) -> Result<()> {
    let (status, dataset) = handler().unwrap_or((PROCESSING_FAILURE, None));
    let data = dataset.as_ref().map(|ds| encode(ds, ts)).transpose()?;
    let rsp = NActionRsp::builder()
        .message_id_being_responded_to(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .affected_sop_instance_uid(sop_instance_uid)
        .action_type_id(action_type_id)
        .status(status)
        .build();
    provider
        .send_message(command_message(&rsp, presentation_context_id, data))
        .context(DimseSnafu)
}

/// Run `handler` to decide the N-CREATE-RSP status and data set, then send
/// it, coercing a handler error to [`PROCESSING_FAILURE`] with no data set
/// (spec.md §4.5.6, §7).
pub fn handle_n_create<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    ts: &TransferSyntax,
    handler: impl FnOnce() -> std::result::Result<(u16, Option<InMemDicomObject>), Box<dyn std::error::Error + Send + Sync>>,
) -> Result<()> {
    let (status, dataset) = handler().unwrap_or((PROCESSING_FAILURE, None));
    let data = dataset.as_ref().map(|ds| encode(ds, ts)).transpose()?;
    let rsp = NCreateRsp::builder()
        .message_id_being_responded_to(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .affected_sop_instance_uid(sop_instance_uid)
        .status(status)
        .build();
    provider
        .send_message(command_message(&rsp, presentation_context_id, data))
        .context(DimseSnafu)
}

/// Run `handler` to decide the N-DELETE-RSP status and send it, coercing a
/// handler error to [`PROCESSING_FAILURE`] (spec.md §4.5.6, §7). N-DELETE
/// carries no data set in either direction.
pub fn handle_n_delete<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    handler: impl FnOnce() -> std::result::Result<u16, Box<dyn std::error::Error + Send + Sync>>,
) -> Result<()> {
    let status = handler().unwrap_or(PROCESSING_FAILURE);
    let rsp = NDeleteRsp::builder()
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

    #[test]
    fn classifies_known_and_unknown_statuses() {
        assert_eq!(classify_status(0x0000), StatusKind::Success);
        assert_eq!(classify_status(0x0112), StatusKind::Failure);
        assert_eq!(classify_status(0x9999), StatusKind::Failure);
    }
}
