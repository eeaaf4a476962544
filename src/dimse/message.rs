//! DIMSE message representation and PDV (de)serialization.
//!
//! A [`DimseMessage`] is a command set plus an optional data set, the unit
//! exchanged by the DIMSE provider (spec.md §3, §4.4). Command sets are
//! always Implicit VR Little Endian, following [`crate::pdu::commands`].

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_encoding::TransferSyntax;
use dicom_object::{AccessError, InMemDicomObject, ReadError, WriteError};
use dicom_transfer_syntax_registry::entries;
use snafu::{ensure, OptionExt, ResultExt, Snafu};

use crate::pdu::{PDataValue, PDataValueType};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("could not decode command set"))]
    DecodeCommand { source: ReadError },

    #[snafu(display("could not encode command set"))]
    EncodeCommand { source: Box<WriteError> },

    #[snafu(display("command set is missing a required field"))]
    MissingField { source: AccessError },

    #[snafu(display("a PDV run mixed presentation context ids {} and {}", first, other))]
    MixedContext { first: u8, other: u8 },

    #[snafu(display("no command PDVs were found in the message"))]
    NoCommand,

    #[snafu(display("command field value could not be read as an integer"))]
    CastField,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A command-set plus optional data-set, tagged with the presentation
/// context it was (or will be) transferred over.
#[derive(Debug, Clone)]
pub struct DimseMessage {
    pub presentation_context_id: u8,
    pub command: InMemDicomObject,
    pub data: Option<Vec<u8>>,
}

impl DimseMessage {
    /// The DIMSE command field of this message, e.g. `0x0001` for C-STORE-RQ.
    pub fn command_field(&self) -> Result<u16> {
        self.command
            .element(tags::COMMAND_FIELD)
            .context(MissingFieldSnafu)?
            .value()
            .to_int::<u16>()
            .map_err(|_| Error::CastField)
    }

    fn tag_u16(&self, tag: Tag) -> Option<u16> {
        self.command
            .element(tag)
            .ok()
            .and_then(|e| e.value().to_int::<u16>().ok())
    }

    /// The Message ID of a request, if present.
    pub fn message_id(&self) -> Option<u16> {
        self.tag_u16(tags::MESSAGE_ID)
    }

    /// The Message ID Being Responded To of a response, if present.
    pub fn message_id_being_responded_to(&self) -> Option<u16> {
        self.tag_u16(tags::MESSAGE_ID_BEING_RESPONDED_TO)
    }

    /// The Status field of a response, if present.
    pub fn status(&self) -> Option<u16> {
        self.tag_u16(tags::STATUS)
    }

    /// Split the message into PDVs no larger than `max_data_len`, encoding
    /// the command set as Implicit VR Little Endian (spec.md §4.4).
    pub fn into_pdvs(self, max_data_len: usize) -> Result<Vec<PDataValue>> {
        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
        let mut command_bytes = Vec::new();
        self.command
            .write_dataset_with_ts(&mut command_bytes, &ts)
            .map_err(Box::from)
            .context(EncodeCommandSnafu)?;

        let mut pdvs = fragment(
            self.presentation_context_id,
            PDataValueType::Command,
            &command_bytes,
            max_data_len,
        );

        if let Some(data) = &self.data {
            pdvs.extend(fragment(
                self.presentation_context_id,
                PDataValueType::Data,
                data,
                max_data_len,
            ));
        }

        Ok(pdvs)
    }

    /// Reassemble a `DimseMessage` from PDV runs of a single command
    /// (and, if present, a single dataset) sharing one context id
    /// (spec.md §3/§4.4).
    pub fn from_pdvs(pdvs: Vec<PDataValue>) -> Result<Self> {
        let mut context_id = None;
        let mut command_bytes = Vec::new();
        let mut data_bytes = Vec::new();
        let mut has_data = false;

        for pdv in pdvs {
            match context_id {
                None => context_id = Some(pdv.presentation_context_id),
                Some(id) => ensure!(
                    id == pdv.presentation_context_id,
                    MixedContextSnafu {
                        first: id,
                        other: pdv.presentation_context_id,
                    }
                ),
            }
            match pdv.value_type {
                PDataValueType::Command => command_bytes.extend(pdv.data),
                PDataValueType::Data => {
                    has_data = true;
                    data_bytes.extend(pdv.data);
                }
            }
        }

        ensure!(!command_bytes.is_empty(), NoCommandSnafu);

        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
        let command = InMemDicomObject::read_dataset_with_ts(command_bytes.as_slice(), &ts)
            .context(DecodeCommandSnafu)?;

        Ok(DimseMessage {
            presentation_context_id: context_id.context(NoCommandSnafu)?,
            command,
            data: has_data.then_some(data_bytes),
        })
    }

    /// Decode this message's data set using the given transfer syntax.
    pub fn data_set(&self, ts: &TransferSyntax) -> Result<Option<InMemDicomObject>> {
        self.data
            .as_ref()
            .map(|data| {
                InMemDicomObject::read_dataset_with_ts(data.as_slice(), ts)
                    .context(DecodeCommandSnafu)
            })
            .transpose()
    }
}

/// Split `bytes` into a sequence of PDVs of the given type, each no larger
/// than `max_data_len`, with `is_last` set only on the final fragment.
fn fragment(
    presentation_context_id: u8,
    value_type: PDataValueType,
    bytes: &[u8],
    max_data_len: usize,
) -> Vec<PDataValue> {
    if bytes.is_empty() {
        return vec![PDataValue {
            presentation_context_id,
            value_type,
            is_last: true,
            data: Vec::new(),
        }];
    }

    let chunks: Vec<_> = bytes.chunks(max_data_len.max(1)).collect();
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| PDataValue {
            presentation_context_id,
            value_type: value_type.clone(),
            is_last: i == last,
            data: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{dicom_value, DataElement, VR};
    use dicom_dictionary_std::uids::VERIFICATION;

    fn echo_command(message_id: u16) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, VERIFICATION),
            DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [0x0030])),
            DataElement::new(tags::MESSAGE_ID, VR::US, dicom_value!(U16, [message_id])),
            DataElement::new(
                tags::COMMAND_DATA_SET_TYPE,
                VR::US,
                dicom_value!(U16, [0x0101]),
            ),
        ])
    }

    #[test]
    fn round_trips_through_pdvs() {
        let msg = DimseMessage {
            presentation_context_id: 1,
            command: echo_command(42),
            data: None,
        };

        let pdvs = msg.into_pdvs(16_384).unwrap();
        assert!(pdvs.iter().all(|p| p.presentation_context_id == 1));

        let decoded = DimseMessage::from_pdvs(pdvs).unwrap();
        assert_eq!(decoded.command_field().unwrap(), 0x0030);
        assert_eq!(decoded.message_id(), Some(42));
        assert!(decoded.data.is_none());
    }

    #[test]
    fn fragments_large_command_into_multiple_pdvs() {
        let msg = DimseMessage {
            presentation_context_id: 3,
            command: echo_command(7),
            data: None,
        };
        let pdvs = msg.into_pdvs(8).unwrap();
        assert!(pdvs.len() > 1);
        assert!(pdvs.iter().rev().skip(1).all(|p| !p.is_last));
        assert!(pdvs.last().unwrap().is_last);
    }

    #[test]
    fn rejects_mixed_context_ids() {
        let pdvs = vec![
            PDataValue {
                presentation_context_id: 1,
                value_type: PDataValueType::Command,
                is_last: true,
                data: vec![0],
            },
            PDataValue {
                presentation_context_id: 3,
                value_type: PDataValueType::Data,
                is_last: true,
                data: vec![0],
            },
        ];
        let err = DimseMessage::from_pdvs(pdvs).unwrap_err();
        assert!(matches!(err, Error::MixedContext { first: 1, other: 3 }));
    }
}
