//! DIMSE service classes: Verification, Storage, Query/Retrieve
//! (Find/Get/Move), and the normalized N-services.
//!
//! The sub-operation engine shared by Move and Get (spec.md §4.5.4/§4.5.5)
//! lives in [`qr_move`] and [`qr_get`]; both are generalizations of the
//! C-STORE fan-out found in `movescu`'s SCU loop, rehosted as a reusable
//! engine rather than a one-shot CLI routine.

pub mod n_service;
pub mod qr_find;
pub mod qr_get;
pub mod qr_move;
pub mod status;
pub mod storage;
pub mod verification;

use dicom_core::header::Header;
use dicom_core::{dicom_value, DataElement, Length, Tag, VR};
use dicom_core::value::Value;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;

use crate::dimse::DimseMessage;
use crate::pdu::commands::Command;

/// Assemble the command-set portion of a [`DimseMessage`] from a typed
/// command struct, setting `CommandDataSetType` the same way
/// [`crate::pdu::commands::Command::encode`] does (spec.md §3 DIMSEMessage:
/// `CommandDataSetType == 0x0101` iff there is no data-set).
pub(crate) fn command_message<C: Command>(
    command: &C,
    presentation_context_id: u8,
    data: Option<Vec<u8>>,
) -> DimseMessage {
    let mut obj = command.dataset();
    obj.put(DataElement::new(
        tags::COMMAND_DATA_SET_TYPE,
        VR::US,
        if data.is_some() {
            dicom_value!(U16, [0x0001])
        } else {
            dicom_value!(U16, [0x0101])
        },
    ));
    DimseMessage { presentation_context_id, command: obj, data }
}

/// PixelData, FloatPixelData, DoubleFloatPixelData (PS3.6).
const PIXEL_DATA_GROUP: u16 = 0x7FE0;
/// PixelDataProviderURL (0028,7FE0).
const PIXEL_DATA_PROVIDER_URL: Tag = Tag(0x0028, 0x7FE0);
/// SpectroscopyData (5600,0020).
const SPECTROSCOPY_DATA: Tag = Tag(0x5600, 0x0020);
/// EncapsulatedDocument (0042,0011).
const ENCAPSULATED_DOCUMENT: Tag = Tag(0x0042, 0x0011);
/// WaveformSequence (5400,0100).
const WAVEFORM_SEQUENCE: Tag = Tag(0x5400, 0x0100);
/// WaveformData (5400,1010).
const WAVEFORM_DATA: Tag = Tag(0x5400, 0x1010);

/// Well-known bulk-data element tags stripped for a "Composite Instance
/// Retrieve Without Bulk Data" Get request (spec.md §4.5.5). OverlayData
/// and CurveData occupy repeating element groups, so they are matched by
/// group range rather than by a single tag.
fn is_bulk_data_tag(tag: Tag) -> bool {
    match (tag.group(), tag.element()) {
        (PIXEL_DATA_GROUP, 0x0008) | (PIXEL_DATA_GROUP, 0x0009) | (PIXEL_DATA_GROUP, 0x0010) => true,
        (g, e) if Tag(g, e) == PIXEL_DATA_PROVIDER_URL => true,
        (g, e) if Tag(g, e) == SPECTROSCOPY_DATA => true,
        (g, e) if Tag(g, e) == ENCAPSULATED_DOCUMENT => true,
        // OverlayData (60xx,3000)
        (g, 0x3000) if (0x6000..=0x60FF).contains(&g) => true,
        // CurveData (50xx,3000) and AudioSampleData (50xx,200C), retired repeating groups
        (g, 0x3000) | (g, 0x200C) if (0x5000..=0x50FF).contains(&g) => true,
        _ => false,
    }
}

/// Strip the well-known bulk-data elements from `obj` in place, including
/// `WaveformData` from every item of `WaveformSequence` (spec.md §4.5.5).
pub fn strip_bulk_data_elements(obj: &mut InMemDicomObject) {
    obj.retain(|elt| !is_bulk_data_tag(elt.tag()));

    if let Ok(elt) = obj.take_element(WAVEFORM_SEQUENCE) {
        if let Some(items) = elt.value().items() {
            let stripped: Vec<InMemDicomObject> = items
                .iter()
                .cloned()
                .map(|mut item| {
                    item.remove_element(WAVEFORM_DATA);
                    item
                })
                .collect();
            obj.put_element(DataElement::new(
                WAVEFORM_SEQUENCE,
                VR::SQ,
                Value::new_sequence(stripped, Length::UNDEFINED),
            ));
        }
    }
}

/// Compute the Message ID of the k-th sub-operation spawned from a request
/// whose own Message ID was `base`, wrapping through `1` rather than `0`
/// (spec.md §4.4/§6, invariant 3: `((base + k) - 1) mod 65535 + 1`).
pub fn sub_op_message_id(base: u16, k: u32) -> u16 {
    let base = base as u32;
    let next = base + k;
    let wrapped = if next > 65535 { next - 65535 } else { next };
    wrapped as u16
}

/// Running totals for a Move or Get sub-operation loop (PS3.7 C.4.2/C.4.3).
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct SubOpCounts {
    pub remaining: u16,
    pub completed: u16,
    pub failed: u16,
    pub warning: u16,
}

impl SubOpCounts {
    pub fn new(total: u16) -> Self {
        SubOpCounts { remaining: total, completed: 0, failed: 0, warning: 0 }
    }

    pub fn record_success(&mut self) {
        self.completed += 1;
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn record_warning(&mut self) {
        self.warning += 1;
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_sub_op_message_id_through_one() {
        // spec.md §8 S5: base 65534, N=3 -> 65535, 1, 2
        assert_eq!(sub_op_message_id(65534, 1), 65535);
        assert_eq!(sub_op_message_id(65534, 2), 1);
        assert_eq!(sub_op_message_id(65534, 3), 2);
    }

    #[test]
    fn does_not_wrap_when_under_limit() {
        assert_eq!(sub_op_message_id(10, 1), 11);
        assert_eq!(sub_op_message_id(10, 5), 15);
    }

    #[test]
    fn sub_op_counts_track_remaining() {
        let mut counts = SubOpCounts::new(3);
        counts.record_success();
        counts.record_warning();
        counts.record_failure();
        assert!(counts.is_done());
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.warning, 1);
        assert_eq!(counts.failed, 1);
    }

    #[test]
    fn strips_pixel_data_but_keeps_other_elements() {
        use dicom_core::dicom_value;
        use dicom_dictionary_std::tags;

        let mut obj = InMemDicomObject::from_element_iter([
            DataElement::new(tags::PATIENT_NAME, VR::PN, dicom_value!(Str, "Doe^John")),
            DataElement::new(Tag(PIXEL_DATA_GROUP, 0x0010), VR::OB, dicom_value!(U8, [1, 2, 3])),
        ]);

        strip_bulk_data_elements(&mut obj);

        assert!(obj.element(tags::PATIENT_NAME).is_ok());
        assert!(obj.element(Tag(PIXEL_DATA_GROUP, 0x0010)).is_err());
    }
}
