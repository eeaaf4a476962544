//! Status code tables for the DIMSE service classes (PS3.7 Annex C).
//!
//! Each table maps a `(status, mask)` pair to a human-readable description
//! and to the severity used for SCU-side classification, grounded on the
//! status enumerations carried in [`crate::pdu::commands`]'s command
//! structs. `classify` compares `status & mask == status` so that
//! range-style codes like the Cxxx "Unable to process" family match every
//! concrete value in the family.

/// Broad classification of a DIMSE response status (PS3.7 Annex C.1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StatusKind {
    Success,
    Warning,
    Pending,
    Cancel,
    Failure,
}

/// One entry of a status table: a `(code, mask)` match, its kind, and a
/// short description for logging/diagnostics.
pub struct StatusEntry {
    pub code: u16,
    pub mask: u16,
    pub kind: StatusKind,
    pub description: &'static str,
}

const fn entry(code: u16, mask: u16, kind: StatusKind, description: &'static str) -> StatusEntry {
    StatusEntry { code, mask, kind, description }
}

/// Classify a status code against a table, matching the first entry whose
/// `code` equals `status & mask`.
pub fn classify(table: &[StatusEntry], status: u16) -> StatusKind {
    table
        .iter()
        .find(|e| status & e.mask == e.code)
        .map(|e| e.kind)
        .unwrap_or(StatusKind::Failure)
}

pub const VERIFICATION_STATUS: &[StatusEntry] = &[
    entry(0x0000, 0xFFFF, StatusKind::Success, "Success"),
    entry(0x0122, 0xFFFF, StatusKind::Failure, "SOP class not supported"),
    entry(0x0210, 0xFFFF, StatusKind::Failure, "Duplicate invocation"),
    entry(0x0211, 0xFFFF, StatusKind::Failure, "Unrecognized operation"),
    entry(0x0212, 0xFFFF, StatusKind::Failure, "Mistyped argument"),
];

pub const STORAGE_STATUS: &[StatusEntry] = &[
    entry(0x0000, 0xFFFF, StatusKind::Success, "Success"),
    entry(0xB000, 0xFFFF, StatusKind::Warning, "Coercion of data elements"),
    entry(0xB006, 0xFFFF, StatusKind::Warning, "Elements discarded"),
    entry(0xB007, 0xFFFF, StatusKind::Warning, "Data set does not match SOP class"),
    entry(0x0117, 0xFFFF, StatusKind::Failure, "Invalid SOP instance"),
    entry(0x0122, 0xFFFF, StatusKind::Failure, "SOP class not supported"),
    entry(0x0124, 0xFFFF, StatusKind::Failure, "Not authorized"),
    entry(0x0210, 0xFFFF, StatusKind::Failure, "Duplicate invocation"),
    entry(0x0211, 0xFFFF, StatusKind::Failure, "Unrecognized operation"),
    entry(0x0212, 0xFFFF, StatusKind::Failure, "Mistyped argument"),
    entry(0xA700, 0xFF00, StatusKind::Failure, "Out of resources"),
    entry(0xA900, 0xFF00, StatusKind::Failure, "Data set does not match SOP class"),
    entry(0xC000, 0xF000, StatusKind::Failure, "Cannot understand"),
];

pub const QR_FIND_STATUS: &[StatusEntry] = &[
    entry(0x0000, 0xFFFF, StatusKind::Success, "Matching is complete"),
    entry(0xFF00, 0xFFFF, StatusKind::Pending, "Matches are continuing"),
    entry(0xFF01, 0xFFFF, StatusKind::Pending, "Matches are continuing, warning"),
    entry(0xFE00, 0xFFFF, StatusKind::Cancel, "Matching terminated due to cancel"),
    entry(0xA700, 0xFF00, StatusKind::Failure, "Out of resources"),
    entry(0xA900, 0xFF00, StatusKind::Failure, "Identifier does not match SOP class"),
    entry(0xC000, 0xF000, StatusKind::Failure, "Unable to process"),
];

pub const QR_GET_STATUS: &[StatusEntry] = &[
    entry(0x0000, 0xFFFF, StatusKind::Success, "Sub-operations complete"),
    entry(0xFF00, 0xFFFF, StatusKind::Pending, "Sub-operations are continuing"),
    entry(0xFE00, 0xFFFF, StatusKind::Cancel, "Sub-operations terminated due to cancel"),
    entry(0xB000, 0xFFFF, StatusKind::Warning, "Sub-operations complete, one or more failures"),
    entry(0xA701, 0xFFFF, StatusKind::Failure, "Out of resources, unable to calculate matches"),
    entry(0xA702, 0xFFFF, StatusKind::Failure, "Out of resources, unable to perform sub-operations"),
    entry(0xA900, 0xFF00, StatusKind::Failure, "Identifier does not match SOP class"),
    entry(0xC000, 0xF000, StatusKind::Failure, "Unable to process"),
];

pub const QR_MOVE_STATUS: &[StatusEntry] = &[
    entry(0x0000, 0xFFFF, StatusKind::Success, "Sub-operations complete"),
    entry(0xFF00, 0xFFFF, StatusKind::Pending, "Sub-operations are continuing"),
    entry(0xFE00, 0xFFFF, StatusKind::Cancel, "Sub-operations terminated due to cancel"),
    entry(0xB000, 0xFFFF, StatusKind::Warning, "Sub-operations complete, one or more failures"),
    entry(0xA701, 0xFFFF, StatusKind::Failure, "Out of resources, unable to calculate matches"),
    entry(0xA702, 0xFFFF, StatusKind::Failure, "Out of resources, unable to perform sub-operations"),
    entry(0xA801, 0xFFFF, StatusKind::Failure, "Move destination unknown"),
    entry(0xA900, 0xFF00, StatusKind::Failure, "Identifier does not match SOP class"),
    entry(0xC000, 0xF000, StatusKind::Failure, "Unable to process"),
];

pub const N_SERVICE_STATUS: &[StatusEntry] = &[
    entry(0x0000, 0xFFFF, StatusKind::Success, "Success"),
    entry(0x0107, 0xFFFF, StatusKind::Warning, "Attribute list error"),
    entry(0x0116, 0xFFFF, StatusKind::Warning, "Attribute value out of range"),
    entry(0x0110, 0xFFFF, StatusKind::Failure, "Processing failure"),
    entry(0x0112, 0xFFFF, StatusKind::Failure, "No such SOP instance"),
    entry(0x0117, 0xFFFF, StatusKind::Failure, "Invalid object instance"),
    entry(0x0118, 0xFFFF, StatusKind::Failure, "No such SOP class"),
    entry(0x0119, 0xFFFF, StatusKind::Failure, "Class-instance conflict"),
    entry(0x0120, 0xFFFF, StatusKind::Failure, "Missing attribute"),
    entry(0x0121, 0xFFFF, StatusKind::Failure, "Missing attribute value"),
    entry(0x0122, 0xFFFF, StatusKind::Failure, "SOP class not supported"),
    entry(0x0123, 0xFFFF, StatusKind::Failure, "No such action"),
    entry(0x0124, 0xFFFF, StatusKind::Failure, "Not authorized"),
    entry(0x0210, 0xFFFF, StatusKind::Failure, "Duplicate invocation"),
    entry(0x0211, 0xFFFF, StatusKind::Failure, "Unrecognized operation"),
    entry(0x0212, 0xFFFF, StatusKind::Failure, "Mistyped argument"),
    entry(0x0213, 0xFFFF, StatusKind::Failure, "Resource limitation"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_success_and_pending() {
        assert_eq!(classify(QR_FIND_STATUS, 0x0000), StatusKind::Success);
        assert_eq!(classify(QR_FIND_STATUS, 0xFF00), StatusKind::Pending);
    }

    #[test]
    fn classifies_masked_failure_range() {
        assert_eq!(classify(STORAGE_STATUS, 0xC123), StatusKind::Failure);
        assert_eq!(classify(QR_MOVE_STATUS, 0xA702), StatusKind::Failure);
    }

    #[test]
    fn unknown_code_defaults_to_failure() {
        assert_eq!(classify(VERIFICATION_STATUS, 0x9999), StatusKind::Failure);
    }
}
