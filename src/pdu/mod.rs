//! DICOM Upper Layer protocol data units.
//!
//! This module defines the seven PDU types of the UL protocol
//! (see PS3.8 section 9.3) and the variable items nested inside them,
//! along with their encoding and decoding via [`reader`] and [`writer`].

/// The default maximum PDU size offered by this implementation.
pub const DEFAULT_MAX_PDU: u32 = 16_384;

/// The minimum PDU size, as specified by the standard.
pub const MINIMUM_PDU_SIZE: u32 = 4_096;

/// The maximum PDU size, as specified by the standard.
pub const MAXIMUM_PDU_SIZE: u32 = 131_072;

/// The length of the PDU header in bytes:
/// PDU-type (1), reserved (1), PDU-length (4).
pub const PDU_HEADER_SIZE: u32 = 6;

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextProposed {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextResult {
    pub id: u8,
    pub reason: PresentationContextResultReason,
    pub transfer_syntax: String,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PresentationContextResultReason {
    Acceptance = 0,
    UserRejection = 1,
    NoReason = 2,
    AbstractSyntaxNotSupported = 3,
    TransferSyntaxesNotSupported = 4,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJResult {
    Permanent,
    Transient,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJSource {
    ServiceUser(AssociationRJServiceUserReason),
    ServiceProviderASCE(AssociationRJServiceProviderASCEReason),
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAETitleNotRecognized,
    CalledAETitleNotRecognized,
    Reserved(u8),
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceProviderASCEReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PDataValue {
    pub presentation_context_id: u8,
    pub value_type: PDataValueType,
    pub is_last: bool,
    pub data: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PDataValueType {
    Command,
    Data,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQSource {
    ServiceUser,
    ServiceProvider(AbortRQServiceProviderReason),
    Reserved,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQServiceProviderReason {
    ReasonNotSpecifiedUnrecognizedPDU,
    UnexpectedPDU,
    Reserved,
    UnrecognizedPDUParameter,
    UnexpectedPDUParameter,
    InvalidPDUParameter,
}

/// The SCU/SCP Role Selection negotiation item (PS3.7 Annex D.3.3.4),
/// one per abstract syntax for which a non-default role is requested.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct RoleSelection {
    pub abstract_syntax: String,
    pub scu_role: bool,
    pub scp_role: bool,
}

/// SOP Class Extended Negotiation sub-item (PS3.7 Annex D.3.3.5).
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct SopClassExtendedNegotiation {
    pub sop_class_uid: String,
    pub service_class_application_information: Vec<u8>,
}

/// SOP Class Common Extended Negotiation sub-item (PS3.7 Annex D.3.3.6).
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct SopClassCommonExtendedNegotiation {
    pub sop_class_uid: String,
    pub service_class_uid: String,
    pub related_general_sop_classes: Vec<String>,
}

/// Asynchronous Operations Window negotiation item (PS3.7 Annex D.3.3.3).
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct AsyncOpsWindow {
    pub max_operations_invoked: u16,
    pub max_operations_performed: u16,
}

/// A user identity negotiation request, see PS3.7 Annex D.3.3.7.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum UserIdentity {
    Username {
        username: String,
        positive_response_requested: bool,
    },
    UsernamePassword {
        username: String,
        password: String,
        positive_response_requested: bool,
    },
    Kerberos {
        ticket: Vec<u8>,
        positive_response_requested: bool,
    },
    Saml {
        assertion: Vec<u8>,
        positive_response_requested: bool,
    },
    Jwt {
        token: Vec<u8>,
        positive_response_requested: bool,
    },
}

/// A user identity negotiation response, carrying the server's token
/// when one was requested and the negotiation type supports it
/// (Kerberos, SAML, JWT).
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct UserIdentityResponse {
    pub server_response: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PduVariableItem {
    Unknown(u8),
    ApplicationContext(String),
    PresentationContextProposed(PresentationContextProposed),
    PresentationContextResult(PresentationContextResult),
    UserVariables(Vec<UserVariableItem>),
}

/// Items nested inside the User Information item of an A-ASSOCIATE-RQ/AC.
///
/// Unknown sub-items are preserved as `Unknown` on read and silently
/// dropped on write, per the negotiation rules in PS3.8 section 9.3.2.3.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum UserVariableItem {
    Unknown(u8, Vec<u8>),
    MaxLength(u32),
    ImplementationClassUID(String),
    ImplementationVersionName(String),
    AsyncOpsWindow(AsyncOpsWindow),
    RoleSelection(RoleSelection),
    SopClassExtendedNegotiation(SopClassExtendedNegotiation),
    SopClassCommonExtendedNegotiation(SopClassCommonExtendedNegotiation),
    UserIdentity(UserIdentity),
    UserIdentityResponse(UserIdentityResponse),
}

/// A single DICOM Upper Layer protocol data unit.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum Pdu {
    Unknown {
        pdu_type: u8,
        data: Vec<u8>,
    },
    AssociationRQ {
        protocol_version: u16,
        calling_ae_title: String,
        called_ae_title: String,
        application_context_name: String,
        presentation_contexts: Vec<PresentationContextProposed>,
        user_variables: Vec<UserVariableItem>,
    },
    AssociationAC {
        protocol_version: u16,
        application_context_name: String,
        presentation_contexts: Vec<PresentationContextResult>,
        user_variables: Vec<UserVariableItem>,
    },
    AssociationRJ {
        result: AssociationRJResult,
        source: AssociationRJSource,
    },
    PData {
        data: Vec<PDataValue>,
    },
    ReleaseRQ,
    ReleaseRP,
    AbortRQ {
        source: AbortRQSource,
    },
}

impl Pdu {
    /// A human-readable name for the PDU variant, for logging.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Pdu::Unknown { .. } => "Unknown",
            Pdu::AssociationRQ { .. } => "A-ASSOCIATE-RQ",
            Pdu::AssociationAC { .. } => "A-ASSOCIATE-AC",
            Pdu::AssociationRJ { .. } => "A-ASSOCIATE-RJ",
            Pdu::PData { .. } => "P-DATA-TF",
            Pdu::ReleaseRQ => "A-RELEASE-RQ",
            Pdu::ReleaseRP => "A-RELEASE-RP",
            Pdu::AbortRQ { .. } => "A-ABORT",
        }
    }
}

pub mod commands;
pub mod generated;
pub mod reader;
pub mod writer;

pub use reader::read_pdu;
pub use writer::write_pdu;

#[cfg(test)]
mod test;
