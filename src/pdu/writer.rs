//! PDU writer module
use crate::pdu::*;
use byteordered::byteorder::{BigEndian, WriteBytesExt};
use dicom_encoding::text::{DefaultCharacterSetCodec, TextCodec};
use snafu::{Backtrace, ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Could not write PDU field `{}`", field))]
    WriteField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not write {} reserved bytes", bytes))]
    WriteReserved {
        bytes: u32,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not encode text field `{}`", field))]
    EncodeField {
        field: &'static str,
        #[snafu(backtrace)]
        source: dicom_encoding::text::EncodeTextError,
    },
    #[snafu(display("Could not write chunk `{}`", name))]
    WriteChunk {
        name: &'static str,
        #[snafu(backtrace)]
        source: Box<Error>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn write_chunk_u32<F>(writer: &mut dyn Write, name: &'static str, func: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data)
        .map_err(Box::from)
        .context(WriteChunkSnafu { name })?;

    let length = data.len() as u32;
    writer
        .write_u32::<BigEndian>(length)
        .context(WriteFieldSnafu { field: "chunk length" })?;
    writer
        .write_all(&data)
        .context(WriteFieldSnafu { field: "chunk data" })?;

    Ok(())
}

fn write_chunk_u16<F>(writer: &mut dyn Write, name: &'static str, func: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data)
        .map_err(Box::from)
        .context(WriteChunkSnafu { name })?;

    let length = data.len() as u16;
    writer
        .write_u16::<BigEndian>(length)
        .context(WriteFieldSnafu { field: "chunk length" })?;
    writer
        .write_all(&data)
        .context(WriteFieldSnafu { field: "chunk data" })?;

    Ok(())
}

fn write_ae_title(
    writer: &mut dyn Write,
    ae_title: &str,
    codec: &dyn TextCodec,
    field: &'static str,
) -> Result<()> {
    let mut bytes = codec.encode(ae_title).context(EncodeFieldSnafu { field })?;
    bytes.resize(16, b' ');
    writer.write_all(&bytes).context(WriteFieldSnafu { field })
}

/// Encode and write a single PDU to `writer`.
pub fn write_pdu<W>(writer: &mut W, pdu: &Pdu) -> Result<()>
where
    W: Write,
{
    let codec = DefaultCharacterSetCodec;
    match pdu {
        Pdu::AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        } => {
            writer
                .write_u8(0x01)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, "A-ASSOCIATE-RQ", |writer| {
                writer
                    .write_u16::<BigEndian>(*protocol_version)
                    .context(WriteFieldSnafu {
                        field: "Protocol-version",
                    })?;
                writer
                    .write_u16::<BigEndian>(0x00)
                    .context(WriteReservedSnafu { bytes: 2_u32 })?;
                write_ae_title(writer, called_ae_title, &codec, "Called-AE-title")?;
                write_ae_title(writer, calling_ae_title, &codec, "Calling-AE-title")?;
                writer
                    .write_all(&[0; 32])
                    .context(WriteReservedSnafu { bytes: 32_u32 })?;

                write_application_context(writer, application_context_name, &codec)?;
                for pc in presentation_contexts {
                    write_presentation_context_proposed(writer, pc, &codec)?;
                }
                write_user_variables(writer, user_variables, &codec)?;

                Ok(())
            })
        }
        Pdu::AssociationAC {
            protocol_version,
            application_context_name,
            presentation_contexts,
            user_variables,
        } => {
            writer
                .write_u8(0x02)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, "A-ASSOCIATE-AC", |writer| {
                writer
                    .write_u16::<BigEndian>(*protocol_version)
                    .context(WriteFieldSnafu {
                        field: "Protocol-version",
                    })?;
                writer
                    .write_u16::<BigEndian>(0x00)
                    .context(WriteReservedSnafu { bytes: 2_u32 })?;
                writer
                    .write_all(&[0; 16])
                    .context(WriteReservedSnafu { bytes: 16_u32 })?;
                writer
                    .write_all(&[0; 16])
                    .context(WriteReservedSnafu { bytes: 16_u32 })?;
                writer
                    .write_all(&[0; 32])
                    .context(WriteReservedSnafu { bytes: 32_u32 })?;

                write_application_context(writer, application_context_name, &codec)?;
                for pc in presentation_contexts {
                    write_presentation_context_result(writer, pc, &codec)?;
                }
                write_user_variables(writer, user_variables, &codec)?;

                Ok(())
            })
        }
        Pdu::AssociationRJ { result, source } => {
            writer
                .write_u8(0x03)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, "A-ASSOCIATE-RJ", |writer| {
                writer
                    .write_u8(0x00)
                    .context(WriteReservedSnafu { bytes: 1_u32 })?;

                writer
                    .write_u8(match result {
                        AssociationRJResult::Permanent => 0x01,
                        AssociationRJResult::Transient => 0x02,
                    })
                    .context(WriteFieldSnafu { field: "Result" })?;

                match source {
                    AssociationRJSource::ServiceUser(reason) => {
                        writer
                            .write_u8(0x01)
                            .context(WriteFieldSnafu { field: "Source" })?;
                        writer
                            .write_u8(match reason {
                                AssociationRJServiceUserReason::NoReasonGiven => 0x01,
                                AssociationRJServiceUserReason::ApplicationContextNameNotSupported => {
                                    0x02
                                }
                                AssociationRJServiceUserReason::CallingAETitleNotRecognized => 0x03,
                                AssociationRJServiceUserReason::CalledAETitleNotRecognized => 0x07,
                                AssociationRJServiceUserReason::Reserved(v) => *v,
                            })
                            .context(WriteFieldSnafu { field: "Reason/Diag." })?;
                    }
                    AssociationRJSource::ServiceProviderASCE(reason) => {
                        writer
                            .write_u8(0x02)
                            .context(WriteFieldSnafu { field: "Source" })?;
                        writer
                            .write_u8(match reason {
                                AssociationRJServiceProviderASCEReason::NoReasonGiven => 0x01,
                                AssociationRJServiceProviderASCEReason::ProtocolVersionNotSupported => {
                                    0x02
                                }
                            })
                            .context(WriteFieldSnafu { field: "Reason/Diag." })?;
                    }
                    AssociationRJSource::ServiceProviderPresentation(reason) => {
                        writer
                            .write_u8(0x03)
                            .context(WriteFieldSnafu { field: "Source" })?;
                        writer
                            .write_u8(match reason {
                                AssociationRJServiceProviderPresentationReason::TemporaryCongestion => {
                                    0x01
                                }
                                AssociationRJServiceProviderPresentationReason::LocalLimitExceeded => {
                                    0x02
                                }
                                AssociationRJServiceProviderPresentationReason::Reserved(v) => *v,
                            })
                            .context(WriteFieldSnafu { field: "Reason/Diag." })?;
                    }
                }

                Ok(())
            })
        }
        Pdu::PData { data } => {
            writer
                .write_u8(0x04)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, "PData", |writer| {
                for pdv in data {
                    write_chunk_u32(writer, "Presentation-data-value item", |writer| {
                        writer.push(pdv.presentation_context_id);

                        let mut header = 0x00;
                        if let PDataValueType::Command = pdv.value_type {
                            header |= 0x01;
                        }
                        if pdv.is_last {
                            header |= 0x02;
                        }
                        writer.push(header);
                        writer.extend(&pdv.data);

                        Ok(())
                    })?;
                }

                Ok(())
            })
        }
        Pdu::ReleaseRQ => {
            writer
                .write_u8(0x05)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u32(writer, "ReleaseRQ", |writer| {
                writer.extend([0u8; 4]);
                Ok(())
            })
        }
        Pdu::ReleaseRP => {
            writer
                .write_u8(0x06)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u32(writer, "ReleaseRP", |writer| {
                writer.extend([0u8; 4]);
                Ok(())
            })
        }
        Pdu::AbortRQ { source } => {
            writer
                .write_u8(0x07)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, "AbortRQ", |writer| {
                writer.push(0);
                writer.push(0);

                let source_word = match source {
                    AbortRQSource::ServiceUser => [0x00, 0x00],
                    AbortRQSource::Reserved => [0x01, 0x00],
                    AbortRQSource::ServiceProvider(reason) => [
                        0x02,
                        match reason {
                            AbortRQServiceProviderReason::ReasonNotSpecifiedUnrecognizedPDU => 0x00,
                            AbortRQServiceProviderReason::UnexpectedPDU => 0x01,
                            AbortRQServiceProviderReason::Reserved => 0x02,
                            AbortRQServiceProviderReason::UnrecognizedPDUParameter => 0x03,
                            AbortRQServiceProviderReason::UnexpectedPDUParameter => 0x04,
                            AbortRQServiceProviderReason::InvalidPDUParameter => 0x05,
                        },
                    ],
                };
                writer.extend(source_word);

                Ok(())
            })
        }
        Pdu::Unknown { pdu_type, data } => {
            writer
                .write_u8(*pdu_type)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u32(writer, "Unknown", |writer| {
                writer.extend(data);
                Ok(())
            })
        }
    }
}

fn write_application_context(
    writer: &mut dyn Write,
    application_context_name: &str,
    codec: &dyn TextCodec,
) -> Result<()> {
    writer
        .write_u8(0x10)
        .context(WriteFieldSnafu { field: "Item-type" })?;
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, "Application Context Item", |writer| {
        writer
            .write_all(&codec.encode(application_context_name).context(EncodeFieldSnafu {
                field: "Application-context-name",
            })?)
            .context(WriteFieldSnafu {
                field: "Application-context-name",
            })
    })
}

fn write_presentation_context_proposed(
    writer: &mut dyn Write,
    pc: &PresentationContextProposed,
    codec: &dyn TextCodec,
) -> Result<()> {
    writer
        .write_u8(0x20)
        .context(WriteFieldSnafu { field: "Item-type" })?;
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, "Presentation Context Item", |writer| {
        writer
            .write_u8(pc.id)
            .context(WriteFieldSnafu {
                field: "Presentation-context-ID",
            })?;
        writer
            .write_all(&[0; 3])
            .context(WriteReservedSnafu { bytes: 3_u32 })?;

        writer
            .write_u8(0x30)
            .context(WriteFieldSnafu { field: "Item-type" })?;
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;
        write_chunk_u16(writer, "Abstract Syntax Item", |writer| {
            writer
                .write_all(&codec.encode(&pc.abstract_syntax).context(EncodeFieldSnafu {
                    field: "Abstract-syntax-name",
                })?)
                .context(WriteFieldSnafu {
                    field: "Abstract-syntax-name",
                })
        })?;

        for ts in &pc.transfer_syntaxes {
            writer
                .write_u8(0x40)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, "Transfer Syntax Sub-Item", |writer| {
                writer
                    .write_all(&codec.encode(ts).context(EncodeFieldSnafu {
                        field: "Transfer-syntax-name",
                    })?)
                    .context(WriteFieldSnafu {
                        field: "Transfer-syntax-name",
                    })
            })?;
        }

        Ok(())
    })
}

fn write_presentation_context_result(
    writer: &mut dyn Write,
    pc: &PresentationContextResult,
    codec: &dyn TextCodec,
) -> Result<()> {
    writer
        .write_u8(0x21)
        .context(WriteFieldSnafu { field: "Item-type" })?;
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, "Presentation-context", |writer| {
        writer
            .write_u8(pc.id)
            .context(WriteFieldSnafu {
                field: "Presentation-context-ID",
            })?;
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;
        writer
            .write_u8(match pc.reason {
                PresentationContextResultReason::Acceptance => 0,
                PresentationContextResultReason::UserRejection => 1,
                PresentationContextResultReason::NoReason => 2,
                PresentationContextResultReason::AbstractSyntaxNotSupported => 3,
                PresentationContextResultReason::TransferSyntaxesNotSupported => 4,
            })
            .context(WriteFieldSnafu {
                field: "Result/Reason",
            })?;
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;

        writer
            .write_u8(0x40)
            .context(WriteFieldSnafu { field: "Item-type" })?;
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;
        write_chunk_u16(writer, "Transfer Syntax sub-item", |writer| {
            writer
                .write_all(&codec.encode(&pc.transfer_syntax).context(EncodeFieldSnafu {
                    field: "Transfer-syntax-name",
                })?)
                .context(WriteFieldSnafu {
                    field: "Transfer-syntax-name",
                })
        })?;

        Ok(())
    })
}

fn write_user_variables(
    writer: &mut dyn Write,
    user_variables: &[UserVariableItem],
    codec: &dyn TextCodec,
) -> Result<()> {
    if user_variables.is_empty() {
        return Ok(());
    }

    writer
        .write_u8(0x50)
        .context(WriteFieldSnafu { field: "Item-type" })?;
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, "User-data", |writer| {
        for var in user_variables {
            write_user_variable(writer, var, codec)?;
        }
        Ok(())
    })
}

fn write_user_variable(
    writer: &mut dyn Write,
    var: &UserVariableItem,
    codec: &dyn TextCodec,
) -> Result<()> {
    match var {
        UserVariableItem::MaxLength(max_length) => {
            writer
                .write_u8(0x51)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, "Maximum-length-received", |writer| {
                writer
                    .write_u32::<BigEndian>(*max_length)
                    .context(WriteFieldSnafu {
                        field: "Maximum-length-received",
                    })
            })
        }
        UserVariableItem::ImplementationClassUID(uid) => {
            writer
                .write_u8(0x52)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, "Implementation-class-uid", |writer| {
                writer
                    .write_all(&codec.encode(uid).context(EncodeFieldSnafu {
                        field: "Implementation-class-uid",
                    })?)
                    .context(WriteFieldSnafu {
                        field: "Implementation-class-uid",
                    })
            })
        }
        UserVariableItem::ImplementationVersionName(name) => {
            writer
                .write_u8(0x55)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, "Implementation-version-name", |writer| {
                writer
                    .write_all(&codec.encode(name).context(EncodeFieldSnafu {
                        field: "Implementation-version-name",
                    })?)
                    .context(WriteFieldSnafu {
                        field: "Implementation-version-name",
                    })
            })
        }
        UserVariableItem::AsyncOpsWindow(window) => {
            writer
                .write_u8(0x53)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, "Asynchronous-operations-window", |writer| {
                writer
                    .write_u16::<BigEndian>(window.max_operations_invoked)
                    .context(WriteFieldSnafu {
                        field: "Maximum-number-operations-invoked",
                    })?;
                writer
                    .write_u16::<BigEndian>(window.max_operations_performed)
                    .context(WriteFieldSnafu {
                        field: "Maximum-number-operations-performed",
                    })
            })
        }
        UserVariableItem::RoleSelection(role) => {
            writer
                .write_u8(0x54)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, "SCP/SCU-role-selection", |writer| {
                write_chunk_u16(writer, "SOP-class-uid", |writer| {
                    writer
                        .write_all(&codec.encode(&role.abstract_syntax).context(EncodeFieldSnafu {
                            field: "SOP-class-uid",
                        })?)
                        .context(WriteFieldSnafu {
                            field: "SOP-class-uid",
                        })
                })?;
                writer
                    .write_u8(role.scu_role as u8)
                    .context(WriteFieldSnafu { field: "SCU-role" })?;
                writer
                    .write_u8(role.scp_role as u8)
                    .context(WriteFieldSnafu { field: "SCP-role" })
            })
        }
        UserVariableItem::SopClassExtendedNegotiation(item) => {
            writer
                .write_u8(0x56)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, "Sub-item", |writer| {
                write_chunk_u16(writer, "SOP-class-uid", |writer| {
                    writer
                        .write_all(&codec.encode(&item.sop_class_uid).context(EncodeFieldSnafu {
                            field: "SOP-class-uid",
                        })?)
                        .context(WriteFieldSnafu {
                            field: "SOP-class-uid",
                        })
                })?;
                write_chunk_u16(writer, "Service-class-application-information", |writer| {
                    writer
                        .write_all(&item.service_class_application_information)
                        .context(WriteFieldSnafu {
                            field: "Service-class-application-information",
                        })
                })
            })
        }
        UserVariableItem::SopClassCommonExtendedNegotiation(item) => {
            writer
                .write_u8(0x57)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, "SOP-class-common-extended-negotiation", |writer| {
                write_chunk_u16(writer, "SOP-class-uid", |writer| {
                    writer
                        .write_all(&codec.encode(&item.sop_class_uid).context(EncodeFieldSnafu {
                            field: "SOP-class-uid",
                        })?)
                        .context(WriteFieldSnafu {
                            field: "SOP-class-uid",
                        })
                })?;
                write_chunk_u16(writer, "Service-class-uid", |writer| {
                    writer
                        .write_all(&codec.encode(&item.service_class_uid).context(EncodeFieldSnafu {
                            field: "Service-class-uid",
                        })?)
                        .context(WriteFieldSnafu {
                            field: "Service-class-uid",
                        })
                })?;
                write_chunk_u16(writer, "Related-general-SOP-class-identification", |writer| {
                    for related in &item.related_general_sop_classes {
                        write_chunk_u16(writer, "Related-general-SOP-class-uid", |writer| {
                            writer
                                .write_all(&codec.encode(related).context(EncodeFieldSnafu {
                                    field: "Related-general-SOP-class-uid",
                                })?)
                                .context(WriteFieldSnafu {
                                    field: "Related-general-SOP-class-uid",
                                })
                        })?;
                    }
                    Ok(())
                })
            })
        }
        UserVariableItem::UserIdentity(identity) => {
            writer
                .write_u8(0x58)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u16(writer, "Item-length", |writer| {
                let (id_type, positive_response_requested, primary, secondary): (
                    u8,
                    bool,
                    Vec<u8>,
                    Vec<u8>,
                ) = match identity {
                    UserIdentity::Username {
                        username,
                        positive_response_requested,
                    } => (1, *positive_response_requested, username.clone().into_bytes(), vec![]),
                    UserIdentity::UsernamePassword {
                        username,
                        password,
                        positive_response_requested,
                    } => (
                        2,
                        *positive_response_requested,
                        username.clone().into_bytes(),
                        password.clone().into_bytes(),
                    ),
                    UserIdentity::Kerberos {
                        ticket,
                        positive_response_requested,
                    } => (3, *positive_response_requested, ticket.clone(), vec![]),
                    UserIdentity::Saml {
                        assertion,
                        positive_response_requested,
                    } => (4, *positive_response_requested, assertion.clone(), vec![]),
                    UserIdentity::Jwt {
                        token,
                        positive_response_requested,
                    } => (5, *positive_response_requested, token.clone(), vec![]),
                };

                writer
                    .write_u8(id_type)
                    .context(WriteFieldSnafu {
                        field: "User-Identity-type",
                    })?;
                writer
                    .write_u8(positive_response_requested as u8)
                    .context(WriteFieldSnafu {
                        field: "Positive-response-requested",
                    })?;
                write_chunk_u16(writer, "Primary-field", |writer| {
                    writer.write_all(&primary).context(WriteFieldSnafu {
                        field: "Primary-field",
                    })
                })?;
                write_chunk_u16(writer, "Secondary-field", |writer| {
                    writer.write_all(&secondary).context(WriteFieldSnafu {
                        field: "Secondary-field",
                    })
                })
            })
        }
        UserVariableItem::UserIdentityResponse(response) => {
            writer
                .write_u8(0x59)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, "User-Identity-response", |writer| {
                write_chunk_u16(writer, "Server-response", |writer| {
                    writer
                        .write_all(&response.server_response)
                        .context(WriteFieldSnafu {
                            field: "Server-response",
                        })
                })
            })
        }
        UserVariableItem::Unknown(item_type, data) => {
            writer
                .write_u8(*item_type)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, "Unknown", |writer| {
                writer.write_all(data).context(WriteFieldSnafu {
                    field: "Unknown Data",
                })
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_write_chunks_with_preceding_u32_length() -> Result<()> {
        let mut bytes = vec![0u8; 0];
        write_chunk_u32(&mut bytes, "Chunk1", |writer| {
            writer
                .write_u8(0x02)
                .context(WriteFieldSnafu { field: "Field1" })?;
            write_chunk_u32(writer, "Chunk2", |writer| {
                writer
                    .write_u8(0x03)
                    .context(WriteFieldSnafu { field: "Field2" })?;
                Ok(())
            })
        })?;

        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes, &[0, 0, 0, 6, 2, 0, 0, 0, 1, 3]);

        Ok(())
    }

    #[test]
    fn can_write_chunks_with_preceding_u16_length() -> Result<()> {
        let mut bytes = vec![0u8; 0];
        write_chunk_u16(&mut bytes, "Chunk1", |writer| {
            writer
                .write_u8(0x02)
                .context(WriteFieldSnafu { field: "Field1" })?;
            write_chunk_u16(writer, "Chunk2", |writer| {
                writer
                    .write_u8(0x03)
                    .context(WriteFieldSnafu { field: "Field2" })?;
                Ok(())
            })
        })?;

        assert_eq!(bytes.len(), 6);
        assert_eq!(bytes, &[0, 4, 2, 0, 1, 3]);

        Ok(())
    }

    #[test]
    fn write_abort_rq() {
        let mut out = vec![];

        let pdu = Pdu::AbortRQ {
            source: AbortRQSource::ServiceUser,
        };
        write_pdu(&mut out, &pdu).unwrap();
        assert_eq!(
            &out,
            &[
                0x07, 0x00, //
                0x00, 0x00, 0x00, 0x04, //
                0x00, 0x00, 0x00, 0x00,
            ]
        );
        out.clear();

        let pdu = Pdu::AbortRQ {
            source: AbortRQSource::Reserved,
        };
        write_pdu(&mut out, &pdu).unwrap();
        assert_eq!(
            &out,
            &[
                0x07, 0x00, //
                0x00, 0x00, 0x00, 0x04, //
                0x00, 0x00, 0x01, 0x00,
            ]
        );
        out.clear();

        let pdu = Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(AbortRQServiceProviderReason::InvalidPDUParameter),
        };
        write_pdu(&mut out, &pdu).unwrap();
        assert_eq!(
            &out,
            &[
                0x07, 0x00, //
                0x00, 0x00, 0x00, 0x04, //
                0x00, 0x00, //
                0x02, 0x05,
            ]
        );
    }
}
