//! PDU reader module
use crate::pdu::*;
use byteordered::byteorder::{BigEndian, ReadBytesExt};
use dicom_encoding::text::{DefaultCharacterSetCodec, TextCodec};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Invalid max PDU length {}", max_pdu_length))]
    InvalidMaxPdu {
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("No PDU available"))]
    NoPduAvailable { backtrace: Backtrace },

    #[snafu(display("Could not read PDU"))]
    ReadPdu {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not read PDU item"))]
    ReadPduItem {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not read PDU field `{}`", field))]
    ReadPduField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Invalid item length {} (must be >=2)", length))]
    InvalidItemLength { length: u32 },

    #[snafu(display("Could not read {} reserved bytes", bytes))]
    ReadReserved {
        bytes: u32,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "Incoming pdu was too large: length {}, maximum is {}",
        pdu_length,
        max_pdu_length
    ))]
    PduTooLarge {
        pdu_length: u32,
        max_pdu_length: u32,
        backtrace: Backtrace,
    },
    #[snafu(display("PDU contained an invalid value {:?}", var_item))]
    InvalidPduVariable {
        var_item: PduVariableItem,
        backtrace: Backtrace,
    },
    #[snafu(display("Multiple transfer syntaxes were accepted"))]
    MultipleTransferSyntaxesAccepted { backtrace: Backtrace },
    #[snafu(display("Invalid reject source or reason"))]
    InvalidRejectSourceOrReason { backtrace: Backtrace },
    #[snafu(display("Invalid abort service provider"))]
    InvalidAbortSourceOrReason { backtrace: Backtrace },
    #[snafu(display("Invalid presentation context result reason"))]
    InvalidPresentationContextResultReason { backtrace: Backtrace },
    #[snafu(display("invalid transfer syntax sub-item"))]
    InvalidTransferSyntaxSubItem { backtrace: Backtrace },
    #[snafu(display("unknown presentation context sub-item"))]
    UnknownPresentationContextSubItem { backtrace: Backtrace },
    #[snafu(display("Could not decode text field `{}`", field))]
    DecodeText {
        field: &'static str,
        #[snafu(backtrace)]
        source: dicom_encoding::text::DecodeTextError,
    },
    #[snafu(display("Missing application context name"))]
    MissingApplicationContextName { backtrace: Backtrace },
    #[snafu(display("Missing abstract syntax"))]
    MissingAbstractSyntax { backtrace: Backtrace },
    #[snafu(display("Missing transfer syntax"))]
    MissingTransferSyntax { backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Read a full PDU from `reader`.
///
/// PDUs announcing a length greater than `max_pdu_length` are rejected
/// with [`Error::PduTooLarge`] rather than read into memory.
pub fn read_pdu<R>(reader: &mut R, max_pdu_length: u32) -> Result<Pdu>
where
    R: Read,
{
    ensure!(
        (MINIMUM_PDU_SIZE..=MAXIMUM_PDU_SIZE).contains(&max_pdu_length),
        InvalidMaxPduSnafu { max_pdu_length }
    );

    // If we can't read 2 bytes here, there is no PDU available. This
    // method can block and wake up when the stream is closed, so we only
    // report NoPduAvailable if we have not yet begun reading a message.
    let mut bytes = [0; 2];
    if let Err(e) = reader.read_exact(&mut bytes) {
        ensure!(e.kind() != ErrorKind::UnexpectedEof, NoPduAvailableSnafu);
        return Err(e).context(ReadPduFieldSnafu { field: "type" });
    }

    let pdu_type = bytes[0];
    let pdu_length = reader
        .read_u32::<BigEndian>()
        .context(ReadPduFieldSnafu { field: "length" })?;

    ensure!(
        pdu_length <= max_pdu_length,
        PduTooLargeSnafu {
            pdu_length,
            max_pdu_length
        }
    );

    let bytes = read_n(reader, pdu_length as usize).context(ReadPduSnafu)?;
    let mut cursor = Cursor::new(bytes);
    let codec = DefaultCharacterSetCodec;

    match pdu_type {
        0x01 => {
            let mut application_context_name: Option<String> = None;
            let mut presentation_contexts = vec![];
            let mut user_variables = vec![];

            let protocol_version = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                field: "Protocol-version",
            })?;

            cursor
                .read_u16::<BigEndian>()
                .context(ReadReservedSnafu { bytes: 2_u32 })?;

            let called_ae_title = read_ae_title(&mut cursor, &codec, "Called-AE-title")?;
            let calling_ae_title = read_ae_title(&mut cursor, &codec, "Calling-AE-title")?;

            cursor
                .seek(SeekFrom::Current(32))
                .context(ReadReservedSnafu { bytes: 32_u32 })?;

            while cursor.position() < cursor.get_ref().len() as u64 {
                match read_pdu_variable(&mut cursor, &codec)? {
                    PduVariableItem::ApplicationContext(val) => {
                        application_context_name = Some(val);
                    }
                    PduVariableItem::PresentationContextProposed(val) => {
                        presentation_contexts.push(val);
                    }
                    PduVariableItem::UserVariables(val) => {
                        user_variables = val;
                    }
                    var_item => {
                        return InvalidPduVariableSnafu { var_item }.fail();
                    }
                }
            }

            Ok(Pdu::AssociationRQ {
                protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name: application_context_name
                    .context(MissingApplicationContextNameSnafu)?,
                presentation_contexts,
                user_variables,
            })
        }
        0x02 => {
            let mut application_context_name: Option<String> = None;
            let mut presentation_contexts = vec![];
            let mut user_variables = vec![];

            let protocol_version = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                field: "Protocol-version",
            })?;

            cursor
                .read_u16::<BigEndian>()
                .context(ReadReservedSnafu { bytes: 2_u32 })?;

            // Reserved fields echoing the called/calling AE titles; not tested on receipt.
            cursor
                .seek(SeekFrom::Current(16))
                .context(ReadReservedSnafu { bytes: 16_u32 })?;
            cursor
                .seek(SeekFrom::Current(16))
                .context(ReadReservedSnafu { bytes: 16_u32 })?;
            cursor
                .seek(SeekFrom::Current(32))
                .context(ReadReservedSnafu { bytes: 32_u32 })?;

            while cursor.position() < cursor.get_ref().len() as u64 {
                match read_pdu_variable(&mut cursor, &codec)? {
                    PduVariableItem::ApplicationContext(val) => {
                        application_context_name = Some(val);
                    }
                    PduVariableItem::PresentationContextResult(val) => {
                        presentation_contexts.push(val);
                    }
                    PduVariableItem::UserVariables(val) => {
                        user_variables = val;
                    }
                    var_item => {
                        return InvalidPduVariableSnafu { var_item }.fail();
                    }
                }
            }

            Ok(Pdu::AssociationAC {
                protocol_version,
                application_context_name: application_context_name
                    .context(MissingApplicationContextNameSnafu)?,
                presentation_contexts,
                user_variables,
            })
        }
        0x03 => {
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            let result = cursor
                .read_u8()
                .context(ReadPduFieldSnafu { field: "Result" })?;
            let source = cursor
                .read_u8()
                .context(ReadPduFieldSnafu { field: "Source" })?;
            let reason = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Reason/Diag.",
            })?;

            let result = match result {
                1 => AssociationRJResult::Permanent,
                2 => AssociationRJResult::Transient,
                _ => return InvalidRejectSourceOrReasonSnafu.fail(),
            };

            let source = match (source, reason) {
                (1, 1) => {
                    AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::NoReasonGiven)
                }
                (1, 2) => AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
                ),
                (1, 3) => AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::CallingAETitleNotRecognized,
                ),
                (1, 7) => AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::CalledAETitleNotRecognized,
                ),
                (1, other) => {
                    AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::Reserved(
                        other,
                    ))
                }
                (2, 1) => AssociationRJSource::ServiceProviderASCE(
                    AssociationRJServiceProviderASCEReason::NoReasonGiven,
                ),
                (2, 2) => AssociationRJSource::ServiceProviderASCE(
                    AssociationRJServiceProviderASCEReason::ProtocolVersionNotSupported,
                ),
                (3, 1) => AssociationRJSource::ServiceProviderPresentation(
                    AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
                ),
                (3, 2) => AssociationRJSource::ServiceProviderPresentation(
                    AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
                ),
                (3, other) => AssociationRJSource::ServiceProviderPresentation(
                    AssociationRJServiceProviderPresentationReason::Reserved(other),
                ),
                _ => return InvalidRejectSourceOrReasonSnafu.fail(),
            };

            Ok(Pdu::AssociationRJ { result, source })
        }
        0x04 => {
            let mut values = vec![];
            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_length = cursor.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-Length",
                })?;

                ensure!(
                    item_length >= 2,
                    InvalidItemLengthSnafu {
                        length: item_length
                    }
                );

                let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Presentation-context-ID",
                })?;

                let header = cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Message Control Header",
                })?;

                let value_type = if header & 0x01 > 0 {
                    PDataValueType::Command
                } else {
                    PDataValueType::Data
                };
                let is_last = (header & 0x02) > 0;

                let data =
                    read_n(&mut cursor, (item_length - 2) as usize).context(ReadPduFieldSnafu {
                        field: "Presentation-data-value",
                    })?;

                values.push(PDataValue {
                    presentation_context_id,
                    value_type,
                    is_last,
                    data,
                })
            }

            Ok(Pdu::PData { data: values })
        }
        0x05 => {
            cursor
                .seek(SeekFrom::Current(4))
                .context(ReadReservedSnafu { bytes: 4_u32 })?;
            Ok(Pdu::ReleaseRQ)
        }
        0x06 => {
            cursor
                .seek(SeekFrom::Current(4))
                .context(ReadReservedSnafu { bytes: 4_u32 })?;
            Ok(Pdu::ReleaseRP)
        }
        0x07 => {
            let mut buf = [0u8; 2];
            cursor
                .read_exact(&mut buf)
                .context(ReadReservedSnafu { bytes: 2_u32 })?;

            let source = cursor
                .read_u8()
                .context(ReadPduFieldSnafu { field: "Source" })?;
            let reason = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Reason/Diag",
            })?;

            let source = match source {
                0 => AbortRQSource::ServiceUser,
                2 => AbortRQSource::ServiceProvider(match reason {
                    0 => AbortRQServiceProviderReason::ReasonNotSpecifiedUnrecognizedPDU,
                    1 => AbortRQServiceProviderReason::UnexpectedPDU,
                    2 => AbortRQServiceProviderReason::Reserved,
                    3 => AbortRQServiceProviderReason::UnrecognizedPDUParameter,
                    4 => AbortRQServiceProviderReason::UnexpectedPDUParameter,
                    5 => AbortRQServiceProviderReason::InvalidPDUParameter,
                    _ => return InvalidAbortSourceOrReasonSnafu.fail(),
                }),
                _ => AbortRQSource::Reserved,
            };

            Ok(Pdu::AbortRQ { source })
        }
        _ => {
            let data = cursor.into_inner();
            Ok(Pdu::Unknown { pdu_type, data })
        }
    }
}

fn read_n<R>(reader: &mut R, bytes_to_read: usize) -> std::io::Result<Vec<u8>>
where
    R: Read,
{
    let mut result = Vec::new();
    reader.take(bytes_to_read as u64).read_to_end(&mut result)?;
    Ok(result)
}

fn read_ae_title<R: Read>(
    cursor: &mut R,
    codec: &dyn TextCodec,
    field: &'static str,
) -> Result<String> {
    let mut ae_bytes = [0; 16];
    cursor
        .read_exact(&mut ae_bytes)
        .context(ReadPduFieldSnafu { field })?;
    Ok(codec
        .decode(&ae_bytes)
        .context(DecodeTextSnafu { field })?
        .trim()
        .to_string())
}

fn read_pdu_variable<R>(reader: &mut R, codec: &dyn TextCodec) -> Result<PduVariableItem>
where
    R: Read,
{
    let item_type = reader
        .read_u8()
        .context(ReadPduFieldSnafu { field: "Item-type" })?;

    reader
        .read_u8()
        .context(ReadReservedSnafu { bytes: 1_u32 })?;

    let item_length = reader.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Item-length",
    })?;

    let bytes = read_n(reader, item_length as usize).context(ReadPduItemSnafu)?;
    let mut cursor = Cursor::new(bytes);

    match item_type {
        0x10 => {
            let val = codec
                .decode(&cursor.into_inner())
                .context(DecodeTextSnafu {
                    field: "Application-context-name",
                })?
                .trim_end_matches('\0')
                .to_string();
            Ok(PduVariableItem::ApplicationContext(val))
        }
        0x20 => {
            let mut abstract_syntax: Option<String> = None;
            let mut transfer_syntaxes = vec![];

            let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor
                    .read_u8()
                    .context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x30 => {
                        abstract_syntax = Some(
                            codec
                                .decode(&read_n(&mut cursor, item_length as usize).context(
                                    ReadPduFieldSnafu {
                                        field: "Abstract-syntax-name",
                                    },
                                )?)
                                .context(DecodeTextSnafu {
                                    field: "Abstract-syntax-name",
                                })?
                                .trim()
                                .to_string(),
                        );
                    }
                    0x40 => {
                        transfer_syntaxes.push(
                            codec
                                .decode(&read_n(&mut cursor, item_length as usize).context(
                                    ReadPduFieldSnafu {
                                        field: "Transfer-syntax-name",
                                    },
                                )?)
                                .context(DecodeTextSnafu {
                                    field: "Transfer-syntax-name",
                                })?
                                .trim()
                                .to_string(),
                        );
                    }
                    _ => return UnknownPresentationContextSubItemSnafu.fail(),
                }
            }

            Ok(PduVariableItem::PresentationContextProposed(
                PresentationContextProposed {
                    id: presentation_context_id,
                    abstract_syntax: abstract_syntax.context(MissingAbstractSyntaxSnafu)?,
                    transfer_syntaxes,
                },
            ))
        }
        0x21 => {
            let mut transfer_syntax: Option<String> = None;

            let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            let reason = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Result/Reason",
            })?;
            let reason = match reason {
                0 => PresentationContextResultReason::Acceptance,
                1 => PresentationContextResultReason::UserRejection,
                2 => PresentationContextResultReason::NoReason,
                3 => PresentationContextResultReason::AbstractSyntaxNotSupported,
                4 => PresentationContextResultReason::TransferSyntaxesNotSupported,
                _ => return InvalidPresentationContextResultReasonSnafu.fail(),
            };

            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor
                    .read_u8()
                    .context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x40 => match transfer_syntax {
                        Some(_) => return MultipleTransferSyntaxesAcceptedSnafu.fail(),
                        None => {
                            transfer_syntax = Some(
                                codec
                                    .decode(&read_n(&mut cursor, item_length as usize).context(
                                        ReadPduFieldSnafu {
                                            field: "Transfer-syntax-name",
                                        },
                                    )?)
                                    .context(DecodeTextSnafu {
                                        field: "Transfer-syntax-name",
                                    })?
                                    .trim()
                                    .to_string(),
                            );
                        }
                    },
                    _ => return InvalidTransferSyntaxSubItemSnafu.fail(),
                }
            }

            Ok(PduVariableItem::PresentationContextResult(
                PresentationContextResult {
                    id: presentation_context_id,
                    reason,
                    transfer_syntax: transfer_syntax.context(MissingTransferSyntaxSnafu)?,
                },
            ))
        }
        0x50 => {
            let mut user_variables = vec![];

            while cursor.position() < cursor.get_ref().len() as u64 {
                user_variables.push(read_user_variable(&mut cursor, codec)?);
            }

            Ok(PduVariableItem::UserVariables(user_variables))
        }
        other => Ok(PduVariableItem::Unknown(other)),
    }
}

fn read_user_variable<R>(cursor: &mut R, codec: &dyn TextCodec) -> Result<UserVariableItem>
where
    R: Read,
{
    let item_type = cursor
        .read_u8()
        .context(ReadPduFieldSnafu { field: "Item-type" })?;
    cursor
        .read_u8()
        .context(ReadReservedSnafu { bytes: 1_u32 })?;
    let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Item-length",
    })?;

    let bytes = read_n(cursor, item_length as usize).context(ReadPduItemSnafu)?;
    let mut body = Cursor::new(bytes);

    match item_type {
        0x51 => Ok(UserVariableItem::MaxLength(
            body.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                field: "Maximum-length-received",
            })?,
        )),
        0x52 => Ok(UserVariableItem::ImplementationClassUID(
            decode_all(&mut body, codec, "Implementation-class-uid")?,
        )),
        0x55 => Ok(UserVariableItem::ImplementationVersionName(decode_all(
            &mut body,
            codec,
            "Implementation-version-name",
        )?)),
        0x53 => {
            let max_operations_invoked =
                body.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Maximum-number-operations-invoked",
                })?;
            let max_operations_performed =
                body.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Maximum-number-operations-performed",
                })?;
            Ok(UserVariableItem::AsyncOpsWindow(AsyncOpsWindow {
                max_operations_invoked,
                max_operations_performed,
            }))
        }
        0x54 => {
            let length = body.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                field: "SOP-class-uid-length",
            })? as usize;
            let abstract_syntax = codec
                .decode(&read_n(&mut body, length).context(ReadPduFieldSnafu {
                    field: "SOP-class-uid",
                })?)
                .context(DecodeTextSnafu {
                    field: "SOP-class-uid",
                })?
                .trim()
                .to_string();
            let scu_role = body
                .read_u8()
                .context(ReadPduFieldSnafu { field: "SCU-role" })?
                != 0;
            let scp_role = body
                .read_u8()
                .context(ReadPduFieldSnafu { field: "SCP-role" })?
                != 0;
            Ok(UserVariableItem::RoleSelection(RoleSelection {
                abstract_syntax,
                scu_role,
                scp_role,
            }))
        }
        0x56 => {
            let sop_class_uid_length =
                body.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "SOP-class-uid-length",
                })?;
            let sop_class_uid = codec
                .decode(&read_n(&mut body, sop_class_uid_length as usize).context(
                    ReadPduFieldSnafu {
                        field: "SOP-class-uid",
                    },
                )?)
                .context(DecodeTextSnafu {
                    field: "SOP-class-uid",
                })?
                .trim()
                .to_string();
            let data_length = body.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                field: "Service-class-application-information-length",
            })?;
            let data = read_n(&mut body, data_length as usize).context(ReadPduFieldSnafu {
                field: "Service-class-application-information",
            })?;
            Ok(UserVariableItem::SopClassExtendedNegotiation(
                SopClassExtendedNegotiation {
                    sop_class_uid,
                    service_class_application_information: data,
                },
            ))
        }
        0x57 => {
            let sop_class_uid = decode_length_prefixed(&mut body, codec, "SOP-class-uid")?;
            let service_class_uid =
                decode_length_prefixed(&mut body, codec, "Service-class-uid")?;
            let related_length = body.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                field: "Related-general-SOP-classes-length",
            })? as usize;
            let related_bytes = read_n(&mut body, related_length).context(ReadPduFieldSnafu {
                field: "Related-general-SOP-classes",
            })?;
            let mut related_cursor = Cursor::new(related_bytes);
            let mut related_general_sop_classes = vec![];
            while related_cursor.position() < related_cursor.get_ref().len() as u64 {
                related_general_sop_classes.push(decode_length_prefixed(
                    &mut related_cursor,
                    codec,
                    "Related-general-SOP-class-uid",
                )?);
            }
            Ok(UserVariableItem::SopClassCommonExtendedNegotiation(
                SopClassCommonExtendedNegotiation {
                    sop_class_uid,
                    service_class_uid,
                    related_general_sop_classes,
                },
            ))
        }
        0x58 => {
            let user_identity_type = body.read_u8().context(ReadPduFieldSnafu {
                field: "User-Identity-type",
            })?;
            let positive_response_requested = body.read_u8().context(ReadPduFieldSnafu {
                field: "User-Identity-positive-response-requested",
            })? == 1;
            let primary_field_length =
                body.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "User-Identity-primary-field-length",
                })?;
            let primary_field = read_n(&mut body, primary_field_length as usize).context(
                ReadPduFieldSnafu {
                    field: "User-Identity-primary-field",
                },
            )?;
            let secondary_field_length =
                body.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "User-Identity-secondary-field-length",
                })?;
            let secondary_field = read_n(&mut body, secondary_field_length as usize).context(
                ReadPduFieldSnafu {
                    field: "User-Identity-secondary-field",
                },
            )?;

            let identity = match user_identity_type {
                1 => UserIdentity::Username {
                    username: String::from_utf8_lossy(&primary_field).into_owned(),
                    positive_response_requested,
                },
                2 => UserIdentity::UsernamePassword {
                    username: String::from_utf8_lossy(&primary_field).into_owned(),
                    password: String::from_utf8_lossy(&secondary_field).into_owned(),
                    positive_response_requested,
                },
                3 => UserIdentity::Kerberos {
                    ticket: primary_field,
                    positive_response_requested,
                },
                4 => UserIdentity::Saml {
                    assertion: primary_field,
                    positive_response_requested,
                },
                5 => UserIdentity::Jwt {
                    token: primary_field,
                    positive_response_requested,
                },
                other => {
                    tracing::warn!("Unknown User Identity Type code {}", other);
                    return Ok(UserVariableItem::Unknown(item_type, body.into_inner()));
                }
            };

            Ok(UserVariableItem::UserIdentity(identity))
        }
        0x59 => {
            let response_length = body.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                field: "Server-response-length",
            })?;
            let server_response = read_n(&mut body, response_length as usize).context(
                ReadPduFieldSnafu {
                    field: "Server-response",
                },
            )?;
            Ok(UserVariableItem::UserIdentityResponse(
                UserIdentityResponse { server_response },
            ))
        }
        other => Ok(UserVariableItem::Unknown(other, body.into_inner())),
    }
}

fn decode_all<R: Read>(
    reader: &mut R,
    codec: &dyn TextCodec,
    field: &'static str,
) -> Result<String> {
    let mut bytes = vec![];
    reader.read_to_end(&mut bytes).context(ReadPduFieldSnafu { field })?;
    Ok(codec
        .decode(&bytes)
        .context(DecodeTextSnafu { field })?
        .trim()
        .to_string())
}

fn decode_length_prefixed<R: Read>(
    reader: &mut R,
    codec: &dyn TextCodec,
    field: &'static str,
) -> Result<String> {
    let length = reader
        .read_u16::<BigEndian>()
        .context(ReadPduFieldSnafu { field })? as usize;
    let bytes = read_n(reader, length).context(ReadPduFieldSnafu { field })?;
    Ok(codec
        .decode(&bytes)
        .context(DecodeTextSnafu { field })?
        .trim()
        .to_string())
}
