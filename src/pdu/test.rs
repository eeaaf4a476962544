use crate::pdu::reader::read_pdu;
use crate::pdu::writer::write_pdu;
use crate::pdu::*;
use std::error::Error;
use std::io::Cursor;

type TestResult = std::result::Result<(), Box<dyn Error>>;

#[test]
fn can_read_write_associate_rq() -> TestResult {
    let association_rq = Pdu::AssociationRQ {
        protocol_version: 2,
        calling_ae_title: "calling ae".to_string(),
        called_ae_title: "called ae".to_string(),
        application_context_name: "application context name".to_string(),
        presentation_contexts: vec![
            PresentationContextProposed {
                id: 1,
                abstract_syntax: "abstract 1".to_string(),
                transfer_syntaxes: vec!["transfer 1".to_string(), "transfer 2".to_string()],
            },
            PresentationContextProposed {
                id: 3,
                abstract_syntax: "abstract 2".to_string(),
                transfer_syntaxes: vec!["transfer 3".to_string(), "transfer 4".to_string()],
            },
        ],
        user_variables: vec![
            UserVariableItem::ImplementationClassUID("class uid".to_string()),
            UserVariableItem::ImplementationVersionName("version name".to_string()),
            UserVariableItem::MaxLength(23),
        ],
    };

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &association_rq)?;

    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?;

    if let Pdu::AssociationRQ {
        protocol_version,
        calling_ae_title,
        called_ae_title,
        application_context_name,
        presentation_contexts,
        user_variables,
    } = result
    {
        assert_eq!(protocol_version, 2);
        assert_eq!(calling_ae_title, "calling ae");
        assert_eq!(called_ae_title, "called ae");
        assert_eq!(application_context_name, "application context name");
        assert_eq!(presentation_contexts.len(), 2);
        assert_eq!(presentation_contexts[0].abstract_syntax, "abstract 1");
        assert_eq!(presentation_contexts[0].transfer_syntaxes.len(), 2);
        assert_eq!(presentation_contexts[0].transfer_syntaxes[0], "transfer 1");
        assert_eq!(presentation_contexts[0].transfer_syntaxes[1], "transfer 2");
        assert_eq!(presentation_contexts[1].abstract_syntax, "abstract 2");
        assert_eq!(presentation_contexts[1].transfer_syntaxes.len(), 2);
        assert_eq!(presentation_contexts[1].transfer_syntaxes[0], "transfer 3");
        assert_eq!(presentation_contexts[1].transfer_syntaxes[1], "transfer 4");
        assert_eq!(user_variables.len(), 3);
        assert!(matches!(
            user_variables[0],
            UserVariableItem::ImplementationClassUID(_)
        ));
        assert!(matches!(
            user_variables[1],
            UserVariableItem::ImplementationVersionName(_)
        ));
        assert!(matches!(user_variables[2], UserVariableItem::MaxLength(_)));
    } else {
        panic!("expected Pdu::AssociationRQ");
    }

    Ok(())
}

#[test]
fn can_read_write_associate_ac() -> TestResult {
    let association_ac = Pdu::AssociationAC {
        protocol_version: 1,
        application_context_name: "application context name".to_string(),
        presentation_contexts: vec![PresentationContextResult {
            id: 1,
            reason: PresentationContextResultReason::Acceptance,
            transfer_syntax: "transfer 1".to_string(),
        }],
        user_variables: vec![
            UserVariableItem::MaxLength(16_384),
            UserVariableItem::AsyncOpsWindow(AsyncOpsWindow {
                max_operations_invoked: 1,
                max_operations_performed: 1,
            }),
        ],
    };

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &association_ac)?;

    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?;

    if let Pdu::AssociationAC {
        protocol_version,
        application_context_name,
        presentation_contexts,
        user_variables,
    } = result
    {
        assert_eq!(protocol_version, 1);
        assert_eq!(application_context_name, "application context name");
        assert_eq!(presentation_contexts.len(), 1);
        assert_eq!(presentation_contexts[0].transfer_syntax, "transfer 1");
        assert_eq!(user_variables.len(), 2);
    } else {
        panic!("expected Pdu::AssociationAC");
    }

    Ok(())
}

#[test]
fn can_read_write_associate_rj() -> TestResult {
    let rj = Pdu::AssociationRJ {
        result: AssociationRJResult::Permanent,
        source: AssociationRJSource::ServiceUser(
            AssociationRJServiceUserReason::CalledAETitleNotRecognized,
        ),
    };

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &rj)?;
    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?;

    assert_eq!(result, rj);

    Ok(())
}

#[test]
fn can_read_write_pdata() -> TestResult {
    let pdata_rq = Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id: 3,
            value_type: PDataValueType::Command,
            is_last: true,
            data: vec![0, 0, 0, 0],
        }],
    };

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &pdata_rq)?;

    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?;

    if let Pdu::PData { data } = result {
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].presentation_context_id, 3);
        assert!(matches!(data[0].value_type, PDataValueType::Command));
        assert!(data[0].is_last);
        assert_eq!(data[0].data, vec![0, 0, 0, 0]);
    } else {
        panic!("expected Pdu::PData");
    }

    Ok(())
}

#[test]
fn can_read_write_release() -> TestResult {
    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &Pdu::ReleaseRQ)?;
    assert_eq!(read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?, Pdu::ReleaseRQ);

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &Pdu::ReleaseRP)?;
    assert_eq!(read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?, Pdu::ReleaseRP);

    Ok(())
}

#[test]
fn can_read_write_abort() -> TestResult {
    let abort = Pdu::AbortRQ {
        source: AbortRQSource::ServiceProvider(AbortRQServiceProviderReason::UnexpectedPDU),
    };

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &abort)?;
    assert_eq!(read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?, abort);

    Ok(())
}

#[test]
fn can_read_write_role_selection() -> TestResult {
    let rq = Pdu::AssociationRQ {
        protocol_version: 1,
        calling_ae_title: "SCU".to_string(),
        called_ae_title: "SCP".to_string(),
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        presentation_contexts: vec![],
        user_variables: vec![UserVariableItem::RoleSelection(RoleSelection {
            abstract_syntax: "1.2.840.10008.5.1.4.1.2.1.1".to_string(),
            scu_role: false,
            scp_role: true,
        })],
    };

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &rq)?;
    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?;

    if let Pdu::AssociationRQ { user_variables, .. } = result {
        match &user_variables[0] {
            UserVariableItem::RoleSelection(role) => {
                assert_eq!(role.abstract_syntax, "1.2.840.10008.5.1.4.1.2.1.1");
                assert!(!role.scu_role);
                assert!(role.scp_role);
            }
            _ => panic!("expected RoleSelection"),
        }
    } else {
        panic!("expected Pdu::AssociationRQ");
    }

    Ok(())
}

#[test]
fn can_read_write_user_identity() -> TestResult {
    let rq = Pdu::AssociationRQ {
        protocol_version: 1,
        calling_ae_title: "SCU".to_string(),
        called_ae_title: "SCP".to_string(),
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        presentation_contexts: vec![],
        user_variables: vec![UserVariableItem::UserIdentity(
            UserIdentity::UsernamePassword {
                username: "alice".to_string(),
                password: "hunter2".to_string(),
                positive_response_requested: true,
            },
        )],
    };

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &rq)?;
    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?;

    if let Pdu::AssociationRQ { user_variables, .. } = result {
        match &user_variables[0] {
            UserVariableItem::UserIdentity(UserIdentity::UsernamePassword {
                username,
                password,
                positive_response_requested,
            }) => {
                assert_eq!(username, "alice");
                assert_eq!(password, "hunter2");
                assert!(positive_response_requested);
            }
            _ => panic!("expected UserIdentity::UsernamePassword"),
        }
    } else {
        panic!("expected Pdu::AssociationRQ");
    }

    Ok(())
}

#[test]
fn can_read_write_sop_class_common_extended_negotiation() -> TestResult {
    let ac = Pdu::AssociationRQ {
        protocol_version: 1,
        calling_ae_title: "SCU".to_string(),
        called_ae_title: "SCP".to_string(),
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        presentation_contexts: vec![],
        user_variables: vec![UserVariableItem::SopClassCommonExtendedNegotiation(
            SopClassCommonExtendedNegotiation {
                sop_class_uid: "1.2.840.10008.5.1.4.1.1.2".to_string(),
                service_class_uid: "1.2.840.10008.4.2".to_string(),
                related_general_sop_classes: vec!["1.2.840.10008.5.1.4.1.1".to_string()],
            },
        )],
    };

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &ac)?;
    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?;

    if let Pdu::AssociationRQ { user_variables, .. } = result {
        match &user_variables[0] {
            UserVariableItem::SopClassCommonExtendedNegotiation(item) => {
                assert_eq!(item.sop_class_uid, "1.2.840.10008.5.1.4.1.1.2");
                assert_eq!(item.service_class_uid, "1.2.840.10008.4.2");
                assert_eq!(item.related_general_sop_classes.len(), 1);
            }
            _ => panic!("expected SopClassCommonExtendedNegotiation"),
        }
    } else {
        panic!("expected Pdu::AssociationRQ");
    }

    Ok(())
}

#[test]
fn unknown_pdu_roundtrips() -> TestResult {
    let pdu = Pdu::Unknown {
        pdu_type: 0xAA,
        data: vec![1, 2, 3, 4],
    };

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &pdu)?;
    assert_eq!(read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU)?, pdu);

    Ok(())
}
