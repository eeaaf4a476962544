//! Verification (C-ECHO) service class (PS3.4 Annex A).

use snafu::{ResultExt, Snafu};

use crate::dimse::{Endpoint, Provider};
use crate::pdu::generated::{CEchoRq, CEchoRsp};
use crate::service::command_message;
use crate::service::status::{classify, StatusKind, VERIFICATION_STATUS};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("DIMSE provider failed while exchanging C-ECHO"))]
    Dimse { source: crate::dimse::Error },

    #[snafu(display("peer sent a C-ECHO-RSP for a different message id"))]
    MismatchedResponse,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Status coerced onto a C-ECHO-RSP when the handler raises instead of
/// returning a status (spec.md §7).
pub const DEFAULT_FAILURE: u16 = 0x0211;

/// Send a C-ECHO-RQ over `abstract_syntax` and wait for the C-ECHO-RSP,
/// returning its classified status.
pub fn send_c_echo<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    abstract_syntax: &str,
    message_id: u16,
) -> Result<StatusKind> {
    let rq = CEchoRq::builder()
        .message_id(message_id)
        .affected_sop_class_uid(abstract_syntax)
        .build();

    provider
        .send_message(command_message(&rq, presentation_context_id, None))
        .context(DimseSnafu)?;

    let response = provider.receive_message().context(DimseSnafu)?;
    if response.message_id_being_responded_to() != Some(message_id) {
        return MismatchedResponseSnafu.fail();
    }

    Ok(classify(VERIFICATION_STATUS, response.status().unwrap_or(0xC000)))
}

/// Run `handler` to decide the C-ECHO-RSP status and send it, coercing a
/// handler error to [`DEFAULT_FAILURE`] (spec.md §4.5.1, §7).
pub fn handle_c_echo<E: Endpoint>(
    provider: &mut Provider<E>,
    presentation_context_id: u8,
    abstract_syntax: &str,
    message_id: u16,
    handler: impl FnOnce() -> std::result::Result<u16, Box<dyn std::error::Error + Send + Sync>>,
) -> Result<()> {
    let status = handler().unwrap_or(DEFAULT_FAILURE);
    let rsp = CEchoRsp::builder()
        .message_id_being_responded_to(message_id)
        .affected_sop_class_uid(abstract_syntax)
        .status(status)
        .build();

    provider
        .send_message(command_message(&rsp, presentation_context_id, None))
        .context(DimseSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_dictionary_std::uids::VERIFICATION;
    use std::sync::mpsc::channel;

    struct ChannelEndpoint {
        tx: std::sync::mpsc::Sender<crate::pdu::Pdu>,
        rx: std::sync::mpsc::Receiver<crate::pdu::Pdu>,
    }

    impl Endpoint for ChannelEndpoint {
        fn send_pdu(
            &mut self,
            pdu: &crate::pdu::Pdu,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.tx.send(pdu.clone()).unwrap();
            Ok(())
        }

        fn receive_pdu(
            &mut self,
        ) -> std::result::Result<crate::pdu::Pdu, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.rx.recv().unwrap())
        }

        fn max_pdu_length(&self) -> u32 {
            16_384
        }
    }

    #[test]
    fn echo_round_trip_reports_success() {
        let (tx_a, rx_a) = channel();
        let (tx_b, rx_b) = channel();
        let mut scu = Provider::new(ChannelEndpoint { tx: tx_a, rx: rx_b });
        let mut scp = Provider::new(ChannelEndpoint { tx: tx_b, rx: rx_a });

        let scp_handle = std::thread::spawn(move || {
            let request = scp.receive_message().unwrap();
            handle_c_echo(
                &mut scp,
                request.presentation_context_id,
                VERIFICATION,
                request.message_id().unwrap(),
                || Ok(0x0000),
            )
            .unwrap();
        });

        let status = send_c_echo(&mut scu, 1, VERIFICATION, 1).unwrap();
        assert_eq!(status, StatusKind::Success);
        scp_handle.join().unwrap();
    }
}
