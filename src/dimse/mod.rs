//! DIMSE message engine
//!
//! Fragments outbound [`DimseMessage`]s into PDVs batched into P-DATA-TF
//! PDUs, and reassembles inbound PDVs into command-set + optional data-set
//! pairs (spec.md §4.4). C-CANCEL requests are intercepted here and parked
//! in a `cancel_req` map keyed by `MessageIDBeingRespondedTo`, rather than
//! surfaced to callers of [`Provider::receive_message`] — this mirrors the
//! way [`crate::association::client::ClientAssociation`] and
//! [`crate::association::server::ServerAssociation`] already own a single
//! `Pdu` stream per connection.

pub mod message;

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use dicom_dictionary_std::tags;
use snafu::{ResultExt, Snafu};

use crate::association::{client::ClientAssociation, server::ServerAssociation, Association};
use crate::association::pdata::calculate_max_data_len_single;
use crate::pcontext::PresentationContextTable;
use crate::pdu::commands::CommandField;
use crate::pdu::{AbortRQServiceProviderReason, AbortRQSource, PDataValue, PDataValueType, Pdu};

pub use message::DimseMessage;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to send PDU"))]
    Send { source: Box<dyn std::error::Error + Send + Sync> },

    #[snafu(display("failed to receive PDU"))]
    Receive { source: Box<dyn std::error::Error + Send + Sync> },

    #[snafu(display("received unexpected PDU `{:?}` while assembling a DIMSE message", pdu))]
    #[non_exhaustive]
    UnexpectedPdu { pdu: Pdu },

    #[snafu(display("could not (de)serialize DIMSE message"))]
    Message { source: message::Error },

    #[snafu(display("PDV referenced presentation context {}, which was not accepted", id))]
    UnknownPresentationContext { id: u8 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A byte-stream endpoint capable of exchanging whole PDUs, abstracting
/// over [`Association`], [`ClientAssociation`] and [`ServerAssociation`]
/// so that [`Provider`] does not need to be generic over the role.
pub trait Endpoint {
    fn send_pdu(&mut self, pdu: &Pdu) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn receive_pdu(&mut self) -> std::result::Result<Pdu, Box<dyn std::error::Error + Send + Sync>>;
    fn max_pdu_length(&self) -> u32;

    /// Set (or clear) the read timeout of the underlying transport. Default
    /// is a no-op, for endpoints (e.g. test stubs) with nothing to time out.
    fn set_read_timeout(
        &mut self,
        _timeout: Option<Duration>,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

macro_rules! impl_endpoint {
    ($ty:ty, $max_pdu_length:ident) => {
        impl Endpoint for $ty {
            fn send_pdu(
                &mut self,
                pdu: &Pdu,
            ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
                self.send(pdu).map_err(|e| Box::new(e) as _)
            }

            fn receive_pdu(
                &mut self,
            ) -> std::result::Result<Pdu, Box<dyn std::error::Error + Send + Sync>> {
                self.receive().map_err(|e| Box::new(e) as _)
            }

            fn max_pdu_length(&self) -> u32 {
                self.$max_pdu_length()
            }

            fn set_read_timeout(
                &mut self,
                timeout: Option<Duration>,
            ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
                // resolves to each type's own inherent `set_read_timeout`,
                // which alone has access to its private transport field.
                self.set_read_timeout(timeout).map_err(|e| Box::new(e) as _)
            }
        }
    };
}

impl_endpoint!(Association, max_pdu_length);
impl_endpoint!(ClientAssociation, max_pdu_length);
// the server fragments outbound messages to the length the calling node
// advertised it can accept, not its own inbound limit.
impl_endpoint!(ServerAssociation, peer_max_pdu_length);

/// Drives the DIMSE message engine over one [`Endpoint`].
///
/// Owns the reassembly buffer of not-yet-consumed PDVs and the
/// `cancel_req` map (spec.md §4.4, §5 "shared resources").
pub struct Provider<E> {
    endpoint: E,
    pending: VecDeque<PDataValue>,
    cancel_req: HashSet<u16>,
    accepted_contexts: Option<PresentationContextTable>,
}

impl<E: Endpoint> Provider<E> {
    pub fn new(endpoint: E) -> Self {
        Provider {
            endpoint,
            pending: VecDeque::new(),
            cancel_req: HashSet::new(),
            accepted_contexts: None,
        }
    }

    /// Validate every inbound PDV's presentation context id against `table`
    /// (spec.md §4.4/§8 invariant 2), aborting the association on a
    /// mismatch instead of silently accepting data for a context that was
    /// never negotiated.
    pub fn with_accepted_contexts(mut self, table: PresentationContextTable) -> Self {
        self.accepted_contexts = Some(table);
        self
    }

    /// Same as [`Provider::with_accepted_contexts`], by mutable reference.
    pub fn set_accepted_contexts(&mut self, table: PresentationContextTable) {
        self.accepted_contexts = Some(table);
    }

    pub fn into_inner(self) -> E {
        self.endpoint
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }

    /// Send a message, fragmenting it into PDVs sized to the peer's
    /// negotiated maximum PDU length and flushing them as one P-DATA-TF
    /// PDU (spec.md §4.4).
    pub fn send_message(&mut self, message: DimseMessage) -> Result<()> {
        let max_data_len = calculate_max_data_len_single(self.endpoint.max_pdu_length()) as usize;
        let pdvs = message.into_pdvs(max_data_len).context(MessageSnafu)?;
        self.endpoint
            .send_pdu(&Pdu::PData { data: pdvs })
            .map_err(|source| Error::Send { source })
    }

    /// Receive the next DIMSE message addressed to the caller.
    ///
    /// C-CANCEL requests are transparently parked in the `cancel_req` map
    /// and never returned from this method; call [`Provider::is_cancelled`]
    /// to poll for them.
    pub fn receive_message(&mut self) -> Result<DimseMessage> {
        loop {
            let message = self.receive_one()?;
            if message.command_field().ok() == Some(CommandField::C_CANCEL_RQ as u16) {
                if let Some(message_id) = message.message_id_being_responded_to() {
                    self.cancel_req.insert(message_id);
                }
                continue;
            }
            return Ok(message);
        }
    }

    /// Atomically check and consume a pending cancellation for `message_id`.
    pub fn is_cancelled(&mut self, message_id: u16) -> bool {
        self.cancel_req.remove(&message_id)
    }

    fn next_pdv(&mut self) -> Result<PDataValue> {
        loop {
            if let Some(pdv) = self.pending.pop_front() {
                self.check_context(pdv.presentation_context_id)?;
                return Ok(pdv);
            }
            match self
                .endpoint
                .receive_pdu()
                .map_err(|source| Error::Receive { source })?
            {
                Pdu::PData { data } => self.pending.extend(data),
                other => return UnexpectedPduSnafu { pdu: other }.fail(),
            }
        }
    }

    /// Check `id` against the accepted presentation context table, if one
    /// was configured. On a mismatch, abort the association (spec.md §4.4
    /// step 4: a malformed/unexpected context id is a protocol violation,
    /// not a recoverable per-message error) before reporting the failure.
    fn check_context(&mut self, id: u8) -> Result<()> {
        let Some(table) = &self.accepted_contexts else {
            return Ok(());
        };
        if table.contains(id) {
            return Ok(());
        }
        let _ = self.endpoint.send_pdu(&Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(AbortRQServiceProviderReason::UnexpectedPDU),
        });
        UnknownPresentationContextSnafu { id }.fail()
    }

    fn receive_one(&mut self) -> Result<DimseMessage> {
        let mut pdvs = Vec::new();
        loop {
            let pdv = self.next_pdv()?;
            let is_command_end = pdv.value_type == PDataValueType::Command && pdv.is_last;
            pdvs.push(pdv);
            if is_command_end {
                break;
            }
        }

        let command_only = DimseMessage::from_pdvs(pdvs.clone()).context(MessageSnafu)?;
        let has_dataset = command_only
            .command
            .element(tags::COMMAND_DATA_SET_TYPE)
            .ok()
            .and_then(|e| e.value().to_int::<u16>().ok())
            .map(|value| value != 0x0101)
            .unwrap_or(false);

        if !has_dataset {
            return Ok(command_only);
        }

        loop {
            let pdv = self.next_pdv()?;
            let is_last = pdv.is_last;
            pdvs.push(pdv);
            if is_last {
                break;
            }
        }

        DimseMessage::from_pdvs(pdvs).context(MessageSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{dicom_value, DataElement, VR};
    use dicom_dictionary_std::uids::VERIFICATION;
    use dicom_object::InMemDicomObject;
    use std::sync::mpsc::{channel, Receiver, Sender};

    /// An in-memory endpoint pair for exercising the provider without a
    /// real socket, modeled the same way the teacher's tests stub out
    /// transports with a `Vec<u8>` cursor.
    struct ChannelEndpoint {
        tx: Sender<Pdu>,
        rx: Receiver<Pdu>,
        max_pdu_length: u32,
    }

    impl Endpoint for ChannelEndpoint {
        fn send_pdu(
            &mut self,
            pdu: &Pdu,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.tx.send(pdu.clone()).unwrap();
            Ok(())
        }

        fn receive_pdu(
            &mut self,
        ) -> std::result::Result<Pdu, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.rx.recv().unwrap())
        }

        fn max_pdu_length(&self) -> u32 {
            self.max_pdu_length
        }
    }

    fn pair(max_pdu_length: u32) -> (ChannelEndpoint, ChannelEndpoint) {
        let (tx_a, rx_a) = channel();
        let (tx_b, rx_b) = channel();
        (
            ChannelEndpoint { tx: tx_a, rx: rx_b, max_pdu_length },
            ChannelEndpoint { tx: tx_b, rx: rx_a, max_pdu_length },
        )
    }

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
    fn sends_and_receives_a_message() {
        let (a, b) = pair(16_384);
        let mut sender = Provider::new(a);
        let mut receiver = Provider::new(b);

        sender
            .send_message(DimseMessage {
                presentation_context_id: 1,
                command: echo_command(5),
                data: None,
            })
            .unwrap();

        let received = receiver.receive_message().unwrap();
        assert_eq!(received.message_id(), Some(5));
        assert_eq!(received.command_field().unwrap(), 0x0030);
    }

    #[test]
    fn parks_cancel_requests_instead_of_returning_them() {
        let (a, b) = pair(16_384);
        let mut sender = Provider::new(a);
        let mut receiver = Provider::new(b);

        let cancel = InMemDicomObject::command_from_element_iter([
            DataElement::new(
                tags::COMMAND_FIELD,
                VR::US,
                dicom_value!(U16, [CommandField::C_CANCEL_RQ as u16]),
            ),
            DataElement::new(
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                VR::US,
                dicom_value!(U16, [9]),
            ),
            DataElement::new(
                tags::COMMAND_DATA_SET_TYPE,
                VR::US,
                dicom_value!(U16, [0x0101]),
            ),
        ]);
        sender
            .send_message(DimseMessage {
                presentation_context_id: 1,
                command: cancel,
                data: None,
            })
            .unwrap();
        sender
            .send_message(DimseMessage {
                presentation_context_id: 1,
                command: echo_command(11),
                data: None,
            })
            .unwrap();

        assert!(!receiver.is_cancelled(9));
        let received = receiver.receive_message().unwrap();
        assert_eq!(received.message_id(), Some(11));
        assert!(receiver.is_cancelled(9));
        assert!(!receiver.is_cancelled(9));
    }

    #[test]
    fn rejects_pdv_for_an_unaccepted_context() {
        use crate::pcontext::{PresentationContext, PresentationContextTable};

        let (a, b) = pair(16_384);
        let mut sender = Provider::new(a);
        let mut table = PresentationContextTable::new();
        table
            .insert(PresentationContext {
                id: 1,
                abstract_syntax: VERIFICATION.to_string(),
                transfer_syntax: "1.2.840.10008.1.2".to_string(),
                as_scu: true,
                as_scp: false,
            })
            .unwrap();
        let mut receiver = Provider::new(b).with_accepted_contexts(table);

        sender
            .send_message(DimseMessage {
                presentation_context_id: 3,
                command: echo_command(1),
                data: None,
            })
            .unwrap();

        let err = receiver.receive_message().unwrap_err();
        assert!(matches!(err, Error::UnknownPresentationContext { id: 3 }));
    }
}
