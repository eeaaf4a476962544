//! Association façade
//!
//! The single front door described by spec.md §4.6: glues a negotiated
//! association (through [`Provider`]) to the [`EventBus`], dispatching
//! `EVT_ESTABLISHED`/`EVT_RELEASED`/`EVT_ABORTED`/`EVT_DIMSE_SENT`/
//! `EVT_DIMSE_RECV` notifications around every exchange and running each
//! service request through the per-service `EVT_C_*`/`EVT_N_*`
//! intervention hook before falling back to the caller-supplied status.
//!
//! This generalizes the teacher's plain [`ClientAssociation`]/
//! [`ServerAssociation`] (each a bare PDU-exchanging socket wrapper) into
//! the higher-level object application code is expected to hold for the
//! association's lifetime.

use std::time::SystemTime;

use dicom_encoding::TransferSyntax;
use dicom_object::InMemDicomObject;

use crate::association::client::{ClientAssociation, ClientAssociationOptions};
use crate::association::server::ServerAssociation;
use crate::dimse::{Endpoint, Provider};
use crate::event::{Event, EventBus, EventKind, EventPayload, InterventionOutcome};
use crate::pcontext::{PresentationContext, PresentationContextTable};
use crate::pdu::commands::Priority;
use crate::pdu::{AbortRQServiceProviderReason, PresentationContextResultReason};
use crate::service::status::StatusKind;
use crate::service::{n_service, qr_find, storage, verification};

/// A negotiated association plus the event bus that observes and
/// intervenes in its traffic (spec.md §4.6, §3 "Ownership").
pub struct Association<E> {
    provider: Provider<E>,
    peer_ae_title: String,
    events: EventBus,
    is_established: bool,
    is_released: bool,
    is_rejected: bool,
    is_aborted: bool,
}

impl<E: Endpoint> Association<E> {
    /// Wrap an already-negotiated endpoint.
    pub fn new(endpoint: E, peer_ae_title: impl Into<String>) -> Self {
        let assoc = Association {
            provider: Provider::new(endpoint),
            peer_ae_title: peer_ae_title.into(),
            events: EventBus::new(),
            is_established: true,
            is_released: false,
            is_rejected: false,
            is_aborted: false,
        };
        assoc.notify(EventKind::Established, EventPayload::None);
        assoc
    }

    /// Whether the association reached the established state. Always true
    /// for a constructed façade: negotiation happens before [`Association`]
    /// exists, so this exists for parity with [`Association::is_released`]/
    /// [`Association::is_aborted`] rather than ever observing a transition.
    pub fn is_established(&self) -> bool {
        self.is_established
    }

    /// Whether [`Association::release`] has completed for this association.
    pub fn is_released(&self) -> bool {
        self.is_released
    }

    /// Whether the association was rejected. Always false: a rejected
    /// association never reaches this façade — [`connect`] returns `Err`
    /// before one is constructed, and nothing currently builds an
    /// `Association` from a rejected acceptor-side negotiation either.
    pub fn is_rejected(&self) -> bool {
        self.is_rejected
    }

    /// Whether [`Association::abort`] has been called for this association.
    pub fn is_aborted(&self) -> bool {
        self.is_aborted
    }

    /// Access the event bus to register notification/intervention handlers.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Borrow the underlying DIMSE provider, for service calls this façade
    /// does not itself wrap (e.g. Move/Get sub-operation engines, which
    /// need two providers and a handler iterator supplied by the caller).
    pub fn provider_mut(&mut self) -> &mut Provider<E> {
        &mut self.provider
    }

    fn notify(&self, kind: EventKind, payload: EventPayload) {
        self.events
            .notify(&Event::new(kind, self.peer_ae_title.clone(), SystemTime::now(), payload));
    }

    fn intervene(&mut self, kind: EventKind, payload: EventPayload) -> InterventionOutcome {
        self.events
            .intervene_dispatch(&Event::new(kind, self.peer_ae_title.clone(), SystemTime::now(), payload))
    }

    /// Send a C-ECHO-RQ and return the classified response status
    /// (spec.md §4.5.2).
    pub fn send_c_echo(
        &mut self,
        presentation_context_id: u8,
        abstract_syntax: &str,
        message_id: u16,
    ) -> verification::Result<StatusKind> {
        self.notify(
            EventKind::DimseSent,
            EventPayload::Dimse { command: "C-ECHO-RQ", presentation_context_id },
        );
        let status = verification::send_c_echo(&mut self.provider, presentation_context_id, abstract_syntax, message_id)?;
        self.notify(
            EventKind::DimseRecv,
            EventPayload::Dimse { command: "C-ECHO-RSP", presentation_context_id },
        );
        Ok(status)
    }

    /// Send a C-STORE-RQ and return the classified response status
    /// (spec.md §4.5.4 Storage).
    #[allow(clippy::too_many_arguments)]
    pub fn send_c_store(
        &mut self,
        presentation_context_id: u8,
        ts: &TransferSyntax,
        message_id: u16,
        sop_class_uid: &str,
        sop_instance_uid: &str,
        priority: Priority,
        source_ts: &str,
        dataset: &InMemDicomObject,
    ) -> storage::Result<StatusKind> {
        self.notify(
            EventKind::DimseSent,
            EventPayload::ServiceRequest {
                sop_class_uid: sop_class_uid.to_string(),
                sop_instance_uid: Some(sop_instance_uid.to_string()),
                message_id,
            },
        );
        let status = storage::send_c_store(
            &mut self.provider,
            presentation_context_id,
            ts,
            message_id,
            sop_class_uid,
            sop_instance_uid,
            priority,
            None,
            source_ts,
            dataset,
        )?;
        self.notify(
            EventKind::DimseRecv,
            EventPayload::Dimse { command: "C-STORE-RSP", presentation_context_id },
        );
        Ok(status)
    }

    /// Send a C-FIND-RQ and return a lazy iterator of matches (spec.md
    /// §4.5.3).
    pub fn send_c_find<'p>(
        &'p mut self,
        presentation_context_id: u8,
        ts: &'p TransferSyntax,
        message_id: u16,
        sop_class_uid: &str,
        priority: Priority,
        identifier: &InMemDicomObject,
    ) -> qr_find::Result<qr_find::FindResponses<'p, E>> {
        self.notify(
            EventKind::DimseSent,
            EventPayload::ServiceRequest {
                sop_class_uid: sop_class_uid.to_string(),
                sop_instance_uid: None,
                message_id,
            },
        );
        qr_find::send_c_find(&mut self.provider, presentation_context_id, ts, message_id, sop_class_uid, priority, identifier)
    }

    /// Run the EVT_C_ECHO intervention handler, if any, falling back to
    /// `default_status` when no handler is registered or the handler
    /// returns [`InterventionOutcome::Continue`].
    pub fn dispatch_c_echo(&mut self, default_status: u16) -> u16 {
        match self.intervene(EventKind::CEcho, EventPayload::None) {
            InterventionOutcome::Status(_, status) => status,
            _ => default_status,
        }
    }

    /// Serve a single C-ECHO-RQ already received on `presentation_context_id`,
    /// running the EVT_C_ECHO intervention handler and sending the
    /// C-ECHO-RSP with its status (spec.md §4.5.1, §4.6).
    pub fn serve_c_echo(
        &mut self,
        presentation_context_id: u8,
        abstract_syntax: &str,
        message_id: u16,
    ) -> verification::Result<()> {
        let status = self.dispatch_c_echo(0x0000);
        verification::handle_c_echo(&mut self.provider, presentation_context_id, abstract_syntax, message_id, || Ok(status))
    }

    /// Run the EVT_C_STORE intervention handler, if any, falling back to
    /// `default_status` (spec.md §4.5.2, §7).
    pub fn dispatch_c_store(&mut self, default_status: u16, sop_class_uid: &str, sop_instance_uid: &str, message_id: u16) -> u16 {
        let payload = EventPayload::ServiceRequest {
            sop_class_uid: sop_class_uid.to_string(),
            sop_instance_uid: Some(sop_instance_uid.to_string()),
            message_id,
        };
        match self.intervene(EventKind::CStore, payload) {
            InterventionOutcome::Status(_, status) => status,
            _ => default_status,
        }
    }

    /// Serve a single C-STORE-RQ already received, running the EVT_C_STORE
    /// intervention handler and sending the C-STORE-RSP with its status
    /// (spec.md §4.5.2, §4.6).
    pub fn serve_c_store(
        &mut self,
        presentation_context_id: u8,
        sop_class_uid: &str,
        sop_instance_uid: &str,
        message_id: u16,
    ) -> storage::Result<()> {
        let status = self.dispatch_c_store(storage::DEFAULT_FAILURE, sop_class_uid, sop_instance_uid, message_id);
        storage::handle_c_store(&mut self.provider, presentation_context_id, sop_class_uid, sop_instance_uid, message_id, || Ok(status))
    }

    fn dispatch_n(&mut self, kind: EventKind, default_status: u16, sop_class_uid: &str, sop_instance_uid: &str, message_id: u16) -> u16 {
        let payload = EventPayload::ServiceRequest {
            sop_class_uid: sop_class_uid.to_string(),
            sop_instance_uid: Some(sop_instance_uid.to_string()),
            message_id,
        };
        match self.intervene(kind, payload) {
            InterventionOutcome::Status(_, status) => status,
            _ => default_status,
        }
    }

    /// Run the EVT_N_DELETE intervention handler, if any, falling back to
    /// [`n_service::PROCESSING_FAILURE`] (spec.md §4.5.6, §7). N-DELETE
    /// carries no data set for a handler to return alongside the status, so
    /// this is the only `dispatch_n_*` that does not need a data set slot.
    pub fn dispatch_n_delete(&mut self, sop_class_uid: &str, sop_instance_uid: &str, message_id: u16) -> u16 {
        self.dispatch_n(EventKind::NDelete, n_service::PROCESSING_FAILURE, sop_class_uid, sop_instance_uid, message_id)
    }

    /// Serve a single N-DELETE-RQ already received, running the
    /// EVT_N_DELETE intervention handler and sending the N-DELETE-RSP with
    /// its status.
    pub fn serve_n_delete(
        &mut self,
        presentation_context_id: u8,
        sop_class_uid: &str,
        sop_instance_uid: &str,
        message_id: u16,
    ) -> n_service::Result<()> {
        let status = self.dispatch_n_delete(sop_class_uid, sop_instance_uid, message_id);
        n_service::handle_n_delete(&mut self.provider, presentation_context_id, message_id, sop_class_uid, sop_instance_uid, || Ok(status))
    }

    /// Gracefully release the association, notifying EVT_RELEASED.
    pub fn release(mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        E: ReleaseCapable,
    {
        self.is_released = true;
        self.notify(EventKind::Released, EventPayload::None);
        self.provider.into_inner().release_endpoint()
    }

    /// Abort the association, notifying EVT_ABORTED. Unlike
    /// [`Association::release`], this does not consume `self`: an abort is
    /// not a negotiated handshake, so the caller may still want to inspect
    /// the façade (e.g. its event bus) before dropping it.
    pub fn abort(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        E: AbortCapable,
    {
        self.is_aborted = true;
        self.notify(EventKind::Aborted, EventPayload::None);
        self.provider.endpoint_mut().abort_endpoint()
    }
}

/// Bridges [`Association::release`] to each concrete endpoint's own
/// `release`, since [`Endpoint`] itself only models PDU exchange.
pub trait ReleaseCapable {
    fn release_endpoint(self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl ReleaseCapable for ClientAssociation {
    fn release_endpoint(mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        ClientAssociation::release(&mut self).map_err(|e| Box::new(e) as _)
    }
}

impl ReleaseCapable for ServerAssociation {
    fn release_endpoint(mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        ServerAssociation::release(&mut self).map_err(|e| Box::new(e) as _)
    }
}

/// Bridges [`Association::abort`] to each concrete endpoint's own `abort`.
pub trait AbortCapable {
    fn abort_endpoint(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl AbortCapable for ClientAssociation {
    fn abort_endpoint(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        ClientAssociation::abort(self).map_err(|e| Box::new(e) as _)
    }
}

impl AbortCapable for ServerAssociation {
    fn abort_endpoint(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        ServerAssociation::abort(self, AbortRQServiceProviderReason::ReasonNotSpecifiedUnrecognizedPDU)
            .map_err(|e| Box::new(e) as _)
    }
}

/// Establish an SCU-side association and wrap it in a façade. `peer_ae_title`
/// should match whatever `called_ae_title` was set on `options`, since
/// [`ClientAssociation`] itself does not retain it. The single negotiated
/// presentation context is recorded in the façade's accepted-context table
/// (spec.md §4.4/§8 invariant 2), so PDVs for any other context id are
/// rejected rather than silently accepted.
pub fn connect<A: std::net::ToSocketAddrs>(
    options: ClientAssociationOptions,
    address: A,
    peer_ae_title: impl Into<String>,
) -> crate::association::client::Result<Association<ClientAssociation>> {
    let client = options.establish(address)?;

    let mut table = PresentationContextTable::new();
    let _ = table.insert(PresentationContext {
        id: client.presentation_context_id(),
        abstract_syntax: client.abstract_syntax_uid().to_string(),
        transfer_syntax: client.transfer_syntax_uid().to_string(),
        as_scu: true,
        as_scp: false,
    });

    let mut assoc = Association::new(client, peer_ae_title);
    assoc.provider.set_accepted_contexts(table);
    Ok(assoc)
}

impl Association<ServerAssociation> {
    /// Wrap a negotiated acceptor-side association, building the accepted
    /// presentation context table from the negotiation result together with
    /// any Role Selection the calling node proposed (spec.md §3, §4.2,
    /// §8 invariant 2) — contexts the acceptor rejected are left out.
    pub fn from_server(server: ServerAssociation, peer_ae_title: impl Into<String>) -> Self {
        let mut table = PresentationContextTable::new();
        for pc in server.presentation_contexts() {
            if pc.reason != PresentationContextResultReason::Acceptance {
                continue;
            }
            let (as_scu, as_scp) = server.role_selection(&pc.abstract_syntax).unwrap_or((true, false));
            let _ = table.insert(PresentationContext {
                id: pc.id,
                abstract_syntax: pc.abstract_syntax.clone(),
                transfer_syntax: pc.transfer_syntax.clone(),
                as_scu,
                as_scp,
            });
        }

        let mut assoc = Association::new(server, peer_ae_title);
        assoc.provider.set_accepted_contexts(table);
        assoc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::Pdu;
    use std::sync::mpsc::channel;

    struct ChannelEndpoint {
        tx: std::sync::mpsc::Sender<Pdu>,
        rx: std::sync::mpsc::Receiver<Pdu>,
    }

    impl Endpoint for ChannelEndpoint {
        fn send_pdu(&mut self, pdu: &Pdu) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.tx.send(pdu.clone()).unwrap();
            Ok(())
        }

        fn receive_pdu(&mut self) -> std::result::Result<Pdu, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.rx.recv().unwrap())
        }

        fn max_pdu_length(&self) -> u32 {
            16_384
        }
    }

    #[test]
    fn established_event_fires_on_construction() {
        let (tx_a, rx_a) = channel();
        let (_tx_b, rx_b) = channel();
        let mut assoc = Association::new(ChannelEndpoint { tx: tx_a, rx: rx_b }, "REMOTE-SCP");

        let seen = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen_handler = std::sync::Arc::clone(&seen);
        assoc.events_mut().on(EventKind::Established, move |_| {
            seen_handler.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        // the constructor already fired EVT_ESTABLISHED before the handler
        // above was registered, so re-notify explicitly to observe it.
        assoc.notify(EventKind::Established, EventPayload::None);
        assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
        drop(rx_a);
    }

    #[test]
    fn c_echo_dispatch_falls_back_to_default_status() {
        let (tx_a, rx_a) = channel();
        let (_tx_b, rx_b) = channel();
        let mut assoc = Association::new(ChannelEndpoint { tx: tx_a, rx: rx_b }, "REMOTE-SCP");
        assert_eq!(assoc.dispatch_c_echo(0x0000), 0x0000);
        drop(rx_a);
    }

    #[test]
    fn c_store_dispatch_honors_registered_intervention() {
        let (tx_a, rx_a) = channel();
        let (_tx_b, rx_b) = channel();
        let mut assoc = Association::new(ChannelEndpoint { tx: tx_a, rx: rx_b }, "REMOTE-SCU");
        assoc.events_mut().intervene(EventKind::CStore, |_| InterventionOutcome::Status(StatusKind::Failure, 0xA700));

        let status = assoc.dispatch_c_store(storage::DEFAULT_FAILURE, "1.2.840.10008.5.1.4.1.1.2", "1.2.3.4", 1);
        assert_eq!(status, 0xA700);
        drop(rx_a);
    }

    #[test]
    fn c_store_dispatch_falls_back_without_a_handler() {
        let (tx_a, rx_a) = channel();
        let (_tx_b, rx_b) = channel();
        let mut assoc = Association::new(ChannelEndpoint { tx: tx_a, rx: rx_b }, "REMOTE-SCU");

        let status = assoc.dispatch_c_store(storage::DEFAULT_FAILURE, "1.2.840.10008.5.1.4.1.1.2", "1.2.3.4", 1);
        assert_eq!(status, storage::DEFAULT_FAILURE);
        drop(rx_a);
    }

    #[test]
    fn serve_n_delete_sends_the_dispatched_status() {
        let (tx_a, rx_a) = channel();
        let (tx_b, rx_b) = channel();
        let mut scp = Association::new(ChannelEndpoint { tx: tx_a, rx: rx_b }, "REMOTE-SCU");
        let mut scu = Provider::new(ChannelEndpoint { tx: tx_b, rx: rx_a });

        scp.events_mut().intervene(EventKind::NDelete, |_| InterventionOutcome::Status(StatusKind::Failure, 0x0117));

        scp.serve_n_delete(1, "1.2.840.10008.5.1.4.1.1.2", "1.2.3.4", 9).unwrap();

        let response = scu.receive_message().unwrap();
        assert_eq!(response.status(), Some(0x0117));
    }
}
