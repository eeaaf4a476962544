//! Event bus
//!
//! Associations report their lifecycle and DIMSE traffic through [`Event`]
//! values dispatched by an [`EventBus`] (spec.md §2, §3). Two kinds of
//! handler exist:
//!
//! - *Notification* handlers (registered with [`EventBus::on`]) are
//!   fire-and-forget: any number may be registered for a given
//!   [`EventKind`], and all of them run in registration order.
//! - *Intervention* handlers (registered with [`EventBus::intervene`]) get
//!   to decide an outcome: at most one may be registered per
//!   [`EventKind`], and its return value feeds back into the caller (spec.md
//!   §3, "intervention events carry a handler return value").
//!
//! Handlers are stored as trait objects, the same pattern already used for
//! error causes throughout this crate (e.g. [`crate::dimse::Error::Send`]'s
//! `Box<dyn std::error::Error + Send + Sync>`).

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use crate::pdu::{AbortRQServiceProviderReason, AssociationRJServiceUserReason};
use crate::service::status::StatusKind;

/// The event kinds an [`Association`](crate::association::Association) can
/// raise, per spec.md §2's enumeration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EventKind {
    /// EVT_REQUESTED: an A-ASSOCIATE-RQ was received (intervention).
    Requested,
    /// EVT_ACCEPTED: the association was accepted.
    Accepted,
    /// EVT_REJECTED: the association was rejected.
    Rejected,
    /// EVT_ESTABLISHED: the association is now in the data transfer state.
    Established,
    /// EVT_RELEASED: the association was released.
    Released,
    /// EVT_ABORTED: the association was aborted, locally or by the peer.
    Aborted,
    /// EVT_DIMSE_SENT: a DIMSE message was sent on this association.
    DimseSent,
    /// EVT_DIMSE_RECV: a DIMSE message was received on this association.
    DimseRecv,
    /// EVT_C_ECHO: a C-ECHO-RQ was received (intervention).
    CEcho,
    /// EVT_C_STORE: a C-STORE-RQ was received (intervention).
    CStore,
    /// EVT_C_FIND: a C-FIND-RQ was received (intervention).
    CFind,
    /// EVT_C_GET: a C-GET-RQ was received (intervention).
    CGet,
    /// EVT_C_MOVE: a C-MOVE-RQ was received (intervention).
    CMove,
    /// EVT_N_EVENT_REPORT: an N-EVENT-REPORT-RQ was received (intervention).
    NEventReport,
    /// EVT_N_GET: an N-GET-RQ was received (intervention).
    NGet,
    /// EVT_N_SET: an N-SET-RQ was received (intervention).
    NSet,
    /// EVT_N_ACTION: an N-ACTION-RQ was received (intervention).
    NAction,
    /// EVT_N_CREATE: an N-CREATE-RQ was received (intervention).
    NCreate,
    /// EVT_N_DELETE: an N-DELETE-RQ was received (intervention).
    NDelete,
    /// EVT_SOP_COMMON: raised once per negotiated SOP class, letting a
    /// handler veto or annotate the presentation context (intervention).
    SopCommon,
    /// EVT_USER_ID: an A-ASSOCIATE-RQ carried a User Identity sub-item
    /// (intervention).
    UserId,
}

/// Kind-specific data carried by an [`Event`] (spec.md §3).
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// No payload beyond the event kind itself.
    None,
    /// The calling and called AE titles of a negotiation event.
    Negotiation {
        calling_ae_title: String,
        called_ae_title: String,
    },
    /// The reason an association was rejected or aborted.
    RejectReason(AssociationRJServiceUserReason),
    /// The reason an association was aborted by this node's provider.
    AbortReason(AbortRQServiceProviderReason),
    /// A DIMSE command field name and the presentation context it travelled
    /// on, for EVT_DIMSE_SENT/RECV.
    Dimse {
        command: &'static str,
        presentation_context_id: u8,
    },
    /// A service request identified by its affected SOP class/instance.
    ServiceRequest {
        sop_class_uid: String,
        sop_instance_uid: Option<String>,
        message_id: u16,
    },
    /// The raw User Identity bytes offered by the calling node.
    UserIdentity { primary_field: Vec<u8> },
}

/// One occurrence of an [`EventKind`]: the association it happened on (by
/// peer AE title, since handlers only ever observe one association's worth
/// of events at a time), when it happened, and its kind-specific payload.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    peer_ae_title: String,
    timestamp: SystemTime,
    payload: EventPayload,
}

impl Event {
    /// Construct a new event. Typically called by the association reactor,
    /// not by library users.
    pub fn new(
        kind: EventKind,
        peer_ae_title: impl Into<String>,
        timestamp: SystemTime,
        payload: EventPayload,
    ) -> Self {
        Event {
            kind,
            peer_ae_title: peer_ae_title.into(),
            timestamp,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn peer_ae_title(&self) -> &str {
        &self.peer_ae_title
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }
}

/// The value an intervention handler hands back to the dispatching code
/// (spec.md §3). Not every variant is meaningful for every [`EventKind`];
/// the dispatcher interprets whichever variant its event expects and
/// treats a mismatched variant as [`InterventionOutcome::Continue`].
#[derive(Debug, Clone)]
pub enum InterventionOutcome {
    /// Let the default behavior proceed (accept the association, use the
    /// handler-less status, etc).
    Continue,
    /// Reject/refuse with the given reason (EVT_REQUESTED, EVT_USER_ID,
    /// EVT_SOP_COMMON).
    Reject(AssociationRJServiceUserReason),
    /// Respond with this DIMSE status instead of the default (EVT_C_*,
    /// EVT_N_*).
    Status(StatusKind, u16),
}

type NotificationHandler = Box<dyn Fn(&Event) + Send + Sync>;
type InterventionHandler = Box<dyn FnMut(&Event) -> InterventionOutcome + Send>;

/// Registers and dispatches [`Event`]s for a single association.
///
/// Cloning is not supported: an `EventBus` owns `FnMut` intervention
/// handlers, so it is meant to live for as long as the association that
/// created it.
#[derive(Default)]
pub struct EventBus {
    notification: HashMap<EventKindTag, Vec<NotificationHandler>>,
    intervention: HashMap<EventKindTag, InterventionHandler>,
}

/// A plain, hashable key distinguishing [`EventKind`] variants without
/// pulling their payload along, used as the handler registry's map key.
type EventKindTag = EventKind;

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("notification_kinds", &self.notification.keys().collect::<Vec<_>>())
            .field("intervention_kinds", &self.intervention.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    /// Register a notification handler for `kind`. Any number of handlers
    /// may be registered for the same kind; all run, in registration
    /// order, whenever a matching event is dispatched.
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.notification
            .entry(kind)
            .or_default()
            .push(Box::new(handler));
    }

    /// Register the intervention handler for `kind`, replacing any handler
    /// previously registered for it. Only one intervention handler can be
    /// active per kind, since its return value is the sole outcome used by
    /// the caller.
    pub fn intervene<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&Event) -> InterventionOutcome + Send + 'static,
    {
        self.intervention.insert(kind, Box::new(handler));
    }

    /// Run every notification handler registered for `event`'s kind.
    pub fn notify(&self, event: &Event) {
        if let Some(handlers) = self.notification.get(&event.kind) {
            for handler in handlers {
                handler(event);
            }
        }
    }

    /// Run the intervention handler registered for `event`'s kind, if any.
    /// Absent a registered handler, the default is
    /// [`InterventionOutcome::Continue`].
    pub fn intervene_dispatch(&mut self, event: &Event) -> InterventionOutcome {
        match self.intervention.get_mut(&event.kind) {
            Some(handler) => handler(event),
            None => InterventionOutcome::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notification_handlers_all_run_in_order() {
        let mut bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_a = Arc::clone(&calls);
        bus.on(EventKind::Established, move |_| {
            calls_a.fetch_add(1, Ordering::SeqCst);
        });
        let calls_b = Arc::clone(&calls);
        bus.on(EventKind::Established, move |_| {
            calls_b.fetch_add(10, Ordering::SeqCst);
        });

        let event = Event::new(
            EventKind::Established,
            "REMOTE-SCU",
            SystemTime::now(),
            EventPayload::None,
        );
        bus.notify(&event);

        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn intervention_defaults_to_continue_when_unregistered() {
        let mut bus = EventBus::new();
        let event = Event::new(
            EventKind::Requested,
            "REMOTE-SCU",
            SystemTime::now(),
            EventPayload::None,
        );

        match bus.intervene_dispatch(&event) {
            InterventionOutcome::Continue => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn intervention_handler_can_reject() {
        let mut bus = EventBus::new();
        bus.intervene(EventKind::Requested, |_| {
            InterventionOutcome::Reject(AssociationRJServiceUserReason::CallingAETitleNotRecognized)
        });

        let event = Event::new(
            EventKind::Requested,
            "REMOTE-SCU",
            SystemTime::now(),
            EventPayload::None,
        );

        match bus.intervene_dispatch(&event) {
            InterventionOutcome::Reject(AssociationRJServiceUserReason::CallingAETitleNotRecognized) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
