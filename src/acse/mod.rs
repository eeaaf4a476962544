//! ACSE (Association Control Service Element) state machine
//!
//! Faithful implementation of the Upper Layer state diagram: 13 states
//! (Sta1..Sta13) driven by 19 labelled events (Evt1..Evt19), each
//! `(state, event)` cell yielding zero or one action plus a next state
//! (spec.md §4.3, PS3.8 section 9.2). The teacher's simplified `ul` crate
//! only exposes the negotiate-once request/response helpers in
//! `association/{client,server}.rs`; this module supplies the explicit
//! table those helpers previously left implicit, grounded on the same
//! PDU vocabulary as `pdu::reader`/`pdu::writer`.

use snafu::Snafu;

/// The thirteen states of the UL state machine (PS3.8 section 9.2).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum State {
    /// Sta1: idle.
    Sta1,
    /// Sta2: transport connection open, awaiting A-ASSOCIATE-RQ PDU.
    Sta2,
    /// Sta3: awaiting local A-ASSOCIATE response primitive.
    Sta3,
    /// Sta4: awaiting transport connection opening to complete.
    Sta4,
    /// Sta5: awaiting A-ASSOCIATE-AC or -RJ PDU.
    Sta5,
    /// Sta6: association established.
    Sta6,
    /// Sta7: awaiting A-RELEASE-RP PDU.
    Sta7,
    /// Sta8: awaiting local A-RELEASE response primitive.
    Sta8,
    /// Sta9: release collision requestor, awaiting local A-RELEASE response.
    Sta9,
    /// Sta10: release collision acceptor, awaiting A-RELEASE-RP PDU.
    Sta10,
    /// Sta11: release collision requestor, awaiting A-RELEASE-RP PDU.
    Sta11,
    /// Sta12: release collision acceptor, awaiting local A-RELEASE response.
    Sta12,
    /// Sta13: awaiting transport connection close.
    Sta13,
}

/// The nineteen events of the UL state machine (PS3.8 section 9.2).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Event {
    /// Evt1: A-ASSOCIATE request (local user).
    Evt1,
    /// Evt2: transport connection confirmation (local transport).
    Evt2,
    /// Evt3: A-ASSOCIATE-AC PDU received.
    Evt3,
    /// Evt4: A-ASSOCIATE-RJ PDU received.
    Evt4,
    /// Evt5: transport connection indication (local transport).
    Evt5,
    /// Evt6: A-ASSOCIATE-RQ PDU received.
    Evt6,
    /// Evt7: A-ASSOCIATE response primitive (accept, local user).
    Evt7,
    /// Evt8: A-ASSOCIATE response primitive (reject, local user).
    Evt8,
    /// Evt9: P-DATA request primitive (local user).
    Evt9,
    /// Evt10: P-DATA-TF PDU received.
    Evt10,
    /// Evt11: A-RELEASE request primitive (local user).
    Evt11,
    /// Evt12: A-RELEASE-RQ PDU received.
    Evt12,
    /// Evt13: A-RELEASE-RP PDU received.
    Evt13,
    /// Evt14: A-RELEASE response primitive (local user).
    Evt14,
    /// Evt15: A-ABORT request primitive (local user).
    Evt15,
    /// Evt16: A-ABORT PDU received.
    Evt16,
    /// Evt17: transport connection closed (local transport).
    Evt17,
    /// Evt18: ARTIM timer expired.
    Evt18,
    /// Evt19: an unrecognized or invalid PDU was received.
    Evt19,
}

/// Actions produced by the state machine (PS3.8 section 9.2, AE/AA/AR prefixes).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Action {
    /// AE-1: issue transport connect request.
    IssueTransportConnect,
    /// AE-2: send A-ASSOCIATE-RQ PDU.
    SendAssociateRq,
    /// AE-3: issue A-ASSOCIATE confirmation (accept) to the user.
    ConfirmAssociateAccept,
    /// AE-4: issue A-ASSOCIATE confirmation (reject) to the user.
    ConfirmAssociateReject,
    /// AE-5: issue transport connection response.
    IssueTransportResponse,
    /// AE-6: stop ARTIM, issue A-ASSOCIATE indication or reject and close.
    IndicateAssociateOrReject,
    /// AE-7: send A-ASSOCIATE-AC PDU.
    SendAssociateAc,
    /// AE-8: send A-ASSOCIATE-RJ PDU.
    SendAssociateRj,
    /// DT-1: send P-DATA-TF PDU.
    SendPData,
    /// DT-2: issue P-DATA indication to the user.
    IndicatePData,
    /// AR-1: send A-RELEASE-RQ PDU.
    SendReleaseRq,
    /// AR-2: issue A-RELEASE indication to the user.
    IndicateRelease,
    /// AR-3: issue A-RELEASE confirmation, close transport.
    ConfirmReleaseAndClose,
    /// AR-4: send A-RELEASE-RP PDU.
    SendReleaseRp,
    /// AR-5: stop ARTIM.
    StopArtim,
    /// AR-6: issue P-DATA indication (release collision).
    IndicatePDataDuringRelease,
    /// AR-7: issue P-DATA request (release collision).
    RequestPDataDuringRelease,
    /// AR-8: issue A-RELEASE indication (release collision).
    IndicateReleaseCollision,
    /// AR-9: send A-RELEASE-RP PDU (release collision, acceptor).
    SendReleaseRpCollision,
    /// AR-10: issue A-RELEASE confirmation (release collision, requestor).
    ConfirmReleaseCollision,
    /// AA-1: send A-ABORT PDU, start ARTIM.
    SendAbort,
    /// AA-2: stop ARTIM, close transport.
    StopArtimAndClose,
    /// AA-3: issue A-ABORT indication, close transport.
    IndicateAbortAndClose,
    /// AA-4: issue A-ABORT indication.
    IndicateAbort,
    /// AA-5: stop ARTIM.
    StopArtimOnAbort,
    /// AA-6: ignore PDU.
    Ignore,
    /// AA-7: send A-ABORT PDU.
    SendAbortOnInvalid,
    /// AA-8: send A-ABORT PDU (unrecognized/invalid PDU), issue indication, start ARTIM.
    SendAbortOnUnrecognized,
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("event {:?} is not valid in state {:?}", event, state))]
    InvalidTransition { state: State, event: Event },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The UL association control state machine.
///
/// `step` looks up the `(state, event)` cell and returns the action to
/// perform (if any) together with the next state. Invalid PDUs in any
/// state cause an abort with reason "unexpected PDU" (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct Fsm {
    state: State,
}

impl Default for Fsm {
    fn default() -> Self {
        Fsm { state: State::Sta1 }
    }
}

impl Fsm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the machine already in the established state (Sta6), for
    /// wiring into association code whose negotiation happens outside this
    /// module (`association::client`/`association::server` each run their
    /// own request/response exchange before an `Fsm` is constructed).
    pub fn established() -> Self {
        Fsm { state: State::Sta6 }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Drive the state machine with one event, returning the action to
    /// take (if any) and transitioning to the next state.
    pub fn step(&mut self, event: Event) -> Result<Option<Action>> {
        use Action::*;
        use Event::*;
        use State::*;

        let (action, next) = match (self.state, event) {
            // requestor side: idle -> connecting -> awaiting AC/RJ
            (Sta1, Evt1) => (Some(IssueTransportConnect), Sta4),
            (Sta4, Evt2) => (Some(SendAssociateRq), Sta5),
            (Sta5, Evt3) => (Some(ConfirmAssociateAccept), Sta6),
            (Sta5, Evt4) => (Some(ConfirmAssociateReject), Sta13),

            // acceptor side: idle -> connected -> awaiting local response
            (Sta1, Evt5) => (Some(IssueTransportResponse), Sta2),
            (Sta2, Evt6) => (Some(IndicateAssociateOrReject), Sta3),
            (Sta3, Evt7) => (Some(SendAssociateAc), Sta6),
            (Sta3, Evt8) => (Some(SendAssociateRj), Sta13),

            // data transfer, established state
            (Sta6, Evt9) => (Some(SendPData), Sta6),
            (Sta6, Evt10) => (Some(IndicatePData), Sta6),

            // release, requestor-initiated
            (Sta6, Evt11) => (Some(SendReleaseRq), Sta7),
            (Sta7, Evt13) => (Some(ConfirmReleaseAndClose), Sta1),
            // release collision: requestor receives RQ while awaiting RP
            (Sta7, Evt12) => (Some(IndicateReleaseCollision), Sta9),
            (Sta9, Evt14) => (Some(SendReleaseRpCollision), Sta11),
            (Sta11, Evt13) => (Some(ConfirmReleaseCollision), Sta1),

            // release, acceptor-initiated
            (Sta6, Evt12) => (Some(IndicateRelease), Sta8),
            (Sta8, Evt14) => (Some(SendReleaseRp), Sta1),
            // release collision: acceptor sends RQ, receives peer's RQ first
            (Sta8, Evt12) => (Some(IndicateReleaseCollision), Sta10),
            (Sta10, Evt14) => (Some(SendReleaseRpCollision), Sta12),
            (Sta12, Evt13) => (Some(ConfirmReleaseCollision), Sta1),

            // abort, any state except Sta1/Sta13 may originate locally
            (s, Evt15) if s != Sta1 && s != Sta13 => (Some(SendAbort), Sta13),
            // abort received from peer: indicate and close, except Sta13 just stops the timer
            (Sta13, Evt16) => (Some(StopArtimAndClose), Sta1),
            (s, Evt16) if s != Sta1 => (Some(IndicateAbortAndClose), Sta1),

            // transport closed
            (Sta13, Evt17) => (Some(StopArtim), Sta1),
            (s, Evt17) if s != Sta1 => (Some(IndicateAbort), Sta1),

            // ARTIM expiry only matters while awaiting cleanup
            (Sta13, Evt18) => (Some(StopArtimOnAbort), Sta1),

            // unrecognized or invalid PDU in any active state aborts
            (s, Evt19) if s != Sta1 && s != Sta13 => (Some(SendAbortOnUnrecognized), Sta13),
            (Sta13, Evt19) => (Some(Ignore), Sta13),

            (state, event) => return InvalidTransitionSnafu { state, event }.fail(),
        };

        self.state = next;
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requestor_happy_path_reaches_established() {
        let mut fsm = Fsm::new();
        assert_eq!(fsm.step(Event::Evt1).unwrap(), Some(Action::IssueTransportConnect));
        assert_eq!(fsm.state(), State::Sta4);
        assert_eq!(fsm.step(Event::Evt2).unwrap(), Some(Action::SendAssociateRq));
        assert_eq!(fsm.state(), State::Sta5);
        assert_eq!(fsm.step(Event::Evt3).unwrap(), Some(Action::ConfirmAssociateAccept));
        assert_eq!(fsm.state(), State::Sta6);
    }

    #[test]
    fn rejection_path_reaches_sta13() {
        let mut fsm = Fsm::new();
        fsm.step(Event::Evt1).unwrap();
        fsm.step(Event::Evt2).unwrap();
        assert_eq!(fsm.step(Event::Evt4).unwrap(), Some(Action::ConfirmAssociateReject));
        assert_eq!(fsm.state(), State::Sta13);
    }

    #[test]
    fn abort_from_established_state() {
        let mut fsm = Fsm::new();
        fsm.step(Event::Evt1).unwrap();
        fsm.step(Event::Evt2).unwrap();
        fsm.step(Event::Evt3).unwrap();
        assert_eq!(fsm.step(Event::Evt15).unwrap(), Some(Action::SendAbort));
        assert_eq!(fsm.state(), State::Sta13);
    }

    #[test]
    fn invalid_event_is_rejected() {
        let mut fsm = Fsm::new();
        let err = fsm.step(Event::Evt10).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { state: State::Sta1, event: Event::Evt10 }));
    }

    #[test]
    fn established_constructor_starts_at_sta6() {
        let fsm = Fsm::established();
        assert_eq!(fsm.state(), State::Sta6);
    }

    #[test]
    fn release_collision_requestor_side() {
        let mut fsm = Fsm::new();
        fsm.step(Event::Evt1).unwrap();
        fsm.step(Event::Evt2).unwrap();
        fsm.step(Event::Evt3).unwrap();
        fsm.step(Event::Evt11).unwrap();
        assert_eq!(fsm.state(), State::Sta7);
        assert_eq!(fsm.step(Event::Evt12).unwrap(), Some(Action::IndicateReleaseCollision));
        assert_eq!(fsm.state(), State::Sta9);
        assert_eq!(fsm.step(Event::Evt14).unwrap(), Some(Action::SendReleaseRpCollision));
        assert_eq!(fsm.state(), State::Sta11);
        assert_eq!(fsm.step(Event::Evt13).unwrap(), Some(Action::ConfirmReleaseCollision));
        assert_eq!(fsm.state(), State::Sta1);
    }
}
