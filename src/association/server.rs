//! Association acceptor module
//!
//! The module provides an abstraction for a DICOM association
//! in which this application entity listens to incoming association requests.
//! See [`ServerAssociationOptions`]
//! for details and examples on how to create an association.
use std::borrow::Cow;
use std::net::TcpStream;
use std::time::Duration;

use snafu::{ensure, ResultExt, Snafu};

use crate::acse::{Action, Event, Fsm};
use crate::pdu::{
    reader::read_pdu, writer::write_pdu, AbortRQServiceProviderReason, AbortRQSource,
    AssociationRJResult, AssociationRJServiceUserReason, AssociationRJSource, Pdu,
    PresentationContextResult, PresentationContextResultReason, RoleSelection, UserIdentity,
    UserVariableItem, DEFAULT_MAX_PDU,
};
use crate::transport::{TcpTransport, Transport};
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

use super::scp::choose_supported;
use super::uid::trim_uid;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// no abstract syntax was offered for negotiation
    MissingAbstractSyntax,

    /// the calling node's request was rejected
    Rejected {
        association_result: AssociationRJResult,
        association_source: AssociationRJSource,
    },

    /// association aborted by the requesting node
    Aborted,

    #[snafu(display("unexpected request `{:?}`", pdu))]
    #[non_exhaustive]
    UnexpectedRequest {
        /// the PDU obtained from the calling node
        pdu: Pdu,
    },

    #[snafu(display("unknown request `{:?}`", pdu))]
    #[non_exhaustive]
    UnknownRequest {
        /// the PDU obtained from the calling node, of variant Unknown
        pdu: Pdu,
    },

    /// failed to send PDU message
    Send { source: crate::pdu::writer::Error },

    /// failed to receive PDU message
    Receive { source: crate::pdu::reader::Error },

    /// transport error while setting the read timeout
    #[non_exhaustive]
    Transport { source: crate::transport::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A single accorded presentation context, as negotiated by the acceptor.
#[derive(Debug, Clone)]
pub struct PresentationContextNegotiated {
    pub id: u8,
    pub reason: PresentationContextResultReason,
    pub abstract_syntax: String,
    pub transfer_syntax: String,
}

/// Common interface for application entity access control policies.
///
/// Existing implementations include [`AcceptAny`] and [`AcceptCalledAeTitle`],
/// but users are free to implement their own.
pub trait AccessControl {
    /// Obtain the decision of whether to accept an incoming association request
    /// based on the recorded application entity titles and/or user identity.
    ///
    /// Returns `Ok(())` if the requesting node should be given clearance.
    /// Otherwise, a concrete association RJ service user reason is given.
    fn check_access(
        &self,
        this_ae_title: &str,
        calling_ae_title: &str,
        called_ae_title: &str,
        user_identity: Option<&UserIdentity>,
    ) -> std::result::Result<(), AssociationRJServiceUserReason>;
}

/// An access control rule that accepts any incoming association request.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AcceptAny;

impl AccessControl for AcceptAny {
    fn check_access(
        &self,
        _this_ae_title: &str,
        _calling_ae_title: &str,
        _called_ae_title: &str,
        _user_identity: Option<&UserIdentity>,
    ) -> std::result::Result<(), AssociationRJServiceUserReason> {
        Ok(())
    }
}

/// An access control rule that accepts association requests
/// whose called AE title matches this node's AE title.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AcceptCalledAeTitle;

impl AccessControl for AcceptCalledAeTitle {
    fn check_access(
        &self,
        this_ae_title: &str,
        _calling_ae_title: &str,
        called_ae_title: &str,
        _user_identity: Option<&UserIdentity>,
    ) -> std::result::Result<(), AssociationRJServiceUserReason> {
        if this_ae_title == called_ae_title {
            Ok(())
        } else {
            Err(AssociationRJServiceUserReason::CalledAETitleNotRecognized)
        }
    }
}

/// A DICOM association builder for an acceptor DICOM node,
/// often taking the role of a service class provider (SCP).
///
/// This is the standard way of negotiating and establishing
/// an association with a requesting node.
/// The outcome is a [`ServerAssociation`].
/// Unlike [`ClientAssociationOptions`],
/// a value of this type can be reused for multiple connections.
///
/// [`ClientAssociationOptions`]: crate::association::client::ClientAssociationOptions
///
/// The SCP will by default accept all transfer syntaxes
/// supported by the main [transfer syntax registry][1],
/// unless one or more transfer syntaxes are explicitly indicated
/// through calls to [`with_transfer_syntax`][2].
///
/// Access control logic is also available,
/// enabling application entities to decide on
/// whether to accept or reject the association request
/// based on the _called_ and _calling_ AE titles.
///
/// - By default, the application will accept requests from anyone
///   ([`AcceptAny`])
/// - To only accept requests with a matching _called_ AE title,
///   add a call to [`accept_called_ae_title`][3] ([`AcceptCalledAeTitle`])
/// - Any other policy can be implemented through the [`AccessControl`] trait.
///
/// [1]: dicom_transfer_syntax_registry
/// [2]: ServerAssociationOptions::with_transfer_syntax
/// [3]: ServerAssociationOptions::accept_called_ae_title
///
/// # Example
///
/// ```no_run
/// # use std::net::TcpListener;
/// # use dicom_ul::association::server::ServerAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// # let tcp_listener: TcpListener = unimplemented!();
/// let scp_options = ServerAssociationOptions::new()
///    .with_abstract_syntax("1.2.840.10008.1.1")
///    .with_transfer_syntax("1.2.840.10008.1.2.1");
///
/// let (stream, _address) = tcp_listener.accept()?;
/// scp_options.establish(stream)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ServerAssociationOptions<'a, A> {
    /// the application entity access control policy
    ae_access_control: A,
    /// the AE title of this DICOM node
    ae_title: Cow<'a, str>,
    /// the requested application context name
    application_context_name: Cow<'a, str>,
    /// the list of supported abstract syntaxes
    abstract_syntax_uids: Vec<Cow<'a, str>>,
    /// the list of supported transfer syntaxes
    transfer_syntax_uids: Vec<Cow<'a, str>>,
    /// the expected protocol version
    protocol_version: u16,
    /// the maximum PDU length this node is willing to receive
    max_pdu_length: u32,
    /// whether to accept abstract syntaxes outside of the supported list
    promiscuous: bool,
}

impl Default for ServerAssociationOptions<'_, AcceptAny> {
    fn default() -> Self {
        ServerAssociationOptions {
            ae_access_control: AcceptAny,
            ae_title: "THIS-SCP".into(),
            application_context_name: "1.2.840.10008.3.1.1.1".into(),
            abstract_syntax_uids: Vec::new(),
            transfer_syntax_uids: Vec::new(),
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            promiscuous: false,
        }
    }
}

impl ServerAssociationOptions<'_, AcceptAny> {
    /// Create a new set of options for establishing an association.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a, A> ServerAssociationOptions<'a, A>
where
    A: AccessControl,
{
    /// Change the access control policy to accept any association
    /// regardless of the specified AE titles.
    ///
    /// This is the default behavior when the options are first created.
    pub fn accept_any(self) -> ServerAssociationOptions<'a, AcceptAny> {
        self.ae_access_control(AcceptAny)
    }

    /// Change the access control policy to accept an association
    /// if the called AE title matches this node's AE title.
    pub fn accept_called_ae_title(self) -> ServerAssociationOptions<'a, AcceptCalledAeTitle> {
        self.ae_access_control(AcceptCalledAeTitle)
    }

    /// Change the access control policy.
    pub fn ae_access_control<P>(self, access_control: P) -> ServerAssociationOptions<'a, P>
    where
        P: AccessControl,
    {
        let ServerAssociationOptions {
            ae_title,
            application_context_name,
            abstract_syntax_uids,
            transfer_syntax_uids,
            protocol_version,
            max_pdu_length,
            promiscuous,
            ae_access_control: _,
        } = self;

        ServerAssociationOptions {
            ae_access_control: access_control,
            ae_title,
            application_context_name,
            abstract_syntax_uids,
            transfer_syntax_uids,
            protocol_version,
            max_pdu_length,
            promiscuous,
        }
    }

    /// Define the application entity title referring to this DICOM node.
    ///
    /// The default is `THIS-SCP`.
    pub fn ae_title<T>(mut self, ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.ae_title = ae_title.into();
        self
    }

    /// Include this abstract syntax in the list of supported presentation contexts.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.abstract_syntax_uids
            .push(trim_uid(abstract_syntax_uid.into()));
        self
    }

    /// Include this transfer syntax in the list of accepted transfer syntaxes.
    pub fn with_transfer_syntax<T>(mut self, transfer_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.transfer_syntax_uids
            .push(trim_uid(transfer_syntax_uid.into()));
        self
    }

    /// Override the maximum PDU length this node is willing to receive.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override promiscuous mode: whether to accept abstract syntaxes
    /// that were not explicitly registered.
    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    /// Process an incoming association request PDU.
    ///
    /// On success, returns the A-ASSOCIATE-AC to send back
    /// together with the negotiated presentation contexts,
    /// the peer's reported maximum PDU length, user variables and AE title.
    /// On failure, returns the PDU to send back (RJ or abort) and the error.
    #[allow(clippy::type_complexity)]
    fn negotiate(
        &self,
        msg: Pdu,
    ) -> std::result::Result<
        (
            Pdu,
            Vec<PresentationContextNegotiated>,
            Vec<UserVariableItem>,
            u32,
            String,
        ),
        (Pdu, Error),
    > {
        let (
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        ) = match msg {
            Pdu::AssociationRQ {
                protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name,
                presentation_contexts,
                user_variables,
            } => (
                protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name,
                presentation_contexts,
                user_variables,
            ),
            Pdu::ReleaseRQ => {
                return Err((Pdu::ReleaseRP, AbortedSnafu.build()));
            }
            pdu @ Pdu::AssociationAC { .. }
            | pdu @ Pdu::AssociationRJ { .. }
            | pdu @ Pdu::PData { .. }
            | pdu @ Pdu::ReleaseRP
            | pdu @ Pdu::AbortRQ { .. } => {
                return Err((
                    Pdu::AbortRQ {
                        source: AbortRQSource::ServiceProvider(
                            AbortRQServiceProviderReason::UnexpectedPDU,
                        ),
                    },
                    UnexpectedRequestSnafu { pdu }.build(),
                ));
            }
            pdu @ Pdu::Unknown { .. } => {
                return Err((
                    Pdu::AbortRQ {
                        source: AbortRQSource::ServiceProvider(
                            AbortRQServiceProviderReason::ReasonNotSpecifiedUnrecognizedPDU,
                        ),
                    },
                    UnknownRequestSnafu { pdu }.build(),
                ));
            }
        };

        if protocol_version != self.protocol_version {
            let association_rj = crate::pdu::Pdu::AssociationRJ {
                result: AssociationRJResult::Permanent,
                source: AssociationRJSource::ServiceProviderASCE(
                    crate::pdu::AssociationRJServiceProviderASCEReason::ProtocolVersionNotSupported,
                ),
            };
            let (result, source) = match &association_rj {
                Pdu::AssociationRJ { result, source } => (result.clone(), source.clone()),
                _ => unreachable!(),
            };
            return Err((
                association_rj,
                RejectedSnafu {
                    association_result: result,
                    association_source: source,
                }
                .build(),
            ));
        }

        if application_context_name != self.application_context_name {
            let result = AssociationRJResult::Permanent;
            let source = AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
            );
            return Err((
                Pdu::AssociationRJ {
                    result: result.clone(),
                    source: source.clone(),
                },
                RejectedSnafu {
                    association_result: result,
                    association_source: source,
                }
                .build(),
            ));
        }

        let user_identity = user_variables.iter().find_map(|item| match item {
            UserVariableItem::UserIdentity(identity) => Some(identity),
            _ => None,
        });

        if let Err(reason) = self.ae_access_control.check_access(
            &self.ae_title,
            &calling_ae_title,
            &called_ae_title,
            user_identity,
        ) {
            let result = AssociationRJResult::Permanent;
            let source = AssociationRJSource::ServiceUser(reason);
            return Err((
                Pdu::AssociationRJ {
                    result: result.clone(),
                    source: source.clone(),
                },
                RejectedSnafu {
                    association_result: result,
                    association_source: source,
                }
                .build(),
            ));
        }

        let peer_max_pdu_length = user_variables
            .iter()
            .find_map(|item| match item {
                UserVariableItem::MaxLength(len) => Some(*len),
                _ => None,
            })
            .unwrap_or(DEFAULT_MAX_PDU);
        // treat 0 as practically unlimited
        let peer_max_pdu_length = if peer_max_pdu_length == 0 {
            u32::MAX
        } else {
            peer_max_pdu_length
        };

        let presentation_contexts_negotiated: Vec<_> = presentation_contexts
            .into_iter()
            .map(|pc| {
                let abstract_syntax = trim_uid(Cow::from(pc.abstract_syntax)).into_owned();
                if !self.promiscuous
                    && !self
                        .abstract_syntax_uids
                        .iter()
                        .any(|uid| uid.as_ref() == abstract_syntax)
                {
                    return PresentationContextNegotiated {
                        id: pc.id,
                        reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
                        transfer_syntax: "1.2.840.10008.1.2".to_string(),
                        abstract_syntax,
                    };
                }

                let (transfer_syntax, reason) = self
                    .choose_ts(pc.transfer_syntaxes)
                    .map(|ts| (ts, PresentationContextResultReason::Acceptance))
                    .unwrap_or_else(|| {
                        (
                            "1.2.840.10008.1.2".to_string(),
                            PresentationContextResultReason::TransferSyntaxesNotSupported,
                        )
                    });

                PresentationContextNegotiated {
                    id: pc.id,
                    reason,
                    transfer_syntax,
                    abstract_syntax,
                }
            })
            .collect();

        let pdu = Pdu::AssociationAC {
            protocol_version: self.protocol_version,
            application_context_name,
            presentation_contexts: presentation_contexts_negotiated
                .iter()
                .map(|pc| PresentationContextResult {
                    id: pc.id,
                    reason: pc.reason.clone(),
                    transfer_syntax: pc.transfer_syntax.clone(),
                })
                .collect(),
            user_variables: vec![
                UserVariableItem::MaxLength(self.max_pdu_length),
                UserVariableItem::ImplementationClassUID(IMPLEMENTATION_CLASS_UID.to_string()),
                UserVariableItem::ImplementationVersionName(
                    IMPLEMENTATION_VERSION_NAME.to_string(),
                ),
            ],
        };

        Ok((
            pdu,
            presentation_contexts_negotiated,
            user_variables,
            peer_max_pdu_length,
            calling_ae_title,
        ))
    }

    /// Negotiate an association with the given TCP stream.
    pub fn establish(&self, stream: TcpStream) -> Result<ServerAssociation> {
        ensure!(
            !self.abstract_syntax_uids.is_empty() || self.promiscuous,
            MissingAbstractSyntaxSnafu
        );

        let mut socket = TcpTransport::new(stream);
        let msg = read_pdu(socket.inner_mut(), self.max_pdu_length).context(ReceiveSnafu)?;

        match self.negotiate(msg) {
            Ok((pdu, presentation_contexts, user_variables, peer_max_pdu_length, peer_ae_title)) => {
                write_pdu(socket.inner_mut(), &pdu).context(SendSnafu)?;
                Ok(ServerAssociation {
                    presentation_contexts,
                    peer_max_pdu_length,
                    max_pdu_length: self.max_pdu_length,
                    peer_ae_title,
                    user_variables,
                    socket,
                })
            }
            Err((pdu, err)) => {
                let _ = write_pdu(socket.inner_mut(), &pdu);
                Err(err)
            }
        }
    }

    /// From a sequence of transfer syntaxes,
    /// choose the first transfer syntax to
    /// - be on the options' list of transfer syntaxes, and
    /// - be supported by the main transfer syntax registry.
    ///
    /// If the options' list is empty,
    /// accept the first transfer syntax supported.
    fn choose_ts<I, T>(&self, it: I) -> Option<T>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        if self.transfer_syntax_uids.is_empty() {
            return choose_supported(it);
        }

        it.into_iter().find(|ts| {
            let ts_trimmed = trim_uid(Cow::from(ts.as_ref()));
            self.transfer_syntax_uids
                .iter()
                .any(|uid| uid.as_ref() == ts_trimmed.as_ref())
                && super::scp::is_supported(&ts_trimmed)
        })
    }
}

/// A DICOM upper level association from the perspective
/// of an accepting application entity.
///
/// When the value falls out of scope,
/// the program will shut down the underlying TCP connection.
#[derive(Debug)]
pub struct ServerAssociation {
    /// The accorded presentation contexts
    presentation_contexts: Vec<PresentationContextNegotiated>,
    /// The maximum PDU length that the calling node accepts
    peer_max_pdu_length: u32,
    /// The maximum PDU length that this node is expecting to receive
    max_pdu_length: u32,
    /// The calling node's application entity title
    peer_ae_title: String,
    /// User variables received from the peer
    user_variables: Vec<UserVariableItem>,
    /// The transport to the other DICOM node
    socket: TcpTransport,
}

impl ServerAssociation {
    /// Obtain a view of the negotiated presentation contexts.
    pub fn presentation_contexts(&self) -> &[PresentationContextNegotiated] {
        &self.presentation_contexts
    }

    /// Retrieve the maximum PDU length that the calling node accepts.
    pub fn peer_max_pdu_length(&self) -> u32 {
        self.peer_max_pdu_length
    }

    /// Retrieve the maximum PDU length this node is expecting to receive.
    pub fn max_pdu_length(&self) -> u32 {
        self.max_pdu_length
    }

    /// Obtain the calling node's application entity title.
    pub fn peer_ae_title(&self) -> &str {
        &self.peer_ae_title
    }

    /// Obtain the user variables sent by the calling node.
    pub fn user_variables(&self) -> &[UserVariableItem] {
        &self.user_variables
    }

    /// Look up the calling node's proposed SCU/SCP role for `abstract_syntax`
    /// via Role Selection (PS3.7 D.3.3.4), if it negotiated one.
    pub fn role_selection(&self, abstract_syntax: &str) -> Option<(bool, bool)> {
        self.user_variables.iter().find_map(|item| match item {
            UserVariableItem::RoleSelection(RoleSelection { abstract_syntax: uid, scu_role, scp_role })
                if uid == abstract_syntax =>
            {
                Some((*scu_role, *scp_role))
            }
            _ => None,
        })
    }

    /// Send a PDU message to the other intervenient.
    pub fn send(&mut self, msg: &Pdu) -> Result<()> {
        write_pdu(self.socket.inner_mut(), msg).context(SendSnafu)
    }

    /// Read a PDU message from the other intervenient.
    pub fn receive(&mut self) -> Result<Pdu> {
        read_pdu(self.socket.inner_mut(), self.max_pdu_length).context(ReceiveSnafu)
    }

    /// Set (or clear) the transport's read timeout.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).context(TransportSnafu)
    }

    /// Gracefully release the association in response to an A-RELEASE-RQ,
    /// driving the ACSE state machine through Sta6 -> Sta8 -> Sta1 (PS3.8
    /// section 9.2).
    pub fn release(&mut self) -> Result<()> {
        let mut fsm = Fsm::established();
        let _ = fsm.step(Event::Evt12);
        if let Ok(Some(Action::SendReleaseRp)) = fsm.step(Event::Evt14) {
            write_pdu(self.socket.inner_mut(), &Pdu::ReleaseRP).context(SendSnafu)?;
        }
        let _ = self.socket.close();
        Ok(())
    }

    /// Abort the association, notifying the other node of the reason.
    pub fn abort(&mut self, reason: AbortRQServiceProviderReason) -> Result<()> {
        write_pdu(
            self.socket.inner_mut(),
            &Pdu::AbortRQ {
                source: AbortRQSource::ServiceProvider(reason),
            },
        )
        .context(SendSnafu)?;
        let _ = self.socket.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_called_ae_title() {
        let options = ServerAssociationOptions::new()
            .accept_called_ae_title()
            .ae_title("THIS-SCP")
            .with_abstract_syntax("1.2.840.10008.1.1")
            .with_transfer_syntax("1.2.840.10008.1.2");

        let rq = Pdu::AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "SOME-SCU".to_string(),
            called_ae_title: "WRONG-SCP".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![],
            user_variables: vec![],
        };

        let err = options.negotiate(rq).unwrap_err();
        match err.1 {
            Error::Rejected {
                association_source:
                    AssociationRJSource::ServiceUser(
                        AssociationRJServiceUserReason::CalledAETitleNotRecognized,
                    ),
                ..
            } => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
