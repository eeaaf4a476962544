//! This crates contains the types and methods needed to interact
//! with DICOM nodes through the upper layer protocol.
//!
//! This crate can be used as a base
//! for finite-state machines and higher-level helpers,
//! enabling the creation of concrete service class users (SCUs)
//! and service class providers (SCPs).
//!
//! - The [`address`] module
//!   provides an abstraction for working with compound addresses
//!   referring to application entities in a network.
//! - The [`pdu`] module
//!   provides data structures representing _protocol data units_,
//!   which are passed around as part of the DICOM network communication support.
//! - The [`association`] module
//!   comprises abstractions for establishing and negotiating associations
//!   between application entities,
//!   via the upper layer protocol by TCP.
//! - The [`acse`] module exposes the full Upper Layer state machine as an
//!   explicit state/event table (PS3.8 section 9.2). [`association::client`]
//!   and [`association::server`] drive it for release/release-collision
//!   handling once an association reaches the established state; the initial
//!   negotiate-once request/response exchange they perform is not yet
//!   re-expressed through the table.
//! - The [`dimse`] module fragments and reassembles DIMSE messages on top
//!   of an association, and the [`service`] module implements the DIMSE
//!   service classes (Verification, Storage, Query/Retrieve, N-services)
//!   in terms of it.
//! - The [`event`] module provides the notification/intervention event bus
//!   through which DIMSE service handlers observe and influence an
//!   association's behavior, and [`listener`] accepts incoming
//!   connections and spawns acceptor associations to serve them.

pub mod acse;
pub mod address;
pub mod association;
pub mod dimse;
pub mod error;
pub mod event;
pub mod listener;
pub mod pcontext;
pub mod pdu;
pub mod service;
pub mod transport;

/// The current implementation class UID generically referring to DICOM-rs.
///
/// Automatically generated as per the standard, part 5, section B.2.
///
/// This UID may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.156227610253341005307660858504280353500";

/// The current implementation version name generically referring to DICOM-rs.
///
/// This name may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_VERSION_NAME: &str = "DICOM-rs 0.8.0";

// re-exports

pub use address::{AeAddr, FullAeAddr};
pub use error::{DicomUlError, Result};
pub use association::client::{ClientAssociation, ClientAssociationOptions};
pub use association::server::{ServerAssociation, ServerAssociationOptions};
pub use pdu::read_pdu;
pub use pdu::write_pdu;
pub use pdu::Pdu;
