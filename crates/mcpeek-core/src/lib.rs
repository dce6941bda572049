//! Core types and error definitions for mcpeek.
//!
//! This crate holds the vocabulary shared by the connection layer and the
//! CLI: the unified error type, the cancellation scope every suspension point
//! observes, and the descriptor / capability / report data model.
//!
//! # Main types
//!
//! - [`McpeekError`]: unified error enum.
//! - [`McpeekResult`]: convenience alias for `Result<T, McpeekError>`.
//! - [`CancelScope`]: cancellation token plus optional deadline.
//! - [`TransportDescriptor`]: how to reach one MCP server.
//! - [`CapabilitySet`]: tools, resources and roots listed by one server.
//! - [`InspectionReport`]: ordered per-server results of an inspection run.

pub mod cancel;
pub mod capability;
pub mod descriptor;
pub mod error;
pub mod report;

pub use cancel::CancelScope;
pub use capability::{
    CapabilityKind, CapabilitySet, ResourceDescriptor, RootDescriptor, ToolDescriptor,
};
pub use descriptor::{TransportDescriptor, TransportKind};
pub use error::{BoxError, McpeekError, McpeekResult};
pub use report::{
    ConnectionFailure, FailureKind, InspectionOutcome, InspectionReport, ReportEntry,
};
