//! Remote service API types
//!
//! This library defines the data exchanged with the remote service layer:
//! - ServiceChannelSpec: validated per-service channel settings
//! - CallRequest / CallResult: the public call contract

pub mod spec;
pub mod call;

pub use spec::{ServiceChannelSpec, Protocol, ClientKind};
pub use call::{CallRequest, CallResult, HttpMethod};
