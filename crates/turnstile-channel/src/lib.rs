//! # Turnstile Channel
//!
//! The external collaborators of the subscription lifecycle: the messaging
//! transport and the restricted channel's membership control.
//!
//! ## Overview
//!
//! The lifecycle engine never talks to a messaging platform directly. It
//! goes through two traits:
//!
//! - [`ChannelControl`] - single-use invitations and membership revocation
//! - [`Messenger`] - messages with menus, invoices, pre-checkout answers
//!
//! Inbound platform events are modelled by [`InboundEvent`].
//!
//! ## Time Bounds
//!
//! No collaborator call may block indefinitely. Wrap each one in
//! [`bounded`]; an expired bound is a transient [`ChannelError::Timeout`].
//!
//! ## Testing
//!
//! [`MemoryChannel`] and [`MemoryMessenger`] record every call and accept
//! injected failures and latency.

pub mod error;
pub mod messages;
pub mod transport;

pub use error::{ChannelError, Result};
pub use messages::{
    Button, ButtonAction, InboundEvent, Invoice, LabeledPrice, Menu, OutboundMessage,
    PreCheckoutVerdict,
};
pub use transport::memory::{IssuedInvite, MemoryChannel, MemoryMessenger, Revocation};
pub use transport::{bounded, ChannelControl, Messenger};
