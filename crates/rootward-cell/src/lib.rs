#![forbid(unsafe_code)]

//! Observable value cells for Rootward.
//!
//! This crate provides:
//! - [`ValueCell`] for a single mutable value with equality-gated change
//!   notification and a version counter
//! - [`Subscription`] as the RAII guard that detaches a listener on drop
//!
//! A cell is exclusively written by one owner and observed by any number of
//! subscribers on the same thread. Scope chains index cells by identity,
//! which is why [`ValueCell::same_cell`] exists alongside value equality.

pub mod cell;

pub use cell::{Subscription, ValueCell};
