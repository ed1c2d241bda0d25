//! # Pulse Proto
//!
//! Wire message and ring slot definitions.
//!
//! All wire structures use fixed-size little-endian layouts so frames can be
//! decoded with a plain byte copy and no per-message branching.

#![no_std]

pub mod messages;

pub use messages::{FeedSlot, Message, Side, Slot, CACHE_LINE, WIRE_SIZE};
