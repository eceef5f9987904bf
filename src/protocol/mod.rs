//! Protocol module for decoding payloads and building commands.
//!
//! This module contains the implementations for:
//! - Fixed-width field decoding
//! - The characteristic and command catalog
//! - Characteristic payload decoding

pub mod catalog;
pub mod codec;
pub mod decoder;

pub use catalog::{AlertMode, CharacteristicId, MonitorCommand};
pub use codec::{decode_timestamp, decode_u32_le};
pub use decoder::decode;
