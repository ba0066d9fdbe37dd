//! dispatch-protocol
//!
//! Wire-level encoding/decoding for the dispatch service.
//!
//! This crate turns WebSocket text frames into logical requests
//! (`dispatch_core::Request`) and logical output
//! (`dispatch_core::OutputMessage`) back into frames.
//!
//! - [`wire_types`] : envelope field names
//! - [`json_codec`] : JSON envelope codec

pub mod wire_types;
pub mod json_codec;

pub use json_codec::{
    ProtocolError,
    decode_request,
    encode_output,
    frame_error,
};
