//! AMF (Action Message Format) implementation
//!
//! AMF0 is the serialization used for every command and data message this
//! client sends or receives: command names, transaction ids, connect
//! parameters, status info objects and stream metadata.

pub mod amf0;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use value::{AmfObject, AmfValue};
