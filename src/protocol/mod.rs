//! Marlin line protocol: framing, checksums, line numbering and the response vocabulary.

pub mod decoder;
pub mod response;

pub use decoder::{checksum, strip_comments, Decoded, LineDecoder, EMERGENCY_CANCEL};
