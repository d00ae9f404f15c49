//! # TLS Parse Errors

use super::events::TlsDecoderEvent;

/// Failure of a TLS/SSLv2 parse step.
///
/// Every failure resets the direction's parse state; the dispatcher records
/// the event returned by [`TlsError::event`] exactly once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlsError {
    #[error("invalid SSLv2 record header: {0}")]
    InvalidSslv2Header(&'static str),

    #[error("SSLv3/TLS header cursor at {cursor} disagrees with record offset {processed}")]
    InvalidTlsHeader { cursor: u32, processed: u32 },

    #[error("handshake record length {length} is shorter than a handshake header")]
    InvalidRecordLength { length: u32 },

    #[error("unknown handshake message type {0}")]
    UnknownHandshakeType(u8),

    #[error("handshake parser consumed {consumed} bytes with {available} available")]
    HandshakeOverrun { consumed: usize, available: usize },

    #[error("record offset {processed} is past the record end {end}")]
    RecordOverrun { processed: u32, end: u32 },

    #[error("certificate decoder left {surplus} bytes but only {written} were written by this call")]
    CertificateOverrun { surplus: usize, written: usize },

    #[error("invalid certificate message: {0}")]
    InvalidCertificate(String),

    #[error("more than {limit} records in a single chunk")]
    TooManyRecords { limit: usize },
}

impl TlsError {
    /// The decoder event that reports this failure.
    pub fn event(&self) -> TlsDecoderEvent {
        match self {
            TlsError::InvalidSslv2Header(_) => TlsDecoderEvent::InvalidSslv2Header,
            TlsError::InvalidTlsHeader { .. } => TlsDecoderEvent::InvalidTlsHeader,
            TlsError::InvalidRecordLength { .. } => TlsDecoderEvent::InvalidRecordLength,
            TlsError::UnknownHandshakeType(_) => TlsDecoderEvent::InvalidHandshakeMessage,
            TlsError::HandshakeOverrun { .. }
            | TlsError::RecordOverrun { .. }
            | TlsError::CertificateOverrun { .. } => TlsDecoderEvent::InvalidSslRecord,
            TlsError::InvalidCertificate(_) => TlsDecoderEvent::InvalidCertificate,
            TlsError::TooManyRecords { .. } => TlsDecoderEvent::TooManyRecordsInPacket,
        }
    }
}
