//! # TLS Decoder Events
//!
//! Protocol anomalies observed while parsing. Events are appended to a
//! per-flow [`EventList`] and never interrupt parsing; the alerting layer
//! drains them.

use serde::{Deserialize, Serialize};

/// A protocol anomaly tag raised by the TLS parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsDecoderEvent {
    /// SSLv2 record header could not be parsed.
    InvalidSslv2Header,
    /// SSLv3/TLS record header cursor is in an impossible state.
    InvalidTlsHeader,
    /// Record content type is not a known SSLv3/TLS type.
    InvalidRecordType,
    /// Record length is too short for its content type.
    InvalidRecordLength,
    /// Handshake message could not be parsed.
    InvalidHandshakeMessage,
    /// Certificate message or certificate entry could not be decoded.
    InvalidCertificate,
    /// A certificate lacks a required element (subject, issuer).
    CertificateMissingElement,
    /// A certificate holds an element the decoder does not know.
    CertificateUnknownElement,
    /// A certificate element has an inconsistent length.
    CertificateInvalidLength,
    /// A certificate string could not be decoded.
    CertificateInvalidString,
    /// An SSLv2 error message was seen.
    ErrorMessageEncountered,
    /// Record bookkeeping overran the record or the input.
    InvalidSslRecord,
    /// Too many records were presented in a single chunk.
    TooManyRecordsInPacket,
    /// The certificate reassembly buffer hit its size limit.
    CertificateBufferExhausted,
}

impl TlsDecoderEvent {
    /// Every event, in declaration order.
    pub const ALL: [TlsDecoderEvent; 14] = [
        TlsDecoderEvent::InvalidSslv2Header,
        TlsDecoderEvent::InvalidTlsHeader,
        TlsDecoderEvent::InvalidRecordType,
        TlsDecoderEvent::InvalidRecordLength,
        TlsDecoderEvent::InvalidHandshakeMessage,
        TlsDecoderEvent::InvalidCertificate,
        TlsDecoderEvent::CertificateMissingElement,
        TlsDecoderEvent::CertificateUnknownElement,
        TlsDecoderEvent::CertificateInvalidLength,
        TlsDecoderEvent::CertificateInvalidString,
        TlsDecoderEvent::ErrorMessageEncountered,
        TlsDecoderEvent::InvalidSslRecord,
        TlsDecoderEvent::TooManyRecordsInPacket,
        TlsDecoderEvent::CertificateBufferExhausted,
    ];

    /// Rule keyword name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            TlsDecoderEvent::InvalidSslv2Header => "invalid_sslv2_header",
            TlsDecoderEvent::InvalidTlsHeader => "invalid_tls_header",
            TlsDecoderEvent::InvalidRecordType => "invalid_record_type",
            TlsDecoderEvent::InvalidRecordLength => "invalid_record_length",
            TlsDecoderEvent::InvalidHandshakeMessage => "invalid_handshake_message",
            TlsDecoderEvent::InvalidCertificate => "invalid_certificate",
            TlsDecoderEvent::CertificateMissingElement => "certificate_missing_element",
            TlsDecoderEvent::CertificateUnknownElement => "certificate_unknown_element",
            TlsDecoderEvent::CertificateInvalidLength => "certificate_invalid_length",
            TlsDecoderEvent::CertificateInvalidString => "certificate_invalid_string",
            TlsDecoderEvent::ErrorMessageEncountered => "error_message_encountered",
            TlsDecoderEvent::InvalidSslRecord => "invalid_ssl_record",
            TlsDecoderEvent::TooManyRecordsInPacket => "too_many_records_in_packet",
            TlsDecoderEvent::CertificateBufferExhausted => "certificate_buffer_exhausted",
        }
    }

    /// Look up an event by its rule keyword name.
    ///
    /// Accepts an optional `tls.` prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("tls.").unwrap_or(name);
        Self::ALL.iter().copied().find(|ev| ev.name() == name)
    }
}

impl std::fmt::Display for TlsDecoderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tls.{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Event list
// ---------------------------------------------------------------------------

/// Append-only per-flow list of decoder events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventList {
    events: Vec<TlsDecoderEvent>,
}

impl EventList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&mut self, event: TlsDecoderEvent) {
        tracing::debug!(event = event.name(), "tls decoder event");
        self.events.push(event);
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// True if `event` is pending.
    pub fn contains(&self, event: TlsDecoderEvent) -> bool {
        self.events.contains(&event)
    }

    /// Number of pending occurrences of `event`.
    pub fn count(&self, event: TlsDecoderEvent) -> usize {
        self.events.iter().filter(|&&ev| ev == event).count()
    }

    /// Iterate over pending events in the order they were raised.
    pub fn iter(&self) -> impl Iterator<Item = &TlsDecoderEvent> {
        self.events.iter()
    }

    /// Remove and return all pending events.
    pub fn drain(&mut self) -> Vec<TlsDecoderEvent> {
        std::mem::take(&mut self.events)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
