//! # TLS Session State
//!
//! Per-flow state: one [`ConnectionState`] per direction, the session-wide
//! [`MilestoneFlags`] and the decoder [`EventList`].
//!
//! A session is created when the protocol probe matches a flow, mutated
//! only by [`TlsParser::parse`](super::TlsParser::parse) for one direction
//! at a time, and dropped on flow teardown together with its reassembly
//! buffer and extracted certificate data.

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use super::certificate::{CertificateBuffer, CertificateInfo};
use super::cursor::{field, FieldSpec, HeaderCursor, HeaderField};
use super::events::{EventList, TlsDecoderEvent};
use super::types::{HANDSHAKE_HEADER_LEN, SSL_VERSION_2, TLS_RECORD_HEADER_LEN, TLS_VERSION_UNKNOWN};
use crate::protocols::Direction;

// ---------------------------------------------------------------------------
// Milestone flags
// ---------------------------------------------------------------------------

/// Handshake milestones observed on a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MilestoneFlags(u32);

impl MilestoneFlags {
    pub const CLIENT_HELLO: Self = Self(0x0001);
    pub const SERVER_HELLO: Self = Self(0x0002);
    pub const CLIENT_KEYX: Self = Self(0x0004);
    pub const SERVER_KEYX: Self = Self(0x0008);
    pub const SSLV2_CLIENT_HS: Self = Self(0x0010);
    pub const SSLV2_SERVER_HS: Self = Self(0x0020);
    pub const SSLV2_CLIENT_MASTER_KEY: Self = Self(0x0040);
    pub const SSLV2_CLIENT_ENCRYPTED: Self = Self(0x0080);
    pub const SSLV2_SERVER_ENCRYPTED: Self = Self(0x0100);
    pub const SSLV2_NO_SESSION_ID: Self = Self(0x0200);
    pub const CHANGE_CIPHER_SPEC: Self = Self(0x0400);
    pub const CLIENT_CHANGE_CIPHER_SPEC: Self = Self(0x0800);
    pub const SERVER_CHANGE_CIPHER_SPEC: Self = Self(0x1000);

    const NAMES: [(MilestoneFlags, &'static str); 13] = [
        (Self::CLIENT_HELLO, "client_hello"),
        (Self::SERVER_HELLO, "server_hello"),
        (Self::CLIENT_KEYX, "client_keyx"),
        (Self::SERVER_KEYX, "server_keyx"),
        (Self::SSLV2_CLIENT_HS, "sslv2_client_hs"),
        (Self::SSLV2_SERVER_HS, "sslv2_server_hs"),
        (Self::SSLV2_CLIENT_MASTER_KEY, "sslv2_client_master_key"),
        (Self::SSLV2_CLIENT_ENCRYPTED, "sslv2_client_encrypted"),
        (Self::SSLV2_SERVER_ENCRYPTED, "sslv2_server_encrypted"),
        (Self::SSLV2_NO_SESSION_ID, "sslv2_no_session_id"),
        (Self::CHANGE_CIPHER_SPEC, "change_cipher_spec"),
        (Self::CLIENT_CHANGE_CIPHER_SPEC, "client_change_cipher_spec"),
        (Self::SERVER_CHANGE_CIPHER_SPEC, "server_change_cipher_spec"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if every flag of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag of `other` is set.
    pub const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Names of the set flags, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Look up a single flag by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(flag, _)| *flag)
    }

    /// The per-direction ChangeCipherSpec flag.
    pub fn change_cipher_spec(direction: Direction) -> Self {
        match direction {
            Direction::Originator => Self::CLIENT_CHANGE_CIPHER_SPEC,
            Direction::Responder => Self::SERVER_CHANGE_CIPHER_SPEC,
        }
    }
}

impl BitOr for MilestoneFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MilestoneFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// Record framing
// ---------------------------------------------------------------------------

/// Record framing chosen for the current record of a direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordFraming {
    /// SSLv3/TLS: content type, version, 16-bit length.
    #[default]
    Tls,
    /// SSLv2 with a 2-byte length (first byte has its top bit set).
    Sslv2TwoByte,
    /// SSLv2 with a 3-byte length (length plus padding byte).
    Sslv2ThreeByte,
}

const TLS_RECORD_LAYOUT: [FieldSpec; 3] = [
    field(HeaderField::ContentType, 1),
    field(HeaderField::Version, 2),
    field(HeaderField::RecordLength, 2),
];

const SSLV2_TWO_BYTE_LAYOUT: [FieldSpec; 2] = [
    field(HeaderField::RecordLength, 2),
    field(HeaderField::ContentType, 1),
];

const SSLV2_THREE_BYTE_LAYOUT: [FieldSpec; 3] = [
    field(HeaderField::RecordLength, 2),
    field(HeaderField::Padding, 1),
    field(HeaderField::ContentType, 1),
];

pub(crate) const HANDSHAKE_LAYOUT: [FieldSpec; 2] = [
    field(HeaderField::MessageType, 1),
    field(HeaderField::MessageLength, 3),
];

/// SSLv2 ClientHello body: version and cipher-spec length, then session-id length.
pub(crate) const SSLV2_SESSION_ID_LAYOUT: [FieldSpec; 2] = [
    field(HeaderField::Skip, 4),
    field(HeaderField::SessionIdLength, 2),
];

impl RecordFraming {
    /// Sniff the framing of a fresh record from its first byte.
    ///
    /// SSLv2 if either of the top two bits is set; the top bit selects the
    /// 2-byte length form.
    pub fn sniff(first: u8) -> Self {
        if first & 0x80 != 0 {
            RecordFraming::Sslv2TwoByte
        } else if first & 0x40 != 0 {
            RecordFraming::Sslv2ThreeByte
        } else {
            RecordFraming::Tls
        }
    }

    pub fn is_sslv2(&self) -> bool {
        !matches!(self, RecordFraming::Tls)
    }

    /// Header layout parsed before the record body.
    ///
    /// For SSLv2 this includes the message type byte, which is the first
    /// byte counted by the record length.
    pub(crate) fn layout(&self) -> &'static [FieldSpec] {
        match self {
            RecordFraming::Tls => &TLS_RECORD_LAYOUT,
            RecordFraming::Sslv2TwoByte => &SSLV2_TWO_BYTE_LAYOUT,
            RecordFraming::Sslv2ThreeByte => &SSLV2_THREE_BYTE_LAYOUT,
        }
    }

    /// Bytes preceding the part of the record counted by its length field.
    pub fn header_width(&self) -> u8 {
        match self {
            RecordFraming::Tls => TLS_RECORD_HEADER_LEN as u8,
            RecordFraming::Sslv2TwoByte => 2,
            RecordFraming::Sslv2ThreeByte => 3,
        }
    }

    /// Mask applied to the SSLv2 length field.
    pub(crate) fn length_mask(&self) -> u32 {
        match self {
            RecordFraming::Tls => 0xffff,
            RecordFraming::Sslv2TwoByte => 0x7fff,
            RecordFraming::Sslv2ThreeByte => 0x3fff,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Parse state of one direction of a session.
#[derive(Debug, Default)]
pub struct ConnectionState {
    pub(crate) framing: RecordFraming,
    pub(crate) header: HeaderCursor,
    pub(crate) record_length: u32,
    pub(crate) record_header_width: u8,
    pub(crate) content_type: u8,
    pub(crate) version: u16,
    /// Cursor within the current record, header included.
    pub(crate) bytes_processed: u32,

    pub(crate) handshake: HeaderCursor,
    pub(crate) handshake_type: u8,
    pub(crate) handshake_message_length: u32,
    /// Cursor within the current handshake message body.
    pub(crate) message_processed: u32,
    /// Remaining bytes of the current Certificate message are skipped.
    pub(crate) certificate_skip: bool,

    pub(crate) session_id: HeaderCursor,
    pub(crate) session_id_length: u16,

    /// ChangeCipherSpec was seen; handshake records are no longer parsed.
    pub(crate) opaque: bool,

    pub(crate) cert_buffer: CertificateBuffer,
    pub(crate) certificate: Option<CertificateInfo>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_length(&self) -> u32 {
        self.record_length
    }

    pub fn record_header_width(&self) -> u8 {
        self.record_header_width
    }

    pub fn framing(&self) -> RecordFraming {
        self.framing
    }

    pub fn content_type(&self) -> u8 {
        self.content_type
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn bytes_processed(&self) -> u32 {
        self.bytes_processed
    }

    pub fn handshake_type(&self) -> u8 {
        self.handshake_type
    }

    pub fn handshake_message_length(&self) -> u32 {
        self.handshake_message_length
    }

    /// Bytes of the 4-byte handshake sub-header read so far.
    pub fn handshake_bytes_processed(&self) -> u8 {
        self.handshake.consumed()
    }

    pub fn session_id_length(&self) -> u16 {
        self.session_id_length
    }

    /// True once this direction has sent ChangeCipherSpec.
    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    /// Certificate data extracted from this direction, if any.
    pub fn certificate(&self) -> Option<&CertificateInfo> {
        self.certificate.as_ref()
    }

    pub fn certificate_buffer(&self) -> &CertificateBuffer {
        &self.cert_buffer
    }

    /// True once the current record header has been read.
    pub fn header_complete(&self) -> bool {
        self.header.is_complete(self.framing.layout())
    }

    /// Offset one past the last byte of the current record.
    pub(crate) fn record_end(&self) -> u32 {
        u32::from(self.record_header_width) + self.record_length
    }

    /// True while a handshake message (or its sub-header) is in progress.
    pub(crate) fn handshake_in_progress(&self) -> bool {
        !self.handshake.is_fresh()
    }

    pub(crate) fn handshake_header_complete(&self) -> bool {
        self.handshake.is_complete(&HANDSHAKE_LAYOUT)
    }

    /// Start a fresh record, choosing its framing from `first`.
    pub(crate) fn begin_record(&mut self, first: u8) {
        let framing = RecordFraming::sniff(first);
        if !framing.is_sslv2() && self.version == SSL_VERSION_2 {
            self.version = TLS_VERSION_UNKNOWN;
        }
        self.framing = framing;
        self.record_header_width = framing.header_width();
        self.header.reset();
        self.session_id.reset();
    }

    /// Move to the fresh-record position after a record completes.
    ///
    /// Handshake message state survives, since a message may continue in
    /// the next record.
    pub(crate) fn finish_record(&mut self) {
        self.bytes_processed = 0;
        self.header.reset();
        self.session_id.reset();
    }

    /// Forget the current handshake message.
    pub(crate) fn finish_handshake_message(&mut self) {
        self.handshake.reset();
        self.handshake_type = 0;
        self.handshake_message_length = 0;
        self.message_processed = 0;
        self.certificate_skip = false;
    }

    /// Return to the fresh-record position after a parse failure.
    ///
    /// Partial reassembly is discarded; certificate data already extracted
    /// is kept.
    pub(crate) fn reset(&mut self) {
        self.finish_record();
        self.finish_handshake_message();
        self.cert_buffer.clear();
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// TLS state of one flow.
#[derive(Debug, Default)]
pub struct SslState {
    client: ConnectionState,
    server: ConnectionState,
    flags: MilestoneFlags,
    events: EventList,
}

impl SslState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse state for the given direction.
    pub fn connection(&self, direction: Direction) -> &ConnectionState {
        match direction {
            Direction::Originator => &self.client,
            Direction::Responder => &self.server,
        }
    }

    pub fn client(&self) -> &ConnectionState {
        &self.client
    }

    pub fn server(&self) -> &ConnectionState {
        &self.server
    }

    pub fn flags(&self) -> MilestoneFlags {
        self.flags
    }

    pub fn events(&self) -> &EventList {
        &self.events
    }

    /// Remove and return all pending decoder events.
    pub fn drain_events(&mut self) -> Vec<TlsDecoderEvent> {
        self.events.drain()
    }

    /// Negotiated version: the server's if it has spoken, else the client's.
    pub fn version(&self) -> u16 {
        if self.server.version != TLS_VERSION_UNKNOWN {
            self.server.version
        } else {
            self.client.version
        }
    }

    /// Borrow one direction's state together with the session-wide parts.
    pub(crate) fn split_mut(
        &mut self,
        direction: Direction,
    ) -> (&mut ConnectionState, &mut MilestoneFlags, &mut EventList) {
        let conn = match direction {
            Direction::Originator => &mut self.client,
            Direction::Responder => &mut self.server,
        };
        (conn, &mut self.flags, &mut self.events)
    }
}

/// Minimum record length for a Handshake record that starts a new message.
pub(crate) const MIN_HANDSHAKE_RECORD_LEN: u32 = HANDSHAKE_HEADER_LEN as u32;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
