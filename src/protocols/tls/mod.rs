//! # TLS/SSLv2 Protocol Parser
//!
//! Incremental parser for SSLv2, SSLv3 and TLS session setup. It follows
//! the record and handshake framing of both directions without terminating
//! TLS, records handshake milestones, extracts the server certificate and
//! raises decoder events on protocol anomalies.
//!
//! ## Capabilities
//!
//! - **Streaming**: input may be cut at any byte; header and message
//!   positions are resumed on the next call
//! - **Dual framing**: SSLv2 2/3-byte headers and SSLv3/TLS 5-byte headers,
//!   sniffed from the first byte of every record
//! - **Certificate reassembly**: Certificate messages spanning several
//!   records are buffered (bounded by configuration) and decoded
//! - **Encryption tracking**: inspection stops once both directions have
//!   switched to encrypted traffic
//!
//! ## Wire Format Reference
//!
//! ```text
//! SSLv3/TLS record:  [content_type:1][version:2][length:2][body]
//! SSLv2 record:      [length:2|3][msg_type:1][body]
//! Handshake:         [msg_type:1][length:3][body]
//! ```

pub mod certificate;
pub mod config;
pub mod cursor;
pub mod error;
pub mod events;
pub mod state;
pub mod types;

mod handshake;
mod record;
mod sslv2;

#[cfg(test)]
pub(crate) mod test_support;

pub use certificate::{
    CertificateDecode, CertificateDecoder, CertificateError, CertificateInfo,
    DecodedCertificates, X509CertificateDecoder,
};
pub use config::{ConfigError, TlsConfig};
pub use error::TlsError;
pub use events::{EventList, TlsDecoderEvent};
pub use state::{ConnectionState, MilestoneFlags, RecordFraming, SslState};

use crate::protocols::{Direction, ProbeResult, ProtocolParser, StreamFlags};

/// Maximum number of records parsed in a single call.
pub const MAX_RECORDS_PER_CHUNK: usize = 30;

// ---------------------------------------------------------------------------
// Parse context
// ---------------------------------------------------------------------------

/// Everything one parse step may touch, borrowed for a single call.
pub(crate) struct ParseContext<'a> {
    pub(crate) direction: Direction,
    pub(crate) conn: &'a mut ConnectionState,
    pub(crate) flags: &'a mut MilestoneFlags,
    pub(crate) events: &'a mut EventList,
    pub(crate) stream: &'a mut StreamFlags,
    pub(crate) config: &'a TlsConfig,
    pub(crate) decoder: &'a dyn CertificateDecoder,
}

impl ParseContext<'_> {
    /// Ask the stream layer to stop feeding this flow.
    pub(crate) fn stop_inspection(&mut self) {
        if self.stream.set_no_inspection() {
            tracing::debug!(direction = ?self.direction, "session encrypted, stopping inspection");
        }
        if self.config.no_reassemble {
            self.stream.set_no_reassembly();
        }
    }

    fn run(&mut self, input: &[u8]) -> Result<usize, TlsError> {
        let mut offset = 0;
        let mut records = 0;

        while offset < input.len() {
            records += 1;
            if records > MAX_RECORDS_PER_CHUNK {
                return Err(TlsError::TooManyRecords {
                    limit: MAX_RECORDS_PER_CHUNK,
                });
            }

            let chunk = &input[offset..];
            if self.conn.bytes_processed == 0 {
                self.conn.begin_record(chunk[0]);
            }

            let n = if self.conn.framing.is_sslv2() {
                sslv2::decode(self, chunk)?
            } else {
                record::decode(self, chunk)?
            };

            if n > chunk.len() {
                return Err(TlsError::RecordOverrun {
                    processed: n as u32,
                    end: chunk.len() as u32,
                });
            }
            offset += n;
        }

        Ok(offset)
    }
}

// ---------------------------------------------------------------------------
// TlsParser
// ---------------------------------------------------------------------------

/// TLS/SSLv2 parser.
///
/// Holds configuration and the certificate decoder; all per-flow state is
/// in the [`SslState`] passed to [`TlsParser::parse`].
pub struct TlsParser {
    config: TlsConfig,
    decoder: Box<dyn CertificateDecoder>,
}

impl TlsParser {
    /// Create a parser with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TlsConfig::default())
    }

    /// Create a parser with the given configuration.
    pub fn with_config(config: TlsConfig) -> Self {
        Self {
            config,
            decoder: Box::new(X509CertificateDecoder),
        }
    }

    /// Replace the certificate decoder.
    pub fn with_decoder(mut self, decoder: Box<dyn CertificateDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &TlsConfig {
        &self.config
    }

    /// Parse the next chunk of one direction of a session.
    ///
    /// On failure the direction returns to the fresh-record position,
    /// exactly one decoder event is recorded and the error is returned; the
    /// caller should stop inspecting the flow.
    pub fn parse(
        &self,
        state: &mut SslState,
        direction: Direction,
        stream: &mut StreamFlags,
        input: &[u8],
    ) -> Result<usize, TlsError> {
        let (conn, flags, events) = state.split_mut(direction);
        let mut ctx = ParseContext {
            direction,
            conn,
            flags,
            events,
            stream,
            config: &self.config,
            decoder: self.decoder.as_ref(),
        };

        match ctx.run(input) {
            Ok(n) => Ok(n),
            Err(err) => {
                tracing::debug!(?direction, error = %err, "tls parse failure, resetting direction");
                ctx.conn.reset();
                ctx.events.push(err.event());
                Err(err)
            }
        }
    }

    /// Decide whether a flow carries SSLv2, SSLv3 or TLS.
    ///
    /// Always [`ProbeResult::NoMatch`] when inspection is disabled.
    pub fn probe(&self, payload: &[u8], direction: Direction) -> ProbeResult {
        if !self.config.enabled {
            return ProbeResult::NoMatch;
        }
        if payload.len() < 3 {
            return ProbeResult::NeedMore;
        }

        if payload[0] & 0x80 != 0 {
            return probe_sslv2(payload, direction);
        }

        if payload[0] == 0x16 && payload[1] == 0x03 && payload[2] <= 0x04 {
            ProbeResult::Match
        } else {
            ProbeResult::NoMatch
        }
    }
}

fn probe_sslv2(payload: &[u8], direction: Direction) -> ProbeResult {
    match direction {
        Direction::Originator => {
            if payload[2] != 0x01 {
                return ProbeResult::NoMatch;
            }
            if payload.len() < 5 {
                return ProbeResult::NeedMore;
            }
            match (payload[3], payload[4]) {
                (0x00, 0x02) => ProbeResult::Match,
                (0x03, minor) if minor <= 0x04 => ProbeResult::Match,
                _ => ProbeResult::NoMatch,
            }
        }
        Direction::Responder => {
            if payload[2] != 0x04 {
                return ProbeResult::NoMatch;
            }
            if payload.len() < 7 {
                return ProbeResult::NeedMore;
            }
            if payload[5..7] == [0x00, 0x02] {
                ProbeResult::Match
            } else {
                ProbeResult::NoMatch
            }
        }
    }
}

impl Default for TlsParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolParser for TlsParser {
    type State = SslState;
    type Error = TlsError;

    fn probe(&self, payload: &[u8], direction: Direction) -> ProbeResult {
        TlsParser::probe(self, payload, direction)
    }

    fn parse(
        &self,
        state: &mut SslState,
        direction: Direction,
        stream: &mut StreamFlags,
        payload: &[u8],
    ) -> Result<usize, TlsError> {
        TlsParser::parse(self, state, direction, stream, payload)
    }

    fn timeout(&self) -> f64 {
        self.config.session_timeout
    }

    fn protocol_id(&self) -> &'static str {
        "tls"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
