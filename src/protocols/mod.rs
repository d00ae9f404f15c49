//! # Protocol Parsers
//!
//! Application-layer parsers driven by the stream reassembly layer. Each
//! parser implements [`ProtocolParser`]: it is probed with the first bytes
//! of a flow, then fed successive chunks of each direction's byte stream
//! together with that flow's parser state.
//!
//! ## Supported Protocols
//!
//! | Module   | Protocol            | Well-Known Ports                  |
//! |----------|---------------------|-----------------------------------|
//! | `tls`    | SSLv2, SSLv3, TLS   | 443, 465, 636, 993, 995, 8443     |
//!
//! ## Adding a New Protocol
//!
//! 1. Create a new module under `src/protocols/<name>/`
//! 2. Declare the module in this file
//! 3. Implement [`ProtocolParser`] for your parser struct
//! 4. Track its sessions with a [`SessionTable`](crate::conntrack::SessionTable)

pub mod tls;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Packet direction relative to the connection originator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Packet from the connection originator (client).
    Originator,
    /// Packet from the connection responder (server).
    Responder,
}

// ---------------------------------------------------------------------------
// Probe result
// ---------------------------------------------------------------------------

/// Outcome of protocol detection on the first bytes of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The payload belongs to this protocol.
    Match,
    /// The payload does not belong to this protocol.
    NoMatch,
    /// Not enough bytes to decide yet.
    NeedMore,
}

// ---------------------------------------------------------------------------
// Cross-call stream flags
// ---------------------------------------------------------------------------

/// Flags a parser raises for the stream layer that drives it.
///
/// Parsers only ever set these; once set they stay set for the life of the
/// flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    no_inspection: bool,
    no_reassembly: bool,
}

impl StreamFlags {
    /// Stop feeding payload to the parser.
    ///
    /// Returns true if the flag was not already set.
    pub fn set_no_inspection(&mut self) -> bool {
        !std::mem::replace(&mut self.no_inspection, true)
    }

    /// Stop reassembling the stream.
    pub fn set_no_reassembly(&mut self) -> bool {
        !std::mem::replace(&mut self.no_reassembly, true)
    }

    pub fn no_inspection(&self) -> bool {
        self.no_inspection
    }

    pub fn no_reassembly(&self) -> bool {
        self.no_reassembly
    }
}

// ---------------------------------------------------------------------------
// ProtocolParser trait
// ---------------------------------------------------------------------------

/// Trait for application-layer protocol parsers.
///
/// A parser holds only configuration; everything it learns about a flow
/// lives in the caller-owned [`ProtocolParser::State`]. The caller must not
/// run two `parse` calls for the same flow concurrently.
pub trait ProtocolParser: Send + Sync {
    /// Per-flow parser state.
    type State: Default + Send + Sync;
    /// Parse failure.
    type Error: std::error::Error;

    /// Decide whether a flow carries this protocol from its first bytes.
    fn probe(&self, payload: &[u8], direction: Direction) -> ProbeResult;

    /// Parse the next chunk of one direction's byte stream.
    ///
    /// # Arguments
    ///
    /// * `state` - Per-flow state from previous calls
    /// * `direction` - Whether the payload is from the originator or responder
    /// * `stream` - Cross-call flags the parser may raise
    /// * `payload` - The next bytes of the stream
    ///
    /// # Returns
    ///
    /// The number of bytes consumed. Incomplete trailing data is consumed
    /// too; its position is kept in `state` for the next call.
    fn parse(
        &self,
        state: &mut Self::State,
        direction: Direction,
        stream: &mut StreamFlags,
        payload: &[u8],
    ) -> Result<usize, Self::Error>;

    /// Return the idle timeout for this protocol's per-flow state.
    ///
    /// After this many seconds without data, the state may be evicted.
    fn timeout(&self) -> f64;

    /// Return a human-readable protocol identifier.
    fn protocol_id(&self) -> &'static str;
}
