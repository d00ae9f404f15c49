//! # Session Tracking
//!
//! Concurrent table of per-flow parser state built on [`DashMap`]. A
//! session is created when the protocol probe matches the first payload of
//! a flow, is fed each direction's stream chunks, and is torn down on flow
//! close or after the parser's idle timeout.
//!
//! ## Design
//!
//! - Flows are identified by their canonical [`FlowKey`], so both directions
//!   map to the same entry.
//! - The originator's key is remembered at creation and used to tell the
//!   direction of later payloads.
//! - All access to one session goes through its shard lock, so the two
//!   directions of a flow are never inside the parser at the same time.

use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::protocols::tls::{SslState, TlsDecoderEvent, TlsParser};
use crate::protocols::{Direction, ProbeResult, ProtocolParser, StreamFlags};
use crate::TlsSessionRecord;

// ---------------------------------------------------------------------------
// Flow Key
// ---------------------------------------------------------------------------

/// A 5-tuple identifying a network flow.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowKey {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    /// IP protocol number (6=TCP, 17=UDP, 1=ICMP, etc.)
    pub proto: u8,
}

impl FlowKey {
    /// Create a new FlowKey.
    pub fn new(src_ip: String, dst_ip: String, src_port: u16, dst_port: u16, proto: u8) -> Self {
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            proto,
        }
    }

    /// The same flow seen from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            src_ip: self.dst_ip.clone(),
            dst_ip: self.src_ip.clone(),
            src_port: self.dst_port,
            dst_port: self.src_port,
            proto: self.proto,
        }
    }

    /// Return the canonical (bidirectional) key so that both directions
    /// of a flow map to the same entry.
    pub fn canonical(&self) -> Self {
        if (&self.src_ip, self.src_port) <= (&self.dst_ip, self.dst_port) {
            self.clone()
        } else {
            self.reversed()
        }
    }

    /// True if this key and `other` have the same source endpoint.
    fn same_source(&self, other: &FlowKey) -> bool {
        self.src_ip == other.src_ip && self.src_port == other.src_port
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto_name = match self.proto {
            1 => "icmp",
            6 => "tcp",
            17 => "udp",
            _ => "other",
        };
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, proto_name
        )
    }
}

// ---------------------------------------------------------------------------
// Tracked session
// ---------------------------------------------------------------------------

/// Parser state of one flow plus its bookkeeping.
#[derive(Debug)]
pub struct TrackedSession<S> {
    /// Key as seen from the originator.
    pub originator: FlowKey,
    pub state: S,
    pub stream: StreamFlags,
    /// First payload timestamp (Unix epoch seconds).
    pub first_seen: f64,
    /// Last payload timestamp.
    pub last_seen: f64,
    halted: [bool; 2],
}

impl<S: Default> TrackedSession<S> {
    fn new(originator: FlowKey, ts: f64) -> Self {
        Self {
            originator,
            state: S::default(),
            stream: StreamFlags::default(),
            first_seen: ts,
            last_seen: ts,
            halted: [false; 2],
        }
    }
}

impl<S> TrackedSession<S> {
    /// Direction of a payload carried under `key`.
    pub fn direction_of(&self, key: &FlowKey) -> Direction {
        if key.same_source(&self.originator) {
            Direction::Originator
        } else {
            Direction::Responder
        }
    }

    /// True once the parser failed on `direction`.
    pub fn is_halted(&self, direction: Direction) -> bool {
        self.halted[direction_index(direction)]
    }
}

fn direction_index(direction: Direction) -> usize {
    match direction {
        Direction::Originator => 0,
        Direction::Responder => 1,
    }
}

// ---------------------------------------------------------------------------
// Session Table
// ---------------------------------------------------------------------------

/// Concurrent table of parser sessions, keyed by canonical [`FlowKey`].
pub struct SessionTable<P: ProtocolParser> {
    parser: P,
    sessions: DashMap<FlowKey, TrackedSession<P::State>>,
}

impl<P: ProtocolParser> SessionTable<P> {
    /// Create an empty table driven by `parser`.
    pub fn new(parser: P) -> Self {
        Self {
            parser,
            sessions: DashMap::new(),
        }
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Probe the first payload of a flow, creating its session on a match.
    ///
    /// `direction` is the direction of `payload` within the flow. Flows
    /// already tracked report [`ProbeResult::Match`] without probing.
    pub fn detect(
        &self,
        key: &FlowKey,
        direction: Direction,
        payload: &[u8],
        ts: f64,
    ) -> ProbeResult {
        let canonical = key.canonical();
        if self.sessions.contains_key(&canonical) {
            return ProbeResult::Match;
        }

        let result = self.parser.probe(payload, direction);
        if result == ProbeResult::Match {
            let originator = match direction {
                Direction::Originator => key.clone(),
                Direction::Responder => key.reversed(),
            };
            self.sessions
                .entry(canonical)
                .or_insert_with(|| TrackedSession::new(originator, ts));
            tracing::info!(
                flow = %key,
                protocol = self.parser.protocol_id(),
                "session created"
            );
        }
        result
    }

    /// Feed the next stream chunk carried under `key`.
    ///
    /// Returns `None` if the flow is not tracked, inspection was stopped, or
    /// the parser already failed on this direction.
    pub fn process(
        &self,
        key: &FlowKey,
        payload: &[u8],
        ts: f64,
    ) -> Option<Result<usize, P::Error>> {
        let mut entry = self.sessions.get_mut(&key.canonical())?;
        let session = entry.value_mut();

        let direction = session.direction_of(key);
        if session.stream.no_inspection() || session.is_halted(direction) {
            return None;
        }
        session.last_seen = ts;

        let result = self
            .parser
            .parse(&mut session.state, direction, &mut session.stream, payload);
        if let Err(err) = &result {
            tracing::debug!(
                flow = %key,
                ?direction,
                error = %err,
                "parser failed, halting direction"
            );
            session.halted[direction_index(direction)] = true;
        }
        Some(result)
    }

    /// Run `f` with read access to a session.
    pub fn inspect<R>(
        &self,
        key: &FlowKey,
        f: impl FnOnce(&TrackedSession<P::State>) -> R,
    ) -> Option<R> {
        self.sessions.get(&key.canonical()).map(|entry| f(entry.value()))
    }

    /// Run `f` with write access to a session's parser state.
    pub fn update<R>(&self, key: &FlowKey, f: impl FnOnce(&mut P::State) -> R) -> Option<R> {
        self.sessions
            .get_mut(&key.canonical())
            .map(|mut entry| f(&mut entry.value_mut().state))
    }

    /// Tear down a session, returning it.
    pub fn remove(&self, key: &FlowKey) -> Option<TrackedSession<P::State>> {
        let removed = self.sessions.remove(&key.canonical()).map(|(_, s)| s);
        if removed.is_some() {
            tracing::info!(flow = %key, "session removed");
        }
        removed
    }

    /// Tear down sessions idle for longer than the parser's timeout.
    pub fn expire(&self, now: f64) -> Vec<(FlowKey, TrackedSession<P::State>)> {
        let timeout = self.parser.timeout();
        let stale: Vec<FlowKey> = self
            .sessions
            .iter()
            .filter(|entry| now - entry.value().last_seen > timeout)
            .map(|entry| entry.key().clone())
            .collect();

        let expired: Vec<_> = stale
            .into_iter()
            .filter_map(|key| {
                self.sessions
                    .remove_if(&key, |_, s| now - s.last_seen > timeout)
            })
            .collect();

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "sessions expired");
        }
        expired
    }

    /// Return the number of tracked sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Return true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionTable<TlsParser> {
    /// Like [`SessionTable::detect`], but only for flows whose server port
    /// is one of the configured TLS ports.
    pub fn detect_on_tls_port(
        &self,
        key: &FlowKey,
        direction: Direction,
        payload: &[u8],
        ts: f64,
    ) -> ProbeResult {
        let server_port = match direction {
            Direction::Originator => key.dst_port,
            Direction::Responder => key.src_port,
        };
        if !self.parser.config().is_tls_port(server_port) {
            return ProbeResult::NoMatch;
        }
        self.detect(key, direction, payload, ts)
    }

    /// Remove and return the pending decoder events of a TLS session.
    pub fn drain_events(&self, key: &FlowKey) -> Vec<TlsDecoderEvent> {
        self.update(key, SslState::drain_events).unwrap_or_default()
    }

    /// Export record summarising a TLS session.
    pub fn session_record(&self, key: &FlowKey) -> Option<TlsSessionRecord> {
        self.inspect(key, |session| {
            TlsSessionRecord::from_state(&session.originator, &session.state)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
