//! # tls-inspect - Incremental TLS/SSLv2 Session Inspection
//!
//! Passive parser for the setup phase of SSLv2, SSLv3 and TLS sessions, as
//! used inline by an intrusion detection engine. It never terminates TLS:
//! it follows record and handshake framing across arbitrarily chunked
//! stream input, records handshake milestones, extracts the server
//! certificate chain and stops inspection once both sides are encrypted.
//!
//! ## Architecture
//!
//! - **protocols**: the [`ProtocolParser`](protocols::ProtocolParser) seam and
//!   the TLS/SSLv2 parser ([`protocols::tls`])
//! - **conntrack**: per-flow session table with creation on probe, direction
//!   tracking and idle expiry
//! - **matcher**: signature matching over milestone flags, certificate
//!   fields and decoder events
//!
//! ## Python Integration
//!
//! With the `python` feature the crate builds as the `tls_inspect` Python
//! module, exposing `TlsEngine` and [`TlsSessionRecord`].

pub mod conntrack;
pub mod matcher;
pub mod protocols;

#[cfg(feature = "python")]
mod python;

use serde::{Deserialize, Serialize};

use conntrack::FlowKey;
use protocols::tls::types::version_to_string;
use protocols::tls::SslState;

// ---------------------------------------------------------------------------
// Export record
// ---------------------------------------------------------------------------

/// Summary of a TLS session for logging and alerting.
#[cfg_attr(feature = "python", pyo3::pyclass(get_all))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsSessionRecord {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    /// Negotiated version, e.g. "TLSv1.2"; empty if none was seen.
    pub version: String,
    pub subject: String,
    pub issuer: String,
    pub fingerprint: String,
    /// Number of certificates in the server chain.
    pub chain_len: usize,
    /// Names of the milestone flags set on the session.
    pub ssl_state: Vec<String>,
    /// Names of the pending decoder events.
    pub events: Vec<String>,
}

impl TlsSessionRecord {
    /// Summarise `state`, with endpoints taken from the originator's key.
    pub fn from_state(flow: &FlowKey, state: &SslState) -> Self {
        let cert = state.server().certificate();

        Self {
            src_ip: flow.src_ip.clone(),
            dst_ip: flow.dst_ip.clone(),
            src_port: flow.src_port,
            dst_port: flow.dst_port,
            version: version_to_string(state.version()),
            subject: cert.and_then(|c| c.subject.clone()).unwrap_or_default(),
            issuer: cert.and_then(|c| c.issuer.clone()).unwrap_or_default(),
            fingerprint: cert.and_then(|c| c.fingerprint.clone()).unwrap_or_default(),
            chain_len: cert.map(|c| c.chain.len()).unwrap_or(0),
            ssl_state: state.flags().names().into_iter().map(String::from).collect(),
            events: state.events().iter().map(|ev| ev.to_string()).collect(),
        }
    }

    /// Serialize to a JSON object.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
