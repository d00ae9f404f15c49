//! Shared wire builders and state snapshots for the integration tests.

#![allow(dead_code)]

use tls_inspect::protocols::tls::{CertificateInfo, SslState, TlsDecoderEvent, TlsParser};
use tls_inspect::protocols::{Direction, StreamFlags};

// ---------------------------------------------------------------------------
// DER
// ---------------------------------------------------------------------------

fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(content);
    out
}

fn seq(parts: &[Vec<u8>]) -> Vec<u8> {
    der(0x30, &parts.concat())
}

fn name(common_name: &str) -> Vec<u8> {
    let attr = seq(&[
        der(0x06, &[0x55, 0x04, 0x03]),
        der(0x0c, common_name.as_bytes()),
    ]);
    seq(&[der(0x31, &attr)])
}

fn algorithm(oid: &[u8]) -> Vec<u8> {
    seq(&[der(0x06, oid), der(0x05, &[])])
}

const SHA256_WITH_RSA: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b];
const RSA_ENCRYPTION: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];

/// X.509 v3 certificate with the given subject and issuer common names.
///
/// `padding` bytes are carried in the signature so tests can make the
/// certificate as large as they need.
pub fn certificate(subject_cn: &str, issuer_cn: &str, padding: usize) -> Vec<u8> {
    let tbs = seq(&[
        der(0xa0, &der(0x02, &[0x02])),
        der(0x02, &[0x01]),
        algorithm(&SHA256_WITH_RSA),
        name(issuer_cn),
        seq(&[der(0x17, b"240101000000Z"), der(0x17, b"340101000000Z")]),
        name(subject_cn),
        seq(&[algorithm(&RSA_ENCRYPTION), der(0x03, &[0x00, 0x30, 0x00])]),
    ]);
    let mut signature = vec![0x00];
    signature.resize(1 + padding.max(1), 0x5a);
    seq(&[tbs, algorithm(&SHA256_WITH_RSA), der(0x03, &signature)])
}

// ---------------------------------------------------------------------------
// TLS framing
// ---------------------------------------------------------------------------

fn u24(len: usize) -> [u8; 3] {
    [(len >> 16) as u8, (len >> 8) as u8, len as u8]
}

pub fn certificate_list(entries: &[Vec<u8>]) -> Vec<u8> {
    let list: Vec<u8> = entries
        .iter()
        .flat_map(|e| u24(e.len()).into_iter().chain(e.iter().copied()))
        .collect();
    let mut out = u24(list.len()).to_vec();
    out.extend(list);
    out
}

pub fn handshake(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![msg_type];
    out.extend_from_slice(&u24(body.len()));
    out.extend_from_slice(body);
    out
}

pub fn record(content_type: u8, version: u16, body: &[u8]) -> Vec<u8> {
    let mut out = vec![content_type];
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Split `payload` across Handshake records of at most `max` body bytes.
pub fn fragment(version: u16, payload: &[u8], max: usize) -> Vec<u8> {
    payload
        .chunks(max)
        .flat_map(|chunk| record(22, version, chunk))
        .collect()
}

/// ClientHello body: version, random, empty session id, one suite, null compression.
pub fn client_hello_body() -> Vec<u8> {
    let mut body = vec![0x03, 0x03];
    body.extend_from_slice(&[0x11; 32]);
    body.extend_from_slice(&[0x00, 0x00, 0x02, 0x13, 0x01, 0x01, 0x00]);
    body
}

/// ServerHello body: version, random, empty session id, suite, null compression.
pub fn server_hello_body() -> Vec<u8> {
    let mut body = vec![0x03, 0x03];
    body.extend_from_slice(&[0x22; 32]);
    body.extend_from_slice(&[0x00, 0x13, 0x01, 0x00]);
    body
}

/// Client side of a full TLS 1.2 handshake up to ChangeCipherSpec.
pub fn client_flight() -> Vec<u8> {
    let mut out = record(22, 0x0301, &handshake(1, &client_hello_body()));
    out.extend(record(22, 0x0303, &handshake(16, &[0x00, 0x02, 0xaa, 0xbb])));
    out.extend(record(20, 0x0303, &[0x01]));
    out
}

/// Server side of a full TLS 1.2 handshake, with the Certificate message
/// fragmented across records of `max_record` bytes.
pub fn server_flight(chain: &[Vec<u8>], max_record: usize) -> Vec<u8> {
    let mut messages = handshake(2, &server_hello_body());
    messages.extend(handshake(11, &certificate_list(chain)));
    messages.extend(handshake(12, &[0x03, 0x00, 0x17, 0x00]));
    messages.extend(handshake(14, &[]));

    let mut out = fragment(0x0303, &messages, max_record);
    out.extend(record(20, 0x0303, &[0x01]));
    out
}

// ---------------------------------------------------------------------------
// Driving the parser
// ---------------------------------------------------------------------------

/// Feed `chunks` in order, asserting each is fully consumed.
pub fn feed_chunks(
    parser: &TlsParser,
    state: &mut SslState,
    stream: &mut StreamFlags,
    direction: Direction,
    chunks: &[&[u8]],
) {
    for chunk in chunks {
        let consumed = parser
            .parse(state, direction, stream, chunk)
            .expect("parse failed");
        assert_eq!(consumed, chunk.len());
    }
}

/// Externally observable state of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub flags: u32,
    pub client: (u8, u16),
    pub server: (u8, u16),
    pub client_cert: Option<CertificateInfo>,
    pub server_cert: Option<CertificateInfo>,
    pub events: Vec<TlsDecoderEvent>,
    pub no_inspection: bool,
}

impl Snapshot {
    pub fn of(state: &SslState, stream: &StreamFlags) -> Self {
        Self {
            flags: state.flags().bits(),
            client: (state.client().content_type(), state.client().version()),
            server: (state.server().content_type(), state.server().version()),
            client_cert: state.client().certificate().cloned(),
            server_cert: state.server().certificate().cloned(),
            events: state.events().iter().copied().collect(),
            no_inspection: stream.no_inspection(),
        }
    }
}
