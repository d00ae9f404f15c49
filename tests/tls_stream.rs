//! # TLS Stream Integration Tests
//!
//! Drives [`TlsParser`] the way the stream reassembly layer does: whole
//! handshake flights cut into arbitrary chunks, in both directions.
//!
//! ## Running
//!
//! ```bash
//! cargo test --test tls_stream
//! ```

mod common;

use sha1::{Digest, Sha1};

use common::*;
use tls_inspect::conntrack::{FlowKey, SessionTable};
use tls_inspect::protocols::tls::{
    CertificateDecode, CertificateDecoder, MilestoneFlags, SslState, TlsConfig, TlsDecoderEvent,
    TlsError, TlsParser, X509CertificateDecoder, MAX_RECORDS_PER_CHUNK,
};
use tls_inspect::protocols::tls::types::SSL_VERSION_2;
use tls_inspect::protocols::{Direction, ProbeResult, StreamFlags};

fn chain() -> Vec<Vec<u8>> {
    vec![
        certificate("www.example.org", "Example Intermediate", 700),
        certificate("Example Intermediate", "Example Root", 300),
    ]
}

fn run_whole(client: &[u8], server: &[u8]) -> Snapshot {
    let parser = TlsParser::new();
    let mut state = SslState::new();
    let mut stream = StreamFlags::default();
    feed_chunks(&parser, &mut state, &mut stream, Direction::Originator, &[client]);
    feed_chunks(&parser, &mut state, &mut stream, Direction::Responder, &[server]);
    Snapshot::of(&state, &stream)
}

#[test]
fn test_full_handshake() {
    let snapshot = run_whole(&client_flight(), &server_flight(&chain(), 512));

    let flags = MilestoneFlags::CLIENT_HELLO
        | MilestoneFlags::SERVER_HELLO
        | MilestoneFlags::CLIENT_KEYX
        | MilestoneFlags::SERVER_KEYX
        | MilestoneFlags::CHANGE_CIPHER_SPEC
        | MilestoneFlags::CLIENT_CHANGE_CIPHER_SPEC
        | MilestoneFlags::SERVER_CHANGE_CIPHER_SPEC;
    assert_eq!(snapshot.flags, flags.bits());
    assert_eq!(snapshot.client, (20, 0x0303));
    assert_eq!(snapshot.server, (20, 0x0303));
    assert!(snapshot.events.is_empty());
    assert!(snapshot.no_inspection);

    let cert = snapshot.server_cert.expect("server certificate");
    assert_eq!(cert.subject.as_deref(), Some("CN=www.example.org"));
    assert_eq!(cert.issuer.as_deref(), Some("CN=Example Intermediate"));
    assert_eq!(cert.chain, chain());
    assert!(snapshot.client_cert.is_none());
}

#[test]
fn test_chunking_invariance_two_chunks() {
    let client = client_flight();
    let server = server_flight(&chain(), 400);
    let expected = run_whole(&client, &server);

    for split in 1..server.len() {
        let parser = TlsParser::new();
        let mut state = SslState::new();
        let mut stream = StreamFlags::default();
        feed_chunks(&parser, &mut state, &mut stream, Direction::Originator, &[&client]);
        feed_chunks(
            &parser,
            &mut state,
            &mut stream,
            Direction::Responder,
            &[&server[..split], &server[split..]],
        );
        assert_eq!(Snapshot::of(&state, &stream), expected, "split at {}", split);
    }
}

#[test]
fn test_chunking_invariance_byte_at_a_time() {
    let client = client_flight();
    let server = server_flight(&chain(), 300);
    let expected = run_whole(&client, &server);

    let parser = TlsParser::new();
    let mut state = SslState::new();
    let mut stream = StreamFlags::default();
    let client_bytes: Vec<&[u8]> = client.chunks(1).collect();
    let server_bytes: Vec<&[u8]> = server.chunks(1).collect();
    feed_chunks(&parser, &mut state, &mut stream, Direction::Originator, &client_bytes);
    feed_chunks(&parser, &mut state, &mut stream, Direction::Responder, &server_bytes);

    assert_eq!(Snapshot::of(&state, &stream), expected);
}

#[test]
fn test_chunking_invariance_interleaved() {
    let client = client_flight();
    let server = server_flight(&chain(), 256);
    let expected = run_whole(&client, &server);

    let parser = TlsParser::new();
    let mut state = SslState::new();
    let mut stream = StreamFlags::default();
    let mut client_chunks = client.chunks(7);
    let mut server_chunks = server.chunks(13);
    loop {
        let c = client_chunks.next();
        let s = server_chunks.next();
        if c.is_none() && s.is_none() {
            break;
        }
        if let Some(c) = c {
            feed_chunks(&parser, &mut state, &mut stream, Direction::Originator, &[c]);
        }
        if let Some(s) = s {
            feed_chunks(&parser, &mut state, &mut stream, Direction::Responder, &[s]);
        }
    }

    assert_eq!(Snapshot::of(&state, &stream), expected);
}

#[test]
fn test_record_header_prefix_byte_at_a_time() {
    let parser = TlsParser::new();

    let mut stepped = SslState::new();
    let mut stream = StreamFlags::default();
    feed_chunks(
        &parser,
        &mut stepped,
        &mut stream,
        Direction::Originator,
        &[&[0x16], &[0x03], &[0x01]],
    );

    let mut whole = SslState::new();
    let mut stream = StreamFlags::default();
    feed_chunks(&parser, &mut whole, &mut stream, Direction::Originator, &[&[0x16, 0x03, 0x01]]);

    for state in [&stepped, &whole] {
        assert_eq!(state.client().content_type(), 0x16);
        assert_eq!(state.client().version(), 0x0301);
        assert_eq!(state.client().bytes_processed(), 3);
    }
}

#[test]
fn test_sslv2_client_hello_fixture() {
    let parser = TlsParser::new();
    let mut state = SslState::new();
    let mut stream = StreamFlags::default();
    let fixture = [0x80, 0x31, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01];

    assert_eq!(parser.probe(&fixture, Direction::Originator), ProbeResult::Match);
    feed_chunks(&parser, &mut state, &mut stream, Direction::Originator, &[&fixture]);

    assert_eq!(state.client().content_type(), 1);
    assert_eq!(state.client().version(), SSL_VERSION_2);
    assert_eq!(state.client().record_header_width(), 2);
    assert_eq!(state.client().session_id_length(), 1);
}

#[test]
fn test_client_hello_odd_splits() {
    let hello = record(22, 0x0301, &handshake(1, &client_hello_body()));
    let cuts = [1, 2, 5, 6, 10];

    let mut chunks: Vec<&[u8]> = Vec::new();
    let mut start = 0;
    for &cut in &cuts {
        chunks.push(&hello[start..cut]);
        start = cut;
    }
    chunks.push(&hello[start..]);

    let parser = TlsParser::new();
    let mut state = SslState::new();
    let mut stream = StreamFlags::default();
    feed_chunks(&parser, &mut state, &mut stream, Direction::Originator, &chunks);

    assert_eq!(state.flags(), MilestoneFlags::CLIENT_HELLO);
    assert_eq!(state.client().version(), 0x0301);
    assert_eq!(state.client().bytes_processed(), 0);
    assert!(state.events().is_empty());
}

#[test]
fn test_multi_record_certificate_matches_direct_decode() {
    let chain = chain();
    let body = certificate_list(&chain);
    let direct = match X509CertificateDecoder.decode(&body) {
        CertificateDecode::Decoded { certificates, .. } => certificates,
        other => panic!("direct decode failed: {:?}", other),
    };

    // 100-byte records put the certificate message across a dozen records
    let parser = TlsParser::new();
    let mut state = SslState::new();
    let mut stream = StreamFlags::default();
    let flight = fragment(0x0303, &handshake(11, &body), 100);
    feed_chunks(&parser, &mut state, &mut stream, Direction::Responder, &[&flight]);

    let cert = state.server().certificate().expect("certificate");
    assert_eq!(cert.subject, direct.subject);
    assert_eq!(cert.issuer, direct.issuer);
    assert_eq!(cert.fingerprint, direct.fingerprint);
    assert_eq!(cert.chain, direct.chain);

    let digest = Sha1::digest(&chain[0]);
    let hex: Vec<String> = digest.iter().map(|b| format!("{:02x}", b)).collect();
    assert_eq!(cert.fingerprint.as_deref(), Some(hex.join(":").as_str()));
}

#[test]
fn test_change_cipher_spec_stops_inspection_once() {
    let parser = TlsParser::with_config(TlsConfig {
        no_reassemble: false,
        ..TlsConfig::default()
    });
    let mut state = SslState::new();
    let mut stream = StreamFlags::default();
    let ccs = record(20, 0x0303, &[0x01]);
    let app = record(23, 0x0303, &[0x42; 16]);

    feed_chunks(&parser, &mut state, &mut stream, Direction::Originator, &[&ccs]);
    assert!(!stream.no_inspection());
    feed_chunks(&parser, &mut state, &mut stream, Direction::Originator, &[&app]);
    assert!(!stream.no_inspection());

    feed_chunks(&parser, &mut state, &mut stream, Direction::Responder, &[&ccs]);
    assert!(stream.no_inspection());
    assert!(!stream.no_reassembly());
    assert!(!stream.set_no_inspection());

    feed_chunks(&parser, &mut state, &mut stream, Direction::Responder, &[&app]);
    feed_chunks(&parser, &mut state, &mut stream, Direction::Originator, &[&app]);
    assert!(stream.no_inspection());
}

#[test]
fn test_malformed_input_raises_one_event() {
    let parser = TlsParser::new();

    // zero-length alert records, one more than allowed per call
    let flood: Vec<u8> = record(21, 0x0303, &[]).repeat(MAX_RECORDS_PER_CHUNK + 5);
    let mut state = SslState::new();
    let mut stream = StreamFlags::default();
    let result = parser.parse(&mut state, Direction::Originator, &mut stream, &flood);
    assert_eq!(
        result,
        Err(TlsError::TooManyRecords {
            limit: MAX_RECORDS_PER_CHUNK
        })
    );
    assert_eq!(
        state.events().iter().copied().collect::<Vec<_>>(),
        vec![TlsDecoderEvent::TooManyRecordsInPacket]
    );
    assert_eq!(state.client().bytes_processed(), 0);

    // unknown handshake message
    let mut state = SslState::new();
    let bad = record(22, 0x0303, &handshake(0x63, &[0u8; 8]));
    let result = parser.parse(&mut state, Direction::Responder, &mut stream, &bad);
    assert_eq!(result, Err(TlsError::UnknownHandshakeType(0x63)));
    assert_eq!(state.events().len(), 1);
    assert!(state.events().contains(TlsDecoderEvent::InvalidHandshakeMessage));

    // recovers at a fresh record afterwards
    let hello = record(22, 0x0303, &handshake(2, &server_hello_body()));
    feed_chunks(&parser, &mut state, &mut stream, Direction::Responder, &[&hello]);
    assert!(state.flags().contains(MilestoneFlags::SERVER_HELLO));
}

#[test]
fn test_certificate_buffer_limit() {
    let parser = TlsParser::with_config(TlsConfig {
        max_certificate_buffer: 512,
        ..TlsConfig::default()
    });
    let mut state = SslState::new();
    let mut stream = StreamFlags::default();

    let server = server_flight(&chain(), 256);
    feed_chunks(&parser, &mut state, &mut stream, Direction::Responder, &[&server]);

    assert!(state.server().certificate().is_none());
    assert!(state.server().certificate_buffer().is_abandoned());
    assert_eq!(state.events().count(TlsDecoderEvent::CertificateBufferExhausted), 1);
    // the rest of the flight is still followed
    assert!(state.flags().contains(
        MilestoneFlags::SERVER_HELLO
            | MilestoneFlags::SERVER_KEYX
            | MilestoneFlags::SERVER_CHANGE_CIPHER_SPEC
    ));
}

#[test]
fn test_session_table_end_to_end() {
    let table = SessionTable::new(TlsParser::new());
    let client_key = FlowKey::new("172.16.0.5".into(), "93.184.216.34".into(), 49152, 443, 6);
    let server_key = client_key.reversed();

    let client = client_flight();
    let server = server_flight(&chain(), 1024);

    assert_eq!(
        table.detect(&client_key, Direction::Originator, &client, 10.0),
        ProbeResult::Match
    );
    for chunk in client.chunks(64) {
        assert!(matches!(table.process(&client_key, chunk, 10.0), Some(Ok(_))));
    }
    for chunk in server.chunks(64) {
        table.process(&server_key, chunk, 10.1);
    }

    let record = table.session_record(&server_key).expect("session record");
    assert_eq!(record.src_ip, "172.16.0.5");
    assert_eq!(record.dst_port, 443);
    assert_eq!(record.version, "TLSv1.2");
    assert_eq!(record.subject, "CN=www.example.org");
    assert_eq!(record.chain_len, 2);
    assert!(record.ssl_state.contains(&"server_change_cipher_spec".to_string()));

    assert!(table.inspect(&client_key, |s| s.stream.no_inspection()).unwrap());
    assert_eq!(table.process(&client_key, &[0x17], 10.2), None);
}
