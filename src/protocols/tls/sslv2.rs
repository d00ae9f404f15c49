//! # SSLv2 Records
//!
//! ```text
//! 2-byte form (first byte & 0x80):   [1|length:15][msg_type][body]
//! 3-byte form (first byte & 0x40):   [0|x|length:14][padding][msg_type][body]
//! ```
//!
//! The message type is the first byte counted by `length`. SSLv2 records
//! are never reassembled; the parser only follows the message sequence to
//! learn when both sides have switched to encrypted traffic.

use super::cursor::HeaderField;
use super::error::TlsError;
use super::events::TlsDecoderEvent;
use super::state::{ConnectionState, MilestoneFlags, SSLV2_SESSION_ID_LAYOUT};
use super::types::{Sslv2MessageType, SSL_VERSION_2};
use super::ParseContext;
use crate::protocols::Direction;

/// Parse as much of the current SSLv2 record as `input` holds.
pub(crate) fn decode(ctx: &mut ParseContext<'_>, input: &[u8]) -> Result<usize, TlsError> {
    let mut consumed = 0;

    if !ctx.conn.header_complete() {
        consumed = read_header(ctx.conn, input);
        if !ctx.conn.header_complete() {
            return Ok(consumed);
        }
        if ctx.conn.record_length == 0 {
            return Err(TlsError::InvalidSslv2Header("zero record length"));
        }
        ctx.conn.version = SSL_VERSION_2;
        on_message(ctx);
    }

    let end = ctx.conn.record_end();
    if ctx.conn.bytes_processed > end {
        return Err(TlsError::RecordOverrun {
            processed: ctx.conn.bytes_processed,
            end,
        });
    }

    let body = &input[consumed..];
    let take = ((end - ctx.conn.bytes_processed) as usize).min(body.len());

    if Sslv2MessageType::from(ctx.conn.content_type) == Sslv2MessageType::ClientHello
        && !ctx.conn.session_id.is_complete(&SSLV2_SESSION_ID_LAYOUT)
    {
        read_session_id(ctx, &body[..take]);
    }

    ctx.conn.bytes_processed += take as u32;
    consumed += take;

    if ctx.conn.bytes_processed == end {
        ctx.conn.finish_record();
    }

    Ok(consumed)
}

fn read_header(conn: &mut ConnectionState, input: &[u8]) -> usize {
    let layout = conn.framing.layout();
    let mask = conn.framing.length_mask();
    let mut msg_type = conn.content_type;
    let mut length = conn.record_length;
    let mut on_field = |field: HeaderField, value: u32| match field {
        HeaderField::RecordLength => length = value & mask,
        HeaderField::ContentType => msg_type = value as u8,
        _ => {}
    };

    let n = match conn.header.decode_whole(layout, input, &mut on_field) {
        Some(n) => n,
        None => conn.header.feed(layout, input, &mut on_field),
    };

    conn.content_type = msg_type;
    conn.record_length = length;
    conn.bytes_processed += n as u32;
    n
}

/// Peek at the ClientHello session-id length while the body is skipped.
fn read_session_id(ctx: &mut ParseContext<'_>, body: &[u8]) {
    let conn = &mut *ctx.conn;
    let mut session_id_length = None;
    conn.session_id.feed(&SSLV2_SESSION_ID_LAYOUT, body, |field, value| {
        if field == HeaderField::SessionIdLength {
            session_id_length = Some(value as u16);
        }
    });

    if let Some(len) = session_id_length {
        conn.session_id_length = len;
        if len == 0 {
            ctx.flags.insert(MilestoneFlags::SSLV2_NO_SESSION_ID);
        }
    }
}

fn on_message(ctx: &mut ParseContext<'_>) {
    let direction = ctx.direction;
    let msg_type = Sslv2MessageType::from(ctx.conn.content_type);
    let mut current = MilestoneFlags::empty();

    tracing::debug!(
        ?direction,
        msg_type = ctx.conn.content_type,
        length = ctx.conn.record_length,
        "sslv2 record"
    );

    match msg_type {
        Sslv2MessageType::Error => ctx.events.push(TlsDecoderEvent::ErrorMessageEncountered),
        Sslv2MessageType::ClientHello => {
            current = MilestoneFlags::CLIENT_HELLO | MilestoneFlags::SSLV2_CLIENT_HS;
        }
        Sslv2MessageType::ServerHello => {
            current = MilestoneFlags::SERVER_HELLO | MilestoneFlags::SSLV2_SERVER_HS;
        }
        Sslv2MessageType::ClientMasterKey => {
            if direction == Direction::Responder {
                tracing::debug!("sslv2 client master key sent towards the client");
            }
            current = MilestoneFlags::SSLV2_CLIENT_MASTER_KEY;
        }
        Sslv2MessageType::ClientCertificate
        | Sslv2MessageType::ServerVerify
        | Sslv2MessageType::ServerFinished
        | Sslv2MessageType::ClientFinished
        | Sslv2MessageType::RequestCertificate => {
            if msg_type == Sslv2MessageType::ClientCertificate {
                if direction == Direction::Originator {
                    current = MilestoneFlags::CLIENT_KEYX;
                } else {
                    tracing::debug!("sslv2 client certificate sent towards the client");
                }
            }
            infer_encryption(ctx);
        }
        Sslv2MessageType::Unknown(other) => {
            tracing::debug!(msg_type = other, "unknown sslv2 message type");
        }
    }

    ctx.flags.insert(current);
}

/// Track when each side of an SSLv2 session has switched to encryption.
///
/// Only meaningful once both hellos have been seen.
fn infer_encryption(ctx: &mut ParseContext<'_>) {
    let flags = *ctx.flags;
    if !flags.contains(MilestoneFlags::CLIENT_HELLO | MilestoneFlags::SERVER_HELLO) {
        return;
    }

    match ctx.direction {
        Direction::Originator => {
            if flags.intersects(
                MilestoneFlags::SSLV2_NO_SESSION_ID | MilestoneFlags::SSLV2_CLIENT_MASTER_KEY,
            ) {
                ctx.flags.insert(MilestoneFlags::SSLV2_CLIENT_ENCRYPTED);
            }
        }
        Direction::Responder => ctx.flags.insert(MilestoneFlags::SSLV2_SERVER_ENCRYPTED),
    }

    if ctx.flags.contains(
        MilestoneFlags::SSLV2_CLIENT_ENCRYPTED | MilestoneFlags::SSLV2_SERVER_ENCRYPTED,
    ) {
        ctx.stop_inspection();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::protocols::tls::events::TlsDecoderEvent;
    use crate::protocols::tls::state::{MilestoneFlags, RecordFraming, SslState};
    use crate::protocols::tls::test_support::sslv2_record;
    use crate::protocols::tls::types::SSL_VERSION_2;
    use crate::protocols::tls::{TlsError, TlsParser};
    use crate::protocols::{Direction, StreamFlags};

    const CLIENT_HELLO: [u8; 9] = [0x80, 0x31, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01];

    #[test]
    fn test_client_hello_header() {
        let parser = TlsParser::new();
        let mut state = SslState::new();
        let mut stream = StreamFlags::default();

        assert_eq!(
            parser.parse(&mut state, Direction::Originator, &mut stream, &CLIENT_HELLO),
            Ok(CLIENT_HELLO.len())
        );
        let client = state.client();
        assert_eq!(client.framing(), RecordFraming::Sslv2TwoByte);
        assert_eq!(client.content_type(), 1);
        assert_eq!(client.version(), SSL_VERSION_2);
        assert_eq!(client.record_length(), 0x31);
        assert_eq!(client.record_header_width(), 2);
        assert_eq!(client.session_id_length(), 1);
        assert!(state
            .flags()
            .contains(MilestoneFlags::CLIENT_HELLO | MilestoneFlags::SSLV2_CLIENT_HS));
        assert!(!state.flags().contains(MilestoneFlags::SSLV2_NO_SESSION_ID));
    }

    #[test]
    fn test_three_byte_header() {
        let parser = TlsParser::new();
        let mut state = SslState::new();
        let mut stream = StreamFlags::default();
        // length 4, padding 0, ServerHello, 3 body bytes
        let data = [0x40, 0x04, 0x00, 0x04, 0x00, 0x01, 0x00];

        assert_eq!(
            parser.parse(&mut state, Direction::Responder, &mut stream, &data),
            Ok(data.len())
        );
        let server = state.server();
        assert_eq!(server.framing(), RecordFraming::Sslv2ThreeByte);
        assert_eq!(server.content_type(), 4);
        assert_eq!(server.bytes_processed(), 0);
        assert!(state.flags().contains(MilestoneFlags::SERVER_HELLO));
    }

    #[test]
    fn test_three_byte_client_hello_session_id() {
        // length 10, padding 0, ClientHello: version 2, 3 cipher bytes,
        // empty session id, 16 challenge bytes (truncated)
        let data = [
            0x40, 0x0a, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00, 0x10, 0xaa,
        ];
        let parser = TlsParser::new();

        for split in 0..=data.len() {
            let mut state = SslState::new();
            let mut stream = StreamFlags::default();
            for chunk in [&data[..split], &data[split..]] {
                if !chunk.is_empty() {
                    assert_eq!(
                        parser.parse(&mut state, Direction::Originator, &mut stream, chunk),
                        Ok(chunk.len())
                    );
                }
            }

            let client = state.client();
            assert_eq!(client.framing(), RecordFraming::Sslv2ThreeByte, "split {}", split);
            assert_eq!(client.session_id_length(), 0, "split {}", split);
            assert_eq!(client.bytes_processed(), 0, "split {}", split);
            assert!(state.flags().contains(MilestoneFlags::SSLV2_NO_SESSION_ID));
        }
    }

    #[test]
    fn test_zero_length_record_fails() {
        let parser = TlsParser::new();
        let mut state = SslState::new();
        let mut stream = StreamFlags::default();

        let data = [0x80, 0x00, 0x01];
        let result = parser.parse(&mut state, Direction::Originator, &mut stream, &data);
        assert!(matches!(result, Err(TlsError::InvalidSslv2Header(_))));
        assert_eq!(state.events().count(TlsDecoderEvent::InvalidSslv2Header), 1);
    }

    #[test]
    fn test_error_message_event() {
        let parser = TlsParser::new();
        let mut state = SslState::new();
        let mut stream = StreamFlags::default();
        let data = sslv2_record(0, &[0x00, 0x01]);

        parser
            .parse(&mut state, Direction::Responder, &mut stream, &data)
            .unwrap();
        assert!(state.events().contains(TlsDecoderEvent::ErrorMessageEncountered));
    }

    #[test]
    fn test_encryption_inference_stops_inspection() {
        let parser = TlsParser::new();
        let mut state = SslState::new();
        let mut stream = StreamFlags::default();

        // ClientHello without a session id
        let hello = sslv2_record(1, &[0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00, 0x10]);
        let server_hello = sslv2_record(4, &[0x00, 0x01, 0x00, 0x02]);
        let client_finished = sslv2_record(3, &[0xaa; 8]);
        let server_verify = sslv2_record(5, &[0xbb; 8]);

        let mut run = |dir, data: &[u8]| {
            parser.parse(&mut state, dir, &mut stream, data).unwrap();
        };
        run(Direction::Originator, &hello);
        run(Direction::Responder, &server_hello);
        run(Direction::Originator, &client_finished);
        run(Direction::Responder, &server_verify);

        assert!(state.flags().contains(
            MilestoneFlags::SSLV2_NO_SESSION_ID
                | MilestoneFlags::SSLV2_CLIENT_ENCRYPTED
                | MilestoneFlags::SSLV2_SERVER_ENCRYPTED
        ));
        assert!(stream.no_inspection());
    }

    #[test]
    fn test_client_certificate_sets_keyx() {
        let parser = TlsParser::new();
        let mut state = SslState::new();
        let mut stream = StreamFlags::default();
        let data = sslv2_record(8, &[0x01, 0x00, 0x00]);

        parser
            .parse(&mut state, Direction::Originator, &mut stream, &data)
            .unwrap();
        assert!(state.flags().contains(MilestoneFlags::CLIENT_KEYX));
        assert!(!state.flags().contains(MilestoneFlags::SSLV2_CLIENT_ENCRYPTED));
    }
}
