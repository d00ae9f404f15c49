//! # Handshake Messages
//!
//! Parses the handshake messages carried in Handshake records. A message
//! and its 4-byte sub-header may continue across record boundaries, so the
//! message position lives in [`ConnectionState`] rather than in the record.
//!
//! Certificate bodies are handed to the reassembler; every other message
//! body is skipped after its milestone flag is recorded.

use super::certificate;
use super::cursor::HeaderField;
use super::error::TlsError;
use super::state::{ConnectionState, MilestoneFlags, HANDSHAKE_LAYOUT};
use super::types::HandshakeType;
use super::ParseContext;

/// Parse handshake data from the body of the current record.
///
/// `input` never extends past the end of the record. Returns the number of
/// bytes consumed, which is all of `input` on success.
pub(crate) fn parse(ctx: &mut ParseContext<'_>, input: &[u8]) -> Result<usize, TlsError> {
    let mut offset = 0;

    while offset < input.len() {
        let available = input.len() - offset;
        let n = parse_step(ctx, &input[offset..])?;
        if n > available {
            return Err(TlsError::HandshakeOverrun {
                consumed: n,
                available,
            });
        }
        if n == 0 {
            break;
        }
        offset += n;
    }

    Ok(offset)
}

/// Advance through at most one message: its header, then its body.
fn parse_step(ctx: &mut ParseContext<'_>, input: &[u8]) -> Result<usize, TlsError> {
    let mut consumed = 0;

    if !ctx.conn.handshake_header_complete() {
        consumed = read_header(ctx.conn, input);
        if !ctx.conn.handshake_header_complete() {
            return Ok(consumed);
        }

        on_message_start(ctx)?;
        if ctx.conn.handshake_message_length == 0 {
            ctx.conn.finish_handshake_message();
            return Ok(consumed);
        }
    }

    Ok(consumed + parse_body(ctx, &input[consumed..])?)
}

fn read_header(conn: &mut ConnectionState, input: &[u8]) -> usize {
    let mut msg_type = conn.handshake_type;
    let mut length = conn.handshake_message_length;
    let mut on_field = |field: HeaderField, value: u32| match field {
        HeaderField::MessageType => msg_type = value as u8,
        HeaderField::MessageLength => length = value,
        _ => {}
    };

    let n = match conn.handshake.decode_whole(&HANDSHAKE_LAYOUT, input, &mut on_field) {
        Some(n) => n,
        None => conn.handshake.feed(&HANDSHAKE_LAYOUT, input, &mut on_field),
    };

    conn.handshake_type = msg_type;
    conn.handshake_message_length = length;
    n
}

fn on_message_start(ctx: &mut ParseContext<'_>) -> Result<(), TlsError> {
    let conn = &mut *ctx.conn;

    tracing::debug!(
        direction = ?ctx.direction,
        msg_type = conn.handshake_type,
        length = conn.handshake_message_length,
        "handshake message"
    );

    match HandshakeType::from(conn.handshake_type) {
        HandshakeType::ClientHello => ctx.flags.insert(MilestoneFlags::CLIENT_HELLO),
        HandshakeType::ServerHello => ctx.flags.insert(MilestoneFlags::SERVER_HELLO),
        HandshakeType::ServerKeyExchange => ctx.flags.insert(MilestoneFlags::SERVER_KEYX),
        HandshakeType::ClientKeyExchange => ctx.flags.insert(MilestoneFlags::CLIENT_KEYX),
        HandshakeType::Certificate => {
            if conn.handshake_message_length == 0 {
                return Err(TlsError::InvalidCertificate(
                    "empty certificate message".to_string(),
                ));
            }
            conn.cert_buffer.clear();
            conn.certificate_skip = conn.cert_buffer.is_abandoned();
        }
        HandshakeType::Unknown(msg_type) => return Err(TlsError::UnknownHandshakeType(msg_type)),
        HandshakeType::HelloRequest
        | HandshakeType::NewSessionTicket
        | HandshakeType::CertificateRequest
        | HandshakeType::ServerHelloDone
        | HandshakeType::CertificateVerify
        | HandshakeType::Finished
        | HandshakeType::CertificateUrl
        | HandshakeType::CertificateStatus => {}
    }

    Ok(())
}

fn parse_body(ctx: &mut ParseContext<'_>, input: &[u8]) -> Result<usize, TlsError> {
    let remaining = (ctx.conn.handshake_message_length - ctx.conn.message_processed) as usize;
    let take = remaining.min(input.len());

    let consumed = if ctx.conn.handshake_type == HandshakeType::CERTIFICATE
        && !ctx.conn.certificate_skip
    {
        certificate::reassemble(ctx, &input[..take], take == remaining)?
    } else {
        take
    };

    ctx.conn.message_processed += consumed as u32;
    if ctx.conn.message_processed == ctx.conn.handshake_message_length {
        ctx.conn.finish_handshake_message();
    }

    Ok(consumed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
