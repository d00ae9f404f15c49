//! # SSLv3/TLS Records
//!
//! ```text
//! +--------------+-----------+-----------+----------------------+
//! | content_type |  version  |  length   | body (length bytes)  |
//! |    1 byte    |  2 bytes  |  2 bytes  |                      |
//! +--------------+-----------+-----------+----------------------+
//! ```
//!
//! The header is decoded in one step when the whole of it is available and
//! through the resumable cursor otherwise. Handshake bodies go to the
//! handshake parser until the direction has sent ChangeCipherSpec; all
//! other bodies are skipped by length.

use super::cursor::HeaderField;
use super::error::TlsError;
use super::events::TlsDecoderEvent;
use super::handshake;
use super::state::{ConnectionState, MilestoneFlags, MIN_HANDSHAKE_RECORD_LEN};
use super::types::ContentType;
use super::ParseContext;

/// Parse as much of the current SSLv3/TLS record as `input` holds.
pub(crate) fn decode(ctx: &mut ParseContext<'_>, input: &[u8]) -> Result<usize, TlsError> {
    let mut consumed = 0;

    if !ctx.conn.header_complete() {
        consumed = read_header(ctx.conn, input)?;
        if !ctx.conn.header_complete() {
            return Ok(consumed);
        }
        on_header(ctx)?;
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

    let used = if ContentType::from(ctx.conn.content_type) == ContentType::Handshake
        && !ctx.conn.opaque
    {
        handshake::parse(ctx, &body[..take])?
    } else {
        take
    };

    ctx.conn.bytes_processed += used as u32;
    consumed += used;

    if ctx.conn.bytes_processed == end {
        ctx.conn.finish_record();
    }

    Ok(consumed)
}

fn read_header(conn: &mut ConnectionState, input: &[u8]) -> Result<usize, TlsError> {
    let cursor = u32::from(conn.header.consumed());
    if cursor != conn.bytes_processed {
        return Err(TlsError::InvalidTlsHeader {
            cursor,
            processed: conn.bytes_processed,
        });
    }

    let layout = conn.framing.layout();
    let mut content_type = conn.content_type;
    let mut version = conn.version;
    let mut length = conn.record_length;
    let mut on_field = |field: HeaderField, value: u32| match field {
        HeaderField::ContentType => content_type = value as u8,
        HeaderField::Version => version = value as u16,
        HeaderField::RecordLength => length = value,
        _ => {}
    };

    let n = match conn.header.decode_whole(layout, input, &mut on_field) {
        Some(n) => n,
        None => conn.header.feed(layout, input, &mut on_field),
    };

    conn.content_type = content_type;
    conn.version = version;
    conn.record_length = length;
    conn.bytes_processed += n as u32;
    Ok(n)
}

fn on_header(ctx: &mut ParseContext<'_>) -> Result<(), TlsError> {
    let conn = &mut *ctx.conn;

    tracing::debug!(
        direction = ?ctx.direction,
        content_type = conn.content_type,
        version = conn.version,
        length = conn.record_length,
        "tls record"
    );

    match ContentType::from(conn.content_type) {
        ContentType::ChangeCipherSpec => {
            ctx.flags.insert(
                MilestoneFlags::CHANGE_CIPHER_SPEC
                    | MilestoneFlags::change_cipher_spec(ctx.direction),
            );
            conn.opaque = true;
            check_encrypted(ctx);
        }
        ContentType::ApplicationData => check_encrypted(ctx),
        ContentType::Handshake => {
            if !conn.opaque
                && !conn.handshake_in_progress()
                && conn.record_length < MIN_HANDSHAKE_RECORD_LEN
            {
                return Err(TlsError::InvalidRecordLength {
                    length: conn.record_length,
                });
            }
        }
        ContentType::Alert | ContentType::Heartbeat => {}
        ContentType::Unknown(_) => ctx.events.push(TlsDecoderEvent::InvalidRecordType),
    }

    Ok(())
}

/// Stop inspection once both directions have sent ChangeCipherSpec.
fn check_encrypted(ctx: &mut ParseContext<'_>) {
    if ctx.flags.contains(
        MilestoneFlags::CLIENT_CHANGE_CIPHER_SPEC | MilestoneFlags::SERVER_CHANGE_CIPHER_SPEC,
    ) {
        ctx.stop_inspection();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
