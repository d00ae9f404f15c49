//! # Certificate Reassembly
//!
//! A Certificate handshake message frequently spans several records. Its
//! body is accumulated into a per-direction [`CertificateBuffer`] and handed
//! to a [`CertificateDecoder`] after every append, until the decoder reports
//! the certificate list complete.
//!
//! ```text
//! Certificate body:
//!   list_length (3 bytes)
//!   repeated:
//!     cert_length (3 bytes)
//!     cert (DER, cert_length bytes)
//! ```
//!
//! The decoder may consume fewer bytes than were buffered. The difference
//! is handed back to the handshake layer, which then skips the rest of the
//! message.

use sha1::{Digest, Sha1};
use x509_parser::error::X509Error;
use x509_parser::nom;
use x509_parser::prelude::parse_x509_certificate;

use super::error::TlsError;
use super::events::TlsDecoderEvent;
use super::ParseContext;

// ---------------------------------------------------------------------------
// Extracted certificate data
// ---------------------------------------------------------------------------

/// Certificate data extracted from one direction of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject of the first certificate.
    pub subject: Option<String>,
    /// Issuer of the first certificate.
    pub issuer: Option<String>,
    /// Colon-separated SHA-1 of the first certificate's DER.
    pub fingerprint: Option<String>,
    /// Raw DER of every certificate, in wire order.
    pub chain: Vec<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Reassembly buffer
// ---------------------------------------------------------------------------

/// Reassembly buffer for the Certificate message of one direction.
#[derive(Debug, Default)]
pub struct CertificateBuffer {
    data: Vec<u8>,
    abandoned: bool,
}

/// The buffer could not grow to hold the incoming bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BufferExhausted;

impl CertificateBuffer {
    /// Bytes buffered so far (the write position).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// True once reassembly was given up for this direction.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Drop buffered bytes, keeping the allocation.
    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    /// Release the buffer and refuse further reassembly.
    pub(crate) fn abandon(&mut self) {
        self.data = Vec::new();
        self.abandoned = true;
    }

    /// Append `bytes`, growing the buffer within `limit`.
    ///
    /// The first allocation is sized from the record carrying the message;
    /// later growth adds twice the incoming size.
    pub(crate) fn append(
        &mut self,
        bytes: &[u8],
        initial: usize,
        limit: usize,
    ) -> Result<(), BufferExhausted> {
        let needed = self.data.len() + bytes.len();
        if needed > limit {
            return Err(BufferExhausted);
        }

        if needed > self.data.capacity() {
            let target = if self.data.capacity() == 0 {
                initial.max(needed)
            } else {
                self.data.capacity() + 2 * bytes.len()
            };
            let target = target.min(limit);
            self.data
                .try_reserve_exact(target - self.data.len())
                .map_err(|_| BufferExhausted)?;
        }

        self.data.extend_from_slice(bytes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decoder seam
// ---------------------------------------------------------------------------

/// Hard decode failure of a certificate list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificateError {
    #[error("certificate entry of {length} bytes at offset {offset} overruns the list")]
    EntryOverrun { offset: usize, length: usize },

    #[error("empty certificate list")]
    EmptyList,
}

/// Certificates decoded from a complete list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedCertificates {
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub fingerprint: Option<String>,
    pub chain: Vec<Vec<u8>>,
    /// Non-fatal anomalies found while decoding.
    pub events: Vec<TlsDecoderEvent>,
}

/// Outcome of one decode attempt over the buffered bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateDecode {
    /// The list is incomplete; at least this many more bytes are needed.
    NeedMore(usize),
    /// The list is complete and occupied the first `consumed` bytes.
    Decoded {
        consumed: usize,
        certificates: DecodedCertificates,
    },
    /// The list framing is broken.
    Malformed(CertificateError),
}

/// Decodes a buffered Certificate message body.
pub trait CertificateDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> CertificateDecode;
}

/// Default decoder: list framing plus X.509 subject/issuer extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509CertificateDecoder;

const LENGTH_PREFIX: usize = 3;

fn read_u24(bytes: &[u8]) -> usize {
    (usize::from(bytes[0]) << 16) | (usize::from(bytes[1]) << 8) | usize::from(bytes[2])
}

impl CertificateDecoder for X509CertificateDecoder {
    fn decode(&self, data: &[u8]) -> CertificateDecode {
        if data.len() < LENGTH_PREFIX {
            return CertificateDecode::NeedMore(LENGTH_PREFIX - data.len());
        }

        let list_len = read_u24(&data[..LENGTH_PREFIX]);
        let total = LENGTH_PREFIX + list_len;
        if data.len() < total {
            return CertificateDecode::NeedMore(total - data.len());
        }
        if list_len == 0 {
            return CertificateDecode::Malformed(CertificateError::EmptyList);
        }

        let list = &data[LENGTH_PREFIX..total];
        let mut chain = Vec::new();
        let mut offset = 0;
        while offset < list.len() {
            if list.len() - offset < LENGTH_PREFIX {
                return CertificateDecode::Malformed(CertificateError::EntryOverrun {
                    offset,
                    length: list.len() - offset,
                });
            }
            let length = read_u24(&list[offset..offset + LENGTH_PREFIX]);
            let start = offset + LENGTH_PREFIX;
            if length > list.len() - start {
                return CertificateDecode::Malformed(CertificateError::EntryOverrun {
                    offset,
                    length,
                });
            }
            chain.push(list[start..start + length].to_vec());
            offset = start + length;
        }

        let mut certificates = DecodedCertificates::default();
        if let Some(first) = chain.first() {
            certificates.fingerprint = Some(fingerprint(first));
            decode_names(first, &mut certificates);
        }
        certificates.chain = chain;

        CertificateDecode::Decoded {
            consumed: total,
            certificates,
        }
    }
}

/// Colon-separated lowercase SHA-1 of `der`.
pub fn fingerprint(der: &[u8]) -> String {
    Sha1::digest(der)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn decode_names(der: &[u8], out: &mut DecodedCertificates) {
    match parse_x509_certificate(der) {
        Ok((_, cert)) => {
            let subject = cert.subject();
            if subject.iter().next().is_none() {
                out.events.push(TlsDecoderEvent::CertificateMissingElement);
            } else {
                out.subject = Some(subject.to_string());
            }

            let issuer = cert.issuer();
            if issuer.iter().next().is_none() {
                out.events.push(TlsDecoderEvent::CertificateMissingElement);
            } else {
                out.issuer = Some(issuer.to_string());
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            out.events.push(x509_error_event(&e));
        }
        Err(nom::Err::Incomplete(_)) => {
            out.events.push(TlsDecoderEvent::CertificateInvalidLength);
        }
    }
}

fn x509_error_event(err: &X509Error) -> TlsDecoderEvent {
    match err {
        X509Error::InvalidX509Name => TlsDecoderEvent::CertificateInvalidString,
        X509Error::InvalidExtensions | X509Error::InvalidAttributes => {
            TlsDecoderEvent::CertificateUnknownElement
        }
        X509Error::Der(_) => TlsDecoderEvent::CertificateInvalidLength,
        _ => TlsDecoderEvent::InvalidCertificate,
    }
}

// ---------------------------------------------------------------------------
// Reassembly
// ---------------------------------------------------------------------------

/// Feed `chunk`, the next slice of a Certificate message body.
///
/// `message_complete` is true when `chunk` ends the message. Returns the
/// number of bytes of `chunk` that belong to the certificate list.
pub(crate) fn reassemble(
    ctx: &mut ParseContext<'_>,
    chunk: &[u8],
    message_complete: bool,
) -> Result<usize, TlsError> {
    let conn = &mut *ctx.conn;

    let initial = 2 * conn.record_length as usize + usize::from(conn.record_header_width) + 1;
    if conn
        .cert_buffer
        .append(chunk, initial, ctx.config.max_certificate_buffer)
        .is_err()
    {
        tracing::warn!(
            direction = ?ctx.direction,
            buffered = conn.cert_buffer.len(),
            incoming = chunk.len(),
            limit = ctx.config.max_certificate_buffer,
            "certificate buffer exhausted, abandoning reassembly"
        );
        ctx.events.push(TlsDecoderEvent::CertificateBufferExhausted);
        conn.cert_buffer.abandon();
        conn.certificate_skip = true;
        return Ok(chunk.len());
    }

    match ctx.decoder.decode(conn.cert_buffer.as_slice()) {
        CertificateDecode::NeedMore(missing) => {
            if message_complete {
                conn.cert_buffer.clear();
                return Err(TlsError::InvalidCertificate(format!(
                    "certificate list short by {} bytes",
                    missing
                )));
            }
            Ok(chunk.len())
        }
        CertificateDecode::Malformed(err) => {
            conn.cert_buffer.clear();
            Err(TlsError::InvalidCertificate(err.to_string()))
        }
        CertificateDecode::Decoded {
            consumed,
            certificates,
        } => {
            let surplus = conn.cert_buffer.len().saturating_sub(consumed);
            conn.cert_buffer.clear();
            if surplus > chunk.len() {
                return Err(TlsError::CertificateOverrun {
                    surplus,
                    written: chunk.len(),
                });
            }

            tracing::debug!(
                direction = ?ctx.direction,
                chain = certificates.chain.len(),
                subject = certificates.subject.as_deref().unwrap_or("-"),
                "certificate list decoded"
            );

            for event in &certificates.events {
                ctx.events.push(*event);
            }
            conn.certificate = Some(CertificateInfo {
                subject: certificates.subject,
                issuer: certificates.issuer,
                fingerprint: certificates.fingerprint,
                chain: certificates.chain,
            });
            conn.certificate_skip = true;

            Ok(chunk.len() - surplus)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
