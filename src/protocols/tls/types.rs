//! # TLS Wire Types
//!
//! Record content types, handshake message types, SSLv2 message types and
//! protocol version constants.

/// SSLv2, as recorded for records framed with the legacy header.
pub const SSL_VERSION_2: u16 = 0x0200;
/// SSLv3.
pub const SSL_VERSION_3: u16 = 0x0300;
/// TLS 1.0.
pub const TLS_VERSION_10: u16 = 0x0301;
/// TLS 1.1.
pub const TLS_VERSION_11: u16 = 0x0302;
/// TLS 1.2.
pub const TLS_VERSION_12: u16 = 0x0303;
/// TLS 1.3.
pub const TLS_VERSION_13: u16 = 0x0304;
/// No version observed yet.
pub const TLS_VERSION_UNKNOWN: u16 = 0x0000;

/// SSLv3/TLS record header length.
pub const TLS_RECORD_HEADER_LEN: usize = 5;

/// Handshake message header length (type + 24-bit length).
pub const HANDSHAKE_HEADER_LEN: usize = 4;

// ---------------------------------------------------------------------------
// Record content type
// ---------------------------------------------------------------------------

/// SSLv3/TLS record content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Heartbeat,
    Unknown(u8),
}

impl From<u8> for ContentType {
    fn from(val: u8) -> Self {
        match val {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            24 => ContentType::Heartbeat,
            other => ContentType::Unknown(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake message type
// ---------------------------------------------------------------------------

/// SSLv3/TLS handshake message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeType {
    HelloRequest,
    ClientHello,
    ServerHello,
    NewSessionTicket,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    CertificateUrl,
    CertificateStatus,
    Unknown(u8),
}

impl HandshakeType {
    /// Wire value of the Certificate message.
    pub const CERTIFICATE: u8 = 11;
}

impl From<u8> for HandshakeType {
    fn from(val: u8) -> Self {
        match val {
            0 => HandshakeType::HelloRequest,
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            4 => HandshakeType::NewSessionTicket,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            13 => HandshakeType::CertificateRequest,
            14 => HandshakeType::ServerHelloDone,
            15 => HandshakeType::CertificateVerify,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            21 => HandshakeType::CertificateUrl,
            22 => HandshakeType::CertificateStatus,
            other => HandshakeType::Unknown(other),
        }
    }
}

// ---------------------------------------------------------------------------
// SSLv2 message type
// ---------------------------------------------------------------------------

/// SSLv2 message type, carried in the first byte after the record length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sslv2MessageType {
    Error,
    ClientHello,
    ClientMasterKey,
    ClientFinished,
    ServerHello,
    ServerVerify,
    ServerFinished,
    RequestCertificate,
    ClientCertificate,
    Unknown(u8),
}

impl From<u8> for Sslv2MessageType {
    fn from(val: u8) -> Self {
        match val {
            0 => Sslv2MessageType::Error,
            1 => Sslv2MessageType::ClientHello,
            2 => Sslv2MessageType::ClientMasterKey,
            3 => Sslv2MessageType::ClientFinished,
            4 => Sslv2MessageType::ServerHello,
            5 => Sslv2MessageType::ServerVerify,
            6 => Sslv2MessageType::ServerFinished,
            7 => Sslv2MessageType::RequestCertificate,
            8 => Sslv2MessageType::ClientCertificate,
            other => Sslv2MessageType::Unknown(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Convert a protocol version number to a human-readable string.
pub fn version_to_string(version: u16) -> String {
    match version {
        SSL_VERSION_2 => "SSLv2".to_string(),
        SSL_VERSION_3 => "SSLv3".to_string(),
        TLS_VERSION_10 => "TLSv1.0".to_string(),
        TLS_VERSION_11 => "TLSv1.1".to_string(),
        TLS_VERSION_12 => "TLSv1.2".to_string(),
        TLS_VERSION_13 => "TLSv1.3".to_string(),
        TLS_VERSION_UNKNOWN => String::new(),
        v => format!("0x{:04X}", v),
    }
}

/// Parse a rule-style version name (`sslv2`, `sslv3`, `1.0` .. `1.3`).
pub fn version_from_name(name: &str) -> Option<u16> {
    match name.to_ascii_lowercase().as_str() {
        "sslv2" | "2.0" => Some(SSL_VERSION_2),
        "sslv3" | "3.0" => Some(SSL_VERSION_3),
        "1.0" | "tlsv1.0" => Some(TLS_VERSION_10),
        "1.1" | "tlsv1.1" => Some(TLS_VERSION_11),
        "1.2" | "tlsv1.2" => Some(TLS_VERSION_12),
        "1.3" | "tlsv1.3" => Some(TLS_VERSION_13),
        _ => None,
    }
}
