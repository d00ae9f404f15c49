//! Wire builders shared by the unit tests.

/// DER TLV with a definite length.
pub fn der(tag: u8, content: &[u8]) -> Vec<u8> {
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

fn sha256_with_rsa() -> Vec<u8> {
    seq(&[
        der(0x06, &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b]),
        der(0x05, &[]),
    ])
}

/// Minimal self-describing X.509 v3 certificate.
pub fn certificate_der(subject_cn: &str, issuer_cn: &str) -> Vec<u8> {
    let tbs = seq(&[
        der(0xa0, &der(0x02, &[0x02])),
        der(0x02, &[0x01]),
        sha256_with_rsa(),
        name(issuer_cn),
        seq(&[
            der(0x17, b"230101000000Z"),
            der(0x17, b"330101000000Z"),
        ]),
        name(subject_cn),
        seq(&[
            seq(&[
                der(0x06, &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01]),
                der(0x05, &[]),
            ]),
            der(0x03, &[0x00, 0x30, 0x00]),
        ]),
    ]);
    seq(&[tbs, sha256_with_rsa(), der(0x03, &[0x00, 0x00])])
}

fn u24(len: usize) -> [u8; 3] {
    [(len >> 16) as u8, (len >> 8) as u8, len as u8]
}

/// Certificate message body: 24-bit list length and 24-bit prefixed entries.
pub fn certificate_list(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut list = Vec::new();
    for entry in entries {
        list.extend_from_slice(&u24(entry.len()));
        list.extend_from_slice(entry);
    }
    let mut out = u24(list.len()).to_vec();
    out.extend_from_slice(&list);
    out
}

/// Handshake message: type and 24-bit length header.
pub fn handshake(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![msg_type];
    out.extend_from_slice(&u24(body.len()));
    out.extend_from_slice(body);
    out
}

/// SSLv3/TLS record.
pub fn record(content_type: u8, version: u16, body: &[u8]) -> Vec<u8> {
    let mut out = vec![content_type];
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// SSLv2 record with the 2-byte length form; `body` follows the message type.
pub fn sslv2_record(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let len = (body.len() + 1) as u16 | 0x8000;
    let mut out = len.to_be_bytes().to_vec();
    out.push(msg_type);
    out.extend_from_slice(body);
    out
}
