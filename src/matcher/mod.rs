//! # TLS Signature Matching
//!
//! Matches TLS sessions against detection signatures built from the
//! parser's outputs: handshake milestone flags, negotiated version, server
//! certificate subject/issuer/fingerprint and pending decoder events.
//!
//! ## Architecture
//!
//! ```text
//! SslState
//!     |
//!     +--> subject / issuer --> [Aho-Corasick automata] --> matched contents
//!     |
//!     v
//! [per-signature conditions: ssl_state, tls_version, fingerprint, events]
//!     |
//!     v
//! matching signatures
//! ```
//!
//! Subject and issuer contents of every signature are compiled into shared
//! automata (one case-sensitive, one ASCII case-insensitive per field), so
//! each certificate string is scanned once per field regardless of how many
//! signatures are loaded.
//!
//! ## Signature Format
//!
//! ```json
//! {
//!   "signatures": [
//!     {
//!       "id": 2000001,
//!       "message": "Self-signed test certificate after SSLv3 hello",
//!       "severity": "medium",
//!       "category": "policy",
//!       "ssl_state": ["server_hello", "!client_keyx"],
//!       "tls_version": "sslv3",
//!       "subject": ["CN=localhost"],
//!       "issuer": ["localhost"],
//!       "nocase": true,
//!       "events": ["certificate_missing_element"]
//!     }
//!   ]
//! }
//! ```

use std::collections::HashSet;

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};

use crate::protocols::tls::types::version_from_name;
use crate::protocols::tls::{MilestoneFlags, SslState, TlsDecoderEvent};

// ---------------------------------------------------------------------------
// Signature definition
// ---------------------------------------------------------------------------

/// A TLS detection signature. Every present condition must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// Unique signature identifier.
    pub id: u32,
    /// Human-readable alert message.
    pub message: String,
    /// Severity level: "info", "low", "medium", "high", "critical".
    pub severity: String,
    /// Alert category (e.g., "malware", "policy").
    #[serde(default)]
    pub category: String,
    /// Milestone flag names; any positive name must be set, no `!name` may be.
    #[serde(default)]
    pub ssl_state: Vec<String>,
    /// Negotiated version (`sslv2`, `sslv3`, `1.0` .. `1.3`).
    #[serde(default)]
    pub tls_version: Option<String>,
    /// Contents that must all occur in the certificate subject.
    #[serde(default)]
    pub subject: Vec<String>,
    /// Contents that must all occur in the certificate issuer.
    #[serde(default)]
    pub issuer: Vec<String>,
    /// Match subject and issuer contents ignoring ASCII case.
    #[serde(default)]
    pub nocase: bool,
    /// Exact certificate fingerprint.
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Decoder event names that must all be pending.
    #[serde(default)]
    pub events: Vec<String>,
}

/// Signature file format for JSON deserialization.
#[derive(Debug, Deserialize)]
struct SignatureFile {
    signatures: Vec<Signature>,
}

// ---------------------------------------------------------------------------
// Content automata
// ---------------------------------------------------------------------------

/// A content pattern registered in a [`ContentSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ContentRef {
    nocase: bool,
    index: usize,
}

#[derive(Default)]
struct ContentSetBuilder {
    exact: Vec<String>,
    nocase: Vec<String>,
}

impl ContentSetBuilder {
    fn add(&mut self, pattern: &str, nocase: bool) -> ContentRef {
        let patterns = if nocase {
            &mut self.nocase
        } else {
            &mut self.exact
        };
        patterns.push(pattern.to_string());
        ContentRef {
            nocase,
            index: patterns.len() - 1,
        }
    }

    fn build(self) -> Result<ContentSet, SignatureError> {
        Ok(ContentSet {
            exact: build_automaton(&self.exact, false)?,
            nocase: build_automaton(&self.nocase, true)?,
        })
    }
}

fn build_automaton(
    patterns: &[String],
    case_insensitive: bool,
) -> Result<Option<AhoCorasick>, SignatureError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    AhoCorasick::builder()
        .ascii_case_insensitive(case_insensitive)
        .build(patterns)
        .map(Some)
        .map_err(|e| SignatureError::BuildError(format!("{}", e)))
}

/// Compiled contents of one certificate field across all signatures.
#[derive(Default)]
struct ContentSet {
    exact: Option<AhoCorasick>,
    nocase: Option<AhoCorasick>,
}

impl ContentSet {
    /// Every registered content occurring in `haystack`.
    fn scan(&self, haystack: &str) -> HashSet<ContentRef> {
        let mut found = HashSet::new();
        for (nocase, automaton) in [(false, &self.exact), (true, &self.nocase)] {
            if let Some(ac) = automaton {
                for mat in ac.find_overlapping_iter(haystack) {
                    found.insert(ContentRef {
                        nocase,
                        index: mat.pattern().as_usize(),
                    });
                }
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// Compiled signatures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CompiledSignature {
    signature: Signature,
    any_state: MilestoneFlags,
    no_state: MilestoneFlags,
    version: Option<u16>,
    subject: Vec<ContentRef>,
    issuer: Vec<ContentRef>,
    events: Vec<TlsDecoderEvent>,
}

impl CompiledSignature {
    fn compile(
        signature: Signature,
        subjects: &mut ContentSetBuilder,
        issuers: &mut ContentSetBuilder,
    ) -> Result<Self, SignatureError> {
        let mut any_state = MilestoneFlags::empty();
        let mut no_state = MilestoneFlags::empty();
        for name in &signature.ssl_state {
            let (negated, name) = match name.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, name.as_str()),
            };
            let flag = MilestoneFlags::from_name(name.trim()).ok_or_else(|| {
                SignatureError::UnknownKeyword(signature.id, format!("ssl_state {}", name))
            })?;
            if negated {
                no_state |= flag;
            } else {
                any_state |= flag;
            }
        }

        let version = match &signature.tls_version {
            Some(name) => Some(version_from_name(name).ok_or_else(|| {
                SignatureError::UnknownKeyword(signature.id, format!("tls_version {}", name))
            })?),
            None => None,
        };

        let events = signature
            .events
            .iter()
            .map(|name| {
                TlsDecoderEvent::from_name(name).ok_or_else(|| {
                    SignatureError::UnknownKeyword(signature.id, format!("event {}", name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let subject = signature
            .subject
            .iter()
            .map(|c| subjects.add(c, signature.nocase))
            .collect();
        let issuer = signature
            .issuer
            .iter()
            .map(|c| issuers.add(c, signature.nocase))
            .collect();

        Ok(Self {
            signature,
            any_state,
            no_state,
            version,
            subject,
            issuer,
            events,
        })
    }

    fn matches(
        &self,
        state: &SslState,
        subject: &HashSet<ContentRef>,
        issuer: &HashSet<ContentRef>,
    ) -> bool {
        let flags = state.flags();
        if !self.any_state.is_empty() && !flags.intersects(self.any_state) {
            return false;
        }
        if flags.intersects(self.no_state) {
            return false;
        }

        if let Some(version) = self.version {
            if state.version() != version {
                return false;
            }
        }

        let cert = state.server().certificate();
        if let Some(fp) = &self.signature.fingerprint {
            if cert.and_then(|c| c.fingerprint.as_deref()) != Some(fp.as_str()) {
                return false;
            }
        }

        if !self.subject.iter().all(|c| subject.contains(c)) {
            return false;
        }
        if !self.issuer.iter().all(|c| issuer.contains(c)) {
            return false;
        }

        self.events.iter().all(|ev| state.events().contains(*ev))
    }
}

// ---------------------------------------------------------------------------
// Signature Engine
// ---------------------------------------------------------------------------

/// TLS signature matching engine.
#[derive(Default)]
pub struct TlsSignatureEngine {
    signatures: Vec<CompiledSignature>,
    subjects: ContentSet,
    issuers: ContentSet,
}

impl TlsSignatureEngine {
    /// Create a new empty signature engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load signatures from a JSON file, replacing any loaded before.
    ///
    /// # Returns
    /// The number of signatures loaded.
    pub fn load_signatures(&mut self, path: &str) -> Result<usize, SignatureError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SignatureError::IoError(format!("{}: {}", path, e)))?;

        self.load_from_str(&content)
            .map_err(|e| match e {
                SignatureError::ParseError(msg) => {
                    SignatureError::ParseError(format!("{}: {}", path, msg))
                }
                other => other,
            })
    }

    /// Load signatures from a JSON string, replacing any loaded before.
    pub fn load_from_str(&mut self, json: &str) -> Result<usize, SignatureError> {
        let sig_file: SignatureFile =
            serde_json::from_str(json).map_err(|e| SignatureError::ParseError(e.to_string()))?;

        let mut subjects = ContentSetBuilder::default();
        let mut issuers = ContentSetBuilder::default();
        let signatures = sig_file
            .signatures
            .into_iter()
            .map(|sig| CompiledSignature::compile(sig, &mut subjects, &mut issuers))
            .collect::<Result<Vec<_>, _>>()?;

        self.subjects = subjects.build()?;
        self.issuers = issuers.build()?;
        self.signatures = signatures;

        tracing::info!(count = self.signatures.len(), "tls signatures loaded");
        Ok(self.signatures.len())
    }

    /// Every signature whose conditions hold for `state`.
    pub fn match_session(&self, state: &SslState) -> Vec<&Signature> {
        let cert = state.server().certificate();
        let subject = cert
            .and_then(|c| c.subject.as_deref())
            .map(|s| self.subjects.scan(s))
            .unwrap_or_default();
        let issuer = cert
            .and_then(|c| c.issuer.as_deref())
            .map(|s| self.issuers.scan(s))
            .unwrap_or_default();

        self.signatures
            .iter()
            .filter(|sig| sig.matches(state, &subject, &issuer))
            .map(|sig| &sig.signature)
            .collect()
    }

    /// Return the number of loaded signatures.
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during signature loading.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Build error: {0}")]
    BuildError(String),

    #[error("signature {0}: unknown {1}")]
    UnknownKeyword(u32, String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
