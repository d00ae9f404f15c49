//! PyO3 bindings: the `tls_inspect` Python module.

use std::sync::atomic::{AtomicU64, Ordering};

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::conntrack::{FlowKey, SessionTable};
use crate::matcher::TlsSignatureEngine;
use crate::protocols::tls::{TlsConfig, TlsParser};
use crate::protocols::{Direction, ProbeResult};
use crate::TlsSessionRecord;

/// Cumulative counters for the engine.
#[derive(Debug, Default)]
struct EngineStats {
    chunks_processed: AtomicU64,
    bytes_processed: AtomicU64,
    sessions_created: AtomicU64,
    parse_failures: AtomicU64,
}

#[pymethods]
impl TlsSessionRecord {
    fn __repr__(&self) -> String {
        format!(
            "TlsSessionRecord({}:{} -> {}:{} {} subject={})",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.version, self.subject
        )
    }

    #[pyo3(name = "to_json")]
    fn py_to_json(&self) -> PyResult<String> {
        self.to_json()
            .map_err(|e| PyValueError::new_err(format!("JSON serialization failed: {e}")))
    }
}

/// TLS inspection engine.
///
/// ```python
/// from tls_inspect import TlsEngine
///
/// engine = TlsEngine()
/// if engine.probe("10.0.0.1", "10.0.0.2", 51000, 443, True, payload, ts) == "match":
///     engine.process("10.0.0.1", "10.0.0.2", 51000, 443, payload, ts)
/// print(engine.session_record("10.0.0.1", "10.0.0.2", 51000, 443))
/// ```
#[pyclass]
pub struct TlsEngine {
    table: SessionTable<TlsParser>,
    signatures: TlsSignatureEngine,
    stats: EngineStats,
}

fn tcp_key(src_ip: &str, dst_ip: &str, src_port: u16, dst_port: u16) -> FlowKey {
    FlowKey::new(src_ip.to_string(), dst_ip.to_string(), src_port, dst_port, 6)
}

#[pymethods]
impl TlsEngine {
    /// Create an engine, optionally from a JSON configuration file.
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => TlsConfig::from_json_file(path)
                .map_err(|e| PyIOError::new_err(format!("Failed to load config: {e}")))?,
            None => TlsConfig::default(),
        };

        Ok(Self {
            table: SessionTable::new(TlsParser::with_config(config)),
            signatures: TlsSignatureEngine::new(),
            stats: EngineStats::default(),
        })
    }

    /// Probe the first payload of a flow; returns "match", "no_match" or "need_more".
    ///
    /// Flows whose server port is not a configured TLS port are "no_match".
    #[allow(clippy::too_many_arguments)]
    fn probe(
        &self,
        src_ip: &str,
        dst_ip: &str,
        src_port: u16,
        dst_port: u16,
        from_originator: bool,
        payload: &[u8],
        ts: f64,
    ) -> &'static str {
        let key = tcp_key(src_ip, dst_ip, src_port, dst_port);
        let direction = if from_originator {
            Direction::Originator
        } else {
            Direction::Responder
        };

        let existed = self.table.len();
        let result = self.table.detect_on_tls_port(&key, direction, payload, ts);
        if result == ProbeResult::Match && self.table.len() > existed {
            self.stats.sessions_created.fetch_add(1, Ordering::Relaxed);
        }

        match result {
            ProbeResult::Match => "match",
            ProbeResult::NoMatch => "no_match",
            ProbeResult::NeedMore => "need_more",
        }
    }

    /// Feed a stream chunk; returns bytes consumed, or None if the flow is not inspected.
    ///
    /// Raises ValueError on a parse failure; the direction is not inspected again.
    fn process(
        &self,
        src_ip: &str,
        dst_ip: &str,
        src_port: u16,
        dst_port: u16,
        payload: &[u8],
        ts: f64,
    ) -> PyResult<Option<usize>> {
        let key = tcp_key(src_ip, dst_ip, src_port, dst_port);
        let Some(result) = self.table.process(&key, payload, ts) else {
            return Ok(None);
        };

        self.stats.chunks_processed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_processed
            .fetch_add(payload.len() as u64, Ordering::Relaxed);

        result.map(Some).map_err(|e| {
            self.stats.parse_failures.fetch_add(1, Ordering::Relaxed);
            PyValueError::new_err(format!("TLS parse failed: {e}"))
        })
    }

    /// Remove and return the pending decoder event names of a flow.
    fn drain_events(
        &self,
        src_ip: &str,
        dst_ip: &str,
        src_port: u16,
        dst_port: u16,
    ) -> Vec<String> {
        let key = tcp_key(src_ip, dst_ip, src_port, dst_port);
        self.table
            .drain_events(&key)
            .into_iter()
            .map(|ev| ev.to_string())
            .collect()
    }

    /// Summary record of a flow's TLS session.
    fn session_record(
        &self,
        src_ip: &str,
        dst_ip: &str,
        src_port: u16,
        dst_port: u16,
    ) -> Option<TlsSessionRecord> {
        self.table
            .session_record(&tcp_key(src_ip, dst_ip, src_port, dst_port))
    }

    /// Match loaded signatures against a flow; returns matching signature ids.
    fn match_signatures(
        &self,
        src_ip: &str,
        dst_ip: &str,
        src_port: u16,
        dst_port: u16,
    ) -> Vec<u32> {
        let key = tcp_key(src_ip, dst_ip, src_port, dst_port);
        self.table
            .inspect(&key, |session| {
                self.signatures
                    .match_session(&session.state)
                    .into_iter()
                    .map(|sig| sig.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Expire idle sessions; returns their summary records.
    fn expire(&self, now: f64) -> Vec<TlsSessionRecord> {
        self.table
            .expire(now)
            .into_iter()
            .map(|(_, session)| TlsSessionRecord::from_state(&session.originator, &session.state))
            .collect()
    }

    /// Load signatures from a JSON file.
    fn load_signatures(&mut self, path: &str) -> PyResult<usize> {
        self.signatures
            .load_signatures(path)
            .map_err(|e| PyIOError::new_err(format!("Failed to load signatures: {e}")))
    }

    /// Return a dictionary of engine statistics.
    fn get_stats(&self) -> std::collections::HashMap<String, u64> {
        let mut map = std::collections::HashMap::new();
        map.insert(
            "chunks_processed".into(),
            self.stats.chunks_processed.load(Ordering::Relaxed),
        );
        map.insert(
            "bytes_processed".into(),
            self.stats.bytes_processed.load(Ordering::Relaxed),
        );
        map.insert(
            "sessions_created".into(),
            self.stats.sessions_created.load(Ordering::Relaxed),
        );
        map.insert(
            "parse_failures".into(),
            self.stats.parse_failures.load(Ordering::Relaxed),
        );
        map.insert("active_sessions".into(), self.table.len() as u64);
        map
    }
}

/// Incremental TLS/SSLv2 session inspection.
///
/// Classes:
///     TlsEngine: Session table, parser and signature matcher
///     TlsSessionRecord: Per-session summary record
#[pymodule]
fn tls_inspect(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<TlsEngine>()?;
    m.add_class::<TlsSessionRecord>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
