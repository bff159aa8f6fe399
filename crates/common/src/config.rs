//! Node configuration loader (TOML + serde).
//!
//! [`NodeConfig::load`] never fails: a missing, unreadable, or malformed
//! file yields the built-in defaults, and individual out-of-range values
//! in an otherwise valid file fall back field-by-field. Callers always
//! receive a usable configuration; the process never refuses to start
//! because of a bad config file.
//!
//! The loaded value is immutable. An administrative reload loads a whole
//! new `NodeConfig` and swaps it in atomically at the controller level.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

/// Default coordinator base URL (task listing + reporting).
pub const DEFAULT_COORDINATOR_URL: &str = "https://api.hashnhedge.com";
/// Default mining pool endpoint handed to the miner process.
pub const DEFAULT_POOL_URL: &str = "pool.hashnhedge.com:3333";
/// Default operator revenue share (70%).
pub const DEFAULT_REVENUE_SHARE: f64 = 0.70;
/// Default switch threshold in USD: tasks paying more than this preempt mining.
pub const DEFAULT_SWITCH_THRESHOLD: f64 = 500.0;

/// Immutable-after-load node settings.
///
/// Every field is guaranteed populated and in range after [`NodeConfig::load`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Unique node identifier, generated if not configured.
    pub node_id: String,
    /// Coordinator base URL for task listing and reporting.
    pub coordinator_url: String,
    /// Pool endpoint passed to the mining worker.
    pub pool_url: String,
    /// Payout wallet identifier. May be empty (node then mines unpaid).
    pub wallet: String,
    /// Operator revenue share, in `(0, 1]`.
    pub revenue_share: f64,
    /// Reward threshold (USD) above which a security task preempts mining.
    pub switch_threshold: f64,
    /// Permitted mining algorithms, in preference order. First entry is
    /// what the miner is launched with.
    pub mining_algorithms: Vec<String>,
    /// Permitted security/cracking algorithms. Tasks advertising anything
    /// else are skipped during selection.
    pub security_algorithms: Vec<String>,
    /// Mining worker binary.
    pub miner_program: String,
    /// Security worker binary (hashcat-compatible CLI contract).
    pub cracker_program: String,
    /// Directory for worker result files.
    pub work_dir: PathBuf,
    /// Seconds between coordinator polls.
    pub poll_interval_secs: u64,
    /// Seconds between `running` progress events for an active task.
    pub progress_cadence_secs: u64,
    /// Grace period before a worker is force-killed on stop.
    pub stop_grace_secs: u64,
    /// Port for the local status/admin HTTP surface.
    pub http_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            node_id: format!("hnh-{}", Uuid::new_v4()),
            coordinator_url: DEFAULT_COORDINATOR_URL.to_string(),
            pool_url: DEFAULT_POOL_URL.to_string(),
            wallet: String::new(),
            revenue_share: DEFAULT_REVENUE_SHARE,
            switch_threshold: DEFAULT_SWITCH_THRESHOLD,
            mining_algorithms: vec![
                "sha256".to_string(),
                "ethash".to_string(),
                "kawpow".to_string(),
                "scrypt".to_string(),
            ],
            security_algorithms: vec![
                "md5".to_string(),
                "ntlm".to_string(),
                "wpa2".to_string(),
                "sha1".to_string(),
            ],
            miner_program: "xmrig".to_string(),
            cracker_program: "hashcat".to_string(),
            work_dir: PathBuf::from("./work"),
            poll_interval_secs: 30,
            progress_cadence_secs: 10,
            stop_grace_secs: 5,
            http_port: 7800,
        }
    }
}

/// Raw on-disk shape. Everything is optional; absent fields take defaults.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    node_id: Option<String>,
    coordinator_url: Option<String>,
    pool_url: Option<String>,
    wallet: Option<String>,
    revenue_share: Option<f64>,
    switch_threshold: Option<f64>,
    http_port: Option<u16>,
    #[serde(default)]
    algorithms: RawAlgorithms,
    #[serde(default)]
    workers: RawWorkers,
    #[serde(default)]
    timing: RawTiming,
}

#[derive(Debug, Default, Deserialize)]
struct RawAlgorithms {
    mining: Option<Vec<String>>,
    security: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWorkers {
    miner_program: Option<String>,
    cracker_program: Option<String>,
    work_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTiming {
    poll_interval_secs: Option<u64>,
    progress_cadence_secs: Option<u64>,
    stop_grace_secs: Option<u64>,
}

impl NodeConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Never fails. A missing or unparseable file yields `Self::default()`
    /// with a warning; a parseable file is merged over the defaults
    /// field-by-field, with out-of-range values (revenue share outside
    /// `(0, 1]`, non-positive threshold, zero intervals) rejected
    /// individually in favor of the default.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<RawConfig>(&s) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("config {} is malformed, using defaults: {}", path.display(), e);
                    RawConfig::default()
                }
            },
            Err(e) => {
                warn!("config {} not readable, using defaults: {}", path.display(), e);
                RawConfig::default()
            }
        };
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Self {
        let defaults = Self::default();

        let revenue_share = match raw.revenue_share {
            Some(s) if s > 0.0 && s <= 1.0 => s,
            Some(s) => {
                warn!("revenue_share {} outside (0, 1], using {}", s, defaults.revenue_share);
                defaults.revenue_share
            }
            None => defaults.revenue_share,
        };

        let switch_threshold = match raw.switch_threshold {
            Some(t) if t > 0.0 => t,
            Some(t) => {
                warn!("switch_threshold {} not positive, using {}", t, defaults.switch_threshold);
                defaults.switch_threshold
            }
            None => defaults.switch_threshold,
        };

        NodeConfig {
            node_id: raw.node_id.unwrap_or(defaults.node_id),
            coordinator_url: raw.coordinator_url.unwrap_or(defaults.coordinator_url),
            pool_url: raw.pool_url.unwrap_or(defaults.pool_url),
            wallet: raw.wallet.unwrap_or(defaults.wallet),
            revenue_share,
            switch_threshold,
            mining_algorithms: raw
                .algorithms
                .mining
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.mining_algorithms),
            security_algorithms: raw
                .algorithms
                .security
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.security_algorithms),
            miner_program: raw.workers.miner_program.unwrap_or(defaults.miner_program),
            cracker_program: raw.workers.cracker_program.unwrap_or(defaults.cracker_program),
            work_dir: raw.workers.work_dir.unwrap_or(defaults.work_dir),
            poll_interval_secs: raw
                .timing
                .poll_interval_secs
                .filter(|&s| s > 0)
                .unwrap_or(defaults.poll_interval_secs),
            progress_cadence_secs: raw
                .timing
                .progress_cadence_secs
                .filter(|&s| s > 0)
                .unwrap_or(defaults.progress_cadence_secs),
            stop_grace_secs: raw.timing.stop_grace_secs.unwrap_or(defaults.stop_grace_secs),
            http_port: raw.http_port.unwrap_or(defaults.http_port),
        }
    }

    /// Interval between coordinator polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Cadence of `running` progress events.
    pub fn progress_cadence(&self) -> Duration {
        Duration::from_secs(self.progress_cadence_secs)
    }

    /// Grace period granted to a worker before it is force-killed.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = NodeConfig::load("/nonexistent/hnh/config.toml");
        assert!(cfg.node_id.starts_with("hnh-"));
        assert_eq!(cfg.coordinator_url, DEFAULT_COORDINATOR_URL);
        assert_eq!(cfg.revenue_share, DEFAULT_REVENUE_SHARE);
        assert_eq!(cfg.switch_threshold, DEFAULT_SWITCH_THRESHOLD);
        assert_eq!(cfg.mining_algorithms[0], "sha256");
        assert_eq!(cfg.security_algorithms.len(), 4);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
        write!(tmp, "this is {{ not toml").expect("write");
        let cfg = NodeConfig::load(tmp.path());
        assert_eq!(cfg.switch_threshold, DEFAULT_SWITCH_THRESHOLD);
        assert_eq!(cfg.cracker_program, "hashcat");
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            tmp,
            r#"
            node_id = "node-test"
            switch_threshold = 750.0
            wallet = "WALLET-1"

            [timing]
            poll_interval_secs = 5
            "#
        )
        .expect("write");
        let cfg = NodeConfig::load(tmp.path());
        assert_eq!(cfg.node_id, "node-test");
        assert_eq!(cfg.switch_threshold, 750.0);
        assert_eq!(cfg.wallet, "WALLET-1");
        assert_eq!(cfg.poll_interval_secs, 5);
        // untouched fields keep defaults
        assert_eq!(cfg.revenue_share, DEFAULT_REVENUE_SHARE);
        assert_eq!(cfg.pool_url, DEFAULT_POOL_URL);
    }

    #[test]
    fn out_of_range_values_fall_back_individually() {
        let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            tmp,
            r#"
            revenue_share = 1.5
            switch_threshold = -10.0
            node_id = "node-keep"
            "#
        )
        .expect("write");
        let cfg = NodeConfig::load(tmp.path());
        assert_eq!(cfg.revenue_share, DEFAULT_REVENUE_SHARE);
        assert_eq!(cfg.switch_threshold, DEFAULT_SWITCH_THRESHOLD);
        // valid fields from the same file still apply
        assert_eq!(cfg.node_id, "node-keep");
    }

    #[test]
    fn zero_intervals_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            tmp,
            r#"
            [timing]
            poll_interval_secs = 0
            progress_cadence_secs = 0
            stop_grace_secs = 0
            "#
        )
        .expect("write");
        let cfg = NodeConfig::load(tmp.path());
        assert_eq!(cfg.poll_interval_secs, 30);
        assert_eq!(cfg.progress_cadence_secs, 10);
        // zero grace is allowed: it means immediate force-kill
        assert_eq!(cfg.stop_grace_secs, 0);
    }

    #[test]
    fn generated_node_ids_are_unique() {
        let a = NodeConfig::default();
        let b = NodeConfig::default();
        assert_ne!(a.node_id, b.node_id);
    }
}
