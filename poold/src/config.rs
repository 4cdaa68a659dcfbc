use crate::api::ProtocolKind;
use crate::error::Result;
use rpc_core::DaemonConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Everything the node reads at startup: process-wide settings plus the pool definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Process-wide settings, shared by every pool the process could host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Storage backend tag
    pub storage: String,
    pub broadcast_interval_secs: u64,
    /// Upper bound on how long `stop` waits for each front-end and the timer
    pub drain_timeout_secs: u64,
    pub status_interval_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            storage: "memory".to_string(),
            broadcast_interval_secs: 10,
            drain_timeout_secs: 5,
            status_interval_secs: 30,
        }
    }
}

/// Pool definition. An absent protocol section disables that front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub coin: CoinConfig,
    pub daemon: Option<DaemonConfig>,
    pub stratum: Option<ProtocolConfig>,
    pub vanilla: Option<ProtocolConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinConfig {
    pub name: String,
    /// Hash algorithm tag, e.g. `sha256d`
    pub algorithm: String,
}

impl Default for CoinConfig {
    fn default() -> Self {
        Self {
            name: "Bitcoin".to_string(),
            algorithm: "sha256d".to_string(),
        }
    }
}

/// Listener settings for one front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub bind_address: String,
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_extranonce2_size")]
    pub extranonce2_size: usize,
    /// Vanilla miners silent for this long are forgotten
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> usize {
    1024
}

fn default_extranonce2_size() -> usize {
    4
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl ProtocolConfig {
    pub fn new(bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            bind_address: bind_address.into(),
            port,
            max_connections: default_max_connections(),
            extranonce2_size: default_extranonce2_size(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }

    /// Default listener for a protocol kind
    pub fn default_for(kind: ProtocolKind) -> Self {
        match kind {
            ProtocolKind::Stratum => Self::new("0.0.0.0", 3333),
            ProtocolKind::Vanilla => Self::new("0.0.0.0", 8080),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    fn problem(&self, kind: ProtocolKind) -> Option<String> {
        if self.bind_address.trim().is_empty() {
            return Some(format!("{} bind_address is empty", kind));
        }
        if self.max_connections == 0 {
            return Some(format!("{} max_connections must be positive", kind));
        }
        if !(1..=16).contains(&self.extranonce2_size) {
            return Some(format!("{} extranonce2_size must be between 1 and 16", kind));
        }
        if self.idle_timeout_secs == 0 {
            return Some(format!("{} idle_timeout_secs must be positive", kind));
        }
        None
    }
}

impl PoolConfig {
    /// Settings for a front-end kind, if that front-end is enabled.
    pub fn section(&self, kind: ProtocolKind) -> Option<&ProtocolConfig> {
        match kind {
            ProtocolKind::Stratum => self.stratum.as_ref(),
            ProtocolKind::Vanilla => self.vanilla.as_ref(),
        }
    }

    fn section_mut(&mut self, kind: ProtocolKind) -> &mut Option<ProtocolConfig> {
        match kind {
            ProtocolKind::Stratum => &mut self.stratum,
            ProtocolKind::Vanilla => &mut self.vanilla,
        }
    }

    /// Why the daemon section cannot be used, if it cannot.
    pub fn daemon_problem(&self) -> Option<String> {
        match &self.daemon {
            None => Some("daemon section is missing".to_string()),
            Some(daemon) => daemon.problem(),
        }
    }

    /// Every reason this configuration is unusable. Empty means valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.coin.algorithm.trim().is_empty() {
            problems.push("coin algorithm is empty".to_string());
        }
        if let Some(problem) = self.daemon_problem() {
            problems.push(problem);
        }
        for kind in ProtocolKind::ALL {
            if let Some(problem) = self.section(kind).and_then(|s| s.problem(kind)) {
                problems.push(problem);
            }
        }
        problems
    }

    pub fn is_valid(&self) -> bool {
        self.problems().is_empty()
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            coin: CoinConfig::default(),
            daemon: Some(DaemonConfig::default()),
            stratum: Some(ProtocolConfig::default_for(ProtocolKind::Stratum)),
            vanilla: None,
        }
    }
}

impl Config {
    /// Load configuration from file if it exists, otherwise use defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Override config with CLI arguments
    pub fn apply_cli_overrides(&mut self, args: &crate::cli::Args) {
        if let Some(algorithm) = &args.algorithm {
            self.pool.coin.algorithm = algorithm.clone();
        }

        if let Some(url) = &args.daemon_url {
            self.pool
                .daemon
                .get_or_insert_with(DaemonConfig::default)
                .url = url.clone();
        }

        if let Some(port) = args.stratum_port {
            self.enable(ProtocolKind::Stratum).port = port;
        }

        if let Some(port) = args.vanilla_port {
            self.enable(ProtocolKind::Vanilla).port = port;
        }

        if args.no_stratum {
            *self.pool.section_mut(ProtocolKind::Stratum) = None;
        }

        if args.no_vanilla {
            *self.pool.section_mut(ProtocolKind::Vanilla) = None;
        }
    }

    fn enable(&mut self, kind: ProtocolKind) -> &mut ProtocolConfig {
        self.pool
            .section_mut(kind)
            .get_or_insert_with(|| ProtocolConfig::default_for(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.pool.is_valid(), "{:?}", config.pool.problems());
        assert_eq!(config.global.broadcast_interval_secs, 10);
        assert_eq!(config.global.storage, "memory");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.pool, PoolConfig::default());
    }

    #[test]
    fn test_load_omitted_section_disables_front_end() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[global]
broadcast_interval_secs = 15

[pool.coin]
name = "Litecoin"
algorithm = "blake3"

[pool.daemon]
url = "ws://10.0.0.2:9000"
timeout_secs = 3
pay_address = "addr"

[pool.vanilla]
bind_address = "127.0.0.1"
port = 9090
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.global.broadcast_interval_secs, 15);
        assert_eq!(config.global.storage, "memory");
        assert_eq!(config.pool.coin.algorithm, "blake3");
        assert!(config.pool.stratum.is_none());
        let vanilla = config.pool.vanilla.as_ref().unwrap();
        assert_eq!(vanilla.port, 9090);
        assert_eq!(vanilla.extranonce2_size, 4);
        assert_eq!(vanilla.idle_timeout_secs, 300);
        assert!(config.pool.is_valid());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pool\nbroken").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(crate::error::PoolError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_problems_cover_every_section() {
        let mut pool = PoolConfig::default();
        pool.coin.algorithm = " ".to_string();
        pool.daemon = None;
        pool.stratum.as_mut().unwrap().max_connections = 0;

        let problems = pool.problems();
        assert_eq!(problems.len(), 3, "{:?}", problems);
        assert!(!pool.is_valid());
        assert_eq!(pool.daemon_problem().as_deref(), Some("daemon section is missing"));
    }

    #[test]
    fn test_zero_idle_timeout_is_invalid() {
        let mut config = Config::default();
        config.enable(ProtocolKind::Vanilla).idle_timeout_secs = 0;
        let problems = config.pool.problems();
        assert!(problems.iter().any(|p| p.contains("idle_timeout_secs")), "{:?}", problems);
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "poold",
            "--daemon-url",
            "ws://node:1234",
            "--vanilla-port",
            "8181",
            "--no-stratum",
            "--algorithm",
            "keccak",
        ]);
        let mut config = Config::default();
        config.apply_cli_overrides(&args);

        assert_eq!(config.pool.daemon.as_ref().unwrap().url, "ws://node:1234");
        assert!(config.pool.stratum.is_none());
        assert_eq!(config.pool.vanilla.as_ref().unwrap().port, 8181);
        assert_eq!(config.pool.coin.algorithm, "keccak");
    }
}
