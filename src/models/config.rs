//! Gate configuration (musicgate.toml)

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "musicgate.toml";

/// Upper bound for any single configured delay
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound for the decision record TTL (one year)
pub const MAX_RECORD_TTL_MINUTES: u64 = 366 * 24 * 60;

// =============================================================================
// Timing
// =============================================================================

/// Delays, expressed in abstract time units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Length of one time unit in milliseconds
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,

    /// Debounce window after a signal before it is trusted
    #[serde(default = "default_confirmation_units")]
    pub confirmation_units: u32,

    /// Delay before the loading affordance appears
    #[serde(default = "default_loading_reveal_units")]
    pub loading_reveal_units: u32,

    /// Delay before the manual-override control appears
    #[serde(default = "default_override_reveal_units")]
    pub override_reveal_units: u32,

    /// Delay between the transition effect and navigation
    #[serde(default = "default_navigate_delay_units")]
    pub navigate_delay_units: u32,

    /// How long a decision record lets the gate be skipped
    #[serde(default = "default_record_ttl_minutes")]
    pub record_ttl_minutes: u64,
}

fn default_unit_ms() -> u64 {
    1000
}

fn default_confirmation_units() -> u32 {
    3
}

fn default_loading_reveal_units() -> u32 {
    2
}

fn default_override_reveal_units() -> u32 {
    10
}

fn default_navigate_delay_units() -> u32 {
    2
}

fn default_record_ttl_minutes() -> u64 {
    60
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            unit_ms: default_unit_ms(),
            confirmation_units: default_confirmation_units(),
            loading_reveal_units: default_loading_reveal_units(),
            override_reveal_units: default_override_reveal_units(),
            navigate_delay_units: default_navigate_delay_units(),
            record_ttl_minutes: default_record_ttl_minutes(),
        }
    }
}

impl TimingConfig {
    /// Resolve unit counts into concrete durations
    pub fn timings(&self) -> GateTimings {
        let unit = |n: u32| Duration::from_millis(self.unit_ms.saturating_mul(u64::from(n)));
        GateTimings {
            confirmation: unit(self.confirmation_units),
            loading_reveal: unit(self.loading_reveal_units),
            override_reveal: unit(self.override_reveal_units),
            navigate_delay: unit(self.navigate_delay_units),
            record_ttl: Duration::from_secs(self.record_ttl_minutes.saturating_mul(60)),
        }
    }

    /// Reject a zero unit, delays above [`MAX_DELAY`] and TTLs above a year
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.unit_ms == 0 {
            anyhow::bail!("timing.unit_ms must be greater than zero");
        }

        let max_ms = u64::try_from(MAX_DELAY.as_millis()).unwrap_or(u64::MAX);
        for (name, units) in [
            ("confirmation_units", self.confirmation_units),
            ("loading_reveal_units", self.loading_reveal_units),
            ("override_reveal_units", self.override_reveal_units),
            ("navigate_delay_units", self.navigate_delay_units),
        ] {
            let within = self
                .unit_ms
                .checked_mul(u64::from(units))
                .is_some_and(|ms| ms <= max_ms);
            if !within {
                anyhow::bail!(
                    "timing.{} = {} units of {}ms exceeds the {}h limit",
                    name,
                    units,
                    self.unit_ms,
                    MAX_DELAY.as_secs() / 3600
                );
            }
        }

        if self.record_ttl_minutes > MAX_RECORD_TTL_MINUTES {
            anyhow::bail!(
                "timing.record_ttl_minutes = {} exceeds the limit of {}",
                self.record_ttl_minutes,
                MAX_RECORD_TTL_MINUTES
            );
        }

        Ok(())
    }
}

/// Concrete delays used by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateTimings {
    pub confirmation: Duration,
    pub loading_reveal: Duration,
    pub override_reveal: Duration,
    pub navigate_delay: Duration,
    pub record_ttl: Duration,
}

impl Default for GateTimings {
    fn default() -> Self {
        TimingConfig::default().timings()
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Where and under which keys the decision record lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store file; defaults to ~/.musicgate/storage.json
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_started_key")]
    pub started_key: String,

    #[serde(default = "default_timestamp_key")]
    pub timestamp_key: String,
}

fn default_started_key() -> String {
    "valentineMusicStarted".to_string()
}

fn default_timestamp_key() -> String {
    "valentineMusicTimestamp".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            started_key: default_started_key(),
            timestamp_key: default_timestamp_key(),
        }
    }
}

// =============================================================================
// Detection
// =============================================================================

/// Heuristic signal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Attach the player attribute-mutation source
    #[serde(default = "default_true")]
    pub observe_player_mutations: bool,

    /// Only mutations of this attribute count as a signal
    #[serde(default = "default_watched_attribute")]
    pub watched_attribute: String,
}

fn default_true() -> bool {
    true
}

fn default_watched_attribute() -> String {
    "src".to_string()
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            observe_player_mutations: true,
            watched_attribute: default_watched_attribute(),
        }
    }
}

// =============================================================================
// Server
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Drop a gate session after this long without a signal or poll
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

fn default_port() -> u16 {
    4567
}

fn default_session_idle_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

impl ServerConfig {
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

// =============================================================================
// Gate Configuration
// =============================================================================

/// Top-level gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Where the gate hands off once passed
    #[serde(default = "default_destination")]
    pub destination: String,

    /// Embed URL of the player shown on the gate page
    #[serde(default = "default_player_url")]
    pub player_url: String,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_destination() -> String {
    "main.html".to_string()
}

fn default_player_url() -> String {
    "https://open.spotify.com/embed/playlist/37i9dQZF1DX50QitC6Oqtn".to_string()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            player_url: default_player_url(),
            timing: TimingConfig::default(),
            storage: StorageConfig::default(),
            detection: DetectionConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl GateConfig {
    /// Load config from `path`, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: GateConfig = toml::from_str(&content)?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Check value ranges that parse fine but cannot be scheduled
    pub fn validate(&self) -> anyhow::Result<()> {
        self.timing.validate()?;
        if self.server.session_idle_secs == 0 {
            anyhow::bail!("server.session_idle_secs must be greater than zero");
        }
        Ok(())
    }

    /// Load `musicgate.toml` from the project root
    pub fn load_from_dir(project_root: &Path) -> anyhow::Result<Self> {
        Self::load(&project_root.join(CONFIG_FILE))
    }

    /// Save config to `path`
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolved store file path
    pub fn storage_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.storage.path {
            return Ok(path.clone());
        }

        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".musicgate").join("storage.json"))
    }
}
