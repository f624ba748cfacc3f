//! Configuration – reads/writes `~/.liftsim/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use liftsim_kernel::PolicyConfig;
use liftsim_middleware::DEFAULT_PORT;
use liftsim_runtime::{NodeRole, SystemConfig, Transport};

/// Which bus the process joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Controller, simulator and REPL in this process only.
    #[default]
    Local,
    /// TCP hub shared by every process on the host.
    Network,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Local => write!(f, "local"),
            TransportKind::Network => write!(f, "network"),
        }
    }
}

/// Persisted user configuration stored in `~/.liftsim/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportKind,

    /// Hub host. Only used with the network transport.
    #[serde(default = "default_host")]
    pub host: String,

    /// Hub port. Only used with the network transport.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Components hosted by this process: `all`, `controller`,
    /// `simulator` or `panel`.
    #[serde(default = "default_role")]
    pub role: String,

    #[serde(default)]
    pub lowest_floor: i32,

    #[serde(default = "default_highest_floor")]
    pub highest_floor: i32,

    /// Fire recall floor, also the floor the car starts at.
    #[serde(default)]
    pub recall_floor: i32,

    /// Time the car takes to travel one floor.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_door_ms")]
    pub door_ms: u64,

    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_role() -> String {
    NodeRole::All.to_string()
}
fn default_highest_floor() -> i32 {
    9
}
fn default_tick_ms() -> u64 {
    750
}
fn default_door_ms() -> u64 {
    1000
}
fn default_dwell_ms() -> u64 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: default_host(),
            port: default_port(),
            role: default_role(),
            lowest_floor: 0,
            highest_floor: default_highest_floor(),
            recall_floor: 0,
            tick_ms: default_tick_ms(),
            door_ms: default_door_ms(),
            dwell_ms: default_dwell_ms(),
        }
    }
}

impl Config {
    /// Turn the file settings into a [`SystemConfig`].
    ///
    /// Rejects inverted floor ranges, a recall floor outside the building
    /// and unknown roles.
    pub fn system_config(&self) -> Result<SystemConfig, String> {
        if self.lowest_floor > self.highest_floor {
            return Err(format!(
                "lowest_floor {} is above highest_floor {}",
                self.lowest_floor, self.highest_floor
            ));
        }
        if !(self.lowest_floor..=self.highest_floor).contains(&self.recall_floor) {
            return Err(format!(
                "recall_floor {} is outside {}..={}",
                self.recall_floor, self.lowest_floor, self.highest_floor
            ));
        }
        let role: NodeRole = self.role.parse().map_err(|e| format!("{e}"))?;
        let transport = match self.transport {
            TransportKind::Local => Transport::Local,
            TransportKind::Network => Transport::Network(self.hub_addr()?),
        };

        Ok(SystemConfig {
            policy: PolicyConfig::default()
                .with_floors(self.lowest_floor, self.highest_floor)
                .with_recall_floor(self.recall_floor)
                .with_start_floor(self.recall_floor)
                .with_door_transition(Duration::from_millis(self.door_ms))
                .with_dwell(Duration::from_millis(self.dwell_ms)),
            tick_period: Duration::from_millis(self.tick_ms),
            transport,
            role,
            ..SystemConfig::default()
        })
    }

    fn hub_addr(&self) -> Result<SocketAddr, String> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| format!("Failed to resolve {}:{}: {}", self.host, self.port, e))?
            .next()
            .ok_or_else(|| format!("No address for {}:{}", self.host, self.port))
    }
}

/// Return the path to `~/.liftsim/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".liftsim").join("config.toml")
}

/// Load the config from disk with environment overrides applied. Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Defaults with environment overrides applied. Used when no usable file
/// exists.
pub fn fallback() -> Config {
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    cfg
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `LIFTSIM_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `LIFTSIM_TRANSPORT` | `transport` (`local` / `network`) |
/// | `LIFTSIM_PORT` | `port` |
/// | `LIFTSIM_LOWEST_FLOOR` | `lowest_floor` |
/// | `LIFTSIM_HIGHEST_FLOOR` | `highest_floor` |
/// | `LIFTSIM_TICK_MS` | `tick_ms` |
/// | `LIFTSIM_ROLE` | `role` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("LIFTSIM_TRANSPORT") {
        match v.to_ascii_lowercase().as_str() {
            "local" => cfg.transport = TransportKind::Local,
            "network" => cfg.transport = TransportKind::Network,
            _ => {}
        }
    }
    if let Some(port) = env_parse("LIFTSIM_PORT") {
        cfg.port = port;
    }
    if let Some(floor) = env_parse("LIFTSIM_LOWEST_FLOOR") {
        cfg.lowest_floor = floor;
    }
    if let Some(floor) = env_parse("LIFTSIM_HIGHEST_FLOOR") {
        cfg.highest_floor = floor;
    }
    if let Some(ms) = env_parse("LIFTSIM_TICK_MS") {
        cfg.tick_ms = ms;
    }
    if let Ok(v) = std::env::var("LIFTSIM_ROLE") {
        cfg.role = v;
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.trim().parse().ok()
}

/// Save the config to disk, creating `~/.liftsim/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    static ENV: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.port, 1234);
        assert_eq!(loaded.transport, TransportKind::Local);
        assert_eq!(loaded.role, "all");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "transport = \"network\"\nhighest_floor = 20\n").expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.transport, TransportKind::Network);
        assert_eq!(cfg.highest_floor, 20);
        assert_eq!(cfg.lowest_floor, 0);
        assert_eq!(cfg.tick_ms, 750);
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"\n").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_liftsim_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".liftsim"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn system_config_carries_building_and_timings() {
        let cfg = Config {
            lowest_floor: -2,
            highest_floor: 12,
            recall_floor: 0,
            tick_ms: 100,
            door_ms: 200,
            dwell_ms: 300,
            role: "controller".to_string(),
            ..Config::default()
        };
        let sys = cfg.system_config().expect("valid");
        assert_eq!(sys.policy.floors(), -2..=12);
        assert_eq!(sys.policy.start_floor, 0);
        assert_eq!(sys.policy.door_transition, Duration::from_millis(200));
        assert_eq!(sys.policy.dwell, Duration::from_millis(300));
        assert_eq!(sys.tick_period, Duration::from_millis(100));
        assert_eq!(sys.role, NodeRole::Controller);
        assert_eq!(sys.transport, Transport::Local);
    }

    #[test]
    fn system_config_resolves_hub_address() {
        let cfg = Config {
            transport: TransportKind::Network,
            port: 4321,
            ..Config::default()
        };
        let sys = cfg.system_config().expect("valid");
        assert_eq!(
            sys.transport,
            Transport::Network(SocketAddr::from(([127, 0, 0, 1], 4321)))
        );
    }

    #[test]
    fn system_config_rejects_bad_layouts() {
        let inverted = Config {
            lowest_floor: 5,
            highest_floor: 2,
            ..Config::default()
        };
        assert!(inverted.system_config().is_err());

        let recall_outside = Config {
            recall_floor: 10,
            ..Config::default()
        };
        assert!(recall_outside.system_config().is_err());

        let bad_role = Config {
            role: "lobby".to_string(),
            ..Config::default()
        };
        assert!(bad_role.system_config().unwrap_err().contains("lobby"));
    }

    #[test]
    fn apply_env_overrides_changes_transport() {
        let _env = env_lock();
        // SAFETY: env_lock serializes every test that touches the environment.
        unsafe { std::env::set_var("LIFTSIM_TRANSPORT", "Network") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.transport, TransportKind::Network);
        unsafe { std::env::remove_var("LIFTSIM_TRANSPORT") };
    }

    #[test]
    fn apply_env_overrides_changes_port() {
        let _env = env_lock();
        // SAFETY: env_lock serializes every test that touches the environment.
        unsafe { std::env::set_var("LIFTSIM_PORT", "9999") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 9999);
        unsafe { std::env::remove_var("LIFTSIM_PORT") };
    }

    #[test]
    fn apply_env_overrides_changes_floors() {
        let _env = env_lock();
        // SAFETY: env_lock serializes every test that touches the environment.
        unsafe {
            std::env::set_var("LIFTSIM_LOWEST_FLOOR", "-1");
            std::env::set_var("LIFTSIM_HIGHEST_FLOOR", "30");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!((cfg.lowest_floor, cfg.highest_floor), (-1, 30));
        unsafe {
            std::env::remove_var("LIFTSIM_LOWEST_FLOOR");
            std::env::remove_var("LIFTSIM_HIGHEST_FLOOR");
        }
    }

    #[test]
    fn apply_env_overrides_changes_role() {
        let _env = env_lock();
        // SAFETY: env_lock serializes every test that touches the environment.
        unsafe { std::env::set_var("LIFTSIM_ROLE", "panel") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.role, "panel");
        unsafe { std::env::remove_var("LIFTSIM_ROLE") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_tick() {
        let _env = env_lock();
        // SAFETY: env_lock serializes every test that touches the environment.
        unsafe { std::env::set_var("LIFTSIM_TICK_MS", "fast") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.tick_ms, 750);
        unsafe { std::env::remove_var("LIFTSIM_TICK_MS") };
    }

    #[test]
    fn fallback_keeps_environment_overrides() {
        let _env = env_lock();
        // SAFETY: env_lock serializes every test that touches the environment.
        unsafe {
            std::env::set_var("LIFTSIM_TRANSPORT", "network");
            std::env::set_var("LIFTSIM_PORT", "4321");
        }
        let cfg = fallback();
        unsafe {
            std::env::remove_var("LIFTSIM_TRANSPORT");
            std::env::remove_var("LIFTSIM_PORT");
        }
        assert_eq!(cfg.transport, TransportKind::Network);
        assert_eq!(cfg.port, 4321);
        assert_eq!(cfg.highest_floor, Config::default().highest_floor);
    }
}
