//! Controller configuration
//!
//! Read once from environment variables at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DOCKER_MACHINE_BINARY: &str = "docker-machine";
const DEFAULT_SCRIPT_DIRECTORY: &str = "/tmp";
const DEFAULT_SCRIPT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_MACHINE_CREATION_TIMEOUT_SECS: u64 = 15 * 60;
const DEFAULT_RECONCILE_CONCURRENCY: u16 = 3;

/// Runtime settings of the Machine Controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch, all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Path or name of the docker-machine executable
    pub docker_machine_binary: String,
    /// Directory holding startup scripts and fetched result files
    pub script_directory: PathBuf,
    /// Requeue delay while a startup script is still running
    pub script_poll_interval: Duration,
    /// Deadline for `docker-machine create`
    pub machine_creation_timeout: Duration,
    /// Deadline for `docker-machine scp` and `docker-machine rm`
    pub command_timeout: Duration,
    /// Interval between VPC state checks
    pub vpc_poll_interval: Duration,
    /// How long a new VPC may stay pending
    pub vpc_poll_timeout: Duration,
    /// Maximum concurrent reconciles
    pub reconcile_concurrency: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            docker_machine_binary: DEFAULT_DOCKER_MACHINE_BINARY.to_string(),
            script_directory: PathBuf::from(DEFAULT_SCRIPT_DIRECTORY),
            script_poll_interval: Duration::from_secs(DEFAULT_SCRIPT_POLL_INTERVAL_SECS),
            machine_creation_timeout: Duration::from_secs(DEFAULT_MACHINE_CREATION_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(120),
            vpc_poll_interval: Duration::from_secs(5),
            vpc_poll_timeout: Duration::from_secs(60),
            reconcile_concurrency: DEFAULT_RECONCILE_CONCURRENCY,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            docker_machine_binary: lookup("DOCKER_MACHINE_BINARY")
                .filter(|b| !b.is_empty())
                .unwrap_or(defaults.docker_machine_binary),
            script_directory: lookup("SCRIPT_DIRECTORY")
                .filter(|d| !d.is_empty())
                .map_or(defaults.script_directory, PathBuf::from),
            script_poll_interval: Duration::from_secs(parse_or_default(
                &lookup,
                "SCRIPT_POLL_INTERVAL_SECS",
                DEFAULT_SCRIPT_POLL_INTERVAL_SECS,
            )),
            machine_creation_timeout: Duration::from_secs(parse_or_default(
                &lookup,
                "MACHINE_CREATION_TIMEOUT_SECS",
                DEFAULT_MACHINE_CREATION_TIMEOUT_SECS,
            )),
            reconcile_concurrency: parse_or_default(
                &lookup,
                "RECONCILE_CONCURRENCY",
                DEFAULT_RECONCILE_CONCURRENCY,
            ),
            ..defaults
        }
    }
}

/// Parse a variable or fall back to `default` when unset or malformed
fn parse_or_default<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
