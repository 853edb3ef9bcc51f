//! docker-machine driver strategies
//!
//! The driver name on a Machine selects which network prerequisites are
//! built, how the startup script reaches the host, how credentials are
//! encoded on the command line and which cloud resources cleanup removes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

/// How the completion of a startup script is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDelivery {
    /// Script is passed to docker-machine and writes `/tmp/result.txt` on the host
    SignalFile,
    /// Script runs as a Kubernetes Job once the host exists
    Job,
}

/// Driver named by `spec.driver.name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Driver {
    Google,
    Aws,
    Azure,
    Hetzner,
    Other(String),
}

impl Driver {
    pub fn from_name(name: &str) -> Self {
        match name {
            "google" => Self::Google,
            "amazonec2" => Self::Aws,
            "azure" => Self::Azure,
            "hetzner" => Self::Hetzner,
            other => Self::Other(other.to_string()),
        }
    }

    /// Name passed to `docker-machine create --driver`
    pub fn name(&self) -> &str {
        match self {
            Self::Google => "google",
            Self::Aws => "amazonec2",
            Self::Azure => "azure",
            Self::Hetzner => "hetzner",
            Self::Other(name) => name,
        }
    }

    /// Whether a VPC, subnet and gateway must exist before creation.
    pub fn requires_network(&self) -> bool {
        matches!(self, Self::Aws)
    }

    pub fn script_delivery(&self) -> ScriptDelivery {
        match self {
            Self::Hetzner => ScriptDelivery::Job,
            _ => ScriptDelivery::SignalFile,
        }
    }

    /// Render an auth secret value as a command-line argument.
    pub fn encode_auth_value(&self, raw: &[u8]) -> String {
        match self {
            Self::Google => STANDARD.encode(raw),
            _ => String::from_utf8_lossy(raw).into_owned(),
        }
    }

    /// SSH user docker-machine provisions on the host
    pub fn ssh_user(&self) -> &'static str {
        match self {
            Self::Aws => "ubuntu",
            _ => "docker-user",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_round_trip() {
        for name in ["google", "amazonec2", "azure", "hetzner", "virtualbox"] {
            assert_eq!(Driver::from_name(name).name(), name);
        }
        assert_eq!(Driver::from_name("virtualbox"), Driver::Other("virtualbox".into()));
    }

    #[test]
    fn test_only_aws_needs_network() {
        assert!(Driver::Aws.requires_network());
        assert!(!Driver::Google.requires_network());
        assert!(!Driver::Hetzner.requires_network());
    }

    #[test]
    fn test_google_auth_is_base64() {
        assert_eq!(Driver::Google.encode_auth_value(b"{\"k\":1}"), "eyJrIjoxfQ==");
        assert_eq!(Driver::Azure.encode_auth_value(b"plain"), "plain");
    }

    #[test]
    fn test_script_delivery_and_user() {
        assert_eq!(Driver::Hetzner.script_delivery(), ScriptDelivery::Job);
        assert_eq!(Driver::Aws.script_delivery(), ScriptDelivery::SignalFile);
        assert_eq!(Driver::Aws.ssh_user(), "ubuntu");
        assert_eq!(Driver::Azure.ssh_user(), "docker-user");
    }
}
