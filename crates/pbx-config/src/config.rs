use pbx_core::DEFAULT_MAX_EXTENSIONS;
use serde::Deserialize;

/// Resolved configuration for a PBX server instance.
#[derive(Debug, Clone, Deserialize)]
pub struct PbxConfig {
    /// TCP port to bind and listen on.
    pub port: u16,

    /// Upper bound on simultaneously registered extensions. Defaults to
    /// [`pbx_core::DEFAULT_MAX_EXTENSIONS`].
    #[serde(default = "default_max_extensions")]
    pub max_extensions: u32,

    /// Optional path to a verbose log file. When absent, only stdout logging
    /// at `info` level is enabled.
    #[serde(default)]
    pub log_file: Option<String>,
}

fn default_max_extensions() -> u32 {
    DEFAULT_MAX_EXTENSIONS
}

impl PbxConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            max_extensions: DEFAULT_MAX_EXTENSIONS,
            log_file: None,
        }
    }

    /// Sanity-checks the configuration. `port = 0` asks the OS to pick an
    /// ephemeral port, which is useful in tests but never what a deployed PBX
    /// wants, so it is rejected here.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("port must be in [1, 65535]".to_string());
        }
        if self.max_extensions == 0 {
            return Err("max_extensions must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_port() {
        let cfg = PbxConfig::new(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_defaults() {
        let cfg = PbxConfig::new(4000);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_extensions, DEFAULT_MAX_EXTENSIONS);
        assert_eq!(cfg.log_file, None);
    }
}
