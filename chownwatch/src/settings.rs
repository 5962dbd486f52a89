use std::path::Path;

use chownwatch_common::{Policy, PolicyFlags, PolicyMode, ProbeConfig};
use config::{Config, ConfigError, Environment, File};
use log::debug;
use serde::Deserialize;

/// Prefix of every environment variable read into [`Settings`].
const ENV_PREFIX: &str = "CHOWNWATCH";

/// How the exit side of each chown syscall is observed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExitMode {
    Kretprobe,
    #[default]
    Tracepoint,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyModeSetting {
    #[default]
    NoFilter,
    Accept,
    Deny,
}

impl From<PolicyModeSetting> for PolicyMode {
    fn from(mode: PolicyModeSetting) -> Self {
        match mode {
            PolicyModeSetting::NoFilter => PolicyMode::NoFilter,
            PolicyModeSetting::Accept => PolicyMode::Accept,
            PolicyModeSetting::Deny => PolicyMode::Deny,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Log,
    Json,
}

/// Chown probe configuration
#[derive(Debug, Deserialize, Clone, Default)]
#[allow(unused)]
pub struct ChownProbeSettings {
    pub enabled: Option<bool>,
    pub exit_mode: Option<ExitMode>,
    pub policy_mode: Option<PolicyModeSetting>,
    pub approved_basenames: Option<Vec<String>>,
    pub discarded_pids: Option<Vec<u32>>,
}

impl ChownProbeSettings {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Policy written to the `POLICIES` map. The basename approver flag is
    /// raised as soon as at least one basename is configured.
    pub fn policy(&self) -> Policy {
        let mode = self.policy_mode.unwrap_or_default().into();
        let flags = if self.approved_basenames().is_empty() {
            PolicyFlags::NONE
        } else {
            PolicyFlags::BASENAME
        };
        Policy::new(mode, flags)
    }

    pub fn approved_basenames(&self) -> &[String] {
        self.approved_basenames.as_deref().unwrap_or_default()
    }

    pub fn discarded_pids(&self) -> &[u32] {
        self.discarded_pids.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[allow(unused)]
pub struct Probes {
    #[serde(default)]
    pub chown: ChownProbeSettings,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[allow(unused)]
pub struct Output {
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[allow(unused)]
pub struct Settings {
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default)]
    pub probes: Probes,
    #[serde(default)]
    pub output: Output,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Reads `.env`, the optional settings file, then `CHOWNWATCH_*`
    /// environment variables. Later sources win.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("probes.chown.approved_basenames")
                    .with_list_parse_key("probes.chown.discarded_pids")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = s.try_deserialize()?;
        debug!("Parsed settings: {:?}", settings);
        Ok(settings)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output.format.unwrap_or_default()
    }

    pub fn to_probe_config(&self, syscall_wrapper: bool) -> ProbeConfig {
        ProbeConfig::new(syscall_wrapper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "CHOWNWATCH_PROBES__CHOWN__ENABLED",
        "CHOWNWATCH_PROBES__CHOWN__EXIT_MODE",
        "CHOWNWATCH_PROBES__CHOWN__POLICY_MODE",
        "CHOWNWATCH_PROBES__CHOWN__APPROVED_BASENAMES",
        "CHOWNWATCH_PROBES__CHOWN__DISCARDED_PIDS",
        "CHOWNWATCH_OUTPUT__FORMAT",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_load_settings() {
        clear_env();
        unsafe {
            std::env::set_var("CHOWNWATCH_PROBES__CHOWN__EXIT_MODE", "kretprobe");
            std::env::set_var("CHOWNWATCH_PROBES__CHOWN__POLICY_MODE", "deny");
            std::env::set_var("CHOWNWATCH_PROBES__CHOWN__APPROVED_BASENAMES", "passwd,shadow");
            std::env::set_var("CHOWNWATCH_PROBES__CHOWN__DISCARDED_PIDS", "1,42");
            std::env::set_var("CHOWNWATCH_OUTPUT__FORMAT", "json");
        }

        let settings = Settings::new().expect("Failed to load settings");
        let chown = &settings.probes.chown;

        assert!(chown.is_enabled());
        assert_eq!(chown.exit_mode, Some(ExitMode::Kretprobe));
        assert_eq!(chown.policy_mode, Some(PolicyModeSetting::Deny));
        assert_eq!(chown.approved_basenames(), ["passwd", "shadow"]);
        assert_eq!(chown.discarded_pids(), [1, 42]);
        assert_eq!(settings.output_format(), OutputFormat::Json);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();

        let settings = Settings::new().expect("Failed to load settings");
        let chown = &settings.probes.chown;

        assert!(chown.is_enabled());
        assert_eq!(chown.exit_mode.unwrap_or_default(), ExitMode::Tracepoint);
        assert_eq!(chown.policy(), Policy::default());
        assert_eq!(settings.output_format(), OutputFormat::Log);
    }

    #[test]
    #[serial]
    fn test_disable_probe() {
        clear_env();
        unsafe {
            std::env::set_var("CHOWNWATCH_PROBES__CHOWN__ENABLED", "false");
        }

        let settings = Settings::new().expect("Failed to load settings");
        assert!(!settings.probes.chown.is_enabled());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let path = std::env::temp_dir().join(format!("chownwatch-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "probes:\n  chown:\n    policy_mode: accept\n    discarded_pids: [7]\noutput:\n  format: json\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).expect("Failed to load settings");
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.probes.chown.policy_mode, Some(PolicyModeSetting::Accept));
        assert_eq!(settings.probes.chown.discarded_pids(), [7]);
        assert_eq!(settings.output_format(), OutputFormat::Json);
    }

    #[test]
    fn test_policy_sets_basename_flag() {
        let chown = ChownProbeSettings {
            policy_mode: Some(PolicyModeSetting::Deny),
            approved_basenames: Some(vec!["passwd".to_string()]),
            ..Default::default()
        };

        let policy = chown.policy();
        assert_eq!(policy.mode(), PolicyMode::Deny);
        assert!(policy.flags.contains(PolicyFlags::BASENAME));
    }

    #[test]
    fn test_policy_without_approvers() {
        let chown = ChownProbeSettings {
            policy_mode: Some(PolicyModeSetting::Deny),
            ..Default::default()
        };

        let policy = chown.policy();
        assert_eq!(policy.mode(), PolicyMode::Deny);
        assert_eq!(policy.flags, PolicyFlags::NONE);
    }

    #[test]
    fn test_to_probe_config() {
        let settings = Settings::default();
        assert!(settings.to_probe_config(true).uses_syscall_wrapper());
        assert!(!settings.to_probe_config(false).uses_syscall_wrapper());
    }
}
