use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "certmon.yaml";

const NOTIFIER_NAMES: [&str; 4] = ["log", "slack", "teams", "datadog"];
const LOG_LEVELS: [&str; 4] = ["DEBUG", "INFO", "WARN", "ERROR"];
const REDACTED: &str = "******";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub kube_config_path: Option<PathBuf>,
    pub cluster_name: String,
    #[serde(with = "duration_str")]
    pub interval: Duration,
    #[serde(with = "duration_str")]
    pub threshold: Duration,
    pub notifiers: Vec<String>,
    #[serde(with = "duration_str")]
    pub dial_timeout: Duration,
    #[serde(with = "duration_str")]
    pub notifier_timeout: Duration,
    pub slack: SlackConfig,
    pub teams: TeamsConfig,
    pub datadog: DatadogConfig,
    pub synthetics: SyntheticsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub token: String,
    pub channel: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamsConfig {
    pub webhook: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatadogConfig {
    pub statsd_address: String,
    pub statsd_tags: Vec<String>,
    pub gauge_key: String,
    pub api_key: String,
    pub application_key: String,
    pub site: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticsConfig {
    pub enabled: bool,
    pub alert_message: String,
    /// Seconds between synthetic runs.
    pub check_interval: u32,
    pub tags: Vec<String>,
    pub default_tag: String,
    pub default_locations: Vec<String>,
    pub additional_endpoints: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "INFO".into(),
            kube_config_path: None,
            cluster_name: String::new(),
            interval: Duration::from_secs(12 * 3600),
            threshold: Duration::from_secs(336 * 3600),
            notifiers: vec!["log".into()],
            dial_timeout: Duration::from_secs(10),
            notifier_timeout: Duration::from_secs(10),
            slack: SlackConfig::default(),
            teams: TeamsConfig::default(),
            datadog: DatadogConfig::default(),
            synthetics: SyntheticsConfig::default(),
        }
    }
}

impl Default for DatadogConfig {
    fn default() -> Self {
        DatadogConfig {
            statsd_address: String::new(),
            statsd_tags: Vec::new(),
            gauge_key: notifiers::datadog::DEFAULT_GAUGE_KEY.into(),
            api_key: String::new(),
            application_key: String::new(),
            site: synthetics::datadog::DEFAULT_SITE.into(),
        }
    }
}

impl Default for SyntheticsConfig {
    fn default() -> Self {
        SyntheticsConfig {
            enabled: false,
            alert_message: String::new(),
            check_interval: 900,
            tags: Vec::new(),
            default_tag: "managed-by-cert-expiry-mon".into(),
            default_locations: vec!["aws:ap-northeast-1".into()],
            additional_endpoints: Vec::new(),
        }
    }
}

/// Read the YAML file (explicit path, else `./certmon.yaml` when present),
/// overlay the process environment and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { Some(p.to_path_buf()) } else { None }
        }
    };
    let mut cfg = match path {
        Some(p) => {
            let s = fs::read_to_string(&p).with_context(|| format!("reading {}", p.display()))?;
            serde_yaml::from_str(&s).with_context(|| format!("parsing {}", p.display()))?
        }
        None => Config::default(),
    };
    cfg.apply_env(|k| std::env::var(k).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

fn list(v: &str) -> Vec<String> {
    v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

fn parse_bool(key: &str, v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => bail!("{}: invalid boolean {:?}", key, v),
    }
}

impl Config {
    /// Override fields from environment variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |k: &str| lookup(k).filter(|v| !v.is_empty());
        let duration = |k: &str| -> Result<Option<Duration>> {
            get(k).map(|v| parse_duration(&v).with_context(|| format!("{} is not a duration", k))).transpose()
        };

        if let Some(v) = get("LOG_LEVEL") { self.log_level = v; }
        if let Some(v) = get("KUBE_CONFIG_PATH") { self.kube_config_path = Some(PathBuf::from(v)); }
        if let Some(v) = get("CLUSTER_NAME") { self.cluster_name = v; }
        if let Some(d) = duration("INTERVAL")? { self.interval = d; }
        if let Some(d) = duration("THRESHOLD")? { self.threshold = d; }
        if let Some(v) = get("NOTIFIERS") { self.notifiers = list(&v); }
        if let Some(d) = duration("DIAL_TIMEOUT")? { self.dial_timeout = d; }
        if let Some(d) = duration("NOTIFIER_TIMEOUT")? { self.notifier_timeout = d; }

        if let Some(v) = get("SLACK_TOKEN") { self.slack.token = v; }
        if let Some(v) = get("SLACK_CHANNEL") { self.slack.channel = v; }
        if let Some(v) = get("TEAMS_WEBHOOK") { self.teams.webhook = v; }

        let dd = &mut self.datadog;
        if let Some(v) = get("DATADOG_STATSD_ADDRESS") { dd.statsd_address = v; }
        if let Some(v) = get("DATADOG_STATSD_TAGS") { dd.statsd_tags = list(&v); }
        if let Some(v) = get("DATADOG_GAUGE_KEY") { dd.gauge_key = v; }
        if let Some(v) = get("DATADOG_API_KEY") { dd.api_key = v; }
        if let Some(v) = get("DATADOG_APPLICATION_KEY") { dd.application_key = v; }
        if let Some(v) = get("DATADOG_SITE") { dd.site = v; }

        let syn = &mut self.synthetics;
        if let Some(v) = get("SYNTHETICS_ENABLED") { syn.enabled = parse_bool("SYNTHETICS_ENABLED", &v)?; }
        if let Some(v) = get("SYNTHETICS_ALERT_MESSAGE") { syn.alert_message = v; }
        if let Some(v) = get("SYNTHETICS_CHECK_INTERVAL") {
            syn.check_interval = v.trim().parse().with_context(|| format!("SYNTHETICS_CHECK_INTERVAL: invalid number {:?}", v))?;
        }
        if let Some(v) = get("SYNTHETICS_TAGS") { syn.tags = list(&v); }
        if let Some(v) = get("SYNTHETICS_DEFAULT_TAG") { syn.default_tag = v; }
        if let Some(v) = get("SYNTHETICS_DEFAULT_LOCATIONS") { syn.default_locations = list(&v); }
        if let Some(v) = get("SYNTHETICS_ADDITIONAL_ENDPOINTS") { syn.additional_endpoints = list(&v); }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_uppercase().as_str()) {
            bail!("log level must be one of {}, got {:?}", LOG_LEVELS.join("|"), self.log_level);
        }
        if self.interval < Duration::from_secs(60) || self.interval > Duration::from_secs(24 * 3600) {
            bail!("interval must be between 1m and 24h, got {}", format_duration(self.interval));
        }
        if self.threshold < Duration::from_secs(24 * 3600) {
            bail!("threshold must be at least 24h, got {}", format_duration(self.threshold));
        }
        if self.notifiers.is_empty() {
            bail!("at least one notifier is required");
        }
        for name in &self.notifiers {
            match name.as_str() {
                "log" => {}
                "slack" if self.slack.token.is_empty() || self.slack.channel.is_empty() => {
                    bail!("slack notifier needs SLACK_TOKEN and SLACK_CHANNEL")
                }
                "teams" if self.teams.webhook.is_empty() => bail!("teams notifier needs TEAMS_WEBHOOK"),
                "datadog" if self.datadog.statsd_address.is_empty() => {
                    bail!("datadog notifier needs DATADOG_STATSD_ADDRESS")
                }
                n if !NOTIFIER_NAMES.contains(&n) => {
                    bail!("unknown notifier {:?}, expected one of {}", n, NOTIFIER_NAMES.join("|"))
                }
                _ => {}
            }
        }
        if self.synthetics.enabled {
            if self.datadog.api_key.is_empty() || self.datadog.application_key.is_empty() {
                bail!("synthetics need DATADOG_API_KEY and DATADOG_APPLICATION_KEY");
            }
            if self.synthetics.default_tag.is_empty() {
                bail!("synthetics need a non-empty SYNTHETICS_DEFAULT_TAG");
            }
            for e in &self.synthetics.additional_endpoints {
                synthetics::SyntheticEndpoint::parse(e).with_context(|| format!("additional endpoint {:?}", e))?;
            }
        }
        Ok(())
    }

    /// Copy with credentials masked, for printing.
    pub fn redacted(&self) -> Config {
        let mask = |s: &mut String| {
            if !s.is_empty() {
                *s = REDACTED.into();
            }
        };
        let mut c = self.clone();
        mask(&mut c.slack.token);
        mask(&mut c.teams.webhook);
        mask(&mut c.datadog.api_key);
        mask(&mut c.datadog.application_key);
        c
    }
}

/// Parse `90s`, `15m`, `12h`, `14d` or a concatenation such as `1h30m`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        bail!("empty duration");
    }
    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => bail!("invalid duration {:?}: unknown unit {:?}", input, c),
        };
        if digits.is_empty() {
            bail!("invalid duration {:?}: unit without a number", input);
        }
        let n: u64 = digits.parse().map_err(|_| anyhow!("invalid duration {:?}", input))?;
        total = n
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| anyhow!("duration {:?} overflows", input))?;
        digits.clear();
    }
    if !digits.is_empty() {
        bail!("invalid duration {:?}: missing unit", input);
    }
    Ok(Duration::from_secs(total))
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let c = Config::default();
        c.validate().unwrap();
        assert_eq!(c.interval, Duration::from_secs(43_200));
        assert_eq!(c.threshold, Duration::from_secs(336 * 3600));
        assert_eq!(c.notifiers, vec!["log"]);
        assert_eq!(c.datadog.gauge_key, "certificate.expiry.days");
        assert_eq!(c.synthetics.default_tag, "managed-by-cert-expiry-mon");
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("14d").unwrap(), Duration::from_secs(14 * 86_400));
        assert!(parse_duration("12").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("3w").is_err());
        assert_eq!(format_duration(Duration::from_secs(336 * 3600)), "336h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
    }

    #[test]
    fn yaml_then_env() {
        let mut c: Config = serde_yaml::from_str(
            "cluster_name: prod\ninterval: 30m\nnotifiers: [log, teams]\nteams:\n  webhook: https://hooks.example/x\n",
        )
        .unwrap();
        assert_eq!(c.interval, Duration::from_secs(1800));
        assert_eq!(c.threshold, Duration::from_secs(336 * 3600));
        c.apply_env(env(&[("CLUSTER_NAME", "staging"), ("THRESHOLD", "48h"), ("SLACK_TOKEN", "")]))
            .unwrap();
        assert_eq!(c.cluster_name, "staging");
        assert_eq!(c.threshold, Duration::from_secs(48 * 3600));
        assert!(c.slack.token.is_empty());
        c.validate().unwrap();
    }

    #[test]
    fn env_lists_and_flags() {
        let mut c = Config::default();
        c.apply_env(env(&[
            ("NOTIFIERS", "log, datadog"),
            ("DATADOG_STATSD_ADDRESS", "127.0.0.1:8125"),
            ("SYNTHETICS_ENABLED", "true"),
            ("DATADOG_API_KEY", "k"),
            ("DATADOG_APPLICATION_KEY", "a"),
            ("SYNTHETICS_ADDITIONAL_ENDPOINTS", "status.example.com,api.example.com:8443"),
            ("SYNTHETICS_CHECK_INTERVAL", "300"),
        ]))
        .unwrap();
        assert_eq!(c.notifiers, vec!["log", "datadog"]);
        assert!(c.synthetics.enabled);
        assert_eq!(c.synthetics.check_interval, 300);
        assert_eq!(c.synthetics.additional_endpoints.len(), 2);
        c.validate().unwrap();
    }

    #[test]
    fn bad_env_values_are_errors() {
        assert!(Config::default().apply_env(env(&[("INTERVAL", "soon")])).is_err());
        assert!(Config::default().apply_env(env(&[("SYNTHETICS_ENABLED", "maybe")])).is_err());
        assert!(Config::default().apply_env(env(&[("SYNTHETICS_CHECK_INTERVAL", "-1")])).is_err());
    }

    #[test]
    fn interval_bounds() {
        let c = Config { interval: Duration::from_secs(59), ..Config::default() };
        assert!(c.validate().is_err());
        let c = Config { interval: Duration::from_secs(25 * 3600), ..Config::default() };
        assert!(c.validate().is_err());
        let c = Config { threshold: Duration::from_secs(23 * 3600), ..Config::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn notifier_credentials_are_checked() {
        let c = Config { notifiers: vec!["slack".into()], ..Config::default() };
        assert!(c.validate().unwrap_err().to_string().contains("SLACK_TOKEN"));
        let c = Config { notifiers: vec!["pagerduty".into()], ..Config::default() };
        assert!(c.validate().unwrap_err().to_string().contains("unknown notifier"));
        let c = Config { notifiers: vec![], ..Config::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn synthetics_need_keys_and_valid_endpoints() {
        let mut c = Config::default();
        c.synthetics.enabled = true;
        assert!(c.validate().is_err());
        c.datadog.api_key = "k".into();
        c.datadog.application_key = "a".into();
        c.validate().unwrap();
        c.synthetics.additional_endpoints = vec!["a.com:".into()];
        assert!(c.validate().is_err());
        c.synthetics.additional_endpoints.clear();
        c.synthetics.default_tag.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn redaction_masks_secrets() {
        let mut c = Config::default();
        c.datadog.api_key = "secret".into();
        let r = c.redacted();
        assert_eq!(r.datadog.api_key, REDACTED);
        assert!(r.datadog.application_key.is_empty());
        assert_eq!(c.datadog.api_key, "secret");
    }
}
