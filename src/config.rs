use anyhow::{bail, Context};
use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 64;

#[derive(Debug, Clone)]
pub struct Config {
    /// Opened at startup when set; otherwise the client sends `workspace.select`.
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub max_code_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workspace: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();

        if let Some(ws) = get("EDCONAD_WORKSPACE").filter(|v| !v.trim().is_empty()) {
            cfg.workspace = Some(PathBuf::from(ws.trim()));
        }
        if let Some(filter) = get("EDCONAD_LOG").filter(|v| !v.trim().is_empty()) {
            cfg.log_filter = filter.trim().to_string();
        }
        if let Some(raw) = get("EDCONAD_MAX_CODE_ATTEMPTS") {
            let n: u32 = raw
                .trim()
                .parse()
                .with_context(|| format!("EDCONAD_MAX_CODE_ATTEMPTS is not a number: {:?}", raw))?;
            if n == 0 {
                bail!("EDCONAD_MAX_CODE_ATTEMPTS must be at least 1");
            }
            cfg.max_code_attempts = n;
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_env() {
        let cfg = Config::from_lookup(lookup(&[])).expect("config");
        assert!(cfg.workspace.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.max_code_attempts, 64);
    }

    #[test]
    fn env_overrides_are_read() {
        let cfg = Config::from_lookup(lookup(&[
            ("EDCONAD_WORKSPACE", "/tmp/school"),
            ("EDCONAD_LOG", "edconad=debug"),
            ("EDCONAD_MAX_CODE_ATTEMPTS", "8"),
        ]))
        .expect("config");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/school")));
        assert_eq!(cfg.log_filter, "edconad=debug");
        assert_eq!(cfg.max_code_attempts, 8);
    }

    #[test]
    fn invalid_attempts_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("EDCONAD_MAX_CODE_ATTEMPTS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("EDCONAD_MAX_CODE_ATTEMPTS", "many")])).is_err());
    }
}
