use super::FloodgateConfig;

/// Environment overrides applied over the file configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub limit_time_unit_ms: Option<u64>,
    pub skip_same_state: Option<bool>,
}

impl EnvOverrides {
    /// Read overrides from env vars. Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut overrides = Self::default();

        if let Some(v) = lookup("FLOODGATE_LIMIT_TIME_UNIT_MS") {
            if let Ok(n) = v.parse::<u64>() {
                overrides.limit_time_unit_ms = Some(n);
            }
        }
        if let Some(v) = lookup("FLOODGATE_SKIP_SAME_STATE") {
            if let Ok(b) = v.parse::<bool>() {
                overrides.skip_same_state = Some(b);
            }
        }

        overrides
    }

    pub fn apply(&self, config: &mut FloodgateConfig) {
        if let Some(n) = self.limit_time_unit_ms {
            config.command.limit_time_unit_ms = n;
        }
        if let Some(b) = self.skip_same_state {
            config.command.skip_same_state = b;
        }
    }
}
