use std::path::{Path, PathBuf};

/// Scheduling limits the engine runs with. Overridable per deployment.
#[derive(Debug, Clone)]
pub struct EngineTuning {
    /// Longest a single pre-commit cast stage may take.
    pub max_stage_len_ms: u64,
    /// How long a commit waits on a visibility answer before aborting.
    pub los_timeout_ms: u64,
    /// Interval between pulsing-effect range sweeps.
    pub range_check_interval_ms: u64,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            max_stage_len_ms: 3_000,
            los_timeout_ms: 5_000,
            range_check_interval_ms: crate::effects::range_monitor::RANGE_CHECK_INTERVAL_MS,
        }
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub tuning: EngineTuning,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: daybreak <data-root>".to_string());
        }

        let root = Path::new(&args[1]).to_path_buf();
        let mut tuning = EngineTuning::default();
        if let Some(value) = env_u64("DAYBREAK_MAX_STAGE_MS")? {
            tuning.max_stage_len_ms = value;
        }
        if let Some(value) = env_u64("DAYBREAK_LOS_TIMEOUT_MS")? {
            tuning.los_timeout_ms = value;
        }
        if let Some(value) = env_u64("DAYBREAK_RANGE_CHECK_MS")? {
            tuning.range_check_interval_ms = value;
        }
        Ok(Self { root, tuning })
    }
}

fn env_u64(name: &str) -> Result<Option<u64>, String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<u64>()
                .map(Some)
                .map_err(|_| format!("invalid {} '{}'", name, value))
        }
        Err(_) => Ok(None),
    }
}
