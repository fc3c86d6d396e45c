// experiment.rs

use anyhow::{Context, Result};
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uxf_core::Settings;
use uxf_session::{Clock, Session, SessionConfig};

/// Experiment description read from JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentDescription {
    pub experiment: String,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub participant_details: Map<String, Value>,
    pub blocks: Vec<BlockDescription>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub web: Option<WebConfig>,
    #[serde(default)]
    pub inter_trial_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockDescription {
    pub trials: i64,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub shuffle: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub sort_into_folders: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data"),
            sort_into_folders: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    pub endpoint: String,
    /// Environment variable holding a bearer token.
    #[serde(default)]
    pub token_env: Option<String>,
}

impl ExperimentDescription {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Simulated outcome of one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub trials: usize,
    pub correct: usize,
}

/// Creates the blocks described in `desc` on an already begun session.
pub fn build_blocks<C: Clock, R: Rng>(
    session: &mut Session<C>,
    desc: &ExperimentDescription,
    rng: &mut R,
) -> Result<()> {
    for (i, block_desc) in desc.blocks.iter().enumerate() {
        let block = session
            .create_block(block_desc.trials)
            .with_context(|| format!("block {}", i + 1))?;
        block.settings = Settings::new(block_desc.settings.clone());
        let number = block.number();
        if block_desc.shuffle {
            session.shuffle_block(number, rng)?;
        }
    }
    Ok(())
}

/// Runs every trial with a simulated participant: a reaction time drawn
/// uniformly from 200–800 ms and a response that is correct 90% of the time.
pub fn simulate_trials<C: Clock, R: Rng>(
    session: &mut Session<C>,
    inter_trial_interval: Duration,
    rng: &mut R,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    while session.has_initialised() && session.begin_next_trial_safe()? {
        let number = session.current_trial_num();
        let condition = session
            .trial_setting(number, "condition")
            .cloned()
            .unwrap_or(Value::Null);
        let rt: f64 = rng.random_range(0.2..0.8);
        let correct = rng.random_bool(0.9);

        let trial = session.current_trial_mut()?;
        trial.record("condition", condition)?;
        trial.record("rt", (rt * 1000.0).round() / 1000.0)?;
        trial.record("correct", correct)?;
        session.clock().sleep(Duration::from_secs_f64(rt));
        session.end_current_trial()?;

        summary.trials += 1;
        summary.correct += usize::from(correct);
        tracing::debug!(trial = number, rt, correct, "simulated trial");

        session.clock().sleep(inter_trial_interval);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uxf_data::MemoryHandler;
    use uxf_session::{BASE_HEADERS, ManualClock};

    const DESCRIPTION: &str = r#"{
        "experiment": "flanker",
        "session": { "settings_to_log": ["condition"] },
        "settings": { "stimulus_ms": 200 },
        "blocks": [
            { "trials": 3, "settings": { "condition": "congruent" } },
            { "trials": 4, "settings": { "condition": "incongruent" }, "shuffle": true }
        ]
    }"#;

    #[test]
    fn description_defaults() {
        let desc: ExperimentDescription = serde_json::from_str(DESCRIPTION).unwrap();
        assert_eq!(desc.blocks.len(), 2);
        assert!(desc.blocks[1].shuffle);
        assert_eq!(desc.output.directory, PathBuf::from("data"));
        assert!(desc.output.sort_into_folders);
        assert!(desc.web.is_none());
        assert!(desc.session.copy_session_settings);
        assert_eq!(desc.session.settings_to_log, vec!["condition"]);
    }

    #[test]
    fn simulated_run_fills_every_trial() {
        let desc: ExperimentDescription = serde_json::from_str(DESCRIPTION).unwrap();
        let handler = MemoryHandler::new();
        let store = handler.store();
        let mut session = Session::with_clock(desc.session.clone(), ManualClock::new());
        session.add_data_handler(handler).unwrap();
        session
            .begin(
                desc.experiment.clone(),
                "P01",
                1,
                None,
                Some(Settings::new(desc.settings.clone())),
            )
            .unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        build_blocks(&mut session, &desc, &mut rng).unwrap();
        let summary = simulate_trials(&mut session, Duration::from_millis(500), &mut rng).unwrap();
        session.end();

        assert_eq!(summary.trials, 7);
        assert!(summary.correct <= 7);
        let table = store.table("trial_results").unwrap();
        assert_eq!(table.num_rows(), 7);
        assert_eq!(table.headers()[..BASE_HEADERS.len()], BASE_HEADERS);
        assert_eq!(
            table.headers()[BASE_HEADERS.len()..],
            ["condition", "rt", "correct"]
        );
        let conditions = table.column("condition").unwrap();
        assert_eq!(conditions[..3], ["congruent"; 3]);
        assert_eq!(conditions[3..], ["incongruent"; 4]);
    }

    #[test]
    fn negative_trial_count_is_rejected() {
        let desc: ExperimentDescription = serde_json::from_str(
            r#"{ "experiment": "x", "blocks": [ { "trials": -2 } ] }"#,
        )
        .unwrap();
        let mut session = Session::with_clock(SessionConfig::default(), ManualClock::new());
        session.begin("x", "P01", 1, None, None).unwrap();
        let err = build_blocks(&mut session, &desc, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid number of trials"));
    }
}
