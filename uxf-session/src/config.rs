use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Save the session settings as `settings` when the session begins.
    pub copy_session_settings: bool,
    /// Save the participant details as a one-row `participant_details` table.
    pub copy_participant_details: bool,
    /// End the session as soon as the last trial ends.
    pub end_after_last_trial: bool,
    /// Run `end()` when the session is dropped.
    pub end_on_drop: bool,
    /// Settings copied into each trial's results when it ends.
    pub settings_to_log: Vec<String>,
    /// Extra result columns present on every trial, null until recorded.
    pub custom_headers: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            copy_session_settings: true,
            copy_participant_details: true,
            end_after_last_trial: false,
            end_on_drop: true,
            settings_to_log: Vec::new(),
            custom_headers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{"end_after_last_trial": true, "settings_to_log": ["hand"]}"#)
                .unwrap();
        assert!(cfg.end_after_last_trial);
        assert!(cfg.copy_session_settings);
        assert!(cfg.end_on_drop);
        assert_eq!(cfg.settings_to_log, vec!["hand"]);
        assert!(cfg.custom_headers.is_empty());
    }
}
