use crate::trial::Trial;
use uxf_core::{Settings, TrialStatus};

/// Ordered group of trials. Created and numbered by the session.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) number: usize,
    pub(crate) trials: Vec<Trial>,
    pub settings: Settings,
}

impl Block {
    pub(crate) fn new(number: usize, number_of_trials: usize) -> Self {
        Self {
            number,
            trials: (0..number_of_trials).map(|_| Trial::new()).collect(),
            settings: Settings::default(),
        }
    }

    /// 1-based position within the session.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn trials_mut(&mut self) -> impl Iterator<Item = &mut Trial> {
        self.trials.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn first_trial(&self) -> Option<&Trial> {
        self.trials.first()
    }

    pub fn last_trial(&self) -> Option<&Trial> {
        self.trials.last()
    }

    pub(crate) fn has_started(&self) -> bool {
        self.trials
            .iter()
            .any(|t| t.status != TrialStatus::NotStarted)
    }
}
