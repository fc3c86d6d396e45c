use crate::block::Block;
use crate::config::SessionConfig;
use crate::events::Listeners;
use crate::results::aggregate_results;
use crate::trial::{BASE_HEADERS, Trial};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Map, Value};
use std::mem;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uxf_core::{
    DataRow, DataTable, DataType, ResultMap, SessionError, Settings, TrialStatus, format_cell,
};
use uxf_data::{DataHandler, DataTarget, HandlerError, SessionInfo};
use uxf_timing::{Clock, SystemClock};

/// A single run of an experiment for one participant.
///
/// Owns the blocks (and through them the trials), the trial/block cursor,
/// the registered data handlers and the lifecycle listeners. The cursor is
/// 1-based; `0` means no trial has begun yet.
pub struct Session<C: Clock = SystemClock> {
    pub config: SessionConfig,
    clock: C,
    blocks: Vec<Block>,
    current_trial_num: usize,
    current_block_num: usize,
    has_initialised: bool,
    experiment_name: String,
    ppid: String,
    number: u32,
    settings: Arc<Settings>,
    participant_details: Map<String, Value>,
    data_handlers: Vec<Box<dyn DataHandler>>,
    on_session_begin: Listeners<Session<C>>,
    on_trial_begin: Listeners<Trial>,
    on_trial_end: Listeners<Trial>,
    on_clean_up: Listeners<()>,
    on_session_end: Listeners<Session<C>>,
}

impl Session<SystemClock> {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }
}

impl<C: Clock> Session<C> {
    pub fn with_clock(config: SessionConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            blocks: Vec::new(),
            current_trial_num: 0,
            current_block_num: 0,
            has_initialised: false,
            experiment_name: String::new(),
            ppid: String::new(),
            number: 0,
            settings: Settings::empty(),
            participant_details: Map::new(),
            data_handlers: Vec::new(),
            on_session_begin: Listeners::new(),
            on_trial_begin: Listeners::new(),
            on_trial_end: Listeners::new(),
            on_clean_up: Listeners::new(),
            on_session_end: Listeners::new(),
        }
    }

    /// Handlers are attached before the session begins and kept for reuse.
    pub fn add_data_handler(
        &mut self,
        handler: impl DataHandler + 'static,
    ) -> Result<(), SessionError> {
        if self.has_initialised {
            return Err(SessionError::AlreadyInitialised);
        }
        self.data_handlers.push(Box::new(handler));
        Ok(())
    }

    pub fn data_handler_names(&self) -> Vec<&str> {
        self.data_handlers.iter().map(|h| h.name()).collect()
    }

    pub fn on_session_begin(&mut self, f: impl FnMut(&Session<C>) + 'static) {
        self.on_session_begin.add(f);
    }

    pub fn on_trial_begin(&mut self, f: impl FnMut(&Trial) + 'static) {
        self.on_trial_begin.add(f);
    }

    pub fn on_trial_end(&mut self, f: impl FnMut(&Trial) + 'static) {
        self.on_trial_end.add(f);
    }

    /// Fired during `end()`, after results are saved and before handlers clean up.
    pub fn on_clean_up(&mut self, f: impl FnMut(&()) + 'static) {
        self.on_clean_up.add(f);
    }

    /// Fired once every handler has finished; state is reset afterwards.
    pub fn on_session_end(&mut self, f: impl FnMut(&Session<C>) + 'static) {
        self.on_session_end.add(f);
    }

    /// True if any handler reports that data for this identity already exists.
    pub fn check_session_exists(
        &self,
        root_path: Option<&Path>,
        experiment_name: &str,
        ppid: &str,
        session_number: u32,
    ) -> bool {
        self.data_handlers.iter().any(|h| {
            h.check_if_risk_of_overwrite(experiment_name, ppid, session_number, root_path)
        })
    }

    pub fn begin(
        &mut self,
        experiment_name: impl Into<String>,
        ppid: impl Into<String>,
        session_number: u32,
        participant_details: Option<Map<String, Value>>,
        settings: Option<Settings>,
    ) -> Result<(), SessionError> {
        if self.has_initialised {
            return Err(SessionError::AlreadyInitialised);
        }
        self.experiment_name = experiment_name.into();
        self.ppid = ppid.into();
        self.number = session_number;
        self.participant_details = participant_details.unwrap_or_default();
        self.settings = settings.map(Arc::new).unwrap_or_else(Settings::empty);

        let info = self.info();
        for handler in self.data_handlers.iter_mut() {
            handler.initialise(&info);
            if let Err(e) = handler.set_up() {
                tracing::warn!(handler = handler.name(), error = %e, "data handler failed to set up");
            }
        }
        self.has_initialised = true;
        tracing::info!(
            experiment = %self.experiment_name,
            ppid = %self.ppid,
            session = self.number,
            "session began"
        );

        let mut listeners = mem::take(&mut self.on_session_begin);
        listeners.emit(self);
        self.on_session_begin = listeners;

        if self.config.copy_session_settings {
            let settings = self.settings.as_map().clone();
            self.save_json_map(&settings, "settings", DataType::SessionInfo);
        }

        if self.config.copy_participant_details {
            let mut table = DataTable::new(self.participant_details.keys().cloned())?;
            let row: DataRow = self
                .participant_details
                .iter()
                .map(|(k, v)| (k.clone(), format_cell(v)))
                .collect();
            table.add_complete_row(row)?;
            self.save_data_table(&table, "participant_details", DataType::SessionInfo);
        }

        Ok(())
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            experiment_name: self.experiment_name.clone(),
            ppid: self.ppid.clone(),
            session_number: self.number,
        }
    }

    pub fn has_initialised(&self) -> bool {
        self.has_initialised
    }

    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    pub fn ppid(&self) -> &str {
        &self.ppid
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn participant_details(&self) -> &Map<String, Value> {
        &self.participant_details
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn current_trial_num(&self) -> usize {
        self.current_trial_num
    }

    pub fn current_block_num(&self) -> usize {
        self.current_block_num
    }

    // ---- structure ----

    /// Appends a block holding `number_of_trials` new trials (zero is allowed;
    /// add trials later with [`create_trial`](Self::create_trial)).
    pub fn create_block(&mut self, number_of_trials: i64) -> Result<&mut Block, SessionError> {
        let count = usize::try_from(number_of_trials).map_err(|_| {
            SessionError::invalid_argument(format!(
                "invalid number of trials supplied: {}",
                number_of_trials
            ))
        })?;
        Ok(self.push_block(count))
    }

    pub fn create_empty_block(&mut self) -> &mut Block {
        self.push_block(0)
    }

    fn push_block(&mut self, count: usize) -> &mut Block {
        let number = self.blocks.len() + 1;
        self.blocks.push(Block::new(number, count));
        self.renumber();
        tracing::debug!(block = number, trials = count, "created block");
        let idx = self.blocks.len() - 1;
        &mut self.blocks[idx]
    }

    /// Appends a trial to the end of `block_number`. Later trials are
    /// renumbered, so this is refused once any of them has started.
    pub fn create_trial(&mut self, block_number: usize) -> Result<&mut Trial, SessionError> {
        let idx = self.block_index(block_number)?;
        if self.blocks[idx + 1..].iter().any(Block::has_started) {
            return Err(SessionError::invalid_argument(format!(
                "cannot add a trial to block {} after later trials have started",
                block_number
            )));
        }
        self.blocks[idx].trials.push(Trial::new());
        self.renumber();
        let block = &mut self.blocks[idx];
        let last = block.trials.len() - 1;
        Ok(&mut block.trials[last])
    }

    /// Shuffles the trial order within a block that has not started yet.
    pub fn shuffle_block<R: Rng + ?Sized>(
        &mut self,
        block_number: usize,
        rng: &mut R,
    ) -> Result<(), SessionError> {
        let idx = self.block_index(block_number)?;
        if self.blocks[idx].has_started() {
            return Err(SessionError::invalid_argument(format!(
                "block {} has already started",
                block_number
            )));
        }
        self.blocks[idx].trials.shuffle(rng);
        self.renumber();
        Ok(())
    }

    fn renumber(&mut self) {
        let mut n = 0;
        for (bi, block) in self.blocks.iter_mut().enumerate() {
            block.number = bi + 1;
            for (ti, trial) in block.trials.iter_mut().enumerate() {
                n += 1;
                trial.number = n;
                trial.block_number = bi + 1;
                trial.number_in_block = ti + 1;
            }
        }
    }

    // ---- navigation ----

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// All trials in global order.
    pub fn trials(&self) -> impl Iterator<Item = &Trial> + Clone {
        self.blocks.iter().flat_map(|b| b.trials.iter())
    }

    pub fn num_trials(&self) -> usize {
        self.blocks.iter().map(Block::len).sum()
    }

    /// Trial by 1-based global number.
    pub fn trial(&self, number: usize) -> Result<&Trial, SessionError> {
        if number == 0 {
            return Err(SessionError::no_such_trial("there is no trial zero"));
        }
        self.trials()
            .nth(number - 1)
            .ok_or_else(|| SessionError::no_such_trial(format!("there is no trial {}", number)))
    }

    pub fn trial_mut(&mut self, number: usize) -> Result<&mut Trial, SessionError> {
        if number == 0 {
            return Err(SessionError::no_such_trial("there is no trial zero"));
        }
        self.blocks
            .iter_mut()
            .flat_map(|b| b.trials.iter_mut())
            .nth(number - 1)
            .ok_or_else(|| SessionError::no_such_trial(format!("there is no trial {}", number)))
    }

    pub fn current_trial(&self) -> Result<&Trial, SessionError> {
        if self.current_trial_num == 0 {
            return Err(SessionError::no_such_trial(
                "there is no trial zero; use next_trial to get the first trial",
            ));
        }
        self.trial(self.current_trial_num)
    }

    pub fn current_trial_mut(&mut self) -> Result<&mut Trial, SessionError> {
        if self.current_trial_num == 0 {
            return Err(SessionError::no_such_trial(
                "there is no trial zero; use next_trial to get the first trial",
            ));
        }
        self.trial_mut(self.current_trial_num)
    }

    pub fn next_trial(&self) -> Result<&Trial, SessionError> {
        self.trials().nth(self.current_trial_num).ok_or_else(|| {
            SessionError::no_such_trial("there is no next trial; reached the end of the trial list")
        })
    }

    pub fn prev_trial(&self) -> Result<&Trial, SessionError> {
        if self.current_trial_num < 2 {
            return Err(SessionError::no_such_trial(
                "there is no previous trial; currently at the start of the session",
            ));
        }
        self.trial(self.current_trial_num - 1)
    }

    pub fn first_trial(&self) -> Result<&Trial, SessionError> {
        let block = self.blocks.first().ok_or_else(|| {
            SessionError::no_such_trial("there is no first trial because no blocks have been created")
        })?;
        block.first_trial().ok_or_else(|| {
            SessionError::no_such_trial("there is no first trial; the first block is empty")
        })
    }

    pub fn last_trial(&self) -> Result<&Trial, SessionError> {
        let block = self.blocks.last().ok_or_else(|| {
            SessionError::no_such_trial("there is no last trial because no blocks have been created")
        })?;
        block.last_trial().ok_or_else(|| {
            SessionError::no_such_trial("there is no last trial; the last block is empty")
        })
    }

    pub fn block(&self, number: usize) -> Result<&Block, SessionError> {
        let idx = self.block_index(number)?;
        Ok(&self.blocks[idx])
    }

    pub fn block_mut(&mut self, number: usize) -> Result<&mut Block, SessionError> {
        let idx = self.block_index(number)?;
        Ok(&mut self.blocks[idx])
    }

    pub fn current_block(&self) -> Result<&Block, SessionError> {
        self.block(self.current_block_num)
    }

    fn block_index(&self, number: usize) -> Result<usize, SessionError> {
        if number == 0 || number > self.blocks.len() {
            return Err(SessionError::no_such_trial(format!(
                "there is no block {}",
                number
            )));
        }
        Ok(number - 1)
    }

    pub fn in_trial(&self) -> bool {
        self.current_trial()
            .is_ok_and(|t| t.status == TrialStatus::InProgress)
    }

    /// Looks `key` up on the trial, then its block, then the session.
    pub fn trial_setting(&self, trial_number: usize, key: &str) -> Option<&Value> {
        let trial = self.trial(trial_number).ok()?;
        let block = self.blocks.get(trial.block_number.checked_sub(1)?)?;
        trial
            .settings
            .get(key)
            .or_else(|| block.settings.get(key))
            .or_else(|| self.settings.get(key))
    }

    // ---- transitions ----

    /// Begins the trial after the current one, ending the current trial
    /// first if it is still running.
    pub fn begin_next_trial(&mut self) -> Result<(), SessionError> {
        if !self.has_initialised {
            return Err(SessionError::NotInitialised);
        }
        let next = self.next_trial()?.number;
        if self.in_trial() {
            self.finish_trial(self.current_trial_num)?;
        }

        let now = self.clock.now();
        let seed = self.seed_result(next, now)?;
        let trial = self.trial_mut(next)?;
        trial.begin(now, seed);
        let block_number = trial.block_number;
        self.current_trial_num = next;
        self.current_block_num = block_number;
        tracing::debug!(trial = next, block = block_number, "trial began");

        let mut listeners = mem::take(&mut self.on_trial_begin);
        if let Ok(trial) = self.trial(next) {
            listeners.emit(trial);
        }
        self.on_trial_begin = listeners;
        Ok(())
    }

    /// Begins the next trial unless the current trial is the last one.
    /// Returns whether a trial was begun.
    pub fn begin_next_trial_safe(&mut self) -> Result<bool, SessionError> {
        if self.current_trial_num != 0 && self.current_trial_num == self.last_trial()?.number {
            return Ok(false);
        }
        self.begin_next_trial()?;
        Ok(true)
    }

    pub fn end_current_trial(&mut self) -> Result<(), SessionError> {
        let trial = self.current_trial()?;
        if trial.status != TrialStatus::InProgress {
            return Err(SessionError::TrialNotInProgress(trial.number));
        }
        self.finish_trial(self.current_trial_num)
    }

    /// Ends the session if `trial_number` is the last trial.
    pub fn end_if_last_trial(&mut self, trial_number: usize) -> Result<bool, SessionError> {
        if !self.has_initialised {
            return Err(SessionError::NotInitialised);
        }
        if trial_number == self.last_trial()?.number {
            self.end();
            return Ok(true);
        }
        Ok(false)
    }

    /// Result map a trial starts with: identity and timing columns, then
    /// logged settings and custom headers as nulls.
    fn seed_result(&self, number: usize, start: Duration) -> Result<ResultMap, SessionError> {
        let trial = self.trial(number)?;
        let base: [Value; 8] = [
            Value::from(self.experiment_name.as_str()),
            Value::from(self.ppid.as_str()),
            Value::from(self.number),
            Value::from(trial.number),
            Value::from(trial.block_number),
            Value::from(trial.number_in_block),
            Value::from(start.as_secs_f64()),
            Value::Null,
        ];
        let mut result: ResultMap = BASE_HEADERS
            .iter()
            .map(|h| h.to_string())
            .zip(base)
            .collect();
        for key in self.config.settings_to_log.iter().chain(&self.config.custom_headers) {
            result.entry(key.clone()).or_insert(Value::Null);
        }
        Ok(result)
    }

    fn finish_trial(&mut self, number: usize) -> Result<(), SessionError> {
        let logged: Vec<(String, Value)> = self
            .config
            .settings_to_log
            .iter()
            .map(|key| {
                let value = self.trial_setting(number, key).cloned().unwrap_or(Value::Null);
                (key.clone(), value)
            })
            .collect();

        let now = self.clock.now();
        let trial = self.trial_mut(number)?;
        trial.end(now);
        trial.record("end_time", now.as_secs_f64())?;
        for (key, value) in logged {
            trial.record(key, value)?;
        }
        tracing::debug!(trial = number, "trial ended");

        let mut listeners = mem::take(&mut self.on_trial_end);
        if let Ok(trial) = self.trial(number) {
            listeners.emit(trial);
        }
        self.on_trial_end = listeners;

        // An empty last block means there is no last trial to end on.
        if self.config.end_after_last_trial
            && self.last_trial().is_ok_and(|t| t.number == number)
        {
            self.end();
        }
        Ok(())
    }

    // ---- data ----

    pub fn save_data_table(
        &mut self,
        table: &DataTable,
        data_name: &str,
        data_type: DataType,
    ) -> Vec<String> {
        self.broadcast(data_name, data_type, |h, target| {
            h.handle_data_table(table, target)
        })
    }

    pub fn save_json_list(
        &mut self,
        list: &[Value],
        data_name: &str,
        data_type: DataType,
    ) -> Vec<String> {
        let value = Value::Array(list.to_vec());
        self.broadcast(data_name, data_type, |h, target| h.handle_json(&value, target))
    }

    pub fn save_json_map(
        &mut self,
        map: &Map<String, Value>,
        data_name: &str,
        data_type: DataType,
    ) -> Vec<String> {
        let value = Value::Object(map.clone());
        self.broadcast(data_name, data_type, |h, target| h.handle_json(&value, target))
    }

    pub fn save_text(&mut self, text: &str, data_name: &str, data_type: DataType) -> Vec<String> {
        self.broadcast(data_name, data_type, |h, target| h.handle_text(text, target))
    }

    pub fn save_bytes(&mut self, bytes: &[u8], data_name: &str, data_type: DataType) -> Vec<String> {
        self.broadcast(data_name, data_type, |h, target| h.handle_bytes(bytes, target))
    }

    /// Hands the payload to every handler in order. A failing handler is
    /// logged and skipped; the returned locations are those that succeeded.
    fn broadcast<F>(&mut self, data_name: &str, data_type: DataType, mut save: F) -> Vec<String>
    where
        F: FnMut(&mut dyn DataHandler, &DataTarget<'_>) -> Result<String, HandlerError>,
    {
        let target = DataTarget {
            experiment_name: &self.experiment_name,
            ppid: &self.ppid,
            session_number: self.number,
            data_name,
            data_type,
        };
        let mut locations = Vec::with_capacity(self.data_handlers.len());
        for handler in self.data_handlers.iter_mut() {
            match save(handler.as_mut(), &target) {
                Ok(location) => {
                    tracing::debug!(handler = handler.name(), data = data_name, %location, "saved");
                    locations.push(location);
                }
                Err(e) => {
                    tracing::warn!(handler = handler.name(), data = data_name, error = %e, "save failed");
                }
            }
        }
        locations
    }

    // ---- teardown ----

    /// Ends the session: finishes a running trial, saves `trial_results`,
    /// runs clean-up listeners, waits for every handler, then resets.
    /// Calling it again, or from `Drop`, does nothing until the next `begin`.
    pub fn end(&mut self) {
        if !mem::replace(&mut self.has_initialised, false) {
            return;
        }

        if self.in_trial() {
            if let Err(e) = self.finish_trial(self.current_trial_num) {
                tracing::warn!(error = %e, "could not end the running trial");
            }
        }
        self.save_results();

        let mut listeners = mem::take(&mut self.on_clean_up);
        listeners.emit(&());
        self.on_clean_up = listeners;

        for handler in self.data_handlers.iter_mut() {
            if let Err(e) = handler.clean_up() {
                tracing::warn!(handler = handler.name(), error = %e, "data handler clean up failed");
            }
        }

        let mut listeners = mem::take(&mut self.on_session_end);
        listeners.emit(self);
        self.on_session_end = listeners;

        self.current_trial_num = 0;
        self.current_block_num = 0;
        self.blocks = Vec::new();
        tracing::info!(experiment = %self.experiment_name, ppid = %self.ppid, "ended session");
    }

    fn save_results(&mut self) {
        match aggregate_results(self.trials()) {
            Ok(table) => {
                self.save_data_table(&table, "trial_results", DataType::TrialResults);
            }
            Err(e) => tracing::warn!(error = %e, "could not build trial results"),
        }
    }
}

impl<C: Clock> Drop for Session<C> {
    fn drop(&mut self) {
        if self.config.end_on_drop {
            self.end();
        }
    }
}
