//! Local file output.
//!
//! Layout: `{base}/{experiment}/{ppid}/S001/{data_name}.{ext}`. With
//! `sort_into_folders`, session info goes under `session_info/` and
//! anything untagged under `other/`; trial results always sit in the
//! session directory itself.

use crate::error::HandlerError;
use crate::handler::{DataHandler, DataTarget, SessionInfo};
use crate::worker::Worker;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use uxf_core::{DataTable, DataType, session_num_to_name};

pub struct FileSaver {
    name: String,
    base_directory: PathBuf,
    pub sort_into_folders: bool,
    worker: Option<Worker>,
}

impl FileSaver {
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            name: "file_saver".to_string(),
            base_directory: base_directory.into(),
            sort_into_folders: true,
            worker: None,
        }
    }

    pub fn with_sort_into_folders(mut self, sort: bool) -> Self {
        self.sort_into_folders = sort;
        self
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn session_path(&self, experiment_name: &str, ppid: &str, session_number: u32) -> PathBuf {
        session_dir(&self.base_directory, experiment_name, ppid, session_number)
    }

    fn path_for(&self, target: &DataTarget<'_>, ext: &str) -> PathBuf {
        let mut path = self.session_path(target.experiment_name, target.ppid, target.session_number);
        if self.sort_into_folders {
            match target.data_type {
                DataType::TrialResults => {}
                other => path.push(other.as_str()),
            }
        }
        path.push(format!("{}.{}", target.data_name, ext));
        path
    }

    fn queue_write(&self, path: PathBuf, contents: Vec<u8>) -> Result<String, HandlerError> {
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| HandlerError::NotSetUp(self.name.clone()))?;
        let location = path.display().to_string();
        tracing::debug!(path = %location, bytes = contents.len(), "queueing file write");
        worker.submit(Box::new(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, contents)?;
            Ok(())
        }))?;
        Ok(location)
    }
}

fn session_dir(base: &Path, experiment_name: &str, ppid: &str, session_number: u32) -> PathBuf {
    base.join(experiment_name)
        .join(ppid)
        .join(session_num_to_name(session_number))
}

impl DataHandler for FileSaver {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(&mut self, session: &SessionInfo) {
        tracing::info!(
            path = %self.session_path(&session.experiment_name, &session.ppid, session.session_number).display(),
            "file saver attached"
        );
    }

    fn set_up(&mut self) -> Result<(), HandlerError> {
        if self.worker.is_none() {
            self.worker = Some(Worker::spawn(&self.name)?);
        }
        Ok(())
    }

    fn check_if_risk_of_overwrite(
        &self,
        experiment_name: &str,
        ppid: &str,
        session_number: u32,
        root_path: Option<&Path>,
    ) -> bool {
        let base = root_path.unwrap_or(self.base_directory.as_path());
        session_dir(base, experiment_name, ppid, session_number).exists()
    }

    fn handle_data_table(
        &mut self,
        table: &DataTable,
        target: &DataTarget<'_>,
    ) -> Result<String, HandlerError> {
        self.queue_write(self.path_for(target, "csv"), table.to_csv().into_bytes())
    }

    fn handle_json(
        &mut self,
        value: &Value,
        target: &DataTarget<'_>,
    ) -> Result<String, HandlerError> {
        let contents = serde_json::to_vec_pretty(value)?;
        self.queue_write(self.path_for(target, "json"), contents)
    }

    fn handle_text(&mut self, text: &str, target: &DataTarget<'_>) -> Result<String, HandlerError> {
        self.queue_write(self.path_for(target, "txt"), text.as_bytes().to_vec())
    }

    fn handle_bytes(
        &mut self,
        bytes: &[u8],
        target: &DataTarget<'_>,
    ) -> Result<String, HandlerError> {
        self.queue_write(self.path_for(target, "bytes"), bytes.to_vec())
    }

    fn clean_up(&mut self) -> Result<(), HandlerError> {
        match self.worker.take() {
            Some(worker) => worker.join(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target<'a>(name: &'a str, data_type: DataType) -> DataTarget<'a> {
        DataTarget {
            experiment_name: "exp",
            ppid: "P01",
            session_number: 2,
            data_name: name,
            data_type,
        }
    }

    #[test]
    fn writes_are_visible_after_clean_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut saver = FileSaver::new(dir.path());
        saver.set_up().unwrap();

        let mut table = DataTable::new(["a", "b"]).unwrap();
        table
            .add_complete_row([("a", "1"), ("b", "2")].into_iter().collect())
            .unwrap();
        let results = saver
            .handle_data_table(&table, &target("trial_results", DataType::TrialResults))
            .unwrap();
        let settings = saver
            .handle_json(&json!({"k": 1}), &target("settings", DataType::SessionInfo))
            .unwrap();
        let notes = saver
            .handle_text("hello", &target("notes", DataType::Other))
            .unwrap();
        saver.clean_up().unwrap();

        let session = dir.path().join("exp").join("P01").join("S002");
        assert_eq!(PathBuf::from(&results), session.join("trial_results.csv"));
        assert_eq!(PathBuf::from(&settings), session.join("session_info").join("settings.json"));
        assert_eq!(PathBuf::from(&notes), session.join("other").join("notes.txt"));

        assert_eq!(fs::read_to_string(&results).unwrap(), "a,b\n1,2\n");
        let parsed: Value = serde_json::from_str(&fs::read_to_string(&settings).unwrap()).unwrap();
        assert_eq!(parsed, json!({"k": 1}));
        assert_eq!(fs::read_to_string(&notes).unwrap(), "hello");
    }

    #[test]
    fn flat_layout_without_sorting() {
        let dir = tempfile::tempdir().unwrap();
        let mut saver = FileSaver::new(dir.path()).with_sort_into_folders(false);
        saver.set_up().unwrap();
        let loc = saver
            .handle_bytes(&[1, 2, 3], &target("blob", DataType::SessionInfo))
            .unwrap();
        saver.clean_up().unwrap();
        assert_eq!(
            PathBuf::from(&loc),
            dir.path().join("exp/P01/S002/blob.bytes")
        );
        assert_eq!(fs::read(&loc).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn refuses_to_save_before_set_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut saver = FileSaver::new(dir.path());
        let err = saver
            .handle_text("x", &target("t", DataType::Other))
            .unwrap_err();
        assert!(matches!(err, HandlerError::NotSetUp(_)));
    }

    #[test]
    fn overwrite_risk_tracks_session_directory() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileSaver::new(dir.path());
        assert!(!saver.check_if_risk_of_overwrite("exp", "P01", 2, None));

        fs::create_dir_all(dir.path().join("exp/P01/S002")).unwrap();
        assert!(saver.check_if_risk_of_overwrite("exp", "P01", 2, None));
        assert!(!saver.check_if_risk_of_overwrite("exp", "P01", 3, None));

        let other = tempfile::tempdir().unwrap();
        assert!(!saver.check_if_risk_of_overwrite("exp", "P01", 2, Some(other.path())));
    }
}
