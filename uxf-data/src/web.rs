//! Network output. Payloads are serialized on the caller's thread and
//! uploaded from a background worker; `clean_up` waits for the queue.

use crate::error::HandlerError;
use crate::handler::{DataHandler, DataTarget, SessionInfo};
use crate::worker::Worker;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uxf_core::{DataTable, DataType};

/// A single object to store remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    /// `experiment/ppid/S001/data_type/data_name.ext`
    pub key: String,
    pub data_type: DataType,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Transport used by [`WebSaver`].
pub trait Uploader: Send + Sync + 'static {
    /// Location descriptor returned to the session for `key`.
    fn location(&self, key: &str) -> String;

    fn upload(&self, record: &UploadRecord) -> Result<(), HandlerError>;
}

/// PUTs each record to `{endpoint}/{key}`.
pub struct HttpUploader {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, HandlerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl Uploader for HttpUploader {
    fn location(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, key)
    }

    fn upload(&self, record: &UploadRecord) -> Result<(), HandlerError> {
        let mut request = self
            .client
            .put(self.location(&record.key))
            .header(reqwest::header::CONTENT_TYPE, record.content_type)
            .body(record.body.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(HandlerError::Upload(format!(
                "{} returned {}",
                record.key, status
            )));
        }
        Ok(())
    }
}

pub struct WebSaver<U: Uploader> {
    name: String,
    uploader: Arc<U>,
    worker: Option<Worker>,
}

impl<U: Uploader> WebSaver<U> {
    pub fn new(uploader: U) -> Self {
        Self {
            name: "web_saver".to_string(),
            uploader: Arc::new(uploader),
            worker: None,
        }
    }

    fn queue_upload(
        &self,
        target: &DataTarget<'_>,
        ext: &str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> Result<String, HandlerError> {
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| HandlerError::NotSetUp(self.name.clone()))?;
        let record = UploadRecord {
            key: format!(
                "{}/{}/{}.{}",
                target.session_key(),
                target.data_type,
                target.data_name,
                ext
            ),
            data_type: target.data_type,
            content_type,
            body,
        };
        let location = self.uploader.location(&record.key);
        tracing::debug!(location = %location, bytes = record.body.len(), "queueing upload");

        let uploader = Arc::clone(&self.uploader);
        worker.submit(Box::new(move || uploader.upload(&record)))?;
        Ok(location)
    }
}

impl<U: Uploader> DataHandler for WebSaver<U> {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(&mut self, session: &SessionInfo) {
        tracing::info!(
            experiment = %session.experiment_name,
            ppid = %session.ppid,
            "web saver attached"
        );
    }

    fn set_up(&mut self) -> Result<(), HandlerError> {
        if self.worker.is_none() {
            self.worker = Some(Worker::spawn(&self.name)?);
        }
        Ok(())
    }

    /// Remote stores are not probed; uploads under an existing key replace it.
    fn check_if_risk_of_overwrite(
        &self,
        _experiment_name: &str,
        _ppid: &str,
        _session_number: u32,
        _root_path: Option<&Path>,
    ) -> bool {
        false
    }

    fn handle_data_table(
        &mut self,
        table: &DataTable,
        target: &DataTarget<'_>,
    ) -> Result<String, HandlerError> {
        self.queue_upload(target, "csv", "text/csv", table.to_csv().into_bytes())
    }

    fn handle_json(
        &mut self,
        value: &Value,
        target: &DataTarget<'_>,
    ) -> Result<String, HandlerError> {
        let body = serde_json::to_vec(value)?;
        self.queue_upload(target, "json", "application/json", body)
    }

    fn handle_text(&mut self, text: &str, target: &DataTarget<'_>) -> Result<String, HandlerError> {
        self.queue_upload(target, "txt", "text/plain", text.as_bytes().to_vec())
    }

    fn handle_bytes(
        &mut self,
        bytes: &[u8],
        target: &DataTarget<'_>,
    ) -> Result<String, HandlerError> {
        self.queue_upload(target, "bytes", "application/octet-stream", bytes.to_vec())
    }

    fn clean_up(&mut self) -> Result<(), HandlerError> {
        match self.worker.take() {
            Some(worker) => worker.join(),
            None => Ok(()),
        }
    }
}
