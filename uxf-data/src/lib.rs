pub mod error;
pub mod file;
pub mod handler;
pub mod memory;
pub mod web;
mod worker;

pub use error::HandlerError;
pub use file::FileSaver;
pub use handler::{DataHandler, DataTarget, SessionInfo};
pub use memory::{MemoryHandler, MemoryLog, MemoryStore, Payload, SavedRecord};
pub use web::{HttpUploader, UploadRecord, Uploader, WebSaver};
