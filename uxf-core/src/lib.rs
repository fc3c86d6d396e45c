pub mod error;
pub mod settings;
pub mod table;
pub mod trial;

pub use error::{SessionError, SettingsError, TableError};
pub use settings::Settings;
pub use table::{DataRow, DataTable};
pub use trial::{DataType, ResultMap, TrialStatus, format_cell, session_num_to_name};
