pub mod block;
pub mod config;
pub mod events;
pub mod results;
pub mod session;
pub mod trial;

pub use block::Block;
pub use config::SessionConfig;
pub use events::Listeners;
pub use results::aggregate_results;
pub use session::Session;
pub use trial::{BASE_HEADERS, Trial};

pub use uxf_core::{DataTable, DataType, ResultMap, SessionError, Settings, TrialStatus};
pub use uxf_data::DataHandler;
pub use uxf_timing::{Clock, ManualClock, SystemClock};
