pub mod controller;
pub mod error;
pub mod state;

pub use controller::{BlockController, StrictModeOutcome, TriggerOutcome};
pub use error::{BlockError, BlockResult};
pub use state::{SessionState, SessionStore};
