pub mod draft;
pub mod registry;

pub use draft::DraftHandle;
pub use registry::{DeleteOutcome, ModeRegistry, RegistryState};
