pub mod mode;

pub use mode::{Mode, ModeId, ModePatch, NewMode, SelectionToken};
