//! External collaborators: the OS removal guard, the Screen Time shield, and
//! the physical trigger reader.

#[cfg(target_os = "ios")]
mod ios;
mod policy;
mod screen_time;
mod trigger;

use std::sync::Arc;

use crate::stats::{Clock, SystemClock};

#[cfg(target_os = "ios")]
pub use ios::ManagedSettingsBridge;
pub use policy::{PolicyBridge, PolicyCapability};
pub use screen_time::{Authorization, ScreenTime};
pub use trigger::{read_trigger_code, TriggerReader};

#[cfg(test)]
pub(crate) mod testing {
    pub use super::policy::testing::RecordingBridge;
    pub use super::screen_time::testing::FakeScreenTime;
    pub use super::trigger::testing::{ScanScript, ScriptedReader};
}

/// Platform services handed to [`crate::AppContext`] by the host shell.
#[derive(Clone)]
pub struct Platform {
    pub policy: PolicyCapability,
    pub screen_time: Arc<dyn ScreenTime>,
    pub trigger_reader: Arc<dyn TriggerReader>,
    pub clock: Arc<dyn Clock>,
}

impl Platform {
    /// Services for the current OS, with the system clock.
    pub fn new(screen_time: Arc<dyn ScreenTime>, trigger_reader: Arc<dyn TriggerReader>) -> Self {
        Self {
            policy: PolicyCapability::detect(),
            screen_time,
            trigger_reader,
            clock: Arc::new(SystemClock),
        }
    }
}
