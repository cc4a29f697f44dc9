//! Bindings to the Swift module wrapping `ManagedSettingsStore`.

use std::ffi::{c_char, CStr};

use anyhow::{bail, Context, Result};

use super::PolicyBridge;

extern "C" {
    fn thinkblock_guard_set_deny_app_removal(deny: bool) -> *mut c_char;
    fn thinkblock_guard_free_string(ptr: *mut c_char);
}

/// Sets `application.denyAppRemoval` on the app's managed settings store.
/// Clearing writes `nil` rather than `false` so the setting is released.
pub struct ManagedSettingsBridge;

impl PolicyBridge for ManagedSettingsBridge {
    fn set_deny_app_removal(&self, deny: bool) -> Result<String> {
        unsafe {
            let ptr = thinkblock_guard_set_deny_app_removal(deny);
            if ptr.is_null() {
                bail!("Swift returned null acknowledgement");
            }
            let ack = CStr::from_ptr(ptr)
                .to_str()
                .map(str::to_owned)
                .context("acknowledgement is not valid UTF-8");
            thinkblock_guard_free_string(ptr);
            ack
        }
    }
}
