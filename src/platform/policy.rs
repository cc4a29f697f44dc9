use std::{fmt, sync::Arc};

use anyhow::Result;

use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;

/// OS switch that denies removal of the blocker app.
pub trait PolicyBridge: Send + Sync {
    /// Returns the platform's acknowledgement string.
    fn set_deny_app_removal(&self, deny: bool) -> Result<String>;
}

/// Whether this platform can enforce uninstall protection at all. Requested
/// once at startup; callers branch on the variant instead of probing.
#[derive(Clone)]
pub enum PolicyCapability {
    Available(Arc<dyn PolicyBridge>),
    Unavailable,
}

impl fmt::Debug for PolicyCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyCapability::Available(_) => f.write_str("PolicyCapability::Available"),
            PolicyCapability::Unavailable => f.write_str("PolicyCapability::Unavailable"),
        }
    }
}

impl PolicyCapability {
    /// The capability of the platform this binary was built for.
    pub fn detect() -> Self {
        #[cfg(target_os = "ios")]
        {
            PolicyCapability::Available(Arc::new(super::ios::ManagedSettingsBridge))
        }

        #[cfg(not(target_os = "ios"))]
        {
            PolicyCapability::Unavailable
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PolicyCapability::Available(_))
    }

    /// Best-effort write of the deny-removal flag. Failure and absence are
    /// logged and otherwise ignored; returns the acknowledgement on success.
    pub fn apply(&self, deny: bool, reason: &str) -> Option<String> {
        match self {
            PolicyCapability::Available(bridge) => match bridge.set_deny_app_removal(deny) {
                Ok(ack) => {
                    log_info!("setDenyAppRemoval({deny}) on {reason} => {ack}");
                    Some(ack)
                }
                Err(err) => {
                    log_warn!("setDenyAppRemoval({deny}) on {reason} failed: {err:#}");
                    None
                }
            },
            PolicyCapability::Unavailable => {
                log_warn!("App removal guard unsupported; skipping deny={deny} on {reason}");
                None
            }
        }
    }
}
