use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use tokio::sync::OnceCell;

use crate::models::SelectionToken;

/// The OS app-shielding capability (Screen Time on iOS).
#[async_trait]
pub trait ScreenTime: Send + Sync {
    async fn request_authorization(&self) -> Result<bool>;
    async fn block_selection(&self, selection: &SelectionToken) -> Result<()>;
    async fn unblock_selection(&self) -> Result<()>;
}

/// Asks for authorization at most once per process and remembers the answer,
/// whether granted or denied. Errors count as denied.
pub struct Authorization {
    screen_time: Arc<dyn ScreenTime>,
    granted: OnceCell<bool>,
}

impl Authorization {
    pub fn new(screen_time: Arc<dyn ScreenTime>) -> Self {
        Self {
            screen_time,
            granted: OnceCell::new(),
        }
    }

    pub async fn ensure(&self) -> bool {
        *self
            .granted
            .get_or_init(|| async {
                match self.screen_time.request_authorization().await {
                    Ok(granted) => {
                        info!("Screen Time authorization result: {granted}");
                        granted
                    }
                    Err(err) => {
                        warn!("Screen Time authorization error: {err:#}");
                        false
                    }
                }
            })
            .await
    }
}
