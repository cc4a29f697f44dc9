use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

/// A physical tag reader. A scan is `request_scan` followed by `read_code`,
/// and the hardware session must be handed back with `release` afterwards no
/// matter how the scan ended.
#[async_trait]
pub trait TriggerReader: Send + Sync {
    async fn request_scan(&self) -> Result<()>;
    async fn read_code(&self) -> Result<Option<String>>;
    fn release(&self);
}

/// Releases the scan session when dropped, covering success, errors, the
/// timeout, and the future being dropped mid-scan.
struct ScanSession<'a> {
    reader: &'a dyn TriggerReader,
}

impl Drop for ScanSession<'_> {
    fn drop(&mut self) {
        self.reader.release();
        debug!("Trigger scan session released");
    }
}

/// Run one scan. Errors, timeouts, and cancellation all yield `None`.
pub async fn read_trigger_code(
    reader: &dyn TriggerReader,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Option<String> {
    let _session = ScanSession { reader };

    let scan = async {
        reader.request_scan().await?;
        reader.read_code().await
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Trigger scan cancelled");
            None
        }
        result = tokio::time::timeout(timeout, scan) => match result {
            Ok(Ok(code)) => code,
            Ok(Err(err)) => {
                warn!("Trigger scan failed: {err:#}");
                None
            }
            Err(_) => {
                warn!("Trigger scan timed out after {timeout:?}");
                None
            }
        },
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ScanScript, ScriptedReader};
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn returns_code_and_releases() {
        let reader = ScriptedReader::new(vec![ScanScript::Code("123456789")]);
        let code = read_trigger_code(&reader, TIMEOUT, &CancellationToken::new()).await;
        assert_eq!(code.as_deref(), Some("123456789"));
        assert_eq!(reader.releases(), 1);
    }

    #[tokio::test]
    async fn failures_and_timeouts_yield_none_and_release() {
        let reader = ScriptedReader::new(vec![ScanScript::Fail, ScanScript::Hang]);
        assert_eq!(read_trigger_code(&reader, TIMEOUT, &CancellationToken::new()).await, None);
        assert_eq!(read_trigger_code(&reader, TIMEOUT, &CancellationToken::new()).await, None);
        assert_eq!(reader.releases(), 2);
    }

    #[tokio::test]
    async fn cancellation_releases_the_session() {
        let reader = ScriptedReader::new(vec![ScanScript::Hang]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let code = read_trigger_code(&reader, Duration::from_secs(60), &cancel).await;
        assert_eq!(code, None);
        assert_eq!(reader.releases(), 1);
    }
}
