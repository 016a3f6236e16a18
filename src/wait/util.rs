use std::time::{Duration, Instant};

use serde_json::Value;

use super::WaitBuilder;
use crate::context::ScriptContext;
use crate::error::WaitError;
use crate::executor::SessionHandle;

/// Number of jQuery requests in flight; zero when the page has no jQuery.
const ACTIVE_AJAX: &str = "return typeof jQuery === 'undefined' ? 0 : jQuery.active;";

const AJAX_REQUEST_PERIOD: Duration = Duration::from_millis(500);

/// Ready-made waits: fixed delays, ajax idle and ajax request tracking.
pub struct WaitUtil<'a> {
    context: &'a ScriptContext,
}

impl<'a> WaitUtil<'a> {
    pub fn new(context: &'a ScriptContext) -> Self {
        Self { context }
    }

    pub fn builder(&self) -> WaitBuilder {
        self.context.wait()
    }

    pub fn element(&self, selector: &str) -> WaitBuilder {
        self.builder().element(selector)
    }

    pub fn element_in(&self, root: &str, selector: &str) -> WaitBuilder {
        self.builder().element_in(root, selector)
    }

    pub fn variable(&self, name: &str) -> WaitBuilder {
        self.builder().variable(name)
    }

    pub async fn wait_time(&self, millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    /// Poll `jQuery.active` until it drops to zero or `timeout` elapses.
    ///
    /// Returns nothing either way; callers re-check state themselves.
    pub async fn ajax_idle(&self, session: &SessionHandle, timeout: Duration) -> Result<(), WaitError> {
        let period = Duration::from_millis(self.context.settings().ajax_poll_ms);
        let start = Instant::now();
        while start.elapsed() < timeout {
            let active = session.execute_script(ACTIVE_AJAX, &[]).await?;
            if is_idle(&active) {
                return Ok(());
            }
            tokio::time::sleep(period).await;
        }
        tracing::debug!("ajax still active after {:?}", timeout);
        Ok(())
    }

    /// [`ajax_idle`](Self::ajax_idle) after a fixed delay.
    pub async fn ajax_idle_after(&self, session: &SessionHandle, delay: Duration, timeout: Duration) -> Result<(), WaitError> {
        tokio::time::sleep(delay).await;
        self.ajax_idle(session, timeout).await
    }

    /// Wait until a request whose URL matches `url` started after `start_millis`.
    pub async fn ajax_request(
        &self,
        session: &SessionHandle,
        url: &str,
        start_millis: i64,
        timeout: Duration,
    ) -> Result<bool, WaitError> {
        self.builder()
            .ajax(url, start_millis)
            .until_on(timeout, AJAX_REQUEST_PERIOD, session.clone())
            .await
    }
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn is_idle(active: &Value) -> bool {
    active.as_u64().unwrap_or(0) == 0
}
