use std::time::Duration;

use serde_json::json;

use super::util::now_millis;
use super::Is;
use crate::config::DEFAULT_PAGE_MARKER;
use crate::context::ScriptContext;
use crate::contracts::RemixUtils;
use crate::error::WaitError;
use crate::executor::SessionHandle;

/// Window variable stamped before an action that reloads the page.
pub const PAGE_MARKER_VARIABLE: &str = "remixPageMarker";

/// Detects that a page has been replaced and the new one announced itself.
///
/// [`set_marker`](Self::set_marker) stamps the current page. After the
/// action, [`wait_until_marker_present`](Self::wait_until_marker_present)
/// polls for the ready variable the new page sets once it finished loading.
pub struct PageMarkerHandler<'a> {
    context: &'a ScriptContext,
    name: Option<String>,
    timeout: Duration,
    period: Duration,
}

impl<'a> PageMarkerHandler<'a> {
    pub fn new(context: &'a ScriptContext) -> Self {
        let settings = context.settings();
        Self {
            context,
            name: None,
            timeout: Duration::from_millis(settings.marker_timeout_ms),
            period: Duration::from_millis(settings.poll_period_ms),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The ready variable: an explicit name, else the configured marker,
    /// else `pageIsReady`.
    pub fn marker_name<'n>(&'n self, explicit: Option<&'n str>) -> &'n str {
        explicit
            .filter(|n| !n.is_empty())
            .or(self.name.as_deref().filter(|n| !n.is_empty()))
            .or(Some(self.context.settings().page_marker.as_str()).filter(|n| !n.is_empty()))
            .unwrap_or(DEFAULT_PAGE_MARKER)
    }

    pub async fn set_marker(&self, session: &SessionHandle) -> Result<(), WaitError> {
        let utils: RemixUtils = self.context.adapter()?;
        utils
            .on(session.clone())
            .set(PAGE_MARKER_VARIABLE, json!(now_millis()))
            .await?;
        tracing::debug!("page marker set");
        Ok(())
    }

    pub async fn wait_until_marker_present(&self, session: &SessionHandle) -> Result<bool, WaitError> {
        self.wait_for_marker(session, None, self.timeout).await
    }

    /// Check the stamp once, then wait up to `timeout` for `marker` to appear.
    ///
    /// The stamp check is negated and so never blocks: an action that keeps
    /// the page (an ajax re-render) goes straight to the ready wait.
    pub async fn wait_for_marker(
        &self,
        session: &SessionHandle,
        marker: Option<&str>,
        timeout: Duration,
    ) -> Result<bool, WaitError> {
        let name = self.marker_name(marker);
        let ready = self
            .context
            .wait()
            .variable(PAGE_MARKER_VARIABLE)
            .is(Is::present())
            .not()
            .variable(name)
            .is(Is::present())
            .until_on(timeout, self.period, session.clone())
            .await?;
        if !ready {
            tracing::warn!("'{}' not set after {:?}", name, timeout);
        }
        Ok(ready)
    }
}
