//! Waits wrapped around a single action: the action runs, then the guard
//! blocks until the page has settled.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use super::is_falsy;
use super::marker::PageMarkerHandler;
use super::util::{now_millis, WaitUtil};
use crate::context::ScriptContext;
use crate::error::{ScriptError, WaitError};
use crate::executor::SessionHandle;

const DEFAULT_XHR_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether an action's result switches off the wait that follows it:
/// `null`, `false`, the empty string and zero do.
pub fn skip_wait_for(result: &Value) -> bool {
    is_falsy(result)
}

/// Runs an action, then waits for the ajax traffic it caused.
///
/// With a URL the guard waits for a request to that URL started after the
/// action began; without one it waits until jQuery reports no active requests.
pub struct XhrGuard<'a> {
    util: WaitUtil<'a>,
    url: Option<String>,
    timeout: Duration,
    disabled_by_return: bool,
}

impl<'a> XhrGuard<'a> {
    pub fn new(context: &'a ScriptContext) -> Self {
        Self {
            util: WaitUtil::new(context),
            url: None,
            timeout: DEFAULT_XHR_TIMEOUT,
            disabled_by_return: false,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into()).filter(|u: &String| !u.is_empty());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn disabled_by_return(mut self, disabled: bool) -> Self {
        self.disabled_by_return = disabled;
        self
    }

    pub async fn around<F, Fut>(&self, session: &SessionHandle, action: F) -> Result<Value, WaitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ScriptError>>,
    {
        let start = now_millis();
        let result = action().await?;

        if self.disabled_by_return && skip_wait_for(&result) {
            tracing::debug!("xhr wait skipped by return value {}", result);
            return Ok(result);
        }
        match &self.url {
            Some(url) => {
                if !self.util.ajax_request(session, url, start, self.timeout).await? {
                    tracing::warn!("no request to '{}' within {:?}", url, self.timeout);
                }
            }
            None => self.util.ajax_idle(session, self.timeout).await?,
        }
        Ok(result)
    }
}

/// Runs an action that replaces the page, then waits for the new page to
/// announce itself. See [`PageMarkerHandler`].
pub struct PageMarkerGuard<'a> {
    handler: PageMarkerHandler<'a>,
    marker: Option<String>,
    disabled_by_return: bool,
}

impl<'a> PageMarkerGuard<'a> {
    pub fn new(context: &'a ScriptContext) -> Self {
        Self {
            handler: PageMarkerHandler::new(context),
            marker: None,
            disabled_by_return: false,
        }
    }

    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.handler = self.handler.with_timeout(timeout);
        self
    }

    pub fn disabled_by_return(mut self, disabled: bool) -> Self {
        self.disabled_by_return = disabled;
        self
    }

    /// Set the marker, run `action`, then wait for the ready variable.
    ///
    /// Returns the action's result whether or not the page became ready in
    /// time; a timeout is logged.
    pub async fn around<F, Fut>(&self, session: &SessionHandle, action: F) -> Result<Value, WaitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ScriptError>>,
    {
        self.handler.set_marker(session).await?;
        let result = action().await?;

        if self.disabled_by_return && skip_wait_for(&result) {
            tracing::debug!("page marker wait skipped by return value {}", result);
            return Ok(result);
        }
        self.handler
            .wait_for_marker(session, self.marker.as_deref(), self.handler.timeout())
            .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Manifest;
    use crate::executor::testing::RecordingSession;
    use crate::script::ResourceSet;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> ScriptContext {
        let mut manifest = Manifest::default();
        manifest.settings.poll_period_ms = 5;
        manifest.settings.ajax_poll_ms = 5;
        ScriptContext::with_resources(manifest, ResourceSet::builtin()).unwrap()
    }

    #[test]
    fn test_skip_wait_for() {
        for skip in [Value::Null, json!(false), json!(""), json!(0), json!(0.0)] {
            assert!(skip_wait_for(&skip), "{skip}");
        }
        for keep in [json!(true), json!("x"), json!(3), json!([]), json!({})] {
            assert!(!skip_wait_for(&keep), "{keep}");
        }
    }

    #[tokio::test]
    async fn test_xhr_guard_waits_for_idle_after_action() {
        let ctx = context();
        let recording = RecordingSession::new();
        recording.reply(json!(1));
        recording.reply(json!(0));
        let session: SessionHandle = recording.clone();

        let action_session = session.clone();
        let result = XhrGuard::new(&ctx)
            .around(&session, || async move { action_session.execute_script("return 'clicked';", &[]).await })
            .await
            .unwrap();

        assert_eq!(result, json!(1));
        let scripts = recording.scripts();
        assert_eq!(scripts[0], "return 'clicked';");
        assert!(scripts[1..].iter().all(|s| s.contains("jQuery.active")));
        assert_eq!(scripts.len(), 2);
    }

    #[tokio::test]
    async fn test_xhr_guard_skipped_by_falsy_return() {
        let ctx = context();
        let recording = RecordingSession::new();
        let session: SessionHandle = recording.clone();

        let result = XhrGuard::new(&ctx)
            .disabled_by_return(true)
            .around(&session, || async { Ok(json!(false)) })
            .await
            .unwrap();
        assert_eq!(result, json!(false));
        assert!(recording.scripts().is_empty());
    }

    #[tokio::test]
    async fn test_xhr_guard_with_url_tracks_request() {
        let ctx = context();
        let recording = RecordingSession::new();
        recording.when("!== undefined", json!(true));
        recording.when("hasRequestFor", json!(true));
        let session: SessionHandle = recording.clone();

        XhrGuard::new(&ctx)
            .url("/api/save")
            .around(&session, || async { Ok(json!("done")) })
            .await
            .unwrap();
        let call = recording.last().unwrap();
        assert!(call.script.contains("hasRequestFor"));
        assert_eq!(call.args[0], json!("/api/save"));
    }

    #[tokio::test]
    async fn test_action_error_propagates() {
        let ctx = context();
        let session: SessionHandle = RecordingSession::new();
        let err = XhrGuard::new(&ctx)
            .around(&session, || async { Err(ScriptError::Execution("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Script(ScriptError::Execution(_))));
    }

    #[tokio::test]
    async fn test_page_marker_guard_sets_before_and_waits_after() {
        let ctx = context();
        let recording = RecordingSession::new();
        recording.when("!== undefined", json!(true));
        recording.when("window.remix.set", Value::Null);
        recording.when("clicked", json!(true));
        // marker already gone, ready flag set
        recording.reply(Value::Null);
        recording.reply(json!(true));
        let session: SessionHandle = recording.clone();

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = order.clone();
        let action_session = session.clone();
        let result = PageMarkerGuard::new(&ctx)
            .marker("loaded")
            .around(&session, || async move {
                seen.lock().push("action");
                action_session.execute_script("return 'clicked';", &[]).await
            })
            .await
            .unwrap();

        assert_eq!(result, json!(true));
        assert_eq!(*order.lock(), vec!["action"]);
        let scripts = recording.scripts();
        let set_at = scripts.iter().position(|s| s.contains("window.remix.set")).unwrap();
        let action_at = scripts.iter().position(|s| s == "return 'clicked';").unwrap();
        let ready_read = recording
            .requests
            .lock()
            .iter()
            .rposition(|r| r.script.contains("window.remix.get") && r.args == vec![json!("loaded")])
            .unwrap();
        assert!(set_at < action_at && action_at < ready_read);
    }
}
