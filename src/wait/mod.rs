//! Polling readiness checks.
//!
//! A [`WaitBuilder`] chains [`WaitCommand`]s, each pairing a target that is
//! re-read on every check with a boolean condition over it, and polls the
//! conjunction until it holds or the timeout elapses.

pub mod commands;
pub mod guard;
pub mod marker;
pub mod util;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::contracts::{RemixUtils, XhrTracking};
use crate::error::{ScriptError, WaitError};
use crate::executor::SessionHandle;

pub use commands::{AjaxSource, ElementSource, SessionSource, ValueSource, VariableSource};
pub use guard::{skip_wait_for, PageMarkerGuard, XhrGuard};
pub use marker::{PageMarkerHandler, PAGE_MARKER_VARIABLE};
pub use util::{now_millis, WaitUtil};

pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type Supplier = Arc<dyn Fn() -> bool + Send + Sync>;
pub type Function = Arc<dyn Fn(Value, SessionHandle) -> BoxFuture<'static, Result<bool, WaitError>> + Send + Sync>;

/// Produces the value a command's condition is evaluated against.
#[async_trait]
pub trait ConditionSource: Send + Sync {
    async fn target(&self, session: &SessionHandle) -> Result<Value, WaitError>;

    /// Sources whose target already is the boolean outcome need no condition.
    fn decides_alone(&self) -> bool {
        false
    }

    fn describe(&self) -> String;
}

/// The condition of one command. Evaluated in the order function, predicate,
/// supplier; the first one set wins.
#[derive(Clone, Default)]
pub struct Condition {
    function: Option<Function>,
    predicate: Option<Predicate>,
    supplier: Option<Supplier>,
}

impl Condition {
    pub fn is_configured(&self) -> bool {
        self.function.is_some() || self.predicate.is_some() || self.supplier.is_some()
    }

    async fn evaluate(&self, target: Value, session: &SessionHandle) -> Result<bool, WaitError> {
        if let Some(function) = &self.function {
            return function(target, session.clone()).await;
        }
        if let Some(predicate) = &self.predicate {
            return Ok(predicate(&target));
        }
        if let Some(supplier) = &self.supplier {
            return Ok(supplier());
        }
        Err(WaitError::IllegalCondition)
    }
}

/// One readiness check of a chain.
pub struct WaitCommand {
    source: Box<dyn ConditionSource>,
    condition: Condition,
    not: bool,
    missing_is_null: bool,
    message: Option<String>,
}

impl WaitCommand {
    pub fn new(source: impl ConditionSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            condition: Condition::default(),
            not: false,
            missing_is_null: false,
            message: None,
        }
    }

    /// The condition outcome, OR'd with the command's `not` flag.
    pub async fn evaluate(&self, session: &SessionHandle) -> Result<bool, WaitError> {
        match self.check(session).await {
            Ok(result) => Ok(result || self.not),
            Err(e) => {
                if let Some(message) = &self.message {
                    tracing::warn!("{} ({}): {}", message, self.source.describe(), e);
                }
                Err(e)
            }
        }
    }

    async fn check(&self, session: &SessionHandle) -> Result<bool, WaitError> {
        if !self.condition.is_configured() && !self.source.decides_alone() {
            return Err(WaitError::IllegalCondition);
        }
        let target = match self.source.target(session).await {
            Err(WaitError::NotFound(_)) if self.missing_is_null => Value::Null,
            other => other?,
        };
        if self.condition.is_configured() {
            self.condition.evaluate(target, session).await
        } else {
            Ok(target.as_bool().unwrap_or(false))
        }
    }
}

/// Recorded combinator between two commands. Evaluation always ANDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
}

/// Fluent builder for a chain of wait commands.
#[derive(Default)]
pub struct WaitBuilder {
    commands: Vec<WaitCommand>,
    operators: Vec<Operator>,
    session: Option<SessionHandle>,
    utils: Option<RemixUtils>,
    xhr: Option<XhrTracking>,
    dangling_condition: bool,
}

impl WaitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_contracts(mut self, utils: RemixUtils, xhr: XhrTracking) -> Self {
        self.utils = Some(utils);
        self.xhr = Some(xhr);
        self
    }

    pub fn command(mut self, command: WaitCommand) -> Self {
        self.commands.push(command);
        self
    }

    pub fn custom(self, source: impl ConditionSource + 'static) -> Self {
        self.command(WaitCommand::new(source))
    }

    /// The first element matching a CSS selector, re-found on every check.
    pub fn element(self, selector: &str) -> Self {
        self.custom(ElementSource::new(selector))
    }

    /// Like [`element`](Self::element), searching below the first match of `root`.
    pub fn element_in(self, root: &str, selector: &str) -> Self {
        self.custom(ElementSource::new(selector).within(root))
    }

    pub fn value(self, value: Value) -> Self {
        self.custom(ValueSource(value))
    }

    pub fn session(self) -> Self {
        self.custom(SessionSource)
    }

    pub fn variable(self, name: &str) -> Self {
        let utils = self.utils.clone();
        self.custom(VariableSource::new(utils, name))
    }

    /// Holds once a request matching `url` started after `start_millis`.
    pub fn ajax(self, url: &str, start_millis: i64) -> Self {
        let xhr = self.xhr.clone();
        self.custom(AjaxSource::new(xhr, url, start_millis))
    }

    pub fn is(self, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.with_condition(|c| c.predicate = Some(Arc::new(predicate)))
    }

    pub fn supplied(self, supplier: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.with_condition(|c| c.supplier = Some(Arc::new(supplier)))
    }

    pub fn matches<F, Fut>(self, function: F) -> Self
    where
        F: Fn(Value, SessionHandle) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<bool, WaitError>> + Send + 'static,
    {
        let function: Function = Arc::new(
            move |target: Value, session: SessionHandle| -> BoxFuture<'static, Result<bool, WaitError>> {
                Box::pin(function(target, session))
            },
        );
        self.with_condition(|c| c.function = Some(function))
    }

    /// Holds when `extractor` applied to the target equals `expected`.
    pub fn has(self, extractor: impl Fn(&Value) -> Value + Send + Sync + 'static, expected: Value) -> Self {
        self.is(move |target| extractor(target) == expected)
    }

    /// Holds once the target is gone. Unlike `is(Is::absent())`, an element
    /// that cannot be found counts as gone instead of being retried.
    pub fn gone(mut self) -> Self {
        match self.commands.last_mut() {
            Some(command) => command.missing_is_null = true,
            None => self.dangling_condition = true,
        }
        self.is(Is::absent())
    }

    /// Marks the current command as negated, which makes it always hold.
    pub fn not(mut self) -> Self {
        match self.commands.last_mut() {
            Some(command) => command.not = true,
            None => self.dangling_condition = true,
        }
        self
    }

    /// Diagnostic logged when the current command fails.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        match self.commands.last_mut() {
            Some(command) => command.message = Some(message.into()),
            None => self.dangling_condition = true,
        }
        self
    }

    pub fn and(mut self) -> Self {
        self.operators.push(Operator::And);
        self
    }

    pub fn or(mut self) -> Self {
        self.operators.push(Operator::Or);
        self
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    fn with_condition(mut self, set: impl FnOnce(&mut Condition)) -> Self {
        match self.commands.last_mut() {
            Some(command) => set(&mut command.condition),
            None => self.dangling_condition = true,
        }
        self
    }

    pub async fn until(self, timeout: Duration, period: Duration) -> Result<bool, WaitError> {
        let session = self.session.clone().ok_or(ScriptError::NoSession)?;
        self.until_on(timeout, period, session).await
    }

    /// Evaluate the chain every `period` until it holds (`true`) or `timeout`
    /// elapses (`false`).
    ///
    /// A [`WaitError::NotFound`] counts as a failed check. Any other error
    /// ends the wait immediately.
    pub async fn until_on(self, timeout: Duration, period: Duration, session: SessionHandle) -> Result<bool, WaitError> {
        if self.dangling_condition {
            return Err(WaitError::IllegalCondition);
        }
        let start = Instant::now();
        loop {
            match self.evaluate(&session).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(WaitError::NotFound(what)) => tracing::trace!("not found yet: {}", what),
                Err(e) => return Err(e),
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(period.min(timeout - elapsed)).await;
        }
    }

    /// One pass over the chain: the AND of every command, stopping at the first false.
    pub async fn evaluate(&self, session: &SessionHandle) -> Result<bool, WaitError> {
        for command in &self.commands {
            if !command.evaluate(session).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Predicates over element snapshots and plain values.
pub struct Is;

impl Is {
    pub fn present() -> impl Fn(&Value) -> bool + Send + Sync + 'static {
        |target: &Value| !target.is_null()
    }

    /// The target is null. Element sources report a missing element as
    /// not found rather than null; use [`WaitBuilder::gone`] for those.
    pub fn absent() -> impl Fn(&Value) -> bool + Send + Sync + 'static {
        |target: &Value| target.is_null()
    }

    pub fn displayed() -> impl Fn(&Value) -> bool + Send + Sync + 'static {
        |target: &Value| flag(target, "displayed")
    }

    pub fn enabled() -> impl Fn(&Value) -> bool + Send + Sync + 'static {
        |target: &Value| flag(target, "enabled")
    }

    pub fn disabled() -> impl Fn(&Value) -> bool + Send + Sync + 'static {
        |target: &Value| !target.is_null() && !flag(target, "enabled")
    }

    pub fn selected() -> impl Fn(&Value) -> bool + Send + Sync + 'static {
        |target: &Value| flag(target, "selected")
    }

    /// Script truthiness: not null, false, 0 or the empty string.
    pub fn truthy() -> impl Fn(&Value) -> bool + Send + Sync + 'static {
        |target: &Value| !is_falsy(target)
    }

    pub fn equal_to(expected: Value) -> impl Fn(&Value) -> bool + Send + Sync + 'static {
        move |target: &Value| *target == expected
    }
}

fn flag(target: &Value, name: &str) -> bool {
    target.get(name).and_then(Value::as_bool).unwrap_or(false)
}

/// `null`, `false`, `""` and numeric zero.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::RecordingSession;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
        succeed_on: usize,
    }

    #[async_trait]
    impl ConditionSource for Counting {
        async fn target(&self, _session: &SessionHandle) -> Result<Value, WaitError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!(n >= self.succeed_on))
        }

        fn describe(&self) -> String {
            "counting".into()
        }
    }

    struct Missing(Arc<AtomicUsize>);

    #[async_trait]
    impl ConditionSource for Missing {
        async fn target(&self, _session: &SessionHandle) -> Result<Value, WaitError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(WaitError::NotFound("#late".into()))
            } else {
                Ok(json!({ "displayed": true }))
            }
        }

        fn describe(&self) -> String {
            "missing".into()
        }
    }

    fn session() -> SessionHandle {
        RecordingSession::new()
    }

    #[tokio::test]
    async fn test_true_on_nth_check() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = WaitBuilder::new()
            .custom(Counting { calls: calls.clone(), succeed_on: 4 })
            .is(Is::truthy())
            .until_on(Duration::from_secs(5), Duration::from_millis(5), session())
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_never_true_times_out_with_false() {
        let timeout = Duration::from_millis(120);
        let start = Instant::now();
        let ok = WaitBuilder::new()
            .value(json!(false))
            .is(Is::truthy())
            .until_on(timeout, Duration::from_millis(50), session())
            .await
            .unwrap();
        assert!(!ok);
        let elapsed = start.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_missing_condition_is_illegal() {
        let err = WaitBuilder::new()
            .value(json!(1))
            .until_on(Duration::from_millis(50), Duration::from_millis(10), session())
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::IllegalCondition));

        let err = WaitBuilder::new()
            .is(Is::present())
            .until_on(Duration::from_millis(50), Duration::from_millis(10), session())
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::IllegalCondition));
    }

    #[tokio::test]
    async fn test_message_before_any_command_is_illegal() {
        let err = WaitBuilder::new()
            .message("nothing to describe")
            .value(json!(true))
            .is(Is::truthy())
            .until_on(Duration::from_millis(50), Duration::from_millis(10), session())
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::IllegalCondition));
    }

    #[tokio::test]
    async fn test_missing_element_is_gone() {
        // the recording session answers every lookup with null
        let ok = WaitBuilder::new()
            .element("#spinner")
            .gone()
            .until_on(Duration::from_secs(2), Duration::from_millis(5), session())
            .await
            .unwrap();
        assert!(ok);

        let ok = WaitBuilder::new()
            .element("#spinner")
            .is(Is::absent())
            .until_on(Duration::from_millis(30), Duration::from_millis(5), session())
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_gone_waits_while_element_is_there() {
        let recording = RecordingSession::new();
        recording.reply(json!({ "displayed": true }));
        recording.reply(json!({ "displayed": true }));
        let ok = WaitBuilder::new()
            .element("#spinner")
            .gone()
            .until_on(Duration::from_secs(2), Duration::from_millis(5), recording.clone())
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(recording.scripts().len(), 3);
    }

    #[test]
    fn test_gone_before_any_command_is_illegal() {
        let err = tokio_test::block_on(
            WaitBuilder::new()
                .gone()
                .until_on(Duration::from_millis(10), Duration::from_millis(5), session()),
        )
        .unwrap_err();
        assert!(matches!(err, WaitError::IllegalCondition));
    }

    #[tokio::test]
    async fn test_not_makes_command_hold() {
        let ok = WaitBuilder::new()
            .value(json!(false))
            .is(Is::truthy())
            .not()
            .until_on(Duration::from_millis(50), Duration::from_millis(10), session())
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_chain_is_a_conjunction_even_with_or() {
        let builder = WaitBuilder::new()
            .value(json!(1))
            .is(Is::truthy())
            .or()
            .value(json!(0))
            .is(Is::truthy());
        assert_eq!(builder.operators(), &[Operator::Or]);
        assert!(!builder.evaluate(&session()).await.unwrap());
    }

    #[tokio::test]
    async fn test_conjunction_stops_at_first_false() {
        let calls = Arc::new(AtomicUsize::new(0));
        let builder = WaitBuilder::new()
            .value(json!(false))
            .is(Is::truthy())
            .custom(Counting { calls: calls.clone(), succeed_on: 1 })
            .is(Is::truthy());
        assert!(!builder.evaluate(&session()).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = WaitBuilder::new()
            .custom(Missing(calls.clone()))
            .is(Is::displayed())
            .until_on(Duration::from_secs(2), Duration::from_millis(5), session())
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_end_the_wait() {
        let err = WaitBuilder::new()
            .value(json!(1))
            .matches(|_, _| async { Err(WaitError::Script(ScriptError::Execution("gone".into()))) })
            .message("page crashed")
            .until_on(Duration::from_secs(2), Duration::from_millis(5), session())
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Script(_)));
    }

    #[tokio::test]
    async fn test_function_wins_over_predicate() {
        let ok = WaitBuilder::new()
            .value(json!(0))
            .is(|_| false)
            .matches(|target, _| async move { Ok(target == json!(0)) })
            .evaluate(&session())
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_supplier_and_has() {
        let builder = WaitBuilder::new()
            .value(json!({ "text": "Done" }))
            .has(|t| t["text"].clone(), json!("Done"))
            .session()
            .supplied(|| true);
        assert!(builder.evaluate(&session()).await.unwrap());
    }

    #[tokio::test]
    async fn test_until_requires_session() {
        let err = WaitBuilder::new()
            .value(json!(true))
            .is(Is::truthy())
            .until(Duration::from_millis(10), Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Script(ScriptError::NoSession)));
    }

    #[test]
    fn test_single_pass_without_runtime_macro() {
        let builder = WaitBuilder::new()
            .value(json!(0))
            .is(Is::truthy())
            .not()
            .value(json!("ok"))
            .is(Is::equal_to(json!("ok")));
        assert!(tokio_test::block_on(builder.evaluate(&session())).unwrap());
    }

    #[test]
    fn test_is_helpers() {
        let snapshot = json!({ "displayed": true, "enabled": false, "selected": true });
        assert!(Is::present()(&snapshot));
        assert!(Is::displayed()(&snapshot));
        assert!(!Is::enabled()(&snapshot));
        assert!(Is::disabled()(&snapshot));
        assert!(Is::selected()(&snapshot));
        assert!(!Is::disabled()(&Value::Null));
        assert!(Is::absent()(&Value::Null));
        for falsy in [json!(null), json!(false), json!(""), json!(0), json!(0.0)] {
            assert!(!Is::truthy()(&falsy), "{falsy} should be falsy");
        }
        assert!(Is::truthy()(&json!("x")));
        assert!(Is::equal_to(json!(3))(&json!(3)));
    }
}
