use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use super::source::{ContractId, ScriptSource};
use crate::error::ScriptError;
use crate::executor::ScriptExecutor;

enum Frame {
    Enter(Arc<ScriptSource>),
    Emit(Arc<ScriptSource>),
}

/// Decides, per call, which contract scripts must be sent ahead of the call.
///
/// Nothing is cached between calls: a navigation can drop earlier injections
/// at any time, so detection probes are asked again on every plan.
pub struct InjectionPlanner<'a> {
    session: &'a dyn ScriptExecutor,
}

impl<'a> InjectionPlanner<'a> {
    pub fn new(session: &'a dyn ScriptExecutor) -> Self {
        Self { session }
    }

    /// Append every fragment reachable from `root` that the page is missing.
    ///
    /// Walks pre-order: dependencies in declaration order, then the node
    /// itself (when [`must_inject`](Self::must_inject) says so) followed by a
    /// newline, then its plugins. Nodes already in `visited` are skipped, so
    /// shared dependencies are emitted once per visited set.
    pub async fn plan_and_append(
        &self,
        buffer: &mut String,
        root: Option<&Arc<ScriptSource>>,
        visited: &mut HashSet<ContractId>,
    ) -> Result<(), ScriptError> {
        let Some(root) = root else {
            return Ok(());
        };
        let mut stack = vec![Frame::Enter(root.clone())];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(node) => {
                    if !visited.insert(node.contract().clone()) {
                        continue;
                    }
                    for plugin in node.plugins().iter().rev() {
                        stack.push(Frame::Enter(plugin.clone()));
                    }
                    stack.push(Frame::Emit(node.clone()));
                    for dependency in node.dependencies().iter().rev() {
                        stack.push(Frame::Enter(dependency.clone()));
                    }
                }
                Frame::Emit(node) => {
                    if self.must_inject(&node).await? {
                        buffer.push_str(node.source());
                        buffer.push('\n');
                    }
                }
            }
        }
        Ok(())
    }

    /// `true` unless the node's detection probe reports its code as present.
    pub async fn must_inject(&self, source: &ScriptSource) -> Result<bool, ScriptError> {
        let Some(probe) = source.probe() else {
            return Ok(true);
        };
        if probe.script.is_empty() {
            return Ok(true);
        }
        let detection_error = |source_err: ScriptError| ScriptError::Detection {
            contract: source.contract().to_string(),
            source: Box::new(source_err),
        };
        let value = self
            .session
            .execute_script(&probe.statement(), &[])
            .await
            .map_err(detection_error)?;
        match value {
            Value::Bool(present) => Ok(!present),
            other => Err(detection_error(ScriptError::Execution(format!(
                "detection script returned {} instead of a boolean",
                other
            )))),
        }
    }

    pub async fn prepare(&self, root: Option<&Arc<ScriptSource>>, call: &str) -> Result<String, ScriptError> {
        let mut buffer = String::new();
        let mut visited = HashSet::new();
        self.plan_and_append(&mut buffer, root, &mut visited).await?;
        buffer.push_str(call);
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::RecordingSession;
    use crate::script::DetectionProbe;
    use serde_json::json;

    fn node(name: &str, deps: &[&Arc<ScriptSource>], plugins: &[&Arc<ScriptSource>]) -> Arc<ScriptSource> {
        node_with(ScriptSource::new(name, format!("{};", name)), deps, plugins)
    }

    fn node_with(
        mut source: ScriptSource,
        deps: &[&Arc<ScriptSource>],
        plugins: &[&Arc<ScriptSource>],
    ) -> Arc<ScriptSource> {
        for dep in deps {
            source.add_dependency((*dep).clone());
        }
        for plugin in plugins {
            source.add_plugin((*plugin).clone());
        }
        Arc::new(source)
    }

    #[tokio::test]
    async fn test_dependency_with_absent_capability_comes_first() {
        let session = RecordingSession::new();
        session.when("window.B", json!(false));
        let b = Arc::new(ScriptSource::new("B", "B;").with_probe(DetectionProbe::new("window.B")));
        let a = node("A", &[&b], &[]);

        let planner = InjectionPlanner::new(session.as_ref());
        let mut buffer = String::new();
        planner
            .plan_and_append(&mut buffer, Some(&a), &mut HashSet::new())
            .await
            .unwrap();
        assert_eq!(buffer, "B;\nA;\n");
        assert_eq!(session.scripts(), vec!["return window.B;"]);
    }

    #[tokio::test]
    async fn test_diamond_emits_shared_node_once() {
        let session = RecordingSession::new();
        let d = node("D", &[], &[]);
        let b = node("B", &[&d], &[]);
        let c = node("C", &[&d], &[]);
        let a = node("A", &[&b, &c], &[]);

        let planner = InjectionPlanner::new(session.as_ref());
        let mut buffer = String::new();
        let mut visited = HashSet::new();
        planner.plan_and_append(&mut buffer, Some(&a), &mut visited).await.unwrap();
        assert_eq!(buffer, "D;\nB;\nC;\nA;\n");

        // planning again with the same visited set adds nothing
        planner.plan_and_append(&mut buffer, Some(&a), &mut visited).await.unwrap();
        planner.plan_and_append(&mut buffer, Some(&c), &mut visited).await.unwrap();
        assert_eq!(buffer, "D;\nB;\nC;\nA;\n");
        assert_eq!(visited.len(), 4);
    }

    #[tokio::test]
    async fn test_plugins_follow_their_host() {
        let session = RecordingSession::new();
        let base = node("Base", &[], &[]);
        let extra = node("Extra", &[&base], &[]);
        let p1 = node("P1", &[], &[]);
        let p2 = node("P2", &[], &[]);
        let host = node("Host", &[&base], &[&p1, &p2]);
        let root = node("Root", &[&host], &[&extra]);

        let planner = InjectionPlanner::new(session.as_ref());
        let payload = planner.prepare(Some(&root), "CALL").await.unwrap();
        assert_eq!(payload, "Base;\nHost;\nP1;\nP2;\nRoot;\nExtra;\nCALL");
    }

    #[tokio::test]
    async fn test_present_capability_is_skipped_but_plugins_still_planned() {
        let session = RecordingSession::new();
        session.when("window.host", json!(true));
        let plugin = node("Plugin", &[], &[]);
        let host = node_with(
            ScriptSource::new("Host", "Host;").with_probe(DetectionProbe::new("window.host")),
            &[],
            &[&plugin],
        );

        let planner = InjectionPlanner::new(session.as_ref());
        assert_eq!(planner.prepare(Some(&host), "").await.unwrap(), "Plugin;\n");
    }

    #[tokio::test]
    async fn test_probe_asked_once_per_node() {
        let session = RecordingSession::new();
        session.when("window.D", json!(false));
        let d = Arc::new(ScriptSource::new("D", "D;").with_probe(DetectionProbe::new("window.D")));
        let b = node("B", &[&d], &[]);
        let c = node("C", &[&d], &[]);
        let a = node("A", &[&b, &c], &[]);

        let planner = InjectionPlanner::new(session.as_ref());
        planner.prepare(Some(&a), "").await.unwrap();
        assert_eq!(session.scripts().len(), 1);
    }

    #[tokio::test]
    async fn test_none_root_is_a_no_op() {
        let session = RecordingSession::new();
        let planner = InjectionPlanner::new(session.as_ref());
        let mut buffer = String::from("x");
        planner.plan_and_append(&mut buffer, None, &mut HashSet::new()).await.unwrap();
        assert_eq!(buffer, "x");
    }

    #[tokio::test]
    async fn test_must_inject_decisions() {
        let session = RecordingSession::new();
        let planner = InjectionPlanner::new(session.as_ref());

        assert!(planner.must_inject(&ScriptSource::new("NoProbe", "")).await.unwrap());
        let empty = ScriptSource::new("Empty", "").with_probe(DetectionProbe::new(""));
        assert!(planner.must_inject(&empty).await.unwrap());
        assert!(session.scripts().is_empty());

        let verbatim = ScriptSource::new("Verbatim", "")
            .with_probe(DetectionProbe::new("return window.ready === true;").without_auto_return());
        session.reply(json!(true));
        assert!(!planner.must_inject(&verbatim).await.unwrap());
        assert_eq!(session.last().unwrap().script, "return window.ready === true;");
    }

    #[tokio::test]
    async fn test_probe_failure_is_detection_error() {
        let session = RecordingSession::new();
        session.fail("ReferenceError: jQuery is not defined");
        let source = ScriptSource::new("JQuery", "").with_probe(DetectionProbe::new("jQuery.fn"));
        let planner = InjectionPlanner::new(session.as_ref());
        let err = planner.must_inject(&source).await.unwrap_err();
        assert!(matches!(err, ScriptError::Detection { ref contract, .. } if contract == "JQuery"));
        assert!(err.to_string().contains("jQuery is not defined"));
    }

    #[tokio::test]
    async fn test_non_boolean_probe_result_is_error() {
        let session = RecordingSession::new();
        session.reply(json!("yes"));
        let source = ScriptSource::new("Odd", "").with_probe(DetectionProbe::new("'yes'"));
        let planner = InjectionPlanner::new(session.as_ref());
        assert!(matches!(
            planner.must_inject(&source).await,
            Err(ScriptError::Detection { .. })
        ));
    }
}
