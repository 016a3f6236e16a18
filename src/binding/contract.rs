use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::call::{self, CallArg, FunctionBinding};
use super::convert::TypeConversionRegistry;
use crate::error::ScriptError;
use crate::executor::SessionHandle;
use crate::script::{ContractId, ScriptSource};

pub type SessionSlot = Arc<RwLock<Option<SessionHandle>>>;

/// Hand-written code serving contract methods that have no script binding.
#[async_trait]
pub trait ManualImplementation: Send + Sync {
    fn name(&self) -> &str;

    fn accepts(&self, method: &str) -> bool;

    async fn invoke(&self, method: &str, args: &[CallArg]) -> anyhow::Result<Value>;
}

/// A typed front for one contract, built from the generic [`Contract`].
pub trait ContractAdapter: Sized {
    const CONTRACT: &'static str;

    fn from_contract(contract: Contract) -> Self;
}

pub struct ContractSpec {
    pub source: Arc<ScriptSource>,
    pub functions: Vec<FunctionBinding>,
    pub manual: Vec<Arc<dyn ManualImplementation>>,
}

struct Inner {
    source: Arc<ScriptSource>,
    functions: HashMap<String, FunctionBinding>,
    manual: Vec<Arc<dyn ManualImplementation>>,
    conversions: Arc<TypeConversionRegistry>,
    session: SessionSlot,
}

/// Method-call surface of one capability contract.
#[derive(Clone)]
pub struct Contract {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Contract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contract")
            .field("name", &self.name())
            .field("functions", &self.inner.functions.len())
            .finish()
    }
}

impl Contract {
    pub fn new(spec: ContractSpec, conversions: Arc<TypeConversionRegistry>, session: SessionSlot) -> Self {
        let functions = spec
            .functions
            .into_iter()
            .map(|f| (f.method().to_string(), f))
            .collect();
        Self {
            inner: Arc::new(Inner {
                source: spec.source,
                functions,
                manual: spec.manual,
                conversions,
                session,
            }),
        }
    }

    pub fn id(&self) -> &ContractId {
        self.inner.source.contract()
    }

    pub fn name(&self) -> &str {
        self.id().as_str()
    }

    pub fn source(&self) -> &Arc<ScriptSource> {
        &self.inner.source
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.inner.functions.contains_key(method)
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn session(&self) -> Option<SessionHandle> {
        self.inner.session.read().clone()
    }

    pub async fn invoke(&self, method: &str, args: &[CallArg]) -> Result<Value, ScriptError> {
        self.dispatch(method, args).await.map(|(raw, _)| raw)
    }

    /// Call a method and convert its result, through a registered converter
    /// when there is one and plain deserialization otherwise.
    pub async fn call<T: DeserializeOwned + 'static>(&self, method: &str, args: &[CallArg]) -> Result<T, ScriptError> {
        let (raw, session) = self.dispatch(method, args).await?;
        match session {
            Some(session) => self.inner.conversions.convert_or_deserialize(raw, &session),
            None => serde_json::from_value(raw).map_err(|e| ScriptError::Conversion {
                target: std::any::type_name::<T>(),
                reason: e.to_string(),
            }),
        }
    }

    /// Call a method whose result type only a registered converter can produce.
    pub async fn call_converted<T: Send + 'static>(&self, method: &str, args: &[CallArg]) -> Result<T, ScriptError> {
        let (raw, session) = self.dispatch(method, args).await?;
        let session = session.ok_or(ScriptError::NoSession)?;
        self.inner
            .conversions
            .convert::<T>(raw, &session)
            .unwrap_or_else(|| {
                Err(ScriptError::Conversion {
                    target: std::any::type_name::<T>(),
                    reason: "no converter registered".into(),
                })
            })
    }

    /// Run an ad-hoc script with this contract's code injected first.
    pub async fn execute_script(&self, script: &str, args: &[Value]) -> Result<Value, ScriptError> {
        let session = self.session().ok_or(ScriptError::NoSession)?;
        call::run(session.as_ref(), &self.inner.source, script, args, false).await
    }

    pub async fn execute_async_script(&self, script: &str, args: &[Value]) -> Result<Value, ScriptError> {
        let session = self.session().ok_or(ScriptError::NoSession)?;
        call::run(session.as_ref(), &self.inner.source, script, args, true).await
    }

    async fn dispatch(&self, method: &str, args: &[CallArg]) -> Result<(Value, Option<SessionHandle>), ScriptError> {
        match self.inner.functions.get(method) {
            Some(binding) => {
                let (raw, session) = call::dispatch(&self.inner.source, binding, args, self.session()).await?;
                Ok((raw, Some(session)))
            }
            None => self.dispatch_manual(method, args).await.map(|raw| (raw, self.session())),
        }
    }

    async fn dispatch_manual(&self, method: &str, args: &[CallArg]) -> Result<Value, ScriptError> {
        let Some(implementation) = self.inner.manual.iter().find(|m| m.accepts(method)) else {
            tracing::debug!("no binding for '{}' on contract '{}', returning null", method, self.name());
            return Ok(Value::Null);
        };
        implementation
            .invoke(method, args)
            .await
            .map_err(|e| ScriptError::Manual {
                implementation: implementation.name().to_string(),
                method: method.to_string(),
                reason: format!("{:#}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::call::values;
    use crate::binding::TypeConverter;
    use crate::config::FunctionDecl;
    use crate::executor::testing::RecordingSession;
    use serde_json::json;

    struct Greeter;

    #[async_trait]
    impl ManualImplementation for Greeter {
        fn name(&self) -> &str {
            "Greeter"
        }

        fn accepts(&self, method: &str) -> bool {
            method == "greet" || method == "fail"
        }

        async fn invoke(&self, method: &str, args: &[CallArg]) -> anyhow::Result<Value> {
            if method == "fail" {
                anyhow::bail!("not today");
            }
            let who = match args.first() {
                Some(CallArg::Value(Value::String(s))) => s.clone(),
                _ => "nobody".to_string(),
            };
            Ok(json!(format!("hello {}", who)))
        }
    }

    #[derive(Debug, PartialEq)]
    struct Tagged(String);

    struct TagConverter;
    impl TypeConverter for TagConverter {
        type Target = Tagged;
        fn convert(&self, raw: Value, _session: &SessionHandle) -> Result<Tagged, ScriptError> {
            Ok(Tagged(raw.to_string()))
        }
    }

    fn contract(session: Option<SessionHandle>) -> Contract {
        let spec = ContractSpec {
            source: Arc::new(ScriptSource::new("Mixed", "function sum(a,b){return a+b;}")),
            functions: vec![
                FunctionBinding::new("sum"),
                FunctionBinding::from(&FunctionDecl::new("title").with_body("return document.title;")),
            ],
            manual: vec![Arc::new(Greeter)],
        };
        let conversions = Arc::new(TypeConversionRegistry::new());
        conversions.register(TagConverter);
        Contract::new(spec, conversions, Arc::new(RwLock::new(session)))
    }

    #[tokio::test]
    async fn test_call_deserializes_result() {
        let session = RecordingSession::new();
        session.reply(json!(5));
        let c = contract(Some(session.clone()));
        let sum: i64 = c.call("sum", &values([json!(2), json!(3)])).await.unwrap();
        assert_eq!(sum, 5);
        assert_eq!(c.methods(), vec!["sum", "title"]);
    }

    #[tokio::test]
    async fn test_call_converted_uses_registry() {
        let session = RecordingSession::new();
        session.reply(json!("Home"));
        let c = contract(Some(session.clone()));
        let tagged: Tagged = c.call_converted("title", &[]).await.unwrap();
        assert_eq!(tagged, Tagged("\"Home\"".into()));
    }

    #[tokio::test]
    async fn test_unbound_method_goes_to_manual_implementation() {
        let session = RecordingSession::new();
        let c = contract(Some(session.clone()));
        let greeting: String = c.call("greet", &values([json!("ann")])).await.unwrap();
        assert_eq!(greeting, "hello ann");
        assert!(session.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unclaimed_method_returns_null() {
        let c = contract(None);
        assert_eq!(c.invoke("nothing", &[]).await.unwrap(), Value::Null);
        let missing: Option<String> = c.call("nothing", &[]).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_manual_failure_is_wrapped() {
        let c = contract(None);
        let err = c.invoke("fail", &[]).await.unwrap_err();
        assert!(matches!(err, ScriptError::Manual { ref implementation, .. } if implementation == "Greeter"));
        assert!(err.to_string().contains("not today"));
    }

    #[tokio::test]
    async fn test_session_set_after_construction_is_seen() {
        let slot: SessionSlot = Arc::new(RwLock::new(None));
        let spec = ContractSpec {
            source: Arc::new(ScriptSource::new("Late", "")),
            functions: vec![FunctionBinding::new("ping")],
            manual: Vec::new(),
        };
        let c = Contract::new(spec, Arc::new(TypeConversionRegistry::new()), slot.clone());
        assert!(matches!(c.invoke("ping", &[]).await.unwrap_err().root(), ScriptError::NoSession));

        let session = RecordingSession::new();
        session.reply(json!("pong"));
        *slot.write() = Some(session.clone());
        assert_eq!(c.invoke("ping", &[]).await.unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn test_execute_script_injects_contract_code() {
        let session = RecordingSession::new();
        session.reply(json!(3));
        let c = contract(Some(session.clone()));
        c.execute_script("return sum(1,2);", &[]).await.unwrap();
        assert_eq!(
            session.last().unwrap().script,
            "function sum(a,b){return a+b;}\nreturn sum(1,2);"
        );

        session.reply(json!("@JS-ERROR: nope"));
        assert!(matches!(
            c.execute_async_script("x", &[]).await,
            Err(ScriptError::Injected(_))
        ));
        assert!(session.last().unwrap().is_async);
    }
}
