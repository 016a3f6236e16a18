use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ScriptError;
use crate::executor::SessionHandle;

/// Turns a raw script result into a richer value.
///
/// The session the result came from is handed over so the converted value
/// can keep addressing the page (for example a cached element reference).
pub trait TypeConverter: Send + Sync + 'static {
    type Target: Send + 'static;

    fn convert(&self, raw: Value, session: &SessionHandle) -> Result<Self::Target, ScriptError>;
}

trait ErasedConverter: Send + Sync {
    fn convert_any(&self, raw: Value, session: &SessionHandle) -> Result<Box<dyn Any + Send>, ScriptError>;
}

impl<C: TypeConverter> ErasedConverter for C {
    fn convert_any(&self, raw: Value, session: &SessionHandle) -> Result<Box<dyn Any + Send>, ScriptError> {
        Ok(Box::new(self.convert(raw, session)?))
    }
}

/// Target-type keyed converter registry.
/// Lookup is by exact type; a second registration for a type replaces the first.
#[derive(Default)]
pub struct TypeConversionRegistry {
    converters: RwLock<HashMap<TypeId, Arc<dyn ErasedConverter>>>,
}

impl TypeConversionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: TypeConverter>(&self, converter: C) {
        let previous = self
            .converters
            .write()
            .insert(TypeId::of::<C::Target>(), Arc::new(converter));
        if previous.is_some() {
            tracing::debug!(
                "replaced converter for {}",
                std::any::type_name::<C::Target>()
            );
        }
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.converters.read().contains_key(&TypeId::of::<T>())
    }

    pub fn convert<T: 'static>(&self, raw: Value, session: &SessionHandle) -> Option<Result<T, ScriptError>> {
        let converter = self.converters.read().get(&TypeId::of::<T>()).cloned()?;
        Some(converter.convert_any(raw, session).and_then(|boxed| {
            boxed
                .downcast::<T>()
                .map(|value| *value)
                .map_err(|_| ScriptError::Conversion {
                    target: std::any::type_name::<T>(),
                    reason: "converter produced a different type".into(),
                })
        }))
    }

    /// Convert through a registered converter, falling back to plain JSON
    /// deserialization when none is registered for `T`.
    pub fn convert_or_deserialize<T: DeserializeOwned + 'static>(
        &self,
        raw: Value,
        session: &SessionHandle,
    ) -> Result<T, ScriptError> {
        match self.convert::<T>(raw.clone(), session) {
            Some(result) => result,
            None => serde_json::from_value(raw).map_err(|e| ScriptError::Conversion {
                target: std::any::type_name::<T>(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::RecordingSession;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Celsius(f64);

    struct FromKelvin;
    impl TypeConverter for FromKelvin {
        type Target = Celsius;
        fn convert(&self, raw: Value, _session: &SessionHandle) -> Result<Celsius, ScriptError> {
            let kelvin = raw.as_f64().ok_or_else(|| ScriptError::Conversion {
                target: "Celsius",
                reason: "not a number".into(),
            })?;
            Ok(Celsius(kelvin - 273.15))
        }
    }

    struct Frozen;
    impl TypeConverter for Frozen {
        type Target = Celsius;
        fn convert(&self, _raw: Value, _session: &SessionHandle) -> Result<Celsius, ScriptError> {
            Ok(Celsius(0.0))
        }
    }

    struct Shouting;
    impl TypeConverter for Shouting {
        type Target = String;
        fn convert(&self, raw: Value, _session: &SessionHandle) -> Result<String, ScriptError> {
            Ok(raw.as_str().unwrap_or_default().to_uppercase())
        }
    }

    fn session() -> SessionHandle {
        RecordingSession::new()
    }

    #[test]
    fn test_lookup_by_exact_type() {
        let registry = TypeConversionRegistry::new();
        registry.register(FromKelvin);
        assert!(registry.contains::<Celsius>());
        assert!(!registry.contains::<f64>());
        let value = registry.convert::<Celsius>(json!(273.15), &session()).unwrap().unwrap();
        assert_eq!(value, Celsius(0.0));
        assert!(registry.convert::<f64>(json!(1.0), &session()).is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = TypeConversionRegistry::new();
        registry.register(FromKelvin);
        registry.register(Frozen);
        let value = registry.convert::<Celsius>(json!(500.0), &session()).unwrap().unwrap();
        assert_eq!(value, Celsius(0.0));
    }

    #[test]
    fn test_fallback_deserializes() {
        let registry = TypeConversionRegistry::new();
        let numbers: Vec<u32> = registry.convert_or_deserialize(json!([1, 2]), &session()).unwrap();
        assert_eq!(numbers, vec![1, 2]);
        let err = registry.convert_or_deserialize::<u32>(json!("x"), &session()).unwrap_err();
        assert!(matches!(err, ScriptError::Conversion { .. }));
    }

    #[test]
    fn test_registered_converter_beats_deserialization() {
        let registry = TypeConversionRegistry::new();
        registry.register(Shouting);
        let value: String = registry.convert_or_deserialize(json!("quiet"), &session()).unwrap();
        assert_eq!(value, "QUIET");
    }
}
