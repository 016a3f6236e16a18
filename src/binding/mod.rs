//! Binding of contract methods to remote script calls.

pub mod call;
pub mod contract;
pub mod convert;

pub use call::{
    values, CallArg, DefaultGlobalReferenceHolder, FunctionBinding, GlobalReferenceHolder, ParamKind, ERROR_SENTINEL,
};
pub use contract::{Contract, ContractAdapter, ContractSpec, ManualImplementation, SessionSlot};
pub use convert::{TypeConversionRegistry, TypeConverter};
