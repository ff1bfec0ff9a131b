//! Shared data models: source spans, data types, operator codes.

mod ops;
mod span;
mod types;

pub use ops::OpCode;
pub use span::{Location, Span};
pub use types::{BaseType, DataTypeInfo};
