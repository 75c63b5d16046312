//! # Value Type System
//!
//! Canonical data types and owned values shared by the storage model and the
//! query engine. `DataType` is the single source of truth for column typing;
//! `Value` is the owned cell/constant representation the evaluator works on.
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | `DataType` | Column/value type discriminant |
//! | `Value` | Owned runtime value (cells, query constants) |
//! | `Timestamp` | Seconds + nanoseconds with consistent signs |
//! | `ObjectId` / `Uuid` | Fixed-size identifier types |
//! | `ObjKey` | Stable per-table object key |

mod value;

pub use value::{decode_base64, DataType, ObjKey, ObjectId, Timestamp, Uuid, Value};

pub use rust_decimal::Decimal;
