//! # Query Arguments
//!
//! The provider interface for `$N` placeholders in predicate text, plus the
//! two stock implementations: `NoArguments` (every access fails) and
//! `MixedArguments` (backed by a vector of owned values). Indexing is
//! 0-based and corresponds to the `$N` tokens.

use eyre::Result;

use crate::error::CoreError;
use crate::types::{DataType, Decimal, ObjKey, ObjectId, Timestamp, Uuid, Value};

/// Typed access to externally supplied query arguments.
pub trait Arguments {
    fn bool_for(&self, n: usize) -> Result<bool>;
    fn long_for(&self, n: usize) -> Result<i64>;
    fn float_for(&self, n: usize) -> Result<f32>;
    fn double_for(&self, n: usize) -> Result<f64>;
    fn string_for(&self, n: usize) -> Result<String>;
    fn binary_for(&self, n: usize) -> Result<Vec<u8>>;
    fn timestamp_for(&self, n: usize) -> Result<Timestamp>;
    fn object_id_for(&self, n: usize) -> Result<ObjectId>;
    fn uuid_for(&self, n: usize) -> Result<Uuid>;
    fn decimal128_for(&self, n: usize) -> Result<Decimal>;
    fn object_index_for(&self, n: usize) -> Result<ObjKey>;
    fn is_null(&self, n: usize) -> Result<bool>;
    fn type_for(&self, n: usize) -> Result<DataType>;
}

fn no_argument(n: usize) -> eyre::Report {
    CoreError::Argument(format!("request for argument at index {} but no arguments are provided", n))
        .into()
}

/// The default provider: any `$N` in the query is an error.
pub struct NoArguments;

macro_rules! no_args_accessor {
    ($name:ident, $ty:ty) => {
        fn $name(&self, n: usize) -> Result<$ty> {
            Err(no_argument(n))
        }
    };
}

impl Arguments for NoArguments {
    no_args_accessor!(bool_for, bool);
    no_args_accessor!(long_for, i64);
    no_args_accessor!(float_for, f32);
    no_args_accessor!(double_for, f64);
    no_args_accessor!(string_for, String);
    no_args_accessor!(binary_for, Vec<u8>);
    no_args_accessor!(timestamp_for, Timestamp);
    no_args_accessor!(object_id_for, ObjectId);
    no_args_accessor!(uuid_for, Uuid);
    no_args_accessor!(decimal128_for, Decimal);
    no_args_accessor!(object_index_for, ObjKey);
    no_args_accessor!(is_null, bool);
    no_args_accessor!(type_for, DataType);
}

/// Arguments backed by a vector of owned values.
pub struct MixedArguments {
    values: Vec<Value>,
}

impl MixedArguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    fn get(&self, n: usize) -> Result<&Value> {
        self.values.get(n).ok_or_else(|| {
            CoreError::Argument(format!(
                "argument index {} out of range ({} arguments)",
                n,
                self.values.len()
            ))
            .into()
        })
    }

    fn wrong_type(&self, n: usize, wanted: &str, got: &Value) -> eyre::Report {
        CoreError::Argument(format!(
            "argument {} is not a {} (found {:?})",
            n, wanted, got
        ))
        .into()
    }
}

impl Arguments for MixedArguments {
    fn bool_for(&self, n: usize) -> Result<bool> {
        match self.get(n)? {
            Value::Bool(b) => Ok(*b),
            other => Err(self.wrong_type(n, "bool", other)),
        }
    }

    fn long_for(&self, n: usize) -> Result<i64> {
        match self.get(n)? {
            Value::Int(i) => Ok(*i),
            other => Err(self.wrong_type(n, "int", other)),
        }
    }

    fn float_for(&self, n: usize) -> Result<f32> {
        match self.get(n)? {
            Value::Float(f) => Ok(*f),
            other => Err(self.wrong_type(n, "float", other)),
        }
    }

    fn double_for(&self, n: usize) -> Result<f64> {
        match self.get(n)? {
            Value::Double(d) => Ok(*d),
            other => Err(self.wrong_type(n, "double", other)),
        }
    }

    fn string_for(&self, n: usize) -> Result<String> {
        match self.get(n)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.wrong_type(n, "string", other)),
        }
    }

    fn binary_for(&self, n: usize) -> Result<Vec<u8>> {
        match self.get(n)? {
            Value::Binary(b) => Ok(b.clone()),
            other => Err(self.wrong_type(n, "binary", other)),
        }
    }

    fn timestamp_for(&self, n: usize) -> Result<Timestamp> {
        match self.get(n)? {
            Value::Timestamp(ts) => Ok(*ts),
            other => Err(self.wrong_type(n, "timestamp", other)),
        }
    }

    fn object_id_for(&self, n: usize) -> Result<ObjectId> {
        match self.get(n)? {
            Value::ObjectId(oid) => Ok(*oid),
            other => Err(self.wrong_type(n, "objectId", other)),
        }
    }

    fn uuid_for(&self, n: usize) -> Result<Uuid> {
        match self.get(n)? {
            Value::Uuid(u) => Ok(*u),
            other => Err(self.wrong_type(n, "uuid", other)),
        }
    }

    fn decimal128_for(&self, n: usize) -> Result<Decimal> {
        match self.get(n)? {
            Value::Decimal(d) => Ok(*d),
            other => Err(self.wrong_type(n, "decimal", other)),
        }
    }

    fn object_index_for(&self, n: usize) -> Result<ObjKey> {
        match self.get(n)? {
            Value::Link(k) => Ok(*k),
            other => Err(self.wrong_type(n, "object", other)),
        }
    }

    fn is_null(&self, n: usize) -> Result<bool> {
        Ok(self.get(n)?.is_null())
    }

    fn type_for(&self, n: usize) -> Result<DataType> {
        let value = self.get(n)?;
        value.data_type().ok_or_else(|| {
            CoreError::Argument(format!("argument {} is null and has no type", n)).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_rejects_everything() {
        let err = NoArguments.long_for(0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::Argument(_))
        ));
    }

    #[test]
    fn mixed_arguments_typed_access() {
        let args = MixedArguments::new(vec![
            Value::Int(7),
            Value::String("x".into()),
            Value::Null,
        ]);
        assert_eq!(args.long_for(0).unwrap(), 7);
        assert_eq!(args.string_for(1).unwrap(), "x");
        assert!(args.is_null(2).unwrap());
        assert!(!args.is_null(0).unwrap());
        assert_eq!(args.type_for(1).unwrap(), DataType::String);
    }

    #[test]
    fn mixed_arguments_out_of_range() {
        let args = MixedArguments::new(vec![]);
        assert!(args.long_for(0).is_err());
    }

    #[test]
    fn mixed_arguments_wrong_type() {
        let args = MixedArguments::new(vec![Value::Int(1)]);
        assert!(args.string_for(0).is_err());
    }
}
