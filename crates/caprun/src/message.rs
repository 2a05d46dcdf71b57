//! # Call Messages
//!
//! The in-memory payload model for requests and responses. A [`Message`]
//! owns a tree of [`Value`]s rooted at an indexed struct; capabilities embed
//! directly as values, which is what makes promise pipelining possible: a
//! pipeline op sequence is just a path through this tree ending at a
//! capability slot.

use crate::client::Client;
use crate::error::Error;
use crate::traits::PipelineOp;

/// Default field capacity reserved at the root of a fresh message when the
/// caller gives no size hint.
pub const SUGGESTED_ROOT_CAPACITY: usize = 8;

/// A dynamic payload value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    U64(u64),
    S64(i64),
    F64(f64),
    Text(String),
    Data(Vec<u8>),
    List(Vec<Value>),
    Struct(Vec<Value>),
    Capability(Client),
}

impl Value {
    /// Descends one level into a struct or list.
    pub fn field(&self, index: u16) -> Option<&Value> {
        match self {
            Self::Struct(fields) => fields.get(index as usize),
            Self::List(items) => items.get(index as usize),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_s64(&self) -> Option<i64> {
        match self {
            Self::S64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_client(&self) -> Option<&Client> {
        match self {
            Self::Capability(client) => Some(client),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::S64(a), Self::S64(b)) => a == b,
            (Self::F64(a), Self::F64(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Data(a), Self::Data(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Struct(a), Self::Struct(b)) => a == b,
            (Self::Capability(a), Self::Capability(b)) => a.is_same(b),
            _ => false,
        }
    }
}

/// An owned payload rooted at a struct value.
#[derive(Debug)]
pub struct Message {
    root: Value,
}

impl Message {
    /// Allocates an empty message. The size hint reserves root fields up
    /// front; absent, a suggested default applies.
    pub fn new(size_hint: Option<usize>) -> Self {
        let capacity = size_hint.unwrap_or(SUGGESTED_ROOT_CAPACITY);
        Self {
            root: Value::Struct(Vec::with_capacity(capacity)),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    /// Writes `value` at `index` of the root struct, padding intermediate
    /// fields with `Null`. Panics if the root has been replaced with a
    /// non-struct value.
    pub fn set_field(&mut self, index: u16, value: Value) {
        let Value::Struct(fields) = &mut self.root else {
            panic!("message root is not a struct");
        };
        let index = index as usize;
        if fields.len() <= index {
            fields.resize(index + 1, Value::Null);
        }
        fields[index] = value;
    }
}

/// Resolves a pipeline op sequence against a response root.
///
/// Never fails outright: a path that misses, or that lands on something
/// other than a capability, yields a broken client carrying the cause, so a
/// pipelined call on it fails naturally.
pub fn pipelined_cap(root: &Value, ops: &[PipelineOp]) -> Client {
    let mut target = root;
    for op in ops {
        match op {
            PipelineOp::Noop => {}
            PipelineOp::GetField(index) => match target.field(*index) {
                Some(value) => target = value,
                None => {
                    return Client::broken(Error::failed(format!(
                        "pipeline op refers to missing field {}",
                        index
                    )))
                }
            },
        }
    }
    match target {
        Value::Capability(client) => client.clone(),
        Value::Null => Client::broken(Error::failed("pipeline target is a null capability")),
        _ => Client::broken(Error::failed("pipeline target is not a capability")),
    }
}
