use std::fmt;

use serde::Serialize;

/// Scalar accepted by the cache write path: the closed set of types the
/// store knows how to serialize.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
}

impl Value {
    /// Byte serialization written to the store. Numbers serialize as their
    /// decimal text so a typed read can parse them back.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Str(s) => s.as_bytes().to_vec(),
            Value::Bytes(b) => b.clone(),
            Value::Int(n) => n.to_string().into_bytes(),
            Value::Float(f) => f.to_string().into_bytes(),
        }
    }

    /// Stable textual form used for history records: strings quoted, numbers
    /// bare, bytes as `b"…"` with ASCII escapes.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s.escape_default()),
            Value::Bytes(b) => format!("b\"{}\"", b.escape_ascii()),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

/// Tuple form of an argument list, the unit recorded in history lists.
/// Single-element tuples keep the trailing comma so arity stays readable.
pub fn format_arg_tuple(args: &[Value]) -> String {
    match args {
        [] => "()".to_string(),
        [one] => format!("({},)", one.repr()),
        many => {
            let parts: Vec<String> = many.iter().map(Value::repr).collect();
            format!("({})", parts.join(", "))
        }
    }
}

/// One replayed call: 1-based position plus the raw recorded input and
/// output representations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub call: usize,
    pub input: String,
    pub output: String,
}

/// Ordered history of an instrumented operation, zipped from its input and
/// output lists. Empty when nothing was recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    pub method: String,
    pub records: Vec<CallRecord>,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} was called {} time{}:",
            self.method,
            self.records.len(),
            if self.records.len() == 1 { "" } else { "s" },
        )?;
        for rec in &self.records {
            writeln!(f, "Call {}:", rec.call)?;
            writeln!(f, "    Inputs: {}", rec.input)?;
            writeln!(f, "    Outputs: {}", rec.output)?;
        }
        Ok(())
    }
}
