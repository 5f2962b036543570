use std::fmt;

use anyhow::Result;
use tracing::debug;

use crate::errors::StoreError;
use crate::store::KeyValueStore;
use crate::types::{format_arg_tuple, CallRecord, Transcript, Value};

/// Counter and history wrapper around a store-backed operation.
///
/// Counters and history lists are keyed by the operation's stable name, so
/// every instance of the same operation shares one counter and one history.
/// Both behaviors are independently toggleable and default to on.
pub struct Instrumentor<'a, S: KeyValueStore + ?Sized> {
    store: &'a S,
    method: &'a str,
    count: bool,
    history: bool,
}

impl<'a, S: KeyValueStore + ?Sized> Instrumentor<'a, S> {
    pub fn new(store: &'a S, method: &'a str) -> Self {
        Self {
            store,
            method,
            count: true,
            history: true,
        }
    }

    pub fn with_count(mut self, on: bool) -> Self {
        self.count = on;
        self
    }

    pub fn with_history(mut self, on: bool) -> Self {
        self.history = on;
        self
    }

    fn calls_key(&self) -> String {
        format!("{}:calls", self.method)
    }

    fn inputs_key(&self) -> String {
        format!("{}:inputs", self.method)
    }

    fn outputs_key(&self) -> String {
        format!("{}:outputs", self.method)
    }

    /// Run `op`, counting the attempt and recording the input/output pair.
    ///
    /// The counter moves before `op` runs, so attempts stay visible even when
    /// the operation fails. The input repr is appended before execution and
    /// the output repr after; a failed operation records its error display as
    /// the output, keeping the two lists in lockstep (index i of inputs
    /// always pairs with index i of outputs).
    pub fn call<T, F>(&self, args: &[Value], op: F) -> Result<T>
    where
        T: fmt::Display,
        F: FnOnce() -> Result<T>,
    {
        if self.count {
            self.store.incr(&self.calls_key())?;
        }
        if !self.history {
            return op();
        }
        self.store
            .rpush(&self.inputs_key(), format_arg_tuple(args).as_bytes())?;
        match op() {
            Ok(result) => {
                self.store
                    .rpush(&self.outputs_key(), result.to_string().as_bytes())?;
                Ok(result)
            }
            Err(err) => {
                self.store
                    .rpush(&self.outputs_key(), format!("error: {err}").as_bytes())?;
                Err(err)
            }
        }
    }

    /// Times the operation has been attempted. 0 when never called;
    /// non-numeric counter bytes are a decode error, not coerced.
    pub fn calls(&self) -> Result<u64> {
        let key = self.calls_key();
        match self.store.get(&key)? {
            None => Ok(0),
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| StoreError::decode(&key, "an integer").into()),
        }
    }

    /// Zip the input and output lists positionally into an ordered
    /// transcript. No recorded history yields an empty transcript.
    pub fn replay(&self) -> Result<Transcript> {
        let inputs = self.store.lrange(&self.inputs_key(), 0, -1)?;
        let outputs = self.store.lrange(&self.outputs_key(), 0, -1)?;
        debug!(
            method = self.method,
            inputs = inputs.len(),
            outputs = outputs.len(),
            "replaying call history"
        );
        let records = inputs
            .iter()
            .zip(outputs.iter())
            .enumerate()
            .map(|(i, (input, output))| CallRecord {
                call: i + 1,
                input: String::from_utf8_lossy(input).into_owned(),
                output: String::from_utf8_lossy(output).into_owned(),
            })
            .collect();
        Ok(Transcript {
            method: self.method.to_string(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::anyhow;

    #[test]
    fn test_counter_matches_invocations() {
        let store = MemoryStore::new();
        let instr = Instrumentor::new(&store, "op");
        for n in 1..=4u64 {
            instr.call(&[Value::from("x")], || Ok("done")).unwrap();
            assert_eq!(instr.calls().unwrap(), n);
        }
    }

    #[test]
    fn test_calls_zero_when_never_called() {
        let store = MemoryStore::new();
        let instr = Instrumentor::new(&store, "op");
        assert_eq!(instr.calls().unwrap(), 0);
    }

    #[test]
    fn test_counter_moves_on_failure_too() {
        let store = MemoryStore::new();
        let instr = Instrumentor::new(&store, "op");
        let result: Result<&str> = instr.call(&[], || Err(anyhow!("boom")));
        assert!(result.is_err());
        assert_eq!(instr.calls().unwrap(), 1);
    }

    #[test]
    fn test_history_lockstep_including_failures() {
        let store = MemoryStore::new();
        let instr = Instrumentor::new(&store, "op");
        instr.call(&[Value::from("a")], || Ok("ok-1")).unwrap();
        let _: Result<&str> = instr.call(&[Value::from("b")], || Err(anyhow!("boom")));
        instr.call(&[Value::from("c")], || Ok("ok-3")).unwrap();

        let inputs = store.lrange("op:inputs", 0, -1).unwrap();
        let outputs = store.lrange("op:outputs", 0, -1).unwrap();
        assert_eq!(inputs.len(), outputs.len());
        assert_eq!(outputs[1], b"error: boom".to_vec());
    }

    #[test]
    fn test_replay_preserves_call_order() {
        let store = MemoryStore::new();
        let instr = Instrumentor::new(&store, "store");
        instr.call(&[Value::from("x")], || Ok("key-1")).unwrap();
        instr.call(&[Value::from("y")], || Ok("key-2")).unwrap();

        let transcript = instr.replay().unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.records[0].call, 1);
        assert_eq!(transcript.records[0].input, "(\"x\",)");
        assert_eq!(transcript.records[0].output, "key-1");
        assert_eq!(transcript.records[1].call, 2);
        assert_eq!(transcript.records[1].input, "(\"y\",)");
        assert_eq!(transcript.records[1].output, "key-2");
    }

    #[test]
    fn test_replay_empty_without_history() {
        let store = MemoryStore::new();
        let transcript = Instrumentor::new(&store, "never").replay().unwrap();
        assert!(transcript.is_empty());
        assert_eq!(transcript.method, "never");
    }

    #[test]
    fn test_toggles_disable_independently() {
        let store = MemoryStore::new();
        let quiet = Instrumentor::new(&store, "op")
            .with_count(false)
            .with_history(false);
        quiet.call(&[Value::from("x")], || Ok("r")).unwrap();
        assert_eq!(quiet.calls().unwrap(), 0);
        assert!(quiet.replay().unwrap().is_empty());

        let count_only = Instrumentor::new(&store, "op").with_history(false);
        count_only.call(&[Value::from("x")], || Ok("r")).unwrap();
        assert_eq!(count_only.calls().unwrap(), 1);
        assert!(count_only.replay().unwrap().is_empty());
    }

    #[test]
    fn test_methods_are_independent() {
        let store = MemoryStore::new();
        let a = Instrumentor::new(&store, "alpha");
        let b = Instrumentor::new(&store, "beta");
        a.call(&[], || Ok("ra")).unwrap();
        a.call(&[], || Ok("ra")).unwrap();
        b.call(&[], || Ok("rb")).unwrap();
        assert_eq!(a.calls().unwrap(), 2);
        assert_eq!(b.calls().unwrap(), 1);
        assert_eq!(a.replay().unwrap().len(), 2);
        assert_eq!(b.replay().unwrap().len(), 1);
    }
}
