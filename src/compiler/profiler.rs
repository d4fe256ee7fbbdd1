//! Call-count profiling for the tiering decision. Every user function
//! starts interpreted; crossing the threshold promotes it once, and a
//! failed compilation pins it to the interpreter for good.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::compiled::CompiledFunction;
use crate::lexer::token::TokenId;

pub enum FunctionState {
    Interpreted { calls: u32 },
    Compiled(Rc<CompiledFunction>),
    Declined,
}

pub struct Profiler {
    states: FxHashMap<TokenId, FunctionState>,
    threshold: u32,
}

impl Profiler {
    pub fn new(threshold: u32) -> Self {
        Self {
            states: FxHashMap::default(),
            threshold,
        }
    }

    /// Counts one call of an interpreted function, returning `true`
    /// exactly when this call crosses the promotion threshold.
    pub fn record_call(&mut self, function_id: TokenId) -> bool {
        match self
            .states
            .entry(function_id)
            .or_insert(FunctionState::Interpreted { calls: 0 })
        {
            FunctionState::Interpreted { calls } => {
                *calls += 1;
                *calls >= self.threshold
            }
            _ => false,
        }
    }

    pub fn compiled(&self, function_id: TokenId) -> Option<Rc<CompiledFunction>> {
        match self.states.get(&function_id) {
            Some(FunctionState::Compiled(compiled)) => Some(Rc::clone(compiled)),
            _ => None,
        }
    }

    pub fn promote(&mut self, function_id: TokenId, compiled: Rc<CompiledFunction>) {
        self.states
            .insert(function_id, FunctionState::Compiled(compiled));
    }

    pub fn decline(&mut self, function_id: TokenId) {
        self.states.insert(function_id, FunctionState::Declined);
    }

    pub fn is_declined(&self, function_id: TokenId) -> bool {
        matches!(self.states.get(&function_id), Some(FunctionState::Declined))
    }

    pub fn call_count(&self, function_id: TokenId) -> u32 {
        match self.states.get(&function_id) {
            Some(FunctionState::Interpreted { calls }) => *calls,
            _ => 0,
        }
    }

    /// Ids of every promoted function, in a stable order.
    pub fn hot_functions(&self) -> Vec<TokenId> {
        let mut ids: Vec<TokenId> = self
            .states
            .iter()
            .filter(|(_, state)| matches!(state, FunctionState::Compiled(_)))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::runtime_value::RuntimeValue;

    fn noop_compiled() -> Rc<CompiledFunction> {
        Rc::new(CompiledFunction::new(Box::new(|_, _| {
            Ok(RuntimeValue::Nil)
        })))
    }

    #[test]
    fn test_threshold_crossing() {
        let mut profiler = Profiler::new(3);
        let id = TokenId::new(0);

        assert!(!profiler.record_call(id));
        assert!(!profiler.record_call(id));
        assert!(profiler.record_call(id));
        assert_eq!(profiler.call_count(id), 3);
    }

    #[test]
    fn test_promoted_function_stops_counting() {
        let mut profiler = Profiler::new(1);
        let id = TokenId::new(0);

        profiler.record_call(id);
        profiler.promote(id, noop_compiled());

        assert!(profiler.compiled(id).is_some());
        assert!(!profiler.record_call(id));
        assert_eq!(profiler.hot_functions(), vec![id]);
    }

    #[test]
    fn test_declined_function_is_never_retried() {
        let mut profiler = Profiler::new(1);
        let id = TokenId::new(7);

        profiler.record_call(id);
        profiler.decline(id);

        assert!(profiler.is_declined(id));
        assert!(!profiler.record_call(id));
        assert!(profiler.compiled(id).is_none());
        assert!(profiler.hot_functions().is_empty());
    }
}
