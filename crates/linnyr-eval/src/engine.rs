use std::cell::RefCell;

use linnyr_common::Value;
use linnyr_parse::ASTNode;
use rustc_hash::FxHashMap;

use crate::context::EvaluationContext;
use crate::interpreter::Interpreter;

/// A compiled expression ready for repeated evaluation: the parsed program,
/// plus the identity (owning entity/attribute name) and original source text
/// that show up in diagnostics and in the call stack when a cycle is
/// reported.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    pub name: String,
    pub source: String,
    pub program: ASTNode,
}

impl CompiledExpression {
    pub fn compile(name: impl Into<String>, source: &str) -> Result<Self, linnyr_parse::ParsingError> {
        let program = linnyr_parse::parse(source)?;
        Ok(Self {
            name: name.into(),
            source: source.to_string(),
            program,
        })
    }
}

/// One entry on the evaluator's call stack: which named expression is being
/// computed, and the source text it came from, for cycle diagnostics.
#[derive(Debug, Clone)]
pub struct Frame {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: String,
    t: i64,
    wildcard: Option<String>,
}

/// Owns the per-`(t, wildcard)` memoization cache and the recursion call
/// stack shared across every expression evaluated during one pass. The
/// context is taken per call, not stored, so one `Evaluator` can be held
/// by a type that also implements [`EvaluationContext`] and hands itself
/// back in as the context on each nested call — that is what lets a cycle
/// spanning several entities' bound expressions be caught by the same
/// stack instead of only a self-referential one. A single instance is
/// meant to live for one evaluation pass over a block; invalidate or
/// replace it between blocks.
#[derive(Default)]
pub struct Evaluator {
    cache: RefCell<FxHashMap<CacheKey, Value>>,
    stack: RefCell<Vec<Frame>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            cache: RefCell::new(FxHashMap::default()),
            stack: RefCell::new(Vec::new()),
        }
    }

    /// Evaluates `expr` at timestep `t` under wildcard binding `wildcard`
    /// against `context`, caching the result and guarding against cycles
    /// (including ones that span several distinct expressions) with
    /// [`Value::Computing`].
    pub fn evaluate(
        &self,
        context: &dyn EvaluationContext,
        expr: &CompiledExpression,
        t: i64,
        wildcard: Option<&str>,
    ) -> Value {
        let key = CacheKey {
            name: expr.name.clone(),
            t,
            wildcard: wildcard.map(str::to_string),
        };
        if let Some(v) = self.cache.borrow().get(&key) {
            return *v;
        }
        if self.stack.borrow().iter().any(|f| f.name == expr.name) {
            return Value::Computing;
        }

        self.cache.borrow_mut().insert(key.clone(), Value::Computing);
        self.stack.borrow_mut().push(Frame {
            name: expr.name.clone(),
            source: expr.source.clone(),
        });

        let interpreter = Interpreter::new(context, t, wildcard);
        let result = interpreter.evaluate(&expr.program);

        self.stack.borrow_mut().pop();
        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// Clears the memoization cache. Call between blocks, since cached
    /// values are only valid for the block whose solution populated them.
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    /// A snapshot of the current call stack, innermost frame last — used to
    /// report which expression detected a cycle and via what chain.
    pub fn call_stack(&self) -> Vec<Frame> {
        self.stack.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linnyr_parse::ReferenceSpec;

    struct SelfReferencingContext;

    impl EvaluationContext for SelfReferencingContext {
        fn resolve(&self, _spec: &ReferenceSpec, _t: i64, _wildcard: Option<&str>) -> Value {
            Value::Number(1.0)
        }
        fn resolve_group(
            &self,
            _spec: &ReferenceSpec,
            _t: i64,
            _wildcard: Option<&str>,
        ) -> Vec<Value> {
            vec![Value::Number(1.0)]
        }
    }

    #[test]
    fn repeated_evaluation_hits_the_cache() {
        let context = SelfReferencingContext;
        let evaluator = Evaluator::new();
        let expr = CompiledExpression::compile("x", "1 + 1").unwrap();
        assert_eq!(evaluator.evaluate(&context, &expr, 0, None), Value::Number(2.0));
        assert_eq!(evaluator.evaluate(&context, &expr, 0, None), Value::Number(2.0));
    }

    #[test]
    fn different_timesteps_are_cached_independently() {
        let context = SelfReferencingContext;
        let evaluator = Evaluator::new();
        let expr = CompiledExpression::compile("x", "[a]").unwrap();
        evaluator.evaluate(&context, &expr, 0, None);
        evaluator.evaluate(&context, &expr, 1, None);
        assert_eq!(evaluator.cache.borrow().len(), 2);
    }

    /// A context that hands itself back in as the resolution context lets
    /// one `Evaluator` see the whole chain: `a` resolving to `b` resolving
    /// back to `a` must report `Computing`, not recurse forever.
    struct CrossReferencingContext<'e> {
        evaluator: &'e Evaluator,
        a: CompiledExpression,
        b: CompiledExpression,
    }

    impl<'e> EvaluationContext for CrossReferencingContext<'e> {
        fn resolve(&self, spec: &ReferenceSpec, t: i64, wildcard: Option<&str>) -> Value {
            match spec.name.as_str() {
                "a" => self.evaluator.evaluate(self, &self.a, t, wildcard),
                "b" => self.evaluator.evaluate(self, &self.b, t, wildcard),
                _ => Value::Undefined,
            }
        }
        fn resolve_group(&self, _spec: &ReferenceSpec, _t: i64, _wildcard: Option<&str>) -> Vec<Value> {
            Vec::new()
        }
    }

    #[test]
    fn a_cycle_spanning_two_expressions_reports_computing_instead_of_recursing() {
        let evaluator = Evaluator::new();
        let context = CrossReferencingContext {
            evaluator: &evaluator,
            a: CompiledExpression::compile("a", "[b]").unwrap(),
            b: CompiledExpression::compile("b", "[a]").unwrap(),
        };
        assert_eq!(evaluator.evaluate(&context, &context.a, 0, None), Value::Computing);
    }
}
