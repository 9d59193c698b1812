use linnyr_common::Diagnostic;
use linnyr_eval::CompiledExpression;

/// An entity attribute backed by a source expression: compiled eagerly on
/// construction so a syntax error is surfaced at edit time, but never
/// allowed to abort the model — a failed compile is retained as a
/// diagnostic and the attribute evaluates to [`linnyr_common::Value::Undefined`]
/// for every timestep, per the propagation policy in the error design.
#[derive(Debug, Clone)]
pub struct Expr {
    pub source: String,
    pub compiled: Result<CompiledExpression, Diagnostic>,
}

impl Expr {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let name = name.into();
        let compiled = CompiledExpression::compile(name, &source).map_err(|e| {
            Diagnostic::from(e).with_entity("expression")
        });
        Self { source, compiled }
    }

    pub fn constant(name: impl Into<String>, value: f64) -> Self {
        // `f64::to_string` renders infinities as "inf"/"-inf", which the
        // tokenizer doesn't recognize as a number literal; spell them as a
        // magnitude the grammar can parse instead.
        let text = if value == f64::INFINITY {
            "1e308".to_string()
        } else if value == f64::NEG_INFINITY {
            "-1e308".to_string()
        } else {
            value.to_string()
        };
        Self::new(name, text)
    }

    pub fn is_ok(&self) -> bool {
        self.compiled.is_ok()
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        self.compiled.as_ref().err()
    }

    pub fn program(&self) -> Option<&CompiledExpression> {
        self.compiled.as_ref().ok()
    }
}
