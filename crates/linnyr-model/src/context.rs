//! Binds the generic expression evaluator to the entity store: resolves a
//! `[entity|attribute@offset]` reference against whichever process, product,
//! link, or dataset `entity` canonically names.
//!
//! Vector attributes (`level`, `actual_flow`, `stock_price`, aliased as `L`
//! per the scenario notation used in [`crate`]'s own tests) read directly
//! from the vector the scheduler already populated. Expression attributes
//! (`lb`, `ub`, `il`, `price`, `rate`) are evaluated on demand against the
//! same `(t, wildcard)` binding, through the [`Evaluator`] each `ModelContext`
//! owns: resolving one entity's bound expression can itself resolve a
//! reference into another entity's bound expression, and since every such
//! call hands the same `ModelContext` back in as the resolution context,
//! they all share one evaluator's cache and call stack — a cycle spanning
//! several entities is reported as [`Value::Computing`] rather than
//! recursing forever.

use linnyr_common::Value;
use linnyr_eval::{EvaluationContext, Evaluator};
use linnyr_parse::ReferenceSpec;

use crate::ids::canonical_id;
use crate::store::Model;

pub struct ModelContext<'a> {
    pub model: &'a Model,
    evaluator: Evaluator,
}

impl<'a> ModelContext<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model, evaluator: Evaluator::new() }
    }

    fn substitute_wildcard(name: &str, wildcard: Option<&str>) -> String {
        match wildcard {
            Some(w) => name.replacen("??", w, 1).replacen('?', w, 1),
            None => name.to_string(),
        }
    }

    fn resolve_one(&self, spec: &ReferenceSpec, t: i64) -> Value {
        let id = canonical_id(&spec.name);
        let attribute = spec.attribute.as_deref().unwrap_or("level");

        if let Some(pid) = self.model.lookup_process(&id) {
            let process = self.model.processes.get(pid).unwrap();
            return match attribute {
                "level" | "L" => vector_at(&process.level, t),
                "ub" => self.eval_expr(&process.upper_bound, t),
                "lb" => self.eval_expr(&process.lower_bound, t),
                "il" => self.eval_expr(&process.initial_level, t),
                _ => Value::Undefined,
            };
        }
        if let Some(qid) = self.model.lookup_product(&id) {
            let product = self.model.products.get(qid).unwrap();
            return match attribute {
                "level" | "L" => vector_at(&product.level, t),
                "stock_price" => value_vector_at(&product.stock_price, t),
                "ub" => self.eval_expr(&product.upper_bound, t),
                "lb" => self.eval_expr(&product.lower_bound, t),
                "il" => self.eval_expr(&product.initial_level, t),
                "price" | "P" => self.eval_expr(&product.price, t),
                _ => Value::Undefined,
            };
        }
        Value::Undefined
    }

    fn eval_expr(&self, expr: &crate::expr::Expr, t: i64) -> Value {
        let Some(program) = expr.program() else {
            return Value::Undefined;
        };
        self.evaluator.evaluate(self, program, t, None)
    }
}

fn vector_at(vector: &[f64], t: i64) -> Value {
    if t < 0 || t as usize >= vector.len() {
        Value::Undefined
    } else {
        Value::Number(vector[t as usize])
    }
}

fn value_vector_at(vector: &[Value], t: i64) -> Value {
    if t < 0 || t as usize >= vector.len() {
        Value::Undefined
    } else {
        vector[t as usize]
    }
}

impl<'a> EvaluationContext for ModelContext<'a> {
    fn resolve(&self, spec: &ReferenceSpec, t: i64, wildcard: Option<&str>) -> Value {
        let substituted_name = Self::substitute_wildcard(&spec.name, wildcard);
        let substituted_spec = ReferenceSpec {
            name: substituted_name,
            ..spec.clone()
        };
        self.resolve_one(&substituted_spec, t)
    }

    fn resolve_group(&self, spec: &ReferenceSpec, t: i64, wildcard: Option<&str>) -> Vec<Value> {
        let prefix = spec.name.trim_end_matches(['?', '*']).to_string();
        let mut matches = Vec::new();
        for (_, process) in self.model.processes.iter() {
            if process.id.starts_with(&canonical_id(&prefix)) {
                let spec = ReferenceSpec {
                    name: process.name.clone(),
                    ..spec.clone()
                };
                matches.push(self.resolve(&spec, t, wildcard));
            }
        }
        for (_, product) in self.model.products.iter() {
            if product.id.starts_with(&canonical_id(&prefix)) {
                let spec = ReferenceSpec {
                    name: product.name.clone(),
                    ..spec.clone()
                };
                matches.push(self.resolve(&spec, t, wildcard));
            }
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    #[test]
    fn resolves_a_process_level_at_a_timestep() {
        let mut model = Model::new();
        let top = model.top_cluster;
        let p = model.add_process("P1", top).unwrap();
        model.processes.get_mut(p).unwrap().level = vec![0.0, 10.0, 10.0];
        let context = ModelContext::new(&model);
        let spec = ReferenceSpec {
            context_prefix: None,
            by_reference: false,
            is_method: false,
            name: "P1".to_string(),
            attribute: Some("L".to_string()),
            offset: None,
        };
        assert_eq!(context.resolve(&spec, 1, None), Value::Number(10.0));
    }

    #[test]
    fn wildcard_equation_selects_the_substituted_product() {
        let mut model = Model::new();
        model.add_product("abc 1").unwrap();
        let q2 = model.add_product("abc 2").unwrap();
        model.products.get_mut(q2).unwrap().level = vec![0.0, 5.0, 7.0];
        let context = ModelContext::new(&model);
        let spec = ReferenceSpec {
            context_prefix: None,
            by_reference: false,
            is_method: false,
            name: "abc ??".to_string(),
            attribute: Some("L".to_string()),
            offset: None,
        };
        assert_eq!(context.resolve(&spec, 2, Some("2")), Value::Number(7.0));
    }

    #[test]
    fn unresolved_entity_evaluates_to_undefined() {
        let model = Model::new();
        let context = ModelContext::new(&model);
        let spec = ReferenceSpec {
            context_prefix: None,
            by_reference: false,
            is_method: false,
            name: "nonexistent".to_string(),
            attribute: None,
            offset: None,
        };
        assert_eq!(context.resolve(&spec, 0, None), Value::Undefined);
    }

    #[test]
    fn bound_expression_attribute_is_evaluated_on_demand() {
        let mut model = Model::new();
        let top = model.top_cluster;
        let p = model.add_process("P1", top).unwrap();
        model.processes.get_mut(p).unwrap().upper_bound = Expr::constant("ub", 42.0);
        let context = ModelContext::new(&model);
        let spec = ReferenceSpec {
            context_prefix: None,
            by_reference: false,
            is_method: false,
            name: "P1".to_string(),
            attribute: Some("ub".to_string()),
            offset: None,
        };
        assert_eq!(context.resolve(&spec, 0, None), Value::Number(42.0));
    }
}
