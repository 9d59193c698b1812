use linnyr_common::Value;
use linnyr_parse::{ASTNode, ASTNodeType, BinaryOperator, ReferenceSpec, StatisticOp, UnaryOperator};

use crate::context::{EvaluationContext, is_wildcard_name};

/// Walks a single compiled expression tree at a fixed `(t, wildcard)`
/// binding. Stateless: all memoization and cycle detection live one layer up
/// in [`crate::engine::Evaluator`]. A bad sub-expression never panics or
/// short-circuits evaluation of the rest of the tree — it degrades to a
/// [`Value`] sentinel that propagates through the surrounding arithmetic.
pub struct Interpreter<'a> {
    context: &'a dyn EvaluationContext,
    t: i64,
    wildcard: Option<&'a str>,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a dyn EvaluationContext, t: i64, wildcard: Option<&'a str>) -> Self {
        Self {
            context,
            t,
            wildcard,
        }
    }

    pub fn evaluate(&self, node: &ASTNode) -> Value {
        match &node.node_type {
            ASTNodeType::Number(n) => Value::Number(*n),
            ASTNodeType::StringLiteral(_) => Value::Undefined,
            ASTNodeType::Reference(r) => self.eval_reference(r),
            ASTNodeType::UnaryOp { op, operand } => self.eval_unary(*op, operand),
            ASTNodeType::BinaryOp { op, left, right } => self.eval_binary(*op, left, right),
            ASTNodeType::StatisticCall { op, args } => self.eval_statistic(*op, args),
        }
    }

    fn resolve_offset(&self, offset: &Option<Box<ASTNode>>) -> Option<i64> {
        match offset {
            None => Some(0),
            Some(expr) => self.evaluate(expr).as_number().map(|n| n.round() as i64),
        }
    }

    fn eval_reference(&self, r: &ReferenceSpec) -> Value {
        let Some(offset) = self.resolve_offset(&r.offset) else {
            return Value::Undefined;
        };
        self.context.resolve(r, self.t + offset, self.wildcard)
    }

    fn eval_unary(&self, op: UnaryOperator, operand: &ASTNode) -> Value {
        let v = self.evaluate(operand);
        match op {
            UnaryOperator::Pos => v,
            UnaryOperator::Neg => -v,
            UnaryOperator::Not => match v.as_number() {
                Some(n) => Value::from(n == 0.0),
                None => v,
            },
        }
    }

    fn eval_binary(&self, op: BinaryOperator, left: &ASTNode, right: &ASTNode) -> Value {
        let l = self.evaluate(left);
        let r = self.evaluate(right);
        match op {
            BinaryOperator::Add => l + r,
            BinaryOperator::Sub => l - r,
            BinaryOperator::Mul => l * r,
            BinaryOperator::Div => l / r,
            BinaryOperator::Pow => eval_pow(l, r),
            BinaryOperator::Eq => eval_compare(l, r, |a, b| a == b),
            BinaryOperator::Ne => eval_compare(l, r, |a, b| a != b),
            BinaryOperator::Lt => eval_compare(l, r, |a, b| a < b),
            BinaryOperator::Le => eval_compare(l, r, |a, b| a <= b),
            BinaryOperator::Gt => eval_compare(l, r, |a, b| a > b),
            BinaryOperator::Ge => eval_compare(l, r, |a, b| a >= b),
            BinaryOperator::And => eval_logical(l, r, |a, b| a && b),
            BinaryOperator::Or => eval_logical(l, r, |a, b| a || b),
        }
    }

    fn eval_statistic(&self, op: StatisticOp, args: &[ASTNode]) -> Value {
        let values = if let [ASTNode {
            node_type: ASTNodeType::Reference(r),
            ..
        }] = args
        {
            if is_wildcard_name(&r.name) {
                match self.resolve_offset(&r.offset) {
                    Some(offset) => self
                        .context
                        .resolve_group(r, self.t + offset, self.wildcard),
                    None => Vec::new(),
                }
            } else {
                vec![self.eval_reference(r)]
            }
        } else {
            args.iter().map(|a| self.evaluate(a)).collect()
        };
        aggregate(op, &values)
    }
}

fn eval_pow(l: Value, r: Value) -> Value {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => {
            if a < 0.0 && b.fract() != 0.0 {
                Value::Undefined
            } else {
                Value::from_f64(a.powf(b))
            }
        }
        _ => propagate(l, r),
    }
}

fn eval_compare<F: Fn(f64, f64) -> bool>(l: Value, r: Value, f: F) -> Value {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => Value::from(f(a, b)),
        _ => propagate(l, r),
    }
}

fn eval_logical<F: Fn(bool, bool) -> bool>(l: Value, r: Value, f: F) -> Value {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => Value::from(f(a != 0.0, b != 0.0)),
        _ => propagate(l, r),
    }
}

/// When at least one operand isn't a plain number, surface whichever one
/// carries the sentinel (preferring the left operand, matching left-to-right
/// evaluation order).
fn propagate(l: Value, r: Value) -> Value {
    if l.as_number().is_none() { l } else { r }
}

/// Aggregates a wildcard-matched group of values for one of the six
/// statistics operators. Non-numeric sentinels in the group are treated as
/// absent members, the same way a spreadsheet aggregate skips blanks, rather
/// than poisoning the whole aggregate.
fn aggregate(op: StatisticOp, values: &[Value]) -> Value {
    let nums: Vec<f64> = values.iter().filter_map(|v| v.as_number()).collect();
    match op {
        StatisticOp::Count => Value::Number(nums.len() as f64),
        StatisticOp::Sum => {
            if nums.is_empty() {
                Value::NoCost
            } else {
                Value::Number(nums.iter().sum())
            }
        }
        StatisticOp::Mean => {
            if nums.is_empty() {
                Value::Undefined
            } else {
                Value::Number(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        StatisticOp::Min => nums
            .iter()
            .cloned()
            .fold(None, |acc, x| Some(acc.map_or(x, |a: f64| a.min(x))))
            .map(Value::Number)
            .unwrap_or(Value::Undefined),
        StatisticOp::Max => nums
            .iter()
            .cloned()
            .fold(None, |acc, x| Some(acc.map_or(x, |a: f64| a.max(x))))
            .map(Value::Number)
            .unwrap_or(Value::Undefined),
        StatisticOp::Sd => {
            if nums.len() < 2 {
                Value::Undefined
            } else {
                let mean = nums.iter().sum::<f64>() / nums.len() as f64;
                let variance = nums.iter().map(|n| (n - mean).powi(2)).sum::<f64>()
                    / (nums.len() - 1) as f64;
                Value::Number(variance.sqrt())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linnyr_parse::parse;
    use std::collections::HashMap;

    struct FakeContext {
        series: HashMap<String, Vec<f64>>,
    }

    impl EvaluationContext for FakeContext {
        fn resolve(&self, spec: &ReferenceSpec, t: i64, _wildcard: Option<&str>) -> Value {
            match self.series.get(&spec.name) {
                Some(s) if t >= 0 && (t as usize) < s.len() => Value::Number(s[t as usize]),
                Some(_) => Value::Undefined,
                None => Value::Undefined,
            }
        }

        fn resolve_group(&self, spec: &ReferenceSpec, t: i64, w: Option<&str>) -> Vec<Value> {
            self.series
                .keys()
                .filter(|k| k.starts_with(spec.name.trim_end_matches(['?', '*'])))
                .map(|k| {
                    self.resolve(
                        &ReferenceSpec {
                            name: k.clone(),
                            ..spec.clone()
                        },
                        t,
                        w,
                    )
                })
                .collect()
        }
    }

    fn ctx() -> FakeContext {
        let mut series = HashMap::new();
        series.insert("a".to_string(), vec![1.0, 2.0, 3.0]);
        series.insert("b".to_string(), vec![10.0, 20.0, 30.0]);
        FakeContext { series }
    }

    #[test]
    fn evaluates_arithmetic_with_references() {
        let ast = parse("[a] + [b]").unwrap();
        let context = ctx();
        let interp = Interpreter::new(&context, 1, None);
        assert_eq!(interp.evaluate(&ast), Value::Number(22.0));
    }

    #[test]
    fn out_of_bounds_offset_is_undefined_not_a_panic() {
        let ast = parse("[a@-5]").unwrap();
        let context = ctx();
        let interp = Interpreter::new(&context, 0, None);
        assert_eq!(interp.evaluate(&ast), Value::Undefined);
    }

    #[test]
    fn division_by_zero_propagates_as_undefined() {
        let ast = parse("[a] / 0").unwrap();
        let context = ctx();
        let interp = Interpreter::new(&context, 0, None);
        assert_eq!(interp.evaluate(&ast), Value::Undefined);
    }

    #[test]
    fn statistic_sugar_aggregates_over_wildcard_group() {
        let ast = parse("SUM$[? ]").unwrap();
        let context = ctx();
        let interp = Interpreter::new(&context, 0, None);
        assert_eq!(interp.evaluate(&ast), Value::Number(11.0));
    }

    #[test]
    fn power_rejects_negative_base_fractional_exponent() {
        let ast = parse("(0 - [a]) ^ 0.5").unwrap();
        let context = ctx();
        let interp = Interpreter::new(&context, 0, None);
        assert_eq!(interp.evaluate(&ast), Value::Undefined);
    }
}
