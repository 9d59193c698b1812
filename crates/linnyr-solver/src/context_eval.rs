//! Small bridge from a canonical entity id + attribute name to a plain
//! `f64`, for the tableau builder's bound-expression lookups.

use linnyr_model::{ModelContext, Model};
use linnyr_parse::ReferenceSpec;

pub fn eval_value_at(model: &Model, entity_id: &str, attribute: &str, t: i64) -> Option<f64> {
    let context = ModelContext::new(model);
    let spec = ReferenceSpec {
        context_prefix: None,
        by_reference: false,
        is_method: false,
        name: entity_id.to_string(),
        attribute: Some(attribute.to_string()),
        offset: None,
    };
    linnyr_eval::EvaluationContext::resolve(&context, &spec, t, None).as_number()
}
