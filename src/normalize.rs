//! Defaulting pass applied to backend candidates before validation.
//!
//! The inference service is instructed to apply these rules itself, but its
//! output is never trusted: the same defaults are re-applied here, on the
//! decoded JSON, so validation downstream never has to repair anything.

use serde_json::{json, Value};

const DEFAULT_SERVINGS: u32 = 4;

/// Apply the canonical recipe defaults to a decoded candidate.
///
/// - `servings` becomes 4 unless it is already a positive number.
/// - Each ingredient gets `quantity: 1` when missing or non-numeric, and a
///   lower-cased `unit` (empty string when missing).
/// - Each step gets `order` = its 1-based position unless the backend
///   supplied an integer >= 1.
/// - `tags` becomes `[]` when missing or not an array.
///
/// Anything this pass cannot repair (missing title, ingredients that are not
/// an array, ...) is left untouched for the validator to report.
pub fn apply_defaults(mut candidate: Value) -> Value {
    if let Some(obj) = candidate.as_object_mut() {
        let servings_ok = obj
            .get("servings")
            .and_then(Value::as_f64)
            .map(|n| n > 0.0)
            .unwrap_or(false);
        if !servings_ok {
            obj.insert("servings".to_string(), json!(DEFAULT_SERVINGS));
        }

        if let Some(Value::Array(ingredients)) = obj.get_mut("ingredients") {
            for ingredient in ingredients.iter_mut() {
                let Some(item) = ingredient.as_object_mut() else {
                    continue;
                };

                if item.get("quantity").and_then(Value::as_f64).is_none() {
                    item.insert("quantity".to_string(), json!(1));
                }

                match item.get("unit").and_then(Value::as_str) {
                    Some(unit) => {
                        let lowered = unit.to_lowercase();
                        item.insert("unit".to_string(), Value::String(lowered));
                    }
                    None => {
                        item.insert("unit".to_string(), Value::String(String::new()));
                    }
                }
            }
        }

        if let Some(Value::Array(steps)) = obj.get_mut("steps") {
            for (position, step) in steps.iter_mut().enumerate() {
                let Some(item) = step.as_object_mut() else {
                    continue;
                };

                let order_ok = item
                    .get("order")
                    .and_then(Value::as_u64)
                    .map(|n| n >= 1)
                    .unwrap_or(false);
                if !order_ok {
                    item.insert("order".to_string(), json!(position + 1));
                }
            }
        }

        if !obj.get("tags").map(Value::is_array).unwrap_or(false) {
            obj.insert("tags".to_string(), json!([]));
        }
    }

    candidate
}
