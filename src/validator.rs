//! Structural validation of normalized recipe candidates.
//!
//! Pure: every applicable rule is checked and its error recorded, rather
//! than stopping at the first failure. Defaults are the normalizer's job;
//! a candidate that still has holes here is reported, not repaired.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Validate a candidate against the canonical recipe shape.
pub fn validate(candidate: &Value) -> ValidationReport {
    let Some(obj) = candidate.as_object() else {
        return ValidationReport {
            valid: false,
            errors: vec!["recipe must be a JSON object".to_string()],
        };
    };

    let mut errors = Vec::new();

    match obj.get("title") {
        Some(Value::String(_)) => {}
        Some(_) => errors.push("title must be a string".to_string()),
        None => errors.push("missing required field: title".to_string()),
    }

    match obj.get("servings") {
        Some(Value::Number(_)) => {}
        Some(_) => errors.push("servings must be a number".to_string()),
        None => errors.push("missing required field: servings".to_string()),
    }

    match obj.get("ingredients") {
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                check_ingredient(index, item, &mut errors);
            }
        }
        _ => errors.push("ingredients must be an array".to_string()),
    }

    match obj.get("steps") {
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                check_step(index, item, &mut errors);
            }
        }
        _ => errors.push("steps must be an array".to_string()),
    }

    if !obj.get("tags").map(Value::is_array).unwrap_or(false) {
        errors.push("tags must be an array".to_string());
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn check_ingredient(index: usize, item: &Value, errors: &mut Vec<String>) {
    let Some(obj) = item.as_object() else {
        errors.push(format!("ingredients[{index}] must be an object"));
        return;
    };

    if !obj.get("name").map(Value::is_string).unwrap_or(false) {
        errors.push(format!("ingredients[{index}].name must be a string"));
    }
    if !obj.get("quantity").map(Value::is_number).unwrap_or(false) {
        errors.push(format!("ingredients[{index}].quantity must be a number"));
    }
    if !obj.get("unit").map(Value::is_string).unwrap_or(false) {
        errors.push(format!("ingredients[{index}].unit must be a string"));
    }
}

fn check_step(index: usize, item: &Value, errors: &mut Vec<String>) {
    let Some(obj) = item.as_object() else {
        errors.push(format!("steps[{index}] must be an object"));
        return;
    };

    if !obj.get("order").map(Value::is_number).unwrap_or(false) {
        errors.push(format!("steps[{index}].order must be a number"));
    }
    if !obj.get("text").map(Value::is_string).unwrap_or(false) {
        errors.push(format!("steps[{index}].text must be a string"));
    }
}
