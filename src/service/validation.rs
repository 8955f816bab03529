//! Request validation from catalog rules.

use crate::config::ValidationRule;
use crate::error::AppError;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

pub struct RequestValidator;

impl RequestValidator {
    /// Validate body against per-column rules. All required fields must be present.
    pub fn validate(
        body: &HashMap<String, Value>,
        rules: &HashMap<String, ValidationRule>,
    ) -> Result<(), AppError> {
        for (col, rule) in rules {
            let val = body.get(col);
            if rule.required == Some(true) && (val.is_none() || val == Some(&Value::Null)) {
                return Err(AppError::Validation(format!("{} is required", col)));
            }
            if let Some(v) = val {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present in body (for PUT). Required is not enforced for missing fields.
    pub fn validate_partial(
        body: &HashMap<String, Value>,
        rules: &HashMap<String, ValidationRule>,
    ) -> Result<(), AppError> {
        for (col, v) in body {
            if let Some(rule) = rules.get(col) {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    col, max
                )));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at least {} characters",
                    col, min
                )));
            }
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        let mut ok = false;
        for a in allowed {
            if value_eq(v, a) {
                ok = true;
                break;
            }
        }
        if !ok {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = v.as_f64() {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = v.as_f64() {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let ok = match format.to_lowercase().as_str() {
        "integer" => v.is_i64() || v.is_u64(),
        "number" => v.is_number(),
        "boolean" => v.is_boolean(),
        "string" => v.is_string(),
        "date" => v
            .as_str()
            .map(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
            .unwrap_or(false),
        "datetime" => v.as_str().map(is_datetime).unwrap_or(false),
        "email" => match (v.as_str(), Regex::new(EMAIL_PATTERN)) {
            (Some(s), Ok(re)) => re.is_match(s),
            _ => false,
        },
        _ => true,
    };
    if ok {
        return Ok(());
    }
    let expected = match format {
        "integer" => "an integer",
        "number" => "a number",
        "boolean" => "a boolean",
        "string" => "a string",
        "date" => "a date (YYYY-MM-DD)",
        "datetime" => "a date-time (YYYY-MM-DDTHH:MM:SS)",
        "email" => "a valid email",
        other => other,
    };
    Err(AppError::Validation(format!("{} must be {}", col, expected)))
}

fn is_datetime(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> HashMap<String, Value> {
        v.as_object().unwrap().clone().into_iter().collect()
    }

    fn rules() -> HashMap<String, ValidationRule> {
        let mut rules = HashMap::new();
        rules.insert(
            "isocode".to_string(),
            ValidationRule {
                required: Some(true),
                max_length: Some(2),
                format: Some("string".into()),
                ..ValidationRule::default()
            },
        );
        rules.insert(
            "fromdate".to_string(),
            ValidationRule {
                format: Some("date".into()),
                ..ValidationRule::default()
            },
        );
        rules.insert(
            "party_id".to_string(),
            ValidationRule {
                format: Some("integer".into()),
                minimum: Some(1.0),
                ..ValidationRule::default()
            },
        );
        rules
    }

    #[test]
    fn required_field_must_be_present_and_not_null() {
        let err = RequestValidator::validate(&map(json!({"isocode": null})), &rules()).unwrap_err();
        assert_eq!(err.to_string(), "isocode is required");
        assert!(RequestValidator::validate(&map(json!({"isocode": "TH"})), &rules()).is_ok());
    }

    #[test]
    fn partial_validation_skips_missing_required() {
        assert!(RequestValidator::validate_partial(&map(json!({"fromdate": "2024-02-29"})), &rules()).is_ok());
    }

    #[test]
    fn length_counts_characters() {
        let err = RequestValidator::validate(&map(json!({"isocode": "THA"})), &rules()).unwrap_err();
        assert_eq!(err.to_string(), "isocode must be at most 2 characters");
        let mut thai = rules();
        thai.get_mut("isocode").unwrap().max_length = Some(3);
        assert!(RequestValidator::validate(&map(json!({"isocode": "ไทย"})), &thai).is_ok());
    }

    #[test]
    fn formats_reject_wrong_json_types() {
        let err = RequestValidator::validate_partial(&map(json!({"party_id": "7"})), &rules()).unwrap_err();
        assert_eq!(err.to_string(), "party_id must be an integer");
        let err = RequestValidator::validate_partial(&map(json!({"fromdate": "2024-13-01"})), &rules()).unwrap_err();
        assert!(err.to_string().starts_with("fromdate must be a date"));
        let err = RequestValidator::validate_partial(&map(json!({"party_id": 0})), &rules()).unwrap_err();
        assert_eq!(err.to_string(), "party_id must be at least 1");
    }

    #[test]
    fn datetime_accepts_common_shapes() {
        assert!(is_datetime("2024-05-01T10:00:00"));
        assert!(is_datetime("2024-05-01T10:00:00+07:00"));
        assert!(!is_datetime("yesterday"));
    }

    #[test]
    fn email_format() {
        assert!(validate_format("email", &json!("a@b.co"), "email").is_ok());
        assert!(validate_format("email", &json!("nope"), "email").is_err());
    }
}
