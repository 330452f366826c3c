//! Checks for student create/update payloads.
//!
//! Every rule runs on every request; all failing fields are reported together.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::err::{Error, FieldError};
use crate::models::{NewStudent, Subject};

pub const MIN_NAME_CHARS: usize = 2;
pub const MIN_GRADE: i64 = 0;
pub const MAX_GRADE: i64 = 100;

lazy_static! {
    static ref EMAIL: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$"
    )
    .unwrap();
}

const NAME_MESSAGE: &str = "Name is required, min 2 chars";
const EMAIL_MESSAGE: &str = "Valid email required";
const SUBJECT_MESSAGE: &str = "Subject must be one of Math, Science, English, History";
const GRADE_MESSAGE: &str = "Grade must be integer between 0 and 100";

/// Lowercased and trimmed; the form every stored and compared email takes.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_student(body: &Value) -> Result<NewStudent, Error> {
    let fields = body.as_object().ok_or_else(|| Error::InvalidPayload {
        message: "Request body must be a JSON object".to_string(),
    })?;

    let mut errors = Vec::new();
    let name = check(&mut errors, "name", NAME_MESSAGE, parse_name(fields));
    let email = check(&mut errors, "email", EMAIL_MESSAGE, parse_email(fields));
    let subject = check(&mut errors, "subject", SUBJECT_MESSAGE, parse_subject(fields));
    let grade = check(&mut errors, "grade", GRADE_MESSAGE, parse_grade(fields));

    match (name, email, subject, grade) {
        (Some(name), Some(email), Some(subject), Some(grade)) => Ok(NewStudent {
            name,
            email,
            subject,
            grade,
        }),
        _ => Err(Error::Validation { errors }),
    }
}

fn check<T>(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    message: &'static str,
    value: Option<T>,
) -> Option<T> {
    if value.is_none() {
        errors.push(FieldError { field, message });
    }
    value
}

fn parse_name(fields: &Map<String, Value>) -> Option<String> {
    let name = fields.get("name")?.as_str()?.trim();
    (name.chars().count() >= MIN_NAME_CHARS).then(|| name.to_string())
}

fn parse_email(fields: &Map<String, Value>) -> Option<String> {
    let email = fields.get("email")?.as_str()?.trim();
    EMAIL.is_match(email).then(|| normalize_email(email))
}

fn parse_subject(fields: &Map<String, Value>) -> Option<Subject> {
    fields.get("subject")?.as_str()?.parse().ok()
}

fn parse_grade(fields: &Map<String, Value>) -> Option<i64> {
    let grade = match fields.get("grade")? {
        Value::Number(number) => match number.as_i64() {
            Some(whole) => whole,
            None => number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)? as i64,
        },
        Value::String(text) => text.parse().ok()?,
        _ => return None,
    };
    (MIN_GRADE..=MAX_GRADE).contains(&grade).then(|| grade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failed_fields(body: Value) -> Vec<&'static str> {
        match validate_student(&body) {
            Err(Error::Validation { errors }) => errors.iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn accepts_and_normalizes_a_valid_student() {
        let student = validate_student(&json!({
            "name": "  Ana Lee ",
            "email": " Ana.Lee@EX.com ",
            "subject": "Math",
            "grade": 95
        }))
        .unwrap();

        assert_eq!(
            student,
            NewStudent {
                name: "Ana Lee".to_string(),
                email: "ana.lee@ex.com".to_string(),
                subject: Subject::Math,
                grade: 95,
            }
        );
    }

    #[test]
    fn grade_bounds_are_inclusive() {
        for grade in [0, 100] {
            let body = json!({"name": "Bo", "email": "bo@ex.com", "subject": "History", "grade": grade});
            assert_eq!(validate_student(&body).unwrap().grade, grade);
        }
    }

    #[test]
    fn out_of_range_grades_are_rejected() {
        for grade in [json!(101), json!(-1), json!(95.5), json!(true), json!("abc")] {
            let body = json!({"name": "Bo", "email": "bo@ex.com", "subject": "Math", "grade": grade});
            assert_eq!(failed_fields(body), vec!["grade"]);
        }
    }

    #[test]
    fn whole_float_grade_is_accepted() {
        let body = json!({"name": "Bo", "email": "bo@ex.com", "subject": "Math", "grade": 95.0});
        assert_eq!(validate_student(&body).unwrap().grade, 95);

        let body = json!({"name": "Bo", "email": "bo@ex.com", "subject": "Math", "grade": 100.5});
        assert_eq!(failed_fields(body), vec!["grade"]);
    }

    #[test]
    fn numeric_string_grade_is_accepted() {
        let body = json!({"name": "Bo", "email": "bo@ex.com", "subject": "Math", "grade": "42"});
        assert_eq!(validate_student(&body).unwrap().grade, 42);
    }

    #[test]
    fn collects_every_failing_field() {
        let body = json!({"name": " a ", "email": "not-an-email", "subject": "math", "grade": 500});
        assert_eq!(failed_fields(body), vec!["name", "email", "subject", "grade"]);
        assert_eq!(failed_fields(json!({})), vec!["name", "email", "subject", "grade"]);
    }

    #[test]
    fn rejects_bad_email_shapes() {
        for email in ["", "a@", "@b.com", "a b@c.com", "a@b", "a@@b.com"] {
            let body = json!({"name": "Bo", "email": email, "subject": "Math", "grade": 1});
            assert_eq!(failed_fields(body), vec!["email"], "{}", email);
        }
    }

    #[test]
    fn non_object_body_is_invalid_payload() {
        assert!(matches!(
            validate_student(&json!([1, 2])),
            Err(Error::InvalidPayload { .. })
        ));
    }
}
