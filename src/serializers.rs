//! Request-body validation for books, authors and accounts.
//!
//! Bodies are taken as raw JSON so that every bad field can be reported at
//! once, keyed by field name, instead of failing on the first serde error.

use chrono::Datelike;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::AuthorRow;

pub const TITLE_MAX_LEN: usize = 200;
pub const NAME_MAX_LEN: usize = 100;
pub const USERNAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 8;
/// Used when a book is created without a publication year.
pub const DEFAULT_PUBLICATION_YEAR: i64 = 2020;

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const NULL: &str = "This field may not be null.";

/// How strictly a body is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    /// PUT: every required field must be present.
    Replace,
    /// PATCH: only the supplied fields are validated.
    Partial,
}

impl Mode {
    fn requires_all(self) -> bool {
        !matches!(self, Mode::Partial)
    }
}

pub fn current_year() -> i64 {
    i64::from(chrono::Local::now().year())
}

/// Rejects years after `current_year`.
pub fn validate_publication_year(value: i64, current_year: i64) -> Result<i64, String> {
    if value > current_year {
        return Err(format!(
            "Publication year cannot be in the future. Current year is {}.",
            current_year
        ));
    }
    Ok(value)
}

fn as_object(body: &Value) -> AppResult<&Map<String, Value>> {
    body.as_object().ok_or_else(|| {
        let kind = match body {
            Value::Array(_) => "list",
            Value::String(_) => "str",
            Value::Number(_) => "int",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::Object(_) => "dict",
        };
        AppError::BadRequest(format!("Invalid data. Expected a dictionary, but got {}.", kind))
    })
}

/// Reads a string field; `None` when it is absent (and allowed to be).
fn string_field(
    obj: &Map<String, Value>,
    field: &str,
    max_len: usize,
    required: bool,
    errors: &mut FieldErrors,
) -> Option<String> {
    match obj.get(field) {
        None => {
            if required {
                errors.add(field, REQUIRED);
            }
            None
        }
        Some(Value::Null) => {
            errors.add(field, NULL);
            None
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                errors.add(field, BLANK);
                return None;
            }
            if trimmed.chars().count() > max_len {
                errors.add(field, format!("Ensure this field has no more than {} characters.", max_len));
                return None;
            }
            Some(trimmed.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(_) => {
            errors.add(field, "Not a valid string.");
            None
        }
    }
}

/// Integers may arrive as JSON numbers (without a fractional part) or as
/// numeric strings.
fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 1e15).map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn integer_field(obj: &Map<String, Value>, field: &str, errors: &mut FieldErrors) -> Option<i64> {
    match obj.get(field)? {
        Value::Null => {
            errors.add(field, NULL);
            None
        }
        value => {
            let parsed = parse_integer(value);
            if parsed.is_none() {
                errors.add(field, "A valid integer is required.");
            }
            parsed
        }
    }
}

/// Validated fields of a book body. Absent fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookInput {
    pub title: Option<String>,
    pub publication_year: Option<i64>,
    pub author_id: Option<i64>,
}

impl BookInput {
    /// Checks shape and field rules that need no database access.
    pub fn parse(body: &Value, mode: Mode, current_year: i64) -> AppResult<(BookInput, FieldErrors)> {
        let obj = as_object(body)?;
        let mut errors = FieldErrors::new();

        let title = string_field(obj, "title", TITLE_MAX_LEN, mode.requires_all(), &mut errors);

        let publication_year = integer_field(obj, "publication_year", &mut errors).and_then(|year| {
            match validate_publication_year(year, current_year) {
                Ok(year) => Some(year),
                Err(message) => {
                    errors.add("publication_year", message);
                    None
                }
            }
        });

        let author_id = match obj.get("author") {
            None => {
                if mode.requires_all() {
                    errors.add("author", REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                errors.add("author", NULL);
                None
            }
            Some(value) => {
                let parsed = parse_integer(value);
                if parsed.is_none() {
                    errors.add("author", format!("Incorrect type. Expected pk value, received {}.", json_kind(value)));
                }
                parsed
            }
        };

        Ok((BookInput { title, publication_year, author_id }, errors))
    }

    /// Full validation: field rules plus the existence of the referenced
    /// author.
    pub async fn validate(pool: &SqlitePool, body: &Value, mode: Mode) -> AppResult<BookInput> {
        let (mut input, mut errors) = Self::parse(body, mode, current_year())?;
        if let Some(author_id) = input.author_id {
            if !AuthorRow::exists(pool, author_id).await? {
                errors.add("author", format!("Invalid pk \"{}\" - object does not exist.", author_id));
                input.author_id = None;
            }
        }
        errors.into_result()?;
        if mode == Mode::Create && input.publication_year.is_none() {
            input.publication_year = Some(DEFAULT_PUBLICATION_YEAR);
        }
        Ok(input)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "str",
        Value::Bool(_) => "bool",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
        Value::Number(_) => "float",
        Value::Null => "NoneType",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorInput {
    pub name: Option<String>,
}

impl AuthorInput {
    pub fn validate(body: &Value, mode: Mode) -> AppResult<AuthorInput> {
        let obj = as_object(body)?;
        let mut errors = FieldErrors::new();
        let name = string_field(obj, "name", NAME_MAX_LEN, mode.requires_all(), &mut errors);
        errors.into_result()?;
        Ok(AuthorInput { name })
    }
}

/// `username`/`password` pair for token issuance and session login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(body: &Value) -> AppResult<Credentials> {
        let obj = as_object(body)?;
        let mut errors = FieldErrors::new();
        let username = string_field(obj, "username", USERNAME_MAX_LEN, true, &mut errors);
        let password = raw_password(obj, &mut errors);
        errors.into_result()?;
        match (username, password) {
            (Some(username), Some(password)) => Ok(Credentials { username, password }),
            _ => Err(AppError::field("non_field_errors", "Unable to log in with provided credentials.")),
        }
    }
}

/// Passwords are taken verbatim; surrounding whitespace is significant.
fn raw_password(obj: &Map<String, Value>, errors: &mut FieldErrors) -> Option<String> {
    match obj.get("password") {
        None => {
            errors.add("password", REQUIRED);
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            errors.add("password", BLANK);
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) => {
            errors.add("password", NULL);
            None
        }
        Some(_) => {
            errors.add("password", "Not a valid string.");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl Registration {
    pub fn validate(body: &Value) -> AppResult<Registration> {
        let obj = as_object(body)?;
        let mut errors = FieldErrors::new();

        let username = string_field(obj, "username", USERNAME_MAX_LEN, true, &mut errors).filter(|name| {
            let ok = name.chars().all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
            if !ok {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
            ok
        });

        let password = raw_password(obj, &mut errors).filter(|pw| {
            let ok = pw.chars().count() >= PASSWORD_MIN_LEN;
            if !ok {
                errors.add(
                    "password",
                    format!("This password is too short. It must contain at least {} characters.", PASSWORD_MIN_LEN),
                );
            }
            ok
        });

        let email = match obj.get("email") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => {
                let s = s.trim();
                if !s.is_empty() && !looks_like_email(s) {
                    errors.add("email", "Enter a valid email address.");
                }
                s.to_string()
            }
            Some(_) => {
                errors.add("email", "Not a valid string.");
                String::new()
            }
        };

        errors.into_result()?;
        match (username, password) {
            (Some(username), Some(password)) => Ok(Registration { username, password, email }),
            _ => Err(AppError::BadRequest("Invalid registration data".to_string())),
        }
    }
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

/// `{"message": ..., "data": ...}` returned by create and update.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub message: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self { message: message.into(), data }
    }
}
