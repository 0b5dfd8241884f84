//! Local validation of registration and password forms.
//!
//! Everything here runs before the identity provider is contacted, and every
//! check runs: a form with three problems reports three [`FieldError`]s.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use framecraft_core::Email;

use crate::models::{BusinessAddress, ProfileUpdate};

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum full-name length, in characters.
pub const MAX_NAME_LENGTH: usize = 100;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ()\-]{7,20}$").expect("Invalid regex"));

static TAX_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-]+$").expect("Invalid regex"));

/// One failed check on one form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Form field name (`email`, `password`, `address.city`, ...).
    pub field: &'static str,
    /// Stable identifier of the failed rule.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All failures found on a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Failure codes recorded against `field`.
    #[must_use]
    pub fn codes_for(&self, field: &str) -> Vec<&'static str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.code)
            .collect()
    }

    fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    fn extend(&mut self, errors: impl IntoIterator<Item = FieldError>) {
        self.0.extend(errors);
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.0.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|e| e.message.clone()).collect();
        f.write_str(&messages.join("; "))
    }
}

/// Sign-up form for an individual (B2C) customer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndividualRegistration {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
    pub phone: Option<String>,
}

/// Sign-up form for a business (B2B) partner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessRegistration {
    /// The person registering on behalf of the business.
    pub account: IndividualRegistration,
    pub company_name: String,
    pub business_type: Option<String>,
    pub tax_id: Option<String>,
    pub address: BusinessAddress,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
}

/// Parsed values of a valid business registration.
#[derive(Debug, Clone)]
pub struct ValidBusinessRegistration {
    pub email: Email,
    pub contact_email: Option<Email>,
}

/// Parse an email address, reporting failure against `field`.
///
/// # Errors
///
/// Returns a `FieldError` describing why the address is invalid.
pub fn validate_email(field: &'static str, input: &str) -> Result<Email, FieldError> {
    Email::parse(input).map_err(|e| FieldError::new(field, "invalid_email", e.to_string()))
}

/// Password strength failures, one per unmet rule.
#[must_use]
pub fn password_failures(field: &'static str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            field,
            "too_short",
            format!("password must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }
    if !password.chars().any(char::is_uppercase) {
        errors.push(FieldError::new(
            field,
            "missing_uppercase",
            "password must contain an uppercase letter",
        ));
    }
    if !password.chars().any(char::is_lowercase) {
        errors.push(FieldError::new(
            field,
            "missing_lowercase",
            "password must contain a lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new(
            field,
            "missing_digit",
            "password must contain a digit",
        ));
    }

    errors
}

/// Check password strength.
///
/// # Errors
///
/// Returns every unmet password rule.
pub fn validate_password(password: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    errors.extend(password_failures("password", password));
    errors.into_result(())
}

/// Validate an individual registration form.
///
/// # Errors
///
/// Returns all field failures found on the form.
pub fn validate_individual(form: &IndividualRegistration) -> Result<Email, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let email = check_account(form, &mut errors);
    match email {
        Some(email) => errors.into_result(email),
        None => Err(errors),
    }
}

/// Validate a business partner registration form.
///
/// # Errors
///
/// Returns all field failures found on the form, including those on the
/// embedded account section.
pub fn validate_business(
    form: &BusinessRegistration,
) -> Result<ValidBusinessRegistration, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let email = check_account(&form.account, &mut errors);

    if form.company_name.trim().is_empty() {
        errors.push(FieldError::new(
            "company_name",
            "required",
            "company name is required",
        ));
    }

    for (field, value) in [
        ("address.street", &form.address.street),
        ("address.city", &form.address.city),
        ("address.zip", &form.address.zip),
        ("address.country", &form.address.country),
    ] {
        if value.trim().is_empty() {
            errors.push(FieldError::new(field, "required", format!("{field} is required")));
        }
    }

    if let Some(tax_id) = present(form.tax_id.as_deref())
        && !TAX_ID_RE.is_match(tax_id)
    {
        errors.push(FieldError::new(
            "tax_id",
            "invalid_tax_id",
            "tax ID may contain only letters, digits and dashes",
        ));
    }

    if let Some(phone) = present(form.contact_phone.as_deref())
        && !PHONE_RE.is_match(phone)
    {
        errors.push(FieldError::new(
            "contact_phone",
            "invalid_phone",
            "contact phone number is not valid",
        ));
    }

    let contact_email = match present(form.contact_email.as_deref()) {
        Some(input) => match validate_email("contact_email", input) {
            Ok(email) => Some(email),
            Err(e) => {
                errors.push(e);
                None
            }
        },
        None => None,
    };

    match email {
        Some(email) => errors.into_result(ValidBusinessRegistration {
            email,
            contact_email,
        }),
        None => Err(errors),
    }
}

/// Validate the fields a profile update would change.
///
/// # Errors
///
/// Returns every failed check on the provided fields.
pub fn validate_profile_update(update: &ProfileUpdate) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if let Some(name) = update.full_name.as_deref() {
        errors.extend(name_failures(name));
    }
    if let Some(phone) = present(update.phone.as_deref())
        && !PHONE_RE.is_match(phone)
    {
        errors.push(FieldError::new("phone", "invalid_phone", "phone number is not valid"));
    }

    errors.into_result(())
}

fn name_failures(name: &str) -> Option<FieldError> {
    let name = name.trim();
    if name.is_empty() {
        Some(FieldError::new("full_name", "required", "full name is required"))
    } else if name.chars().count() > MAX_NAME_LENGTH {
        Some(FieldError::new(
            "full_name",
            "too_long",
            format!("full name must be at most {MAX_NAME_LENGTH} characters"),
        ))
    } else {
        None
    }
}

/// Checks shared by both registration forms. Returns the parsed email when
/// it is valid; other failures are pushed onto `errors`.
fn check_account(form: &IndividualRegistration, errors: &mut ValidationErrors) -> Option<Email> {
    let email = match validate_email("email", &form.email) {
        Ok(email) => Some(email),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    errors.extend(password_failures("password", &form.password));

    if form.password != form.confirm_password {
        errors.push(FieldError::new(
            "confirm_password",
            "mismatch",
            "passwords do not match",
        ));
    }

    errors.extend(name_failures(&form.full_name));

    if let Some(phone) = present(form.phone.as_deref())
        && !PHONE_RE.is_match(phone)
    {
        errors.push(FieldError::new("phone", "invalid_phone", "phone number is not valid"));
    }

    email
}

/// Treat blank optional inputs as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
