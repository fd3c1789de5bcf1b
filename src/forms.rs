use std::collections::BTreeMap;

use serde::Deserialize;
use validator::{Validate, ValidationErrors};

use crate::feedback::Feedback;
use crate::user::Registration;

/// Messages to show next to each form field.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut form = Self::default();

        for (field, errs) in errors.field_errors() {
            for e in errs {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                form.add(&field, message);
            }
        }

        form
    }
}

fn errors_of(result: Result<(), ValidationErrors>) -> FormErrors {
    result.err().map(FormErrors::from).unwrap_or_default()
}

/// Usernames end up in paths, keep them to characters that need no escaping.
fn username_chars(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[derive(Debug, Default, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct RegisterForm {
    #[validate(length(min = 1, max = 20, message = "Username must be 1 to 20 characters."))]
    pub username: String,

    #[validate(length(min = 1, message = "This field is required."))]
    pub password: String,

    #[validate(
        email(message = "Invalid email address."),
        length(max = 50, message = "Email must be at most 50 characters.")
    )]
    pub email: String,

    #[validate(length(min = 1, max = 30, message = "First name must be 1 to 30 characters."))]
    pub firstname: String,

    #[validate(length(min = 1, max = 30, message = "Last name must be 1 to 30 characters."))]
    pub lastname: String,
}

impl RegisterForm {
    pub fn clean(&self) -> Result<Registration, FormErrors> {
        let mut errors = errors_of(self.validate());

        if !username_chars(&self.username) {
            errors.add(
                "username",
                "Only letters, digits, '_', '-' and '.' are allowed.",
            );
        }

        errors.into_result()?;

        Ok(Registration {
            username: self.username.clone(),
            password: self.password.clone(),
            email: self.email.clone(),
            first_name: self.firstname.clone(),
            last_name: self.lastname.clone(),
        })
    }
}

#[derive(Debug, Default, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct LoginForm {
    #[validate(length(min = 1, max = 20, message = "Username must be 1 to 20 characters."))]
    pub username: String,

    #[validate(length(min = 1, message = "This field is required."))]
    pub password: String,
}

impl LoginForm {
    pub fn clean(&self) -> Result<(), FormErrors> {
        errors_of(self.validate()).into_result()
    }
}

#[derive(Debug, Default, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct FeedbackForm {
    #[validate(length(min = 1, max = 100, message = "Title must be 1 to 100 characters."))]
    pub title: String,

    #[validate(length(min = 1, message = "This field is required."))]
    pub content: String,
}

impl FeedbackForm {
    pub fn clean(&self) -> Result<(), FormErrors> {
        errors_of(self.validate()).into_result()
    }
}

impl From<&Feedback> for FeedbackForm {
    fn from(fb: &Feedback) -> Self {
        Self {
            title: fb.title.clone(),
            content: fb.content.clone(),
        }
    }
}
