//! Reading submission form: raw input checked against one declarative rule
//! per measurement, coerced to numbers, range-checked on the parsed payload
//! and handed to the repository.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{NewReading, Reading};
use crate::repository::{ReadingRepository, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Height,
    Weight,
    Temperature,
    HeartRate,
    BpSystolic,
    BpDiastolic,
    RespiratoryRate,
    GlucoseLevel,
    OxygenSaturation,
}

impl Measurement {
    pub fn as_str(self) -> &'static str {
        match self {
            Measurement::Height => "height",
            Measurement::Weight => "weight",
            Measurement::Temperature => "temperature",
            Measurement::HeartRate => "heart_rate",
            Measurement::BpSystolic => "bp_systolic",
            Measurement::BpDiastolic => "bp_diastolic",
            Measurement::RespiratoryRate => "respiratory_rate",
            Measurement::GlucoseLevel => "glucose_level",
            Measurement::OxygenSaturation => "oxygen_saturation",
        }
    }
}

/// How one measurement's text becomes a number. Bounds live on
/// [`NewReading`] as `validator` ranges.
pub struct FieldRule {
    pub field: Measurement,
    pub nullable: bool,
    pub message: &'static str,
}

impl FieldRule {
    /// Blank input is "not measured"; anything else must be a finite number.
    pub fn coerce(&self, raw: &str) -> Result<Option<f64>, &'static str> {
        let text = raw.trim();
        if text.is_empty() {
            return if self.nullable { Ok(None) } else { Err(self.message) };
        }

        let value: f64 = text.parse().map_err(|_| self.message)?;
        if !value.is_finite() {
            return Err(self.message);
        }
        Ok(Some(value))
    }
}

pub static READING_RULES: [FieldRule; 9] = [
    FieldRule {
        field: Measurement::Height,
        nullable: true,
        message: "Height must be a number",
    },
    FieldRule {
        field: Measurement::Weight,
        nullable: true,
        message: "Weight must be a number",
    },
    FieldRule {
        field: Measurement::Temperature,
        nullable: true,
        message: "Temperature must be a number",
    },
    FieldRule {
        field: Measurement::HeartRate,
        nullable: true,
        message: "Heart rate must be a number",
    },
    FieldRule {
        field: Measurement::BpSystolic,
        nullable: true,
        message: "Systolic pressure must be a number",
    },
    FieldRule {
        field: Measurement::BpDiastolic,
        nullable: true,
        message: "Diastolic pressure must be a number",
    },
    FieldRule {
        field: Measurement::RespiratoryRate,
        nullable: true,
        message: "Respiratory rate must be a number",
    },
    FieldRule {
        field: Measurement::GlucoseLevel,
        nullable: true,
        message: "Glucose level must be a number",
    },
    FieldRule {
        field: Measurement::OxygenSaturation,
        nullable: true,
        message: "Oxygen saturation must be a number between 0 and 100",
    },
];

/// Field name to message, for every field that failed.
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(f64),
}

// Clients send either what was typed or an already numeric value; null is blank.
fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<TextOrNumber>::deserialize(deserializer)? {
        None => String::new(),
        Some(TextOrNumber::Text(text)) => text,
        Some(TextOrNumber::Number(value)) => value.to_string(),
    })
}

/// Raw input as typed; every field defaults to blank ("not measured").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingFormValues {
    #[serde(deserialize_with = "text_or_number")]
    pub height: String,
    #[serde(deserialize_with = "text_or_number")]
    pub weight: String,
    #[serde(deserialize_with = "text_or_number")]
    pub temperature: String,
    #[serde(deserialize_with = "text_or_number")]
    pub heart_rate: String,
    #[serde(deserialize_with = "text_or_number")]
    pub bp_systolic: String,
    #[serde(deserialize_with = "text_or_number")]
    pub bp_diastolic: String,
    #[serde(deserialize_with = "text_or_number")]
    pub respiratory_rate: String,
    #[serde(deserialize_with = "text_or_number")]
    pub glucose_level: String,
    #[serde(deserialize_with = "text_or_number")]
    pub oxygen_saturation: String,
    pub notes: String,
}

impl ReadingFormValues {
    fn raw(&self, field: Measurement) -> &str {
        match field {
            Measurement::Height => &self.height,
            Measurement::Weight => &self.weight,
            Measurement::Temperature => &self.temperature,
            Measurement::HeartRate => &self.heart_rate,
            Measurement::BpSystolic => &self.bp_systolic,
            Measurement::BpDiastolic => &self.bp_diastolic,
            Measurement::RespiratoryRate => &self.respiratory_rate,
            Measurement::GlucoseLevel => &self.glucose_level,
            Measurement::OxygenSaturation => &self.oxygen_saturation,
        }
    }

    /// Applies every rule once, then the payload's range checks, and collects
    /// all failures.
    pub fn validate(&self, patient_id: Uuid) -> Result<NewReading, FieldErrors> {
        let mut reading = NewReading::new(patient_id);
        let mut errors = FieldErrors::new();

        for rule in &READING_RULES {
            match rule.coerce(self.raw(rule.field)) {
                Ok(value) => set_measurement(&mut reading, rule.field, value),
                Err(message) => {
                    errors.insert(rule.field.as_str(), message.to_string());
                }
            }
        }

        if let Err(invalid) = Validate::validate(&reading) {
            let by_field = invalid.field_errors();
            for rule in &READING_RULES {
                let name = rule.field.as_str();
                if let Some(failure) = by_field.get(name).and_then(|failures| failures.first()) {
                    let message = failure.message.as_deref().unwrap_or(rule.message);
                    errors.entry(name).or_insert_with(|| message.to_string());
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let notes = self.notes.trim();
        reading.diagnosed_for = (!notes.is_empty()).then(|| notes.to_string());
        Ok(reading)
    }
}

fn set_measurement(reading: &mut NewReading, field: Measurement, value: Option<f64>) {
    let slot = match field {
        Measurement::Height => &mut reading.height,
        Measurement::Weight => &mut reading.weight,
        Measurement::Temperature => &mut reading.temperature,
        Measurement::HeartRate => &mut reading.heart_rate,
        Measurement::BpSystolic => &mut reading.bp_systolic,
        Measurement::BpDiastolic => &mut reading.bp_diastolic,
        Measurement::RespiratoryRate => &mut reading.respiratory_rate,
        Measurement::GlucoseLevel => &mut reading.glucose_level,
        Measurement::OxygenSaturation => &mut reading.oxygen_saturation,
    };
    *slot = value;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
    pub label: String,
    pub href: String,
}

/// Toast shown to the doctor after a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
    pub action: Option<NotificationAction>,
}

impl Notification {
    pub fn reading_saved(reading: &Reading) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: "Reading submitted".into(),
            description: "The patient's medical reading has been saved successfully.".into(),
            action: Some(NotificationAction {
                label: "View".into(),
                href: format!(
                    "/dashboard/patients/{}/readings/{}",
                    reading.patient_id, reading.id
                ),
            }),
        }
    }

    pub fn submission_failed() -> Self {
        Self {
            level: NotificationLevel::Error,
            title: "Error".into(),
            description: "There was a problem submitting the reading.".into(),
            action: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submitted {
    pub reading: Reading,
    pub notification: Notification,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitError {
    Invalid(FieldErrors),
    Failed {
        error: RepositoryError,
        notification: Notification,
    },
}

#[derive(Debug, Clone)]
pub struct ReadingForm {
    patient_id: Uuid,
    values: ReadingFormValues,
}

impl ReadingForm {
    pub fn new(patient_id: Uuid) -> Self {
        Self::with_values(patient_id, ReadingFormValues::default())
    }

    pub fn with_values(patient_id: Uuid, values: ReadingFormValues) -> Self {
        Self {
            patient_id,
            values,
        }
    }

    pub fn values(&self) -> &ReadingFormValues {
        &self.values
    }

    pub fn reset(&mut self) {
        self.values = ReadingFormValues::default();
    }

    /// Invalid input never reaches the repository. The form stays mutably
    /// borrowed until the create call returns, so it cannot be edited or
    /// submitted again while pending. Values are cleared only on success.
    pub async fn submit(&mut self, repo: &ReadingRepository) -> Result<Submitted, SubmitError> {
        let data = self.values.validate(self.patient_id).map_err(SubmitError::Invalid)?;

        match repo.create_reading(data).await {
            Ok(reading) => {
                self.reset();
                let notification = Notification::reading_saved(&reading);
                Ok(Submitted {
                    reading,
                    notification,
                })
            }
            Err(error) => {
                tracing::error!(patient_id = %self.patient_id, error = %error, "Error submitting patient reading");
                Err(SubmitError::Failed {
                    error,
                    notification: Notification::submission_failed(),
                })
            }
        }
    }
}
