use chrono::{Datelike, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::schema::{doctors, patients, readings, reports};

/// A point-in-time set of vital-sign measurements for one patient.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = readings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Reading {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub temperature: Option<f64>,
    pub heart_rate: Option<f64>,
    pub bp_systolic: Option<f64>,
    pub bp_diastolic: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub glucose_level: Option<f64>,
    pub oxygen_saturation: Option<f64>,
    pub diagnosed_for: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Doctor-authored reading payload; the service assigns id and timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewReading {
    pub patient_id: Uuid,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub temperature: Option<f64>,
    pub heart_rate: Option<f64>,
    pub bp_systolic: Option<f64>,
    pub bp_diastolic: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub glucose_level: Option<f64>,
    #[validate(range(
        min = 0.0,
        max = 100.0,
        message = "Oxygen saturation must be a number between 0 and 100"
    ))]
    pub oxygen_saturation: Option<f64>,
    pub diagnosed_for: Option<String>,
}

impl NewReading {
    pub fn new(patient_id: Uuid) -> Self {
        Self {
            patient_id,
            ..Self::default()
        }
    }

    // Postgres TIMESTAMP keeps microseconds, so trim here to round-trip exactly.
    pub fn to_reading(self) -> Reading {
        let now = Utc::now().naive_utc().trunc_subsecs(6);
        Reading {
            id: Uuid::new_v4(),
            patient_id: self.patient_id,
            height: self.height,
            weight: self.weight,
            temperature: self.temperature,
            heart_rate: self.heart_rate,
            bp_systolic: self.bp_systolic,
            bp_diastolic: self.bp_diastolic,
            respiratory_rate: self.respiratory_rate,
            glucose_level: self.glucose_level,
            oxygen_saturation: self.oxygen_saturation,
            diagnosed_for: self.diagnosed_for,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = patients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Patient {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub name: String,
    pub dob: NaiveDate,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Patient {
    /// Age in whole years on `today`; zero for birth dates in the future.
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        let mut years = today.year() - self.dob.year();
        if (today.month(), today.day()) < (self.dob.month(), self.dob.day()) {
            years -= 1;
        }
        years.max(0) as u32
    }

    pub fn short_id(&self) -> String {
        short_id(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = doctors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Diagnostic summary produced outside this service; read-only here.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Report {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub reading_id: Option<Uuid>,
    pub summary: String,
    pub diagnosis: String,
    pub recommendations: String,
    pub urgency_level: String,
    pub additional_notes: Option<String>,
    pub created_at: NaiveDateTime,
}

/// First six characters of the hyphenated id, as shown in page headers.
pub fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(6).collect()
}
