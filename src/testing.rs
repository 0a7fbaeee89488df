//! In-memory collaborators for unit and handler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, SubsecRound, Utc};
use uuid::Uuid;

use crate::cache::{CacheInvalidator, PageCache};
use crate::db::{ClinicStore, ReadingStore, StoreError};
use crate::models::{Doctor, NewReading, Patient, Reading, Report};
use crate::session::{AuthError, AuthProvider, AuthUser, SessionAccessor};
use crate::AppState;

#[derive(Default)]
struct Tables {
    doctors: Vec<Doctor>,
    patients: Vec<Patient>,
    readings: Vec<Reading>,
    reports: Vec<Report>,
}

/// Mirrors the Postgres store, including the patient foreign key.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    vanish_on_delete: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call fails as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Readings disappear just before `delete_reading` runs, as if another
    /// request had removed them first.
    pub fn set_vanish_on_delete(&self, vanish: bool) {
        self.vanish_on_delete.store(vanish, Ordering::SeqCst);
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection refused".into()));
        }
        Ok(self.tables.lock().unwrap())
    }

    pub fn seed_doctor(&self, name: &str) -> Doctor {
        let now = Utc::now().naive_utc();
        let doctor = Doctor {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@clinic.test", name.to_lowercase().replace(' ', ".")),
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().doctors.push(doctor.clone());
        doctor
    }

    /// A new doctor with one patient.
    pub fn seed_patient(&self, name: &str) -> (Doctor, Patient) {
        let doctor = self.seed_doctor("Dr Quinn");
        let patient = self.seed_patient_for(doctor.id, name);
        (doctor, patient)
    }

    pub fn seed_patient_for(&self, doctor_id: Uuid, name: &str) -> Patient {
        let now = Utc::now().naive_utc();
        let patient = Patient {
            id: Uuid::new_v4(),
            doctor_id,
            name: name.to_string(),
            dob: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(),
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().patients.push(patient.clone());
        patient
    }

    pub fn seed_reading(&self, patient_id: Uuid, minutes_ago: i64) -> Reading {
        let mut reading = NewReading::new(patient_id).to_reading();
        reading.created_at = (Utc::now() - Duration::minutes(minutes_ago))
            .naive_utc()
            .trunc_subsecs(6);
        reading.updated_at = reading.created_at;
        self.tables.lock().unwrap().readings.push(reading.clone());
        reading
    }

    pub fn seed_report(&self, patient_id: Uuid, summary: &str, minutes_ago: i64) -> Report {
        let report = Report {
            id: Uuid::new_v4(),
            patient_id,
            reading_id: None,
            summary: summary.to_string(),
            diagnosis: "Hypertension".into(),
            recommendations: "Reduce salt intake".into(),
            urgency_level: "medium".into(),
            additional_notes: None,
            created_at: (Utc::now() - Duration::minutes(minutes_ago)).naive_utc(),
        };
        self.tables.lock().unwrap().reports.push(report.clone());
        report
    }

    pub fn reading_count(&self) -> usize {
        self.tables.lock().unwrap().readings.len()
    }
}

impl ReadingStore for MemoryStore {
    fn insert_reading(&self, reading: &Reading) -> Result<Reading, StoreError> {
        let mut tables = self.tables()?;
        if !tables.patients.iter().any(|p| p.id == reading.patient_id) {
            return Err(StoreError::MissingParent("readings_patient_id_fkey".into()));
        }
        if tables.readings.iter().any(|r| r.id == reading.id) {
            return Err(StoreError::ConstraintViolation("readings_pkey".into()));
        }
        tables.readings.push(reading.clone());
        Ok(reading.clone())
    }

    fn find_reading(&self, id: Uuid) -> Result<Option<Reading>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.readings.iter().find(|r| r.id == id).cloned())
    }

    fn find_reading_patient(&self, id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.readings.iter().find(|r| r.id == id).map(|r| r.patient_id))
    }

    fn list_readings_for_patient(&self, patient_id: Uuid) -> Result<Vec<Reading>, StoreError> {
        let tables = self.tables()?;
        let mut rows: Vec<Reading> = tables
            .readings
            .iter()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    fn count_readings_for_patient(&self, patient_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.tables()?;
        Ok(tables.readings.iter().filter(|r| r.patient_id == patient_id).count() as i64)
    }

    fn count_readings_for_doctor(&self, doctor_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.tables()?;
        let count = tables
            .readings
            .iter()
            .filter(|r| {
                tables
                    .patients
                    .iter()
                    .any(|p| p.id == r.patient_id && p.doctor_id == doctor_id)
            })
            .count();
        Ok(count as i64)
    }

    fn delete_reading(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if self.vanish_on_delete.load(Ordering::SeqCst) {
            tables.readings.retain(|r| r.id != id);
        }
        let before = tables.readings.len();
        tables.readings.retain(|r| r.id != id);
        if tables.readings.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

impl ClinicStore for MemoryStore {
    fn find_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.patients.iter().find(|p| p.id == id).cloned())
    }

    fn find_doctor(&self, id: Uuid) -> Result<Option<Doctor>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.doctors.iter().find(|d| d.id == id).cloned())
    }

    fn list_reports_for_patient(&self, patient_id: Uuid) -> Result<Vec<Report>, StoreError> {
        let tables = self.tables()?;
        let mut rows: Vec<Report> = tables
            .reports
            .iter()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}

#[derive(Default)]
pub struct RecordingInvalidator {
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingInvalidator {
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, paths: &[String]) {
        self.calls.lock().unwrap().push(paths.to_vec());
    }
}

/// Accepts a fixed set of access tokens; anything else is rejected.
#[derive(Default)]
pub struct StaticAuth {
    users: HashMap<String, AuthUser>,
}

impl StaticAuth {
    pub fn with_user(mut self, token: &str, id: Uuid) -> Self {
        self.users.insert(
            token.to_string(),
            AuthUser {
                id,
                email: Some("doctor@clinic.test".into()),
            },
        );
        self
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        self.users
            .get(access_token)
            .cloned()
            .ok_or_else(|| AuthError::Rejected("401 Unauthorized".into()))
    }
}

pub const SESSION_COOKIE: &str = "sb-access-token";

/// App state over a shared in-memory store, signed in as `doctor` for `token`.
pub fn app_state(store: &Arc<MemoryStore>, token: &str, doctor: Uuid) -> (AppState, Arc<PageCache>) {
    let auth = Arc::new(StaticAuth::default().with_user(token, doctor));
    let session = SessionAccessor::new(auth, store.clone(), SESSION_COOKIE);
    let state = AppState::new(store.clone(), store.clone(), session);
    let pages = state.pages.clone();
    (state, pages)
}
