//! Persistence client: the row-level contract the rest of the service is
//! written against, and its diesel/Postgres implementation.
//!
//! Every store call is a single statement with its own implicit transaction.
//! Calls are blocking; async callers go through [`blocking`].

use std::sync::Arc;

use actix_web::web;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;
use uuid::Uuid;

use crate::DbPool;
use crate::models::{Doctor, Patient, Reading, Report};
use crate::schema::{doctors, patients, readings, reports};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("referenced row does not exist: {0}")]
    MissingParent(String),

    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                StoreError::MissingParent(info.message().to_string())
            }
            DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::NotNullViolation
                | DatabaseErrorKind::CheckViolation,
                info,
            ) => StoreError::ConstraintViolation(info.message().to_string()),
            other => StoreError::Transport(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        StoreError::Transport(format!("couldn't get db connection from pool: {err}"))
    }
}

/// Reading rows keyed by reading, patient and (through the patient) doctor.
pub trait ReadingStore: Send + Sync + 'static {
    fn insert_reading(&self, reading: &Reading) -> Result<Reading, StoreError>;

    fn find_reading(&self, id: Uuid) -> Result<Option<Reading>, StoreError>;

    /// Owning patient of a reading, without loading the measurements.
    fn find_reading_patient(&self, id: Uuid) -> Result<Option<Uuid>, StoreError>;

    /// Newest first.
    fn list_readings_for_patient(&self, patient_id: Uuid) -> Result<Vec<Reading>, StoreError>;

    fn count_readings_for_patient(&self, patient_id: Uuid) -> Result<i64, StoreError>;

    fn count_readings_for_doctor(&self, doctor_id: Uuid) -> Result<i64, StoreError>;

    /// Fails with [`StoreError::NotFound`] when no row was deleted.
    fn delete_reading(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Read access to the records owned by other parts of the clinic system.
pub trait ClinicStore: Send + Sync + 'static {
    fn find_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError>;

    fn find_doctor(&self, id: Uuid) -> Result<Option<Doctor>, StoreError>;

    /// Oldest first, so the last entry is the most recent report.
    fn list_reports_for_patient(&self, patient_id: Uuid) -> Result<Vec<Report>, StoreError>;
}

/// Runs a store call on actix's blocking thread pool.
pub async fn blocking<S, T, F>(store: &Arc<S>, f: F) -> Result<T, StoreError>
where
    S: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    web::block(move || f(store.as_ref()))
        .await
        .map_err(|e| StoreError::Transport(format!("Error blocking thread: {e}")))?
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, StoreError> {
        Ok(self.pool.get()?)
    }
}

impl ReadingStore for PgStore {
    fn insert_reading(&self, reading: &Reading) -> Result<Reading, StoreError> {
        let mut conn = self.conn()?;
        let row = diesel::insert_into(readings::table)
            .values(reading)
            .returning(Reading::as_returning())
            .get_result(&mut conn)?;
        Ok(row)
    }

    fn find_reading(&self, id: Uuid) -> Result<Option<Reading>, StoreError> {
        let mut conn = self.conn()?;
        let row = readings::table
            .find(id)
            .select(Reading::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn find_reading_patient(&self, id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let mut conn = self.conn()?;
        let patient_id = readings::table
            .find(id)
            .select(readings::patient_id)
            .first(&mut conn)
            .optional()?;
        Ok(patient_id)
    }

    fn list_readings_for_patient(&self, patient_id: Uuid) -> Result<Vec<Reading>, StoreError> {
        let mut conn = self.conn()?;
        let rows = readings::table
            .filter(readings::patient_id.eq(patient_id))
            .order(readings::created_at.desc())
            .select(Reading::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn count_readings_for_patient(&self, patient_id: Uuid) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let count = readings::table
            .filter(readings::patient_id.eq(patient_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    fn count_readings_for_doctor(&self, doctor_id: Uuid) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let count = readings::table
            .inner_join(patients::table)
            .filter(patients::doctor_id.eq(doctor_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    fn delete_reading(&self, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let affected = diesel::delete(readings::table.find(id)).execute(&mut conn)?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

impl ClinicStore for PgStore {
    fn find_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        let mut conn = self.conn()?;
        let row = patients::table
            .find(id)
            .select(Patient::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn find_doctor(&self, id: Uuid) -> Result<Option<Doctor>, StoreError> {
        let mut conn = self.conn()?;
        let row = doctors::table
            .find(id)
            .select(Doctor::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn list_reports_for_patient(&self, patient_id: Uuid) -> Result<Vec<Report>, StoreError> {
        let mut conn = self.conn()?;
        let rows = reports::table
            .filter(reports::patient_id.eq(patient_id))
            .order(reports::created_at.asc())
            .select(Report::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }
}
