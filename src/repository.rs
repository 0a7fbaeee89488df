//! Reading lifecycle: create, look up, count and delete readings, keeping the
//! dashboard views that display them fresh.
//!
//! Each operation is a single call against the [`ReadingStore`]. Failures are
//! logged with their detail and surfaced as a coarse [`RepositoryError`]
//! whose variant tells the caller what kind of failure it was.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::cache::{self, CacheInvalidator};
use crate::db::{self, ReadingStore, StoreError};
use crate::models::{NewReading, Reading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("Failed to {op}")]
    NotFound { op: &'static str },

    #[error("Failed to {op}")]
    ConstraintViolation { op: &'static str },

    #[error("Failed to {op}")]
    TransportFailure { op: &'static str },
}

impl RepositoryError {
    /// Logs the underlying failure and keeps only its kind.
    pub fn from_store(op: &'static str, err: StoreError) -> Self {
        tracing::error!(operation = op, error = %err, "Failed to {op}");
        match err {
            StoreError::NotFound | StoreError::MissingParent(_) => RepositoryError::NotFound { op },
            StoreError::ConstraintViolation(_) => RepositoryError::ConstraintViolation { op },
            StoreError::Transport(_) => RepositoryError::TransportFailure { op },
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            RepositoryError::NotFound { op }
            | RepositoryError::ConstraintViolation { op }
            | RepositoryError::TransportFailure { op } => op,
        }
    }
}

#[derive(Clone)]
pub struct ReadingRepository {
    store: Arc<dyn ReadingStore>,
    invalidator: Arc<dyn CacheInvalidator>,
}

impl ReadingRepository {
    pub fn new(store: Arc<dyn ReadingStore>, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        Self { store, invalidator }
    }

    pub async fn create_reading(&self, data: NewReading) -> Result<Reading, RepositoryError> {
        const OP: &str = "create reading";
        tracing::info!(patient_id = %data.patient_id, "Creating reading");

        let reading = data.to_reading();
        let created = db::blocking(&self.store, move |s| s.insert_reading(&reading))
            .await
            .map_err(|e| RepositoryError::from_store(OP, e))?;

        self.invalidate_patient_views(created.patient_id);
        Ok(created)
    }

    /// `Ok(None)` for an unknown id; errors only when the store itself fails.
    pub async fn get_reading_by_id(&self, id: Uuid) -> Result<Option<Reading>, RepositoryError> {
        db::blocking(&self.store, move |s| s.find_reading(id))
            .await
            .map_err(|e| RepositoryError::from_store("get reading", e))
    }

    pub async fn get_readings_by_patient_id(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<Reading>, RepositoryError> {
        db::blocking(&self.store, move |s| s.list_readings_for_patient(patient_id))
            .await
            .map_err(|e| RepositoryError::from_store("get readings", e))
    }

    pub async fn get_num_readings_by_patient_id(
        &self,
        patient_id: Uuid,
    ) -> Result<i64, RepositoryError> {
        db::blocking(&self.store, move |s| s.count_readings_for_patient(patient_id))
            .await
            .map_err(|e| RepositoryError::from_store("get number of readings", e))
    }

    pub async fn get_num_readings_by_doctor_id(
        &self,
        doctor_id: Uuid,
    ) -> Result<i64, RepositoryError> {
        db::blocking(&self.store, move |s| s.count_readings_for_doctor(doctor_id))
            .await
            .map_err(|e| RepositoryError::from_store("get number of readings", e))
    }

    /// Idempotent: deleting an unknown reading succeeds without touching any view.
    pub async fn delete_reading_by_id(&self, id: Uuid) -> Result<(), RepositoryError> {
        const OP: &str = "delete reading";

        let owner = db::blocking(&self.store, move |s| s.find_reading_patient(id))
            .await
            .map_err(|e| RepositoryError::from_store(OP, e))?;
        let Some(patient_id) = owner else {
            tracing::warn!(reading_id = %id, "Reading with ID {id} not found for deletion");
            return Ok(());
        };

        match db::blocking(&self.store, move |s| s.delete_reading(id)).await {
            Ok(()) => {}
            // Removed by a concurrent delete, which invalidates on its own.
            Err(StoreError::NotFound) => {
                tracing::warn!(reading_id = %id, "Reading with ID {id} was already deleted");
                return Ok(());
            }
            Err(err) => return Err(RepositoryError::from_store(OP, err)),
        }

        self.invalidate_patient_views(patient_id);
        Ok(())
    }

    fn invalidate_patient_views(&self, patient_id: Uuid) {
        self.invalidator.invalidate(&cache::patient_view_paths(patient_id));
    }
}
