//! Read-side views for the dashboard pages. The view builders are pure; the
//! [`Dashboard`] service only fetches what they need.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cache::{self, DASHBOARD_PATH};
use crate::db::{self, ClinicStore};
use crate::models::{self, Doctor, Patient, Reading, Report};
use crate::repository::{ReadingRepository, RepositoryError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub label: String,
    pub href: String,
}

impl Link {
    fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
        }
    }
}

/// The last crumb is the current page and carries no link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breadcrumb {
    pub label: String,
    pub href: Option<String>,
}

fn patient_breadcrumbs(patient_id: Uuid, patient_label: &str, page: Option<&str>) -> Vec<Breadcrumb> {
    let mut crumbs = vec![
        Breadcrumb {
            label: "Dashboard".into(),
            href: Some(DASHBOARD_PATH.into()),
        },
        Breadcrumb {
            label: "Patients".into(),
            href: Some(format!("{DASHBOARD_PATH}/patients")),
        },
    ];
    match page {
        Some(page) => {
            crumbs.push(Breadcrumb {
                label: patient_label.into(),
                href: Some(cache::patient_path(patient_id)),
            });
            crumbs.push(Breadcrumb {
                label: page.into(),
                href: None,
            });
        }
        None => crumbs.push(Breadcrumb {
            label: patient_label.into(),
            href: None,
        }),
    }
    crumbs
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientHeader {
    pub id: Uuid,
    pub short_id: String,
    pub name: String,
    pub age: u32,
    pub new_reading: Link,
}

impl PatientHeader {
    fn new(patient: &Patient, today: NaiveDate) -> Self {
        Self {
            id: patient.id,
            short_id: patient.short_id(),
            name: patient.name.clone(),
            age: patient.age_on(today),
            new_reading: Link::new(
                "New Reading",
                format!("{}/new", cache::patient_readings_path(patient.id)),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingPatient {
    pub breadcrumbs: Vec<Breadcrumb>,
    pub title: String,
    pub message: String,
}

impl MissingPatient {
    fn new(patient_id: Uuid, page: Option<&str>) -> Self {
        Self {
            breadcrumbs: patient_breadcrumbs(patient_id, "Invalid", page),
            title: "Patient Not Found".into(),
            message: "The patient with the provided ID could not be found.".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub breadcrumbs: Vec<Breadcrumb>,
    pub doctor_name: String,
    pub total_readings: i64,
}

pub fn dashboard_summary(doctor: &Doctor, total_readings: i64) -> DashboardSummary {
    DashboardSummary {
        breadcrumbs: vec![Breadcrumb {
            label: "Dashboard".into(),
            href: None,
        }],
        doctor_name: doctor.name.clone(),
        total_readings,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientOverview {
    pub breadcrumbs: Vec<Breadcrumb>,
    pub patient: PatientHeader,
    pub reading_count: i64,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PatientView {
    NotFound(MissingPatient),
    Found(PatientOverview),
}

pub fn patient_view(
    patient_id: Uuid,
    patient: Option<&Patient>,
    reading_count: i64,
    today: NaiveDate,
) -> PatientView {
    let Some(patient) = patient else {
        return PatientView::NotFound(MissingPatient::new(patient_id, None));
    };
    PatientView::Found(PatientOverview {
        breadcrumbs: patient_breadcrumbs(patient.id, &patient.name, None),
        patient: PatientHeader::new(patient, today),
        reading_count,
        links: vec![
            Link::new("Readings", cache::patient_readings_path(patient.id)),
            Link::new("Reports", format!("{}/reports", cache::patient_path(patient.id))),
        ],
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientReadings {
    pub breadcrumbs: Vec<Breadcrumb>,
    pub patient: PatientHeader,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReadingsView {
    NotFound(MissingPatient),
    Found(PatientReadings),
}

pub fn readings_view(
    patient_id: Uuid,
    patient: Option<&Patient>,
    readings: Vec<Reading>,
    today: NaiveDate,
) -> ReadingsView {
    let Some(patient) = patient else {
        return ReadingsView::NotFound(MissingPatient::new(patient_id, Some("Readings")));
    };
    ReadingsView::Found(PatientReadings {
        breadcrumbs: patient_breadcrumbs(patient.id, &patient.name, Some("Readings")),
        patient: PatientHeader::new(patient, today),
        readings,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoReports {
    pub breadcrumbs: Vec<Breadcrumb>,
    pub patient: PatientHeader,
    pub title: String,
    pub message: String,
    pub call_to_action: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestReport {
    pub id: Uuid,
    pub short_id: String,
    pub generated_on: NaiveDate,
    pub summary: String,
    pub diagnosis: String,
    pub recommendations: String,
    pub urgency_level: String,
    pub additional_notes: Option<String>,
    pub full_report: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub id: Uuid,
    pub reading_id: Option<Uuid>,
    pub diagnosis: String,
    pub urgency_level: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientReports {
    pub breadcrumbs: Vec<Breadcrumb>,
    pub patient: PatientHeader,
    pub latest: LatestReport,
    pub reports: Vec<ReportRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReportsView {
    NotFound(MissingPatient),
    Empty(NoReports),
    Populated(PatientReports),
}

/// `reports` are oldest first; the last one is shown as the latest.
pub fn reports_view(
    patient_id: Uuid,
    patient: Option<&Patient>,
    reports: &[Report],
    today: NaiveDate,
) -> ReportsView {
    let Some(patient) = patient else {
        return ReportsView::NotFound(MissingPatient::new(patient_id, Some("Reports")));
    };
    let breadcrumbs = patient_breadcrumbs(patient.id, &patient.name, Some("Reports"));

    let Some(latest) = reports.last() else {
        return ReportsView::Empty(NoReports {
            breadcrumbs,
            patient: PatientHeader::new(patient, today),
            title: "No Reports Found".into(),
            message: format!(
                "{} does not have any reports generated yet. Generate a new report for any reading on the readings page.",
                patient.name
            ),
            call_to_action: Link::new(
                format!("Readings for {}", patient.name),
                cache::patient_readings_path(patient.id),
            ),
        });
    };

    ReportsView::Populated(PatientReports {
        breadcrumbs,
        patient: PatientHeader::new(patient, today),
        latest: LatestReport {
            id: latest.id,
            short_id: models::short_id(&latest.id),
            generated_on: latest.created_at.date(),
            summary: latest.summary.clone(),
            diagnosis: latest.diagnosis.clone(),
            recommendations: latest.recommendations.clone(),
            urgency_level: latest.urgency_level.clone(),
            additional_notes: latest.additional_notes.clone(),
            full_report: Link::new(
                "View Full Report",
                format!("{}/reports/{}", cache::patient_path(patient.id), latest.id),
            ),
        },
        reports: reports
            .iter()
            .map(|r| ReportRow {
                id: r.id,
                reading_id: r.reading_id,
                diagnosis: r.diagnosis.clone(),
                urgency_level: r.urgency_level.clone(),
                created_at: r.created_at,
            })
            .collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountMenu {
    pub name: String,
    pub email: String,
    pub links: Vec<Link>,
}

pub fn account_menu(doctor: &Doctor) -> AccountMenu {
    AccountMenu {
        name: doctor.name.clone(),
        email: doctor.email.clone(),
        links: vec![
            Link::new("Profile", "/profile"),
            Link::new("Dashboard", DASHBOARD_PATH),
            Link::new("Logout", "/logout"),
        ],
    }
}

#[derive(Clone)]
pub struct Dashboard {
    clinic: Arc<dyn ClinicStore>,
    readings: ReadingRepository,
}

impl Dashboard {
    pub fn new(clinic: Arc<dyn ClinicStore>, readings: ReadingRepository) -> Self {
        Self { clinic, readings }
    }

    async fn patient(&self, patient_id: Uuid) -> Result<Option<Patient>, RepositoryError> {
        db::blocking(&self.clinic, move |s| s.find_patient(patient_id))
            .await
            .map_err(|e| RepositoryError::from_store("get patient", e))
    }

    pub async fn summary(&self, doctor: &Doctor) -> Result<DashboardSummary, RepositoryError> {
        let total = self.readings.get_num_readings_by_doctor_id(doctor.id).await?;
        Ok(dashboard_summary(doctor, total))
    }

    pub async fn patient_overview(&self, patient_id: Uuid) -> Result<PatientView, RepositoryError> {
        let Some(patient) = self.patient(patient_id).await? else {
            return Ok(patient_view(patient_id, None, 0, today()));
        };
        let count = self.readings.get_num_readings_by_patient_id(patient_id).await?;
        Ok(patient_view(patient_id, Some(&patient), count, today()))
    }

    pub async fn patient_readings(&self, patient_id: Uuid) -> Result<ReadingsView, RepositoryError> {
        let Some(patient) = self.patient(patient_id).await? else {
            return Ok(readings_view(patient_id, None, Vec::new(), today()));
        };
        let readings = self.readings.get_readings_by_patient_id(patient_id).await?;
        Ok(readings_view(patient_id, Some(&patient), readings, today()))
    }

    pub async fn patient_reports(&self, patient_id: Uuid) -> Result<ReportsView, RepositoryError> {
        let Some(patient) = self.patient(patient_id).await? else {
            return Ok(reports_view(patient_id, None, &[], today()));
        };
        let reports = db::blocking(&self.clinic, move |s| s.list_reports_for_patient(patient_id))
            .await
            .map_err(|e| RepositoryError::from_store("get reports", e))?;
        Ok(reports_view(patient_id, Some(&patient), &reports, today()))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
