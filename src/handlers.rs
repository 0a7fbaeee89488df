use actix_web::error::JsonPayloadError;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde_json::json;
use uuid::Uuid;

use crate::AppState;
use crate::cache::{self, DASHBOARD_PATH};
use crate::dashboard::{self, PatientView, ReadingsView};
use crate::error::{ApiError, ErrorBody};
use crate::form::{ReadingForm, ReadingFormValues, SubmitError};
use crate::models::Doctor;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(rejected_body))
    .service(
        web::scope("/patients")
            .route("/{patient_id}/readings", web::post().to(create_reading))
            .route("/{patient_id}/readings", web::get().to(get_readings_for_patient))
            .route("/{patient_id}/readings/count", web::get().to(count_readings_for_patient)),
    )
    .service(
        web::scope("/readings")
            .route("/{reading_id}", web::get().to(get_reading))
            .route("/{reading_id}", web::delete().to(delete_reading)),
    )
    .route("/doctors/{doctor_id}/readings/count", web::get().to(count_readings_for_doctor))
    .service(
        web::scope("/dashboard")
            .route("", web::get().to(dashboard_summary))
            .route("/patients/{patient_id}", web::get().to(patient_overview))
            .route("/patients/{patient_id}/readings", web::get().to(patient_readings))
            .route("/patients/{patient_id}/reports", web::get().to(patient_reports)),
    )
    .route("/account", web::get().to(account_menu))
    .route("/", web::get().to(hello));
}

async fn hello() -> impl Responder {
    HttpResponse::Ok().body("Hello, vitals!")
}

fn rejected_body(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(error = %err, "Rejected request body");
    ApiError::BadRequest("Invalid request body".into()).into()
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid UUID format".into()))
}

async fn signed_in(req: &HttpRequest, state: &AppState) -> Result<Doctor, ApiError> {
    state
        .session
        .current_doctor(req)
        .await?
        .ok_or(ApiError::Unauthorized)
}

/// Serves a dashboard page from the page cache, rendering it on a miss.
/// Pages for a missing patient are never cached.
async fn cached_page<F, Fut>(
    state: &AppState,
    path: &str,
    viewer: &Doctor,
    render: F,
) -> Result<HttpResponse, ApiError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(serde_json::Value, bool), ApiError>>,
{
    let viewer = viewer.id.to_string();
    if let Some(page) = state.pages.get(path, &viewer) {
        tracing::debug!(path, "Serving cached view");
        return Ok(HttpResponse::Ok().json(page));
    }

    let generation = state.pages.generation(path);
    let (page, cacheable) = render().await?;
    if cacheable {
        state.pages.put(path, &viewer, generation, page.clone());
    }
    Ok(HttpResponse::Ok().json(page))
}

fn to_page<T: serde::Serialize>(view: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(view).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialize view");
        ApiError::Internal
    })
}

pub async fn create_reading(
    req: HttpRequest,
    state: web::Data<AppState>,
    patient_id: web::Path<String>,
    values: web::Json<ReadingFormValues>,
) -> Result<HttpResponse, ApiError> {
    signed_in(&req, &state).await?;
    let patient_id = parse_id(&patient_id)?;

    let mut form = ReadingForm::with_values(patient_id, values.into_inner());
    match form.submit(&state.readings).await {
        Ok(submitted) => Ok(HttpResponse::Created().json(submitted)),
        Err(SubmitError::Invalid(errors)) => {
            Ok(HttpResponse::UnprocessableEntity().json(json!({ "errors": errors })))
        }
        Err(SubmitError::Failed {
            error,
            notification,
        }) => {
            let error = ApiError::from(error);
            Ok(HttpResponse::build(actix_web::ResponseError::status_code(&error)).json(json!({
                "error": ErrorBody::new(error.code(), error.to_string()).error,
                "notification": notification,
            })))
        }
    }
}

pub async fn get_reading(
    req: HttpRequest,
    state: web::Data<AppState>,
    reading_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    signed_in(&req, &state).await?;
    let reading_id = parse_id(&reading_id)?;

    match state.readings.get_reading_by_id(reading_id).await? {
        Some(reading) => Ok(HttpResponse::Ok().json(reading)),
        None => Err(ApiError::NotFound("Reading not found".into())),
    }
}

pub async fn get_readings_for_patient(
    req: HttpRequest,
    state: web::Data<AppState>,
    patient_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    signed_in(&req, &state).await?;
    let patient_id = parse_id(&patient_id)?;

    let readings = state.readings.get_readings_by_patient_id(patient_id).await?;
    Ok(HttpResponse::Ok().json(readings))
}

pub async fn count_readings_for_patient(
    req: HttpRequest,
    state: web::Data<AppState>,
    patient_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    signed_in(&req, &state).await?;
    let patient_id = parse_id(&patient_id)?;

    let count = state.readings.get_num_readings_by_patient_id(patient_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

pub async fn count_readings_for_doctor(
    req: HttpRequest,
    state: web::Data<AppState>,
    doctor_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    signed_in(&req, &state).await?;
    let doctor_id = parse_id(&doctor_id)?;

    let count = state.readings.get_num_readings_by_doctor_id(doctor_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

pub async fn delete_reading(
    req: HttpRequest,
    state: web::Data<AppState>,
    reading_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    signed_in(&req, &state).await?;
    let reading_id = parse_id(&reading_id)?;

    state.readings.delete_reading_by_id(reading_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn dashboard_summary(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let doctor = signed_in(&req, &state).await?;

    cached_page(&state, DASHBOARD_PATH, &doctor, || async {
        let summary = state.dashboard.summary(&doctor).await?;
        Ok::<_, ApiError>((to_page(&summary)?, true))
    })
    .await
}

pub async fn patient_overview(
    req: HttpRequest,
    state: web::Data<AppState>,
    patient_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let doctor = signed_in(&req, &state).await?;
    let patient_id = parse_id(&patient_id)?;

    cached_page(&state, &cache::patient_path(patient_id), &doctor, || async {
        let view = state.dashboard.patient_overview(patient_id).await?;
        let cacheable = matches!(view, PatientView::Found(_));
        Ok::<_, ApiError>((to_page(&view)?, cacheable))
    })
    .await
}

pub async fn patient_readings(
    req: HttpRequest,
    state: web::Data<AppState>,
    patient_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let doctor = signed_in(&req, &state).await?;
    let patient_id = parse_id(&patient_id)?;

    cached_page(&state, &cache::patient_readings_path(patient_id), &doctor, || async {
        let view = state.dashboard.patient_readings(patient_id).await?;
        let cacheable = matches!(view, ReadingsView::Found(_));
        Ok::<_, ApiError>((to_page(&view)?, cacheable))
    })
    .await
}

pub async fn patient_reports(
    req: HttpRequest,
    state: web::Data<AppState>,
    patient_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    signed_in(&req, &state).await?;
    let patient_id = parse_id(&patient_id)?;

    let view = state.dashboard.patient_reports(patient_id).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Renders nothing (204) unless a signed-in user has a doctor record.
pub async fn account_menu(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    match state.session.current_doctor(&req).await? {
        Some(doctor) => Ok(HttpResponse::Ok().json(dashboard::account_menu(&doctor))),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use actix_web::cookie::Cookie;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use serde_json::Value;

    use crate::testing::{self, MemoryStore, SESSION_COOKIE};

    const TOKEN: &str = "valid-token";

    fn session() -> Cookie<'static> {
        Cookie::new(SESSION_COOKIE, TOKEN)
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data(web::Data::new($state)).configure(routes)).await
        };
    }

    #[actix_web::test]
    async fn hello_is_public() {
        let store = Arc::new(MemoryStore::new());
        let (state, _) = testing::app_state(&store, TOKEN, Uuid::new_v4());
        let app = app!(state);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn reading_routes_require_a_doctor_session() {
        let store = Arc::new(MemoryStore::new());
        let (_, patient) = store.seed_patient("Ada Lovelace");
        // Signed in as a user that has no doctor record.
        let (state, _) = testing::app_state(&store, TOKEN, Uuid::new_v4());
        let app = app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/patients/{}/readings", patient.id))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/patients/{}/readings", patient.id))
                .cookie(session())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn submit_create_fetch_and_delete_a_reading() {
        let store = Arc::new(MemoryStore::new());
        let (doctor, patient) = store.seed_patient("Ada Lovelace");
        let (state, _) = testing::app_state(&store, TOKEN, doctor.id);
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri(&format!("/patients/{}/readings", patient.id))
            .cookie(session())
            .set_json(json!({
                "temperature": "37.2",
                "heart_rate": "72",
                "oxygen_saturation": "98",
                "notes": "Follow-up"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        let reading_id = body["reading"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["reading"]["temperature"], 37.2);
        assert_eq!(body["reading"]["height"], Value::Null);
        assert_eq!(body["reading"]["diagnosed_for"], "Follow-up");
        assert_eq!(body["notification"]["title"], "Reading submitted");
        assert_eq!(
            body["notification"]["action"]["href"],
            format!("/dashboard/patients/{}/readings/{}", patient.id, reading_id)
        );

        let req = test::TestRequest::get()
            .uri(&format!("/readings/{reading_id}"))
            .cookie(session())
            .to_request();
        let fetched: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fetched, body["reading"]);

        let req = test::TestRequest::get()
            .uri(&format!("/doctors/{}/readings/count", doctor.id))
            .cookie(session())
            .to_request();
        let count: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(count["count"], 1);

        let req = test::TestRequest::delete()
            .uri(&format!("/readings/{reading_id}"))
            .cookie(session())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get()
            .uri(&format!("/readings/{reading_id}"))
            .cookie(session())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        // Second delete is a no-op.
        let req = test::TestRequest::delete()
            .uri(&format!("/readings/{reading_id}"))
            .cookie(session())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
    }

    #[actix_web::test]
    async fn invalid_form_returns_field_errors() {
        let store = Arc::new(MemoryStore::new());
        let (doctor, patient) = store.seed_patient("Ada Lovelace");
        let (state, _) = testing::app_state(&store, TOKEN, doctor.id);
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri(&format!("/patients/{}/readings", patient.id))
            .cookie(session())
            .set_json(json!({ "oxygen_saturation": "150", "weight": "heavy" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body["errors"]["oxygen_saturation"],
            "Oxygen saturation must be a number between 0 and 100"
        );
        assert_eq!(body["errors"]["weight"], "Weight must be a number");
        assert_eq!(store.reading_count(), 0);
    }

    #[actix_web::test]
    async fn numeric_json_values_are_accepted() {
        let store = Arc::new(MemoryStore::new());
        let (doctor, patient) = store.seed_patient("Ada Lovelace");
        let (state, _) = testing::app_state(&store, TOKEN, doctor.id);
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri(&format!("/patients/{}/readings", patient.id))
            .cookie(session())
            .set_json(json!({ "height": 170, "oxygen_saturation": "98" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["reading"]["height"], 170.0);
        assert_eq!(body["reading"]["oxygen_saturation"], 98.0);
    }

    #[actix_web::test]
    async fn unreadable_body_uses_error_envelope() {
        let store = Arc::new(MemoryStore::new());
        let (doctor, patient) = store.seed_patient("Ada Lovelace");
        let (state, _) = testing::app_state(&store, TOKEN, doctor.id);
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri(&format!("/patients/{}/readings", patient.id))
            .cookie(session())
            .set_json(json!({ "height": true }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "Invalid request body");
        assert_eq!(store.reading_count(), 0);
    }

    #[actix_web::test]
    async fn failed_create_returns_generic_notification() {
        let store = Arc::new(MemoryStore::new());
        let (doctor, _) = store.seed_patient("Ada Lovelace");
        let (state, _) = testing::app_state(&store, TOKEN, doctor.id);
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri(&format!("/patients/{}/readings", Uuid::new_v4()))
            .cookie(session())
            .set_json(json!({ "temperature": "37" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["message"], "Failed to create reading");
        assert_eq!(body["notification"]["title"], "Error");
        assert_eq!(body["notification"]["action"], Value::Null);
    }

    #[actix_web::test]
    async fn malformed_id_is_a_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let doctor = store.seed_doctor("Gregory House");
        let (state, _) = testing::app_state(&store, TOKEN, doctor.id);
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/readings/not-a-uuid")
            .cookie(session())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn creating_a_reading_invalidates_cached_views() {
        let store = Arc::new(MemoryStore::new());
        let (doctor, patient) = store.seed_patient("Ada Lovelace");
        let (state, pages) = testing::app_state(&store, TOKEN, doctor.id);
        let app = app!(state);

        for uri in [
            "/dashboard".to_string(),
            format!("/dashboard/patients/{}", patient.id),
            format!("/dashboard/patients/{}/readings", patient.id),
        ] {
            let req = test::TestRequest::get().uri(&uri).cookie(session()).to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
            assert!(pages.contains(&uri), "{uri} should be cached");
        }

        let req = test::TestRequest::get().uri("/dashboard").cookie(session()).to_request();
        let before: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(before["total_readings"], 0);

        let req = test::TestRequest::post()
            .uri(&format!("/patients/{}/readings", patient.id))
            .cookie(session())
            .set_json(json!({ "heart_rate": "80" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        assert!(!pages.contains("/dashboard"));
        assert!(!pages.contains(&format!("/dashboard/patients/{}", patient.id)));
        assert!(!pages.contains(&format!("/dashboard/patients/{}/readings", patient.id)));

        let req = test::TestRequest::get().uri("/dashboard").cookie(session()).to_request();
        let after: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(after["total_readings"], 1);

        let req = test::TestRequest::get()
            .uri(&format!("/dashboard/patients/{}/readings", patient.id))
            .cookie(session())
            .to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["state"], "found");
        assert_eq!(view["readings"].as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn missing_patient_views_are_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let doctor = store.seed_doctor("Gregory House");
        let (state, pages) = testing::app_state(&store, TOKEN, doctor.id);
        let app = app!(state);
        let uri = format!("/dashboard/patients/{}", Uuid::new_v4());

        let req = test::TestRequest::get().uri(&uri).cookie(session()).to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["state"], "not_found");
        assert!(!pages.contains(&uri));
    }

    #[actix_web::test]
    async fn reports_page_states() {
        let store = Arc::new(MemoryStore::new());
        let (doctor, patient) = store.seed_patient("Ada Lovelace");
        let (state, _) = testing::app_state(&store, TOKEN, doctor.id);
        let app = app!(state);
        let uri = format!("/dashboard/patients/{}/reports", patient.id);

        let req = test::TestRequest::get().uri(&uri).cookie(session()).to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["state"], "empty");

        store.seed_report(patient.id, "Stable vitals", 10);
        let req = test::TestRequest::get().uri(&uri).cookie(session()).to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["state"], "populated");
        assert_eq!(view["latest"]["summary"], "Stable vitals");
    }

    #[actix_web::test]
    async fn account_menu_renders_nothing_without_doctor() {
        let store = Arc::new(MemoryStore::new());
        let doctor = store.seed_doctor("Gregory House");
        let (state, _) = testing::app_state(&store, TOKEN, doctor.id);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/account").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get().uri("/account").cookie(session()).to_request();
        let menu: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(menu["name"], "Gregory House");
        assert_eq!(menu["email"], doctor.email);
    }
}
