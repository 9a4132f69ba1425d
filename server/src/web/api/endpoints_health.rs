use crate::web::api::APIError;
use crate::web::AppState;
use actix_web::http::header::ContentType;
use actix_web::{get, web, HttpResponse, Responder};
use dutyboard_api_types::HealthResponse;
use log::error;

/// Check if the database is reachable
#[get("/health")]
async fn get_health(state: web::Data<AppState>) -> Result<impl Responder, APIError> {
    let result = web::block(move || -> Result<(), APIError> {
        let mut store = state.store.get_facade()?;
        Ok(store.check_connection()?)
    })
    .await?;

    Ok(match result {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            result: "OK".to_owned(),
            error: None,
        }),
        Err(e) => {
            error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                result: "ERROR".to_owned(),
                error: Some(e.to_string()),
            })
        }
    })
}

/// Prometheus text exposition of the web server's metrics
#[get("/metrics")]
async fn get_metrics(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok()
        .insert_header(ContentType::plaintext())
        .body(state.prometheus.render())
}
