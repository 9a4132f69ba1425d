use std::fmt::Display;

mod endpoints_health;
mod endpoints_person;
mod endpoints_schedule;

use crate::data_store::StoreError;
use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    web, HttpResponse,
};
use serde::Deserialize;
use serde_json::json;

pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.service(get_api_service())
        .service(endpoints_health::get_health)
        .service(endpoints_health::get_metrics);
}

fn get_api_service() -> actix_web::Scope {
    let query_config =
        web::QueryConfig::default().error_handler(|err, _req| APIError::InvalidQuery(err).into());
    web::scope("/api/v1")
        .app_data(query_config)
        .service(endpoints_schedule::get_schedule)
        .service(endpoints_person::get_person)
        .service(endpoints_person::get_person_image)
}

/// Query parameters of the endpoints returning formatted timestamps
#[derive(Debug, Deserialize)]
struct TimezoneQuery {
    timezone: Option<String>,
}

#[derive(Debug)]
pub enum APIError {
    NotExisting,
    InvalidQuery(actix_web::error::QueryPayloadError),
    TransactionConflict,
    DatabaseUnavailable(String),
    InternalError(String),
}

impl Display for APIError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotExisting => f.write_str("Element does not exist")?,
            Self::InvalidQuery(e) => {
                write!(f, "Invalid query parameters: {}", e)?;
            }
            Self::TransactionConflict => {
                f.write_str("Concurrent database transaction conflict. Please retry request.")?;
            }
            Self::DatabaseUnavailable(e) => {
                write!(f, "Database is not available: {}", e)?;
            }
            Self::InternalError(s) => {
                f.write_str("Internal error: ")?;
                f.write_str(s)?;
            }
        };
        Ok(())
    }
}

impl ResponseError for APIError {
    fn error_response(&self) -> HttpResponse {
        let message = format!("{}", self);

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(json!({
                "httpCode": self.status_code().as_u16(),
                "message": message
            }))
    }
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotExisting => StatusCode::NOT_FOUND,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::TransactionConflict => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for APIError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConnectionError(error) => Self::DatabaseUnavailable(error),
            StoreError::QueryError(diesel_error) => Self::InternalError(format!(
                "Error while executing database query: {}",
                diesel_error
            )),
            StoreError::TransactionConflict => Self::TransactionConflict,
            StoreError::NotExisting => Self::NotExisting,
            StoreError::ConstraintViolation(e) | StoreError::InvalidInputData(e) => {
                Self::InternalError(e)
            }
            StoreError::InvalidDataInDatabase(e) => Self::InternalError(format!(
                "Data queried from database could not be deserialized: {}",
                e
            )),
        }
    }
}

impl From<actix_web::error::BlockingError> for APIError {
    fn from(_e: actix_web::error::BlockingError) -> Self {
        APIError::InternalError(
            "Could not get thread from thread pool for synchronous database operation.".to_owned(),
        )
    }
}
