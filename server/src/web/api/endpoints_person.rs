use crate::data_store::models::Person;
use crate::data_store::{PersonId, PersonImageId};
use crate::web::api::{APIError, TimezoneQuery};
use crate::web::time_format::{format_timestamp, resolve_timezone};
use crate::web::AppState;
use actix_web::http::header::{CacheControl, CacheDirective, ContentType};
use actix_web::{get, web, HttpResponse, Responder};
use chrono_tz::Tz;
use dutyboard_api_types::PersonResponse;

#[get("/person/{person_uid}")]
async fn get_person(
    path: web::Path<PersonId>,
    query: web::Query<TimezoneQuery>,
    state: web::Data<AppState>,
) -> Result<impl Responder, APIError> {
    let person_uid = path.into_inner();
    let timezone = resolve_timezone(
        query.timezone.as_deref(),
        &state.config.display.default_timezone,
    );
    let person = web::block(move || -> Result<_, APIError> {
        let mut store = state.store.get_facade()?;
        Ok(store.get_person(person_uid)?)
    })
    .await??;

    Ok(web::Json(person_response(person, &timezone)))
}

fn person_response(person: Person, timezone: &Tz) -> PersonResponse {
    PersonResponse {
        uid: person.uid,
        username: person.username,
        email: person.email,
        img_filename: person.image_uid.map(|image_uid| image_uid.to_string()),
        img_width: person.img_width,
        img_height: person.img_height,
        extra_attributes: person.extra_attributes.into(),
        last_update: format_timestamp(&person.last_update, timezone),
        error_msg: person.error_msg.unwrap_or_default(),
        sync: person.sync,
    }
}

#[get("/person_img/{image_uid}")]
async fn get_person_image(
    path: web::Path<PersonImageId>,
    state: web::Data<AppState>,
) -> Result<impl Responder, APIError> {
    let image_uid = path.into_inner();
    let image = web::block(move || -> Result<_, APIError> {
        let mut store = state.store.get_facade()?;
        Ok(store.get_person_image(image_uid)?)
    })
    .await??;

    Ok(HttpResponse::Ok()
        .insert_header(ContentType::jpeg())
        .insert_header(CacheControl(vec![CacheDirective::MaxAge(3600)]))
        .body(image.image_bytes))
}
