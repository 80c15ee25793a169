use crate::error::app_error::ErrorBody;
use rocket::serde::json::Json;
use rocket::{Request, catch};

#[catch(400)]
pub fn bad_request(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::message("Bad request"))
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::message("Not found"))
}

#[catch(413)]
pub fn payload_too_large(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::message("Request body too large"))
}

#[catch(422)]
pub fn unprocessable_entity(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::message("Malformed JSON request body"))
}

#[catch(429)]
pub fn too_many_requests(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::message("Too many requests"))
}

#[catch(500)]
pub fn internal_error(_: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::message("Internal server error"))
}
