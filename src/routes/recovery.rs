use std::convert::Infallible;

use serde_json::{json, Value};
use warp::{
    filters::body::BodyDeserializeError,
    http::StatusCode,
    reject::{InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType},
    reply::{self, Reply},
    Rejection,
};

use crate::error::Error;

fn detail(message: impl ToString) -> Value {
    json!({ "detail": message.to_string() })
}

/// Renders every rejection as a JSON body. Validation errors keep their
/// field map, everything else becomes `{"detail": ...}`.
pub async fn recover(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if let Some(error) = rejection.find::<Error>() {
        let status = error.status();
        let body = match error {
            Error::Validation(errors) => serde_json::to_value(errors).unwrap_or_default(),
            _ if status.is_server_error() => {
                log::error!("> {error}");
                detail("Internal server error")
            }
            _ => detail(error),
        };
        (status, body)
    } else if let Some(e) = rejection.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, detail(e))
    } else if let Some(e) = rejection.find::<InvalidQuery>() {
        (StatusCode::BAD_REQUEST, detail(e))
    } else if rejection.find::<PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, detail("Payload too large"))
    } else if rejection.find::<LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, detail("Content-Length required"))
    } else if rejection.find::<UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            detail("Unsupported media type"),
        )
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, detail("Not found"))
    } else if rejection.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, detail("Method not allowed"))
    } else {
        log::error!("> Unhandled rejection: {rejection:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            detail("Internal server error"),
        )
    };

    Ok(reply::with_status(reply::json(&body), status))
}
