use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use crate::error::Error;

use super::jwt::{verify_jwt_session, Identity, SessionData};

const TOKEN_SCHEMES: &[&str] = &["Token ", "Bearer "];

/// Resolves the caller from an `Authorization` header or a `session` cookie.
/// No credentials means anonymous; broken credentials are an error.
pub fn resolve_identity(
    authorization: Option<&str>,
    cookie: Option<&str>,
    secret: &[u8],
) -> Result<Identity, Error> {
    let token = match authorization {
        Some(header) => Some(
            TOKEN_SCHEMES
                .iter()
                .find_map(|scheme| header.strip_prefix(scheme))
                .ok_or_else(|| Error::Unauthorized("Unsupported authorization scheme".to_owned()))?,
        ),
        None => cookie,
    };

    match token {
        Some(token) => {
            let session: SessionData = verify_jwt_session(token.trim(), secret)?.into();
            Ok(Identity::User(session))
        }
        None => Ok(Identity::Anonymous),
    }
}

pub fn with_identity(
    secret: Arc<Vec<u8>>,
) -> impl Filter<Extract = (Identity,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::cookie::optional::<String>("session"))
        .and_then(move |header: Option<String>, cookie: Option<String>| {
            let secret = secret.clone();
            async move {
                resolve_identity(header.as_deref(), cookie.as_deref(), &secret)
                    .map_err(warp::reject::custom)
            }
        })
}

pub fn with_session(
    secret: Arc<Vec<u8>>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    with_identity(secret).and_then(|identity: Identity| async move {
        identity.into_session().map_err(warp::reject::custom)
    })
}
