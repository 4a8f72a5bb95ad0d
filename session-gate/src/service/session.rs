//! Session management

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::error::ErrorUnauthorized;
use actix_web::http::header;
use actix_web::middleware::Next;
use actix_web::web::Data;
use actix_web::{Error, HttpMessage};
use tracing::{debug, warn};

use crate::model::Model;
use crate::model::sessions::SessionKey;

/// Authenticates the `Authorization: Session {key}` header
///
/// Requests without the header pass through anonymously. On success the `LoginSession` is attached
/// to the request extensions; any header that doesn't authenticate is rejected.
pub async fn middleware<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<B>, Error>
where
    B: MessageBody + 'static,
{
    if let Some(auth_header) = req.headers().get(header::AUTHORIZATION) {
        let auth_header = auth_header
            .to_str()
            .map_err(|err| ErrorUnauthorized(err.to_string()))?;

        let key = SessionKey::from_authorization(auth_header)
            .map_err(|err| ErrorUnauthorized(err.to_string()))?;

        let model: Data<Model> = req
            .app_data()
            .cloned()
            .ok_or_else(|| ErrorUnauthorized("Missing context"))?;

        let session = key.authenticate(model.db()).await.map_err(|err| {
            warn!(%err, "Session authentication failed");
            ErrorUnauthorized(err.to_string())
        })?;

        let validity = model.validator().check(&session.login);
        debug!(session = %session.id, %validity, "Session authenticated");

        req.extensions_mut().insert(session);
    }

    next.call(req).await
}
