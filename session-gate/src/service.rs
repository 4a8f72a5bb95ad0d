//! Utilities for services building

use actix_web::error::{ErrorInternalServerError, ErrorUnauthorized};
use actix_web::web::{Data, ServiceConfig};
use actix_web::{HttpMessage, delete, middleware};
use actix_web::{HttpRequest, HttpResponse, Result, get, post, web};
use async_graphql::EmptySubscription;
use async_graphql::http::GraphiQLSource;
use async_graphql_actix_web::{GraphQLRequest, GraphQLResponse};
use serde::Serialize;


mod session;

use crate::model::Model;
use crate::model::sessions::LoginSession;
use crate::mutation::Mutation;
use crate::query::Query;

/// Root GraphQL schema
pub type Schema = async_graphql::Schema<Query, Mutation, EmptySubscription>;

/// Validity of the current session's access token
#[derive(Debug, Serialize)]
struct ValidityResponse {
    valid: bool,
    reason: &'static str,
}

/// Tells whether the current session holds a usable access token
#[get("/session/validity")]
async fn session_validity(req: HttpRequest, model: Data<Model>) -> web::Json<ValidityResponse> {
    let response = match req.extensions().get::<LoginSession>() {
        Some(session) => {
            let validity = model.validator().check(&session.login);
            ValidityResponse {
                valid: validity.is_valid(),
                reason: validity.reason(),
            }
        }
        None => ValidityResponse {
            valid: false,
            reason: "missing_session",
        },
    };

    web::Json(response)
}

/// Returns the access token of the current session, only while it is valid
#[get("/session/token")]
async fn session_token(req: HttpRequest, model: Data<Model>) -> Result<HttpResponse> {
    let extensions = req.extensions();
    let session = extensions
        .get::<LoginSession>()
        .ok_or_else(|| ErrorUnauthorized("Missing session"))?;

    let token = session
        .login
        .usable_access_token(model.validator())
        .ok_or_else(|| ErrorUnauthorized("Access token is not valid"))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(token.to_owned()))
}

/// Closes current session
#[delete("/session")]
async fn logout(req: HttpRequest, model: Data<Model>) -> Result<()> {
    let session = req.extensions_mut().remove::<LoginSession>();
    if let Some(session) = session {
        session
            .logout(model.db())
            .await
            .map_err(|_| ErrorInternalServerError("Cannot close session"))?;
    }

    Ok(())
}

/// ActixWeb GraphQL endpoint
#[post("/api")]
async fn api(
    schema: web::Data<Schema>,
    req: HttpRequest,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = request.into_inner();
    if let Some(session) = req.extensions_mut().remove::<LoginSession>() {
        request = request.data(session);
    }
    schema.execute(request).await.into()
}

/// ActixWeb GraphQLi endpoint
#[get("/pg")]
async fn graphiql() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(GraphiQLSource::build().endpoint("/api").finish()))
}

/// Returns configuration function for the ActixWeb services
pub fn configure(graphiql_enabled: bool, model: Model) -> impl Fn(&mut ServiceConfig) + Clone {
    move |cfg: &mut ServiceConfig| {
        let session_aware = {
            web::scope("")
                .wrap(middleware::from_fn(session::middleware))
                .service(api)
                .service(session_validity)
                .service(session_token)
                .service(logout)
        };

        cfg.app_data(Data::new(model.schema()))
            .app_data(Data::new(model.clone()));

        if graphiql_enabled {
            cfg.service(graphiql);
        }

        cfg.service(session_aware);
    }
}
