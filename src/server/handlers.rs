//! Request handlers and JSON responses
//!
//! Every response carries the CORS headers; errors use the envelope
//! `{"success": false, "error": <status>, "message": <text>}`.

use super::AppState;
use crate::auth::AuthFailure;
use crate::catalog::{ActorInput, Catalog, CatalogError, MovieInput};
use crate::router::{Route, RouterError};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, WWW_AUTHENTICATE,
};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const ALLOW_HEADERS: &str = "Content-Type,Authorization,true";
const ALLOW_METHODS: &str = "GET,PUT,POST,DELETE,OPTIONS,PATCH";

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

const NOT_FOUND_MESSAGE: &str = "Resource not found.";
const UNPROCESSABLE_MESSAGE: &str = "Unable to process your request. Please try again later.";

type HttpResponse = Response<Full<Bytes>>;

pub(super) async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<HttpResponse, Infallible> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let (route_name, response) = match Route::parse(method.as_str(), &path) {
        Ok(route) => (route.name(), dispatch(route, req, &state).await),
        Err(e) => {
            debug!(method = %method, path = %path, error = %e, "Unroutable request");
            ("unmatched", router_error(&e))
        }
    };

    let status = response.status().as_u16();
    debug!(method = %method, path = %path, status, "Handled request");
    crate::metrics::record_http_request(route_name, status, started.elapsed().as_secs_f64());

    Ok(with_cors(response))
}

async fn dispatch(route: Route, req: Request<Incoming>, state: &AppState) -> HttpResponse {
    let Some(required) = route.required_permission() else {
        return match route {
            Route::Index => json_response(
                StatusCode::OK,
                &json!({ "message": "Welcome to the casting agency" }),
            ),
            Route::Health => {
                let mut response = Response::new(Full::new(Bytes::from_static(b"ok")));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                response
            }
            _ => {
                let mut response = Response::new(Full::new(Bytes::new()));
                *response.status_mut() = StatusCode::NO_CONTENT;
                response
            }
        };
    };

    let (parts, body) = req.into_parts();
    let catalog = state.catalog.clone();

    match state
        .guard
        .protect(&parts.headers, required, |_claims| {
            handle_protected(route, body, catalog)
        })
        .await
    {
        Ok(response) => response,
        Err(failure) => auth_error(&failure),
    }
}

/// Runs only after the caller was authorized for `route`
async fn handle_protected(route: Route, body: Incoming, catalog: Catalog) -> HttpResponse {
    let result = match route {
        Route::ListActors => Ok(success("actors", json!(catalog.actors()))),
        Route::CreateActor => match read_input::<ActorInput, _>(body).await {
            Ok(input) => catalog
                .create_actor(input)
                .map(|actor| success("actor", json!([actor]))),
            Err(response) => return response,
        },
        Route::UpdateActor(id) => {
            if catalog.actor(id).is_none() {
                return not_found();
            }
            match read_input::<ActorInput, _>(body).await {
                Ok(input) => catalog
                    .update_actor(id, input)
                    .map(|actor| success("actors", json!([actor]))),
                Err(response) => return response,
            }
        }
        Route::DeleteActor(id) => catalog
            .delete_actor(id)
            .map(|_| success("delete", json!(id.to_string()))),
        Route::ListMovies => Ok(success("movies", json!(catalog.movies()))),
        Route::CreateMovie => match read_input::<MovieInput, _>(body).await {
            Ok(input) => catalog
                .create_movie(input)
                .map(|movie| success("movies", json!([movie]))),
            Err(response) => return response,
        },
        Route::UpdateMovie(id) => {
            if catalog.movie(id).is_none() {
                return not_found();
            }
            match read_input::<MovieInput, _>(body).await {
                Ok(input) => catalog
                    .update_movie(id, input)
                    .map(|movie| success("movies", json!([movie]))),
                Err(response) => return response,
            }
        }
        Route::DeleteMovie(id) => catalog
            .delete_movie(id)
            .map(|_| success("delete", json!(id.to_string()))),
        Route::Index | Route::Health | Route::Preflight => return not_found(),
    };

    result.unwrap_or_else(|e| catalog_error(&e))
}

/// Read a JSON object body into `T`
///
/// Bodies over [`MAX_BODY_BYTES`] are 413. A body that is not a JSON object
/// is 422; an object with fields of the wrong type is 400.
async fn read_input<T, B>(body: B) -> Result<T, HttpResponse>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            debug!(limit = MAX_BODY_BYTES, "Request body too large");
            return Err(error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body is too large.",
            ));
        }
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Unable to read request body.",
            ));
        }
    };

    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(value @ Value::Object(_)) => value,
        _ => {
            return Err(error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                UNPROCESSABLE_MESSAGE,
            ))
        }
    };

    serde_json::from_value(value).map_err(|e| {
        debug!(error = %e, "Request body has invalid field types");
        error_response(StatusCode::BAD_REQUEST, "Request body has invalid field values.")
    })
}

fn success(key: &str, value: Value) -> HttpResponse {
    let mut body = serde_json::Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    body.insert(key.to_string(), value);
    json_response(StatusCode::OK, &Value::Object(body))
}

fn json_response(status: StatusCode, body: &Value) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    json_response(
        status,
        &json!({
            "success": false,
            "error": status.as_u16(),
            "message": message,
        }),
    )
}

fn not_found() -> HttpResponse {
    error_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
}

fn router_error(e: &RouterError) -> HttpResponse {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::NOT_FOUND);
    match e {
        RouterError::NotFound(_) => not_found(),
        RouterError::MethodNotAllowed { .. } => error_response(status, "Method not allowed."),
    }
}

fn catalog_error(e: &CatalogError) -> HttpResponse {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    error_response(status, &e.to_string())
}

fn auth_error(failure: &AuthFailure) -> HttpResponse {
    let status = StatusCode::from_u16(failure.status()).unwrap_or(StatusCode::UNAUTHORIZED);
    let mut response = error_response(status, &failure.description);
    if failure.kind.is_unauthenticated() {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

fn with_cors(mut response: HttpResponse) -> HttpResponse {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    response
}
