//! Casting API router
//!
//! Parses incoming requests into typed routes. Every protected route names
//! the single permission a caller must hold.

use crate::auth::RequiredPermission;
use thiserror::Error;

/// Router errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("No route for path: {0}")]
    NotFound(String),

    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },
}

impl RouterError {
    pub fn status_code(&self) -> u16 {
        match self {
            RouterError::NotFound(_) => 404,
            RouterError::MethodNotAllowed { .. } => 405,
        }
    }
}

/// API operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// GET /
    Index,
    /// GET /health
    Health,
    /// OPTIONS on any path
    Preflight,
    /// GET /actors
    ListActors,
    /// POST /actors
    CreateActor,
    /// PATCH /actors/{id}
    UpdateActor(u64),
    /// DELETE /actors/{id}
    DeleteActor(u64),
    /// GET /movies
    ListMovies,
    /// POST /movies
    CreateMovie,
    /// PATCH /movies/{id}
    UpdateMovie(u64),
    /// DELETE /movies/{id}
    DeleteMovie(u64),
}

/// Which collection a path addresses
#[derive(Clone, Copy)]
enum Collection {
    Actors,
    Movies,
}

impl Route {
    /// Resolve a request method and path to a route
    pub fn parse(method: &str, path: &str) -> Result<Route, RouterError> {
        if method == "OPTIONS" {
            return Ok(Route::Preflight);
        }

        let not_allowed = || RouterError::MethodNotAllowed {
            method: method.to_string(),
            path: path.to_string(),
        };
        let not_found = || RouterError::NotFound(path.to_string());

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            [""] => match method {
                "GET" => Ok(Route::Index),
                _ => Err(not_allowed()),
            },
            ["health"] => match method {
                "GET" => Ok(Route::Health),
                _ => Err(not_allowed()),
            },
            [collection] => {
                let collection = Self::collection(collection).ok_or_else(not_found)?;
                match (method, collection) {
                    ("GET", Collection::Actors) => Ok(Route::ListActors),
                    ("POST", Collection::Actors) => Ok(Route::CreateActor),
                    ("GET", Collection::Movies) => Ok(Route::ListMovies),
                    ("POST", Collection::Movies) => Ok(Route::CreateMovie),
                    _ => Err(not_allowed()),
                }
            }
            [collection, id] => {
                let collection = Self::collection(collection).ok_or_else(not_found)?;
                let id: u64 = id.parse().map_err(|_| not_found())?;
                match (method, collection) {
                    ("PATCH", Collection::Actors) => Ok(Route::UpdateActor(id)),
                    ("DELETE", Collection::Actors) => Ok(Route::DeleteActor(id)),
                    ("PATCH", Collection::Movies) => Ok(Route::UpdateMovie(id)),
                    ("DELETE", Collection::Movies) => Ok(Route::DeleteMovie(id)),
                    _ => Err(not_allowed()),
                }
            }
            _ => Err(not_found()),
        }
    }

    fn collection(segment: &str) -> Option<Collection> {
        match segment {
            "actors" => Some(Collection::Actors),
            "movies" => Some(Collection::Movies),
            _ => None,
        }
    }

    /// Permission required to call this route, `None` for public routes
    pub fn required_permission(&self) -> Option<RequiredPermission> {
        match self {
            Route::Index | Route::Health | Route::Preflight => None,
            Route::ListActors => Some(RequiredPermission::GET_ACTORS),
            Route::CreateActor => Some(RequiredPermission::POST_ACTORS),
            Route::UpdateActor(_) => Some(RequiredPermission::PATCH_ACTORS),
            Route::DeleteActor(_) => Some(RequiredPermission::DELETE_ACTORS),
            Route::ListMovies => Some(RequiredPermission::GET_MOVIES),
            Route::CreateMovie => Some(RequiredPermission::POST_MOVIES),
            Route::UpdateMovie(_) => Some(RequiredPermission::PATCH_MOVIES),
            Route::DeleteMovie(_) => Some(RequiredPermission::DELETE_MOVIES),
        }
    }

    /// Route template, used as a low-cardinality metrics label
    pub fn name(&self) -> &'static str {
        match self {
            Route::Index => "/",
            Route::Health => "/health",
            Route::Preflight => "preflight",
            Route::ListActors | Route::CreateActor => "/actors",
            Route::UpdateActor(_) | Route::DeleteActor(_) => "/actors/{id}",
            Route::ListMovies | Route::CreateMovie => "/movies",
            Route::UpdateMovie(_) | Route::DeleteMovie(_) => "/movies/{id}",
        }
    }
}
