//! In-memory actor and movie catalog
//!
//! Records live in [`BTreeMap`]s behind a [`parking_lot::RwLock`], so listings
//! come back ordered by id. Ids are assigned sequentially from 1 and never
//! reused. Every movie references an existing actor; deleting an actor
//! deletes that actor's movies.
//!
//! `Catalog` is cheaply cloneable; all clones share the same records.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Catalog errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("name, age and gender are required fields.")]
    MissingActorFields,

    #[error("title, release year and actor ID are required fields")]
    MissingMovieFields,

    #[error("Actor {0} does not exist.")]
    UnknownActor(u64),

    #[error("Resource not found.")]
    ActorNotFound(u64),

    #[error("Resource not found.")]
    MovieNotFound(u64),
}

impl CatalogError {
    pub fn status_code(&self) -> u16 {
        match self {
            CatalogError::ActorNotFound(_) | CatalogError::MovieNotFound(_) => 404,
            _ => 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: u64,
    pub name: String,
    pub age: u32,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    pub release_year: i32,
    pub actor_id: u64,
}

/// Actor fields from a request body
///
/// Absent, `null` and empty-string values count as not provided.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActorInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// Movie fields from a request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovieInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub actor_id: Option<u64>,
}

fn provided(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[derive(Default)]
struct Records {
    actors: BTreeMap<u64, Actor>,
    movies: BTreeMap<u64, Movie>,
    last_actor_id: u64,
    last_movie_id: u64,
}

/// Shared in-memory catalog
#[derive(Clone, Default)]
pub struct Catalog {
    records: Arc<RwLock<Records>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-filled with seven actors and eight movies
    pub fn with_demo_data() -> Self {
        let catalog = Self::new();
        catalog.seed_demo_data();
        catalog
    }

    fn seed_demo_data(&self) {
        let actors = [
            ("Leonardo", 55, "Male"),
            ("Salman", 50, "Male"),
            ("Vivek", 22, "Male"),
            ("Pranshant", 50, "Male"),
            ("Shahrukh", 44, "Male"),
            ("Katrina", 50, "Female"),
            ("Naina", 50, "Male"),
        ];
        let movies = [
            ("Black Diamond", 2011, 1),
            ("King Kong", 2010, 1),
            ("Tarzan", 2008, 2),
            ("Harry Potter", 2012, 3),
            ("Narnia", 2020, 4),
            ("Zootopia", 1700, 5),
            ("lalaland", 2001, 6),
            ("Lion King", 2001, 7),
        ];

        let mut records = self.records.write();
        for (name, age, gender) in actors {
            records.last_actor_id += 1;
            let id = records.last_actor_id;
            records.actors.insert(
                id,
                Actor {
                    id,
                    name: name.to_string(),
                    age,
                    gender: gender.to_string(),
                },
            );
        }
        for (title, release_year, actor_id) in movies {
            records.last_movie_id += 1;
            let id = records.last_movie_id;
            records.movies.insert(
                id,
                Movie {
                    id,
                    title: title.to_string(),
                    release_year,
                    actor_id,
                },
            );
        }

        info!(
            actors = records.actors.len(),
            movies = records.movies.len(),
            "Seeded demo catalog"
        );
    }

    pub fn actors(&self) -> Vec<Actor> {
        self.records.read().actors.values().cloned().collect()
    }

    pub fn movies(&self) -> Vec<Movie> {
        self.records.read().movies.values().cloned().collect()
    }

    pub fn actor(&self, id: u64) -> Option<Actor> {
        self.records.read().actors.get(&id).cloned()
    }

    pub fn movie(&self, id: u64) -> Option<Movie> {
        self.records.read().movies.get(&id).cloned()
    }

    /// Add an actor; name, age and gender are all required
    pub fn create_actor(&self, input: ActorInput) -> Result<Actor, CatalogError> {
        let (Some(name), Some(age), Some(gender)) =
            (provided(input.name), input.age, provided(input.gender))
        else {
            return Err(CatalogError::MissingActorFields);
        };

        let mut records = self.records.write();
        records.last_actor_id += 1;
        let actor = Actor {
            id: records.last_actor_id,
            name,
            age,
            gender,
        };
        records.actors.insert(actor.id, actor.clone());
        Ok(actor)
    }

    /// Overwrite the provided fields of an actor
    pub fn update_actor(&self, id: u64, input: ActorInput) -> Result<Actor, CatalogError> {
        let mut records = self.records.write();
        let actor = records
            .actors
            .get_mut(&id)
            .ok_or(CatalogError::ActorNotFound(id))?;

        if let Some(name) = provided(input.name) {
            actor.name = name;
        }
        if let Some(age) = input.age {
            actor.age = age;
        }
        if let Some(gender) = provided(input.gender) {
            actor.gender = gender;
        }
        Ok(actor.clone())
    }

    /// Remove an actor and their movies; returns how many movies went with them
    pub fn delete_actor(&self, id: u64) -> Result<usize, CatalogError> {
        let mut records = self.records.write();
        records
            .actors
            .remove(&id)
            .ok_or(CatalogError::ActorNotFound(id))?;

        let before = records.movies.len();
        records.movies.retain(|_, movie| movie.actor_id != id);
        Ok(before - records.movies.len())
    }

    /// Add a movie; title, release year and an existing actor are required
    pub fn create_movie(&self, input: MovieInput) -> Result<Movie, CatalogError> {
        let (Some(title), Some(release_year), Some(actor_id)) =
            (provided(input.title), input.release_year, input.actor_id)
        else {
            return Err(CatalogError::MissingMovieFields);
        };

        let mut records = self.records.write();
        if !records.actors.contains_key(&actor_id) {
            return Err(CatalogError::UnknownActor(actor_id));
        }

        records.last_movie_id += 1;
        let movie = Movie {
            id: records.last_movie_id,
            title,
            release_year,
            actor_id,
        };
        records.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    /// Overwrite the provided fields of a movie
    pub fn update_movie(&self, id: u64, input: MovieInput) -> Result<Movie, CatalogError> {
        let mut records = self.records.write();
        if !records.movies.contains_key(&id) {
            return Err(CatalogError::MovieNotFound(id));
        }
        if let Some(actor_id) = input.actor_id {
            if !records.actors.contains_key(&actor_id) {
                return Err(CatalogError::UnknownActor(actor_id));
            }
        }

        let movie = records
            .movies
            .get_mut(&id)
            .ok_or(CatalogError::MovieNotFound(id))?;
        if let Some(title) = provided(input.title) {
            movie.title = title;
        }
        if let Some(release_year) = input.release_year {
            movie.release_year = release_year;
        }
        if let Some(actor_id) = input.actor_id {
            movie.actor_id = actor_id;
        }
        Ok(movie.clone())
    }

    pub fn delete_movie(&self, id: u64) -> Result<(), CatalogError> {
        self.records
            .write()
            .movies
            .remove(&id)
            .map(|_| ())
            .ok_or(CatalogError::MovieNotFound(id))
    }
}
