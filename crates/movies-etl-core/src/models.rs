//! Core data models.
//!
//! [`FilmWork`] is the enriched representation fetched from the relational
//! source (one value per film work, related genres and persons nested).
//! [`FlatFilmWorkRow`] is the degenerate one-row-per-join-tuple shape.
//! [`FilmWorkDocument`] is what ends up in the search index.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role a person holds on a film work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Actor,
    Director,
    Writer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Actor => "actor",
            Role::Director => "director",
            Role::Writer => "writer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actor" => Ok(Role::Actor),
            "director" => Ok(Role::Director),
            "writer" => Ok(Role::Writer),
            other => anyhow::bail!("Unknown role: '{}'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub full_name: String,
}

/// A person linked to a film work. The role column is free text in the
/// source schema, so it is kept raw here and parsed during transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRole {
    #[serde(flatten)]
    pub person: Person,
    #[serde(default)]
    pub role: Option<String>,
}

/// A film work with all related genres and persons, as enriched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmWork {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub creation_date: Option<NaiveDate>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub persons: Vec<PersonRole>,
}

/// One `(film work, person link, genre)` tuple from an un-aggregated join.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatFilmWorkRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub kind: Option<String>,
    pub creation_date: Option<NaiveDate>,
    pub role: Option<String>,
    pub person_id: Option<Uuid>,
    pub person_name: Option<String>,
    pub genre_id: Option<Uuid>,
    pub genre_name: Option<String>,
}

/// `{id, name}` reference embedded in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: Uuid,
    pub name: String,
}

/// Search index document for one film work.
///
/// Field order is the serialized order, which keeps documents byte-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmWorkDocument {
    pub id: Uuid,
    pub imdb_rating: Option<f64>,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub creation_date: Option<NaiveDate>,
    pub genre: Vec<String>,
    pub genres: Vec<NamedRef>,
    pub directors_names: Vec<String>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub directors: Vec<NamedRef>,
    pub actors: Vec<NamedRef>,
    pub writers: Vec<NamedRef>,
}
