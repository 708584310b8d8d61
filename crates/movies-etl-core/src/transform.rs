//! Transform stage: enriched film works → index documents.
//!
//! Nested collections are always recomputed from the enrichment result,
//! de-duplicated by id and sorted by `(name, id)`, so transforming the same
//! source state twice yields byte-identical documents.
//!
//! A person holding several roles on one film work appears once in each
//! matching role collection. Links with a missing or unknown role are kept
//! out of all three.

use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;

use crate::error::StageError;
use crate::models::{
    FilmWork, FilmWorkDocument, FlatFilmWorkRow, Genre, NamedRef, Person, PersonRole, Role,
};
use crate::sink::IndexDocument;

/// Sort `(id, name)` pairs into stable, de-duplicated references.
fn sorted_refs(pairs: impl IntoIterator<Item = (Uuid, String)>) -> Vec<NamedRef> {
    let unique: BTreeMap<Uuid, String> = pairs.into_iter().collect();
    let mut refs: Vec<NamedRef> = unique
        .into_iter()
        .map(|(id, name)| NamedRef { id, name })
        .collect();
    refs.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
    refs
}

fn with_role(persons: &[PersonRole], role: Role) -> Vec<NamedRef> {
    sorted_refs(
        persons
            .iter()
            .filter(|link| link.role.as_deref().and_then(|r| r.parse::<Role>().ok()) == Some(role))
            .map(|link| (link.person.id, link.person.full_name.clone())),
    )
}

fn names(refs: &[NamedRef]) -> Vec<String> {
    refs.iter().map(|r| r.name.clone()).collect()
}

/// Build the index document for one film work.
pub fn to_document(film_work: &FilmWork) -> FilmWorkDocument {
    let genres = sorted_refs(
        film_work
            .genres
            .iter()
            .map(|genre| (genre.id, genre.name.clone())),
    );
    let directors = with_role(&film_work.persons, Role::Director);
    let actors = with_role(&film_work.persons, Role::Actor);
    let writers = with_role(&film_work.persons, Role::Writer);

    FilmWorkDocument {
        id: film_work.id,
        imdb_rating: film_work.rating,
        title: film_work.title.clone(),
        description: film_work.description.clone(),
        kind: film_work.kind.clone(),
        creation_date: film_work.creation_date,
        genre: names(&genres),
        genres,
        directors_names: names(&directors),
        actors_names: names(&actors),
        writers_names: names(&writers),
        directors,
        actors,
        writers,
    }
}

/// Serialize one document per distinct film work id, bound for `index`.
///
/// When an id repeats, the first occurrence wins.
pub fn to_index_documents(
    film_works: &[FilmWork],
    index: &str,
) -> Result<Vec<IndexDocument>, StageError> {
    let mut seen = HashSet::new();
    let mut documents = Vec::with_capacity(film_works.len());
    for film_work in film_works {
        if !seen.insert(film_work.id) {
            continue;
        }
        let source = serde_json::to_string(&to_document(film_work)).map_err(|e| {
            StageError::fatal(e).context(format!("serializing film work {}", film_work.id))
        })?;
        documents.push(IndexDocument {
            index: index.to_string(),
            id: film_work.id.to_string(),
            source,
        });
    }
    Ok(documents)
}

/// Group one-row-per-join-tuple input into one [`FilmWork`] per id.
///
/// Film works keep the order in which their id first appears; scalar
/// columns come from that first row.
pub fn group_flat_rows(rows: &[FlatFilmWorkRow]) -> Vec<FilmWork> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut grouped: HashMap<Uuid, FilmWork> = HashMap::new();
    let mut seen_genres: HashSet<(Uuid, Uuid)> = HashSet::new();
    let mut seen_links: HashSet<(Uuid, Uuid, Option<String>)> = HashSet::new();

    for row in rows {
        let film_work = grouped.entry(row.id).or_insert_with(|| {
            order.push(row.id);
            FilmWork {
                id: row.id,
                title: row.title.clone(),
                description: row.description.clone(),
                rating: row.rating,
                kind: row.kind.clone(),
                creation_date: row.creation_date,
                genres: Vec::new(),
                persons: Vec::new(),
            }
        });

        if let (Some(genre_id), Some(name)) = (row.genre_id, &row.genre_name) {
            if seen_genres.insert((row.id, genre_id)) {
                film_work.genres.push(Genre {
                    id: genre_id,
                    name: name.clone(),
                    description: None,
                });
            }
        }

        if let (Some(person_id), Some(full_name)) = (row.person_id, &row.person_name) {
            if seen_links.insert((row.id, person_id, row.role.clone())) {
                film_work.persons.push(PersonRole {
                    person: Person {
                        id: person_id,
                        full_name: full_name.clone(),
                    },
                    role: row.role.clone(),
                });
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| grouped.remove(&id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: u128, name: &str, role: Option<&str>) -> PersonRole {
        PersonRole {
            person: Person {
                id: Uuid::from_u128(id),
                full_name: name.to_string(),
            },
            role: role.map(str::to_string),
        }
    }

    fn genre(id: u128, name: &str) -> Genre {
        Genre {
            id: Uuid::from_u128(id),
            name: name.to_string(),
            description: None,
        }
    }

    fn arrival() -> FilmWork {
        FilmWork {
            id: Uuid::from_u128(1),
            title: "Arrival".to_string(),
            description: Some("Linguist meets heptapods".to_string()),
            rating: Some(7.9),
            kind: Some("movie".to_string()),
            creation_date: None,
            genres: vec![genre(11, "Sci-Fi"), genre(10, "Drama")],
            persons: vec![
                person(20, "Eric Heisserer", Some("writer")),
                person(21, "Denis Villeneuve", Some("director")),
                person(22, "Amy Adams", Some("actor")),
                person(23, "Jeremy Renner", Some("actor")),
            ],
        }
    }

    #[test]
    fn scalars_are_copied() {
        let doc = to_document(&arrival());
        assert_eq!(doc.id, Uuid::from_u128(1));
        assert_eq!(doc.title, "Arrival");
        assert_eq!(doc.imdb_rating, Some(7.9));
        assert_eq!(doc.kind.as_deref(), Some("movie"));
    }

    #[test]
    fn collections_are_partitioned_and_sorted() {
        let doc = to_document(&arrival());
        assert_eq!(doc.genre, vec!["Drama", "Sci-Fi"]);
        assert_eq!(doc.actors_names, vec!["Amy Adams", "Jeremy Renner"]);
        assert_eq!(doc.directors_names, vec!["Denis Villeneuve"]);
        assert_eq!(doc.writers_names, vec!["Eric Heisserer"]);
        assert_eq!(doc.writers[0].id, Uuid::from_u128(20));
    }

    #[test]
    fn person_with_two_roles_lands_in_both_collections_only() {
        let mut fw = arrival();
        fw.persons = vec![
            person(30, "Taylor Sheridan", Some("actor")),
            person(30, "Taylor Sheridan", Some("writer")),
        ];
        let doc = to_document(&fw);
        assert_eq!(doc.actors_names, vec!["Taylor Sheridan"]);
        assert_eq!(doc.writers_names, vec!["Taylor Sheridan"]);
        assert!(doc.directors.is_empty());
    }

    #[test]
    fn null_and_unknown_roles_are_ignored() {
        let mut fw = arrival();
        fw.persons = vec![person(40, "Nobody", None), person(41, "Someone", Some("producer"))];
        let doc = to_document(&fw);
        assert!(doc.actors.is_empty() && doc.writers.is_empty() && doc.directors.is_empty());
    }

    #[test]
    fn film_work_without_links_has_empty_collections() {
        let mut fw = arrival();
        fw.genres.clear();
        fw.persons.clear();
        let doc = to_document(&fw);
        assert!(doc.genre.is_empty());
        assert!(doc.actors.is_empty());
        assert!(doc.writers.is_empty());
        assert!(doc.directors.is_empty());
    }

    #[test]
    fn serialization_is_stable_under_input_reordering() {
        let a = arrival();
        let mut b = arrival();
        b.genres.reverse();
        b.persons.reverse();

        let docs_a = to_index_documents(&[a], "movies").unwrap();
        let docs_b = to_index_documents(&[b], "movies").unwrap();
        assert_eq!(docs_a, docs_b);
        assert_eq!(docs_a[0].id, Uuid::from_u128(1).to_string());
    }

    #[test]
    fn duplicate_ids_produce_one_document() {
        let docs = to_index_documents(&[arrival(), arrival()], "movies").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].index, "movies");
    }

    #[test]
    fn document_field_names_match_index_mapping() {
        let docs = to_index_documents(&[arrival()], "movies").unwrap();
        let value: serde_json::Value = serde_json::from_str(&docs[0].source).unwrap();
        for field in [
            "id",
            "imdb_rating",
            "title",
            "description",
            "type",
            "genre",
            "genres",
            "actors_names",
            "writers_names",
            "directors_names",
            "actors",
            "writers",
            "directors",
        ] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }

    fn flat(person: Option<(u128, &str, &str)>, genre: Option<(u128, &str)>) -> FlatFilmWorkRow {
        FlatFilmWorkRow {
            id: Uuid::from_u128(1),
            title: "Arrival".to_string(),
            description: None,
            rating: Some(7.9),
            kind: Some("movie".to_string()),
            creation_date: None,
            role: person.map(|p| p.2.to_string()),
            person_id: person.map(|p| Uuid::from_u128(p.0)),
            person_name: person.map(|p| p.1.to_string()),
            genre_id: genre.map(|g| Uuid::from_u128(g.0)),
            genre_name: genre.map(|g| g.1.to_string()),
        }
    }

    #[test]
    fn flat_rows_group_into_the_same_document() {
        let rows = vec![
            flat(Some((22, "Amy Adams", "actor")), Some((11, "Sci-Fi"))),
            flat(Some((22, "Amy Adams", "actor")), Some((10, "Drama"))),
            flat(Some((21, "Denis Villeneuve", "director")), Some((11, "Sci-Fi"))),
            flat(Some((21, "Denis Villeneuve", "director")), Some((10, "Drama"))),
        ];
        let grouped = group_flat_rows(&rows);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].genres.len(), 2);
        assert_eq!(grouped[0].persons.len(), 2);

        let doc = to_document(&grouped[0]);
        assert_eq!(doc.genre, vec!["Drama", "Sci-Fi"]);
        assert_eq!(doc.actors_names, vec!["Amy Adams"]);
        assert_eq!(doc.directors_names, vec!["Denis Villeneuve"]);
    }

    #[test]
    fn flat_row_without_links_still_yields_a_film_work() {
        let grouped = group_flat_rows(&[flat(None, None)]);
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].genres.is_empty());
        assert!(grouped[0].persons.is_empty());
    }
}
