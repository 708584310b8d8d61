//! In-memory [`ChangeSource`] for tests.
//!
//! Holds a tiny catalog (genres, persons, film works and their links) behind
//! `std::sync::RwLock` and answers the same queries the PostgreSQL source
//! does, with the same ordering and cursor semantics. Failures can be
//! injected per operation to exercise retry and abort paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::batch::TrackedTable;
use crate::error::StageError;
use crate::models::{FilmWork, FlatFilmWorkRow, Genre, Person, PersonRole};
use crate::watermark::{PageCursor, Watermark};

use super::{ChangeSource, ChangedRow};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOp {
    ChangedSince,
    FilmWorksReferencing,
    Enrich,
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Fatal,
}

/// Scalar columns of a film work row.
#[derive(Debug, Clone)]
pub struct FilmWorkRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub kind: Option<String>,
    pub creation_date: Option<NaiveDate>,
    pub modified: Watermark,
}

#[derive(Default)]
struct Catalog {
    genres: HashMap<Uuid, (Genre, Watermark)>,
    persons: HashMap<Uuid, (Person, Watermark)>,
    film_works: HashMap<Uuid, FilmWorkRecord>,
    genre_links: Vec<(Uuid, Uuid)>,
    person_links: Vec<(Uuid, Uuid, Option<String>)>,
}

#[derive(Default)]
pub struct InMemorySource {
    catalog: RwLock<Catalog>,
    failures: Mutex<HashMap<SourceOp, VecDeque<FailureKind>>>,
    calls: Mutex<HashMap<SourceOp, usize>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_genre(&self, genre: Genre, modified: Watermark) {
        let mut catalog = self.catalog.write().unwrap();
        catalog.genres.insert(genre.id, (genre, modified));
    }

    pub fn upsert_person(&self, person: Person, modified: Watermark) {
        let mut catalog = self.catalog.write().unwrap();
        catalog.persons.insert(person.id, (person, modified));
    }

    pub fn upsert_film_work(&self, record: FilmWorkRecord) {
        let mut catalog = self.catalog.write().unwrap();
        catalog.film_works.insert(record.id, record);
    }

    pub fn link_genre(&self, film_work_id: Uuid, genre_id: Uuid) {
        let mut catalog = self.catalog.write().unwrap();
        catalog.genre_links.push((film_work_id, genre_id));
    }

    pub fn link_person(&self, film_work_id: Uuid, person_id: Uuid, role: Option<&str>) {
        let mut catalog = self.catalog.write().unwrap();
        catalog
            .person_links
            .push((film_work_id, person_id, role.map(str::to_string)));
    }

    /// Make the next calls of `op` fail, one failure per call, in order.
    pub fn fail_next(&self, op: SourceOp, kinds: impl IntoIterator<Item = FailureKind>) {
        let mut failures = self.failures.lock().unwrap();
        failures.entry(op).or_default().extend(kinds);
    }

    /// Number of times `op` has been invoked, failed calls included.
    pub fn calls(&self, op: SourceOp) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    fn enter(&self, op: SourceOp) -> Result<(), StageError> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        let next = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match next {
            Some(FailureKind::Transient) => Err(StageError::transient(anyhow!(
                "injected transient failure in {:?}",
                op
            ))),
            Some(FailureKind::Fatal) => {
                Err(StageError::fatal(anyhow!("injected fatal failure in {:?}", op)))
            }
            None => Ok(()),
        }
    }
}

fn page(mut rows: Vec<ChangedRow>, after: PageCursor, limit: usize) -> Vec<ChangedRow> {
    rows.retain(|row| after.precedes(row));
    rows.sort_by_key(|row| (row.modified, row.id));
    rows.truncate(limit);
    rows
}

fn unique(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

impl Catalog {
    fn genres_of(&self, film_work_id: Uuid) -> Vec<Genre> {
        self.genre_links
            .iter()
            .filter(|(fw, _)| *fw == film_work_id)
            .filter_map(|(_, genre_id)| self.genres.get(genre_id))
            .map(|(genre, _)| genre.clone())
            .collect()
    }

    fn persons_of(&self, film_work_id: Uuid) -> Vec<PersonRole> {
        self.person_links
            .iter()
            .filter(|(fw, _, _)| *fw == film_work_id)
            .filter_map(|(_, person_id, role)| {
                self.persons.get(person_id).map(|(person, _)| PersonRole {
                    person: person.clone(),
                    role: role.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChangeSource for InMemorySource {
    async fn changed_since(
        &self,
        table: TrackedTable,
        after: PageCursor,
        limit: usize,
    ) -> Result<Vec<ChangedRow>, StageError> {
        self.enter(SourceOp::ChangedSince)?;
        let catalog = self.catalog.read().unwrap();
        let rows: Vec<ChangedRow> = match table {
            TrackedTable::Genre => catalog
                .genres
                .iter()
                .map(|(id, (_, modified))| ChangedRow {
                    id: *id,
                    modified: *modified,
                })
                .collect(),
            TrackedTable::Person => catalog
                .persons
                .iter()
                .map(|(id, (_, modified))| ChangedRow {
                    id: *id,
                    modified: *modified,
                })
                .collect(),
            TrackedTable::FilmWork => catalog
                .film_works
                .values()
                .map(|fw| ChangedRow {
                    id: fw.id,
                    modified: fw.modified,
                })
                .collect(),
        };
        Ok(page(rows, after, limit))
    }

    async fn film_works_referencing(
        &self,
        table: TrackedTable,
        ids: &[Uuid],
        after: PageCursor,
        limit: usize,
    ) -> Result<Vec<ChangedRow>, StageError> {
        self.enter(SourceOp::FilmWorksReferencing)?;
        let catalog = self.catalog.read().unwrap();
        let wanted: HashSet<Uuid> = ids.iter().copied().collect();
        let linked: HashSet<Uuid> = match table {
            TrackedTable::Genre => catalog
                .genre_links
                .iter()
                .filter(|(_, genre_id)| wanted.contains(genre_id))
                .map(|(fw, _)| *fw)
                .collect(),
            TrackedTable::Person => catalog
                .person_links
                .iter()
                .filter(|(_, person_id, _)| wanted.contains(person_id))
                .map(|(fw, _, _)| *fw)
                .collect(),
            TrackedTable::FilmWork => {
                return Err(StageError::fatal(anyhow!(
                    "film_work has no link table to resolve through"
                )))
            }
        };
        let rows = linked
            .into_iter()
            .filter_map(|id| catalog.film_works.get(&id))
            .map(|fw| ChangedRow {
                id: fw.id,
                modified: fw.modified,
            })
            .collect();
        Ok(page(rows, after, limit))
    }

    async fn enrich(&self, ids: &[Uuid]) -> Result<Vec<FilmWork>, StageError> {
        self.enter(SourceOp::Enrich)?;
        let catalog = self.catalog.read().unwrap();
        Ok(unique(ids)
            .into_iter()
            .filter_map(|id| catalog.film_works.get(&id))
            .map(|fw| FilmWork {
                id: fw.id,
                title: fw.title.clone(),
                description: fw.description.clone(),
                rating: fw.rating,
                kind: fw.kind.clone(),
                creation_date: fw.creation_date,
                genres: catalog.genres_of(fw.id),
                persons: catalog.persons_of(fw.id),
            })
            .collect())
    }

    async fn enrich_flat(&self, ids: &[Uuid]) -> Result<Vec<FlatFilmWorkRow>, StageError> {
        self.enter(SourceOp::Enrich)?;
        let catalog = self.catalog.read().unwrap();
        let mut rows = Vec::new();
        for id in unique(ids) {
            let Some(fw) = catalog.film_works.get(&id) else {
                continue;
            };
            // LEFT JOIN semantics: a missing side still yields one row.
            let persons: Vec<Option<PersonRole>> = match catalog.persons_of(id) {
                p if p.is_empty() => vec![None],
                p => p.into_iter().map(Some).collect(),
            };
            let genres: Vec<Option<Genre>> = match catalog.genres_of(id) {
                g if g.is_empty() => vec![None],
                g => g.into_iter().map(Some).collect(),
            };
            for person in &persons {
                for genre in &genres {
                    rows.push(FlatFilmWorkRow {
                        id: fw.id,
                        title: fw.title.clone(),
                        description: fw.description.clone(),
                        rating: fw.rating,
                        kind: fw.kind.clone(),
                        creation_date: fw.creation_date,
                        role: person.as_ref().and_then(|p| p.role.clone()),
                        person_id: person.as_ref().map(|p| p.person.id),
                        person_name: person.as_ref().map(|p| p.person.full_name.clone()),
                        genre_id: genre.as_ref().map(|g| g.id),
                        genre_name: genre.as_ref().map(|g| g.name.clone()),
                    });
                }
            }
        }
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), StageError> {
        self.enter(SourceOp::Ping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Watermark {
        Watermark::new(Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap())
    }

    fn film_work(id: u128, modified: i64) -> FilmWorkRecord {
        FilmWorkRecord {
            id: Uuid::from_u128(id),
            title: format!("film {id}"),
            description: None,
            rating: Some(7.5),
            kind: Some("movie".to_string()),
            creation_date: None,
            modified: ts(modified),
        }
    }

    #[tokio::test]
    async fn changed_since_is_strict_sorted_and_limited() {
        let source = InMemorySource::new();
        for (id, modified) in [(3, 30), (1, 10), (2, 20), (4, 40)] {
            source.upsert_film_work(film_work(id, modified));
        }

        let rows = source
            .changed_since(TrackedTable::FilmWork, PageCursor::after(ts(10)), 2)
            .await
            .unwrap();
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(2), Uuid::from_u128(3)]);
    }

    #[tokio::test]
    async fn referencing_deduplicates_film_works() {
        let source = InMemorySource::new();
        source.upsert_film_work(film_work(1, 10));
        let a = Person {
            id: Uuid::from_u128(100),
            full_name: "A".into(),
        };
        let b = Person {
            id: Uuid::from_u128(101),
            full_name: "B".into(),
        };
        source.upsert_person(a.clone(), ts(1));
        source.upsert_person(b.clone(), ts(1));
        source.link_person(Uuid::from_u128(1), a.id, Some("actor"));
        source.link_person(Uuid::from_u128(1), b.id, Some("writer"));

        let rows = source
            .film_works_referencing(
                TrackedTable::Person,
                &[a.id, b.id],
                PageCursor::after(Watermark::origin()),
                10,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, Uuid::from_u128(1));
    }

    #[tokio::test]
    async fn enrich_flat_emits_one_row_for_unlinked_film_work() {
        let source = InMemorySource::new();
        source.upsert_film_work(film_work(1, 10));
        let rows = source.enrich_flat(&[Uuid::from_u128(1)]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].person_id.is_none());
        assert!(rows[0].genre_id.is_none());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let source = InMemorySource::new();
        source.fail_next(SourceOp::Ping, [FailureKind::Transient, FailureKind::Fatal]);

        assert!(source.ping().await.unwrap_err().is_transient());
        assert!(!source.ping().await.unwrap_err().is_transient());
        assert!(source.ping().await.is_ok());
        assert_eq!(source.calls(SourceOp::Ping), 3);
    }
}
