//! SQL text for the three query shapes the pipeline runs.
//!
//! Table and schema names are interpolated, never user values: tables come
//! from [`TrackedTable`] and the schema is validated as a plain identifier
//! when the config is loaded. Everything else is a bind parameter.
//!
//! All paged queries use keyset pagination on `(modified, id)`:
//! `$n` = cursor timestamp, `$n+1` = cursor id, `$n+2` = page size.

use movies_etl_core::TrackedTable;

/// `$1` modified, `$2` id, `$3` limit.
pub fn changed_since(schema: &str, table: TrackedTable) -> String {
    format!(
        r#"SELECT id, modified
FROM {schema}.{table}
WHERE modified > $1 OR (modified = $1 AND id > $2)
ORDER BY modified, id
LIMIT $3"#,
        table = table.table_name(),
    )
}

/// `$1` dependency ids, `$2` modified, `$3` id, `$4` limit.
///
/// Returns `None` for the root table, which has nothing to resolve.
pub fn film_works_referencing(schema: &str, table: TrackedTable) -> Option<String> {
    let (link_table, link_column) = table.link()?;
    Some(format!(
        r#"SELECT fw.id, fw.modified
FROM {schema}.film_work fw
WHERE EXISTS (
    SELECT 1 FROM {schema}.{link_table} l
    WHERE l.film_work_id = fw.id AND l.{link_column} = ANY($1)
)
AND (fw.modified > $2 OR (fw.modified = $2 AND fw.id > $3))
ORDER BY fw.modified, fw.id
LIMIT $4"#
    ))
}

const ENRICH_JOINS: &str = r#"
LEFT JOIN {schema}.person_film_work pfw ON pfw.film_work_id = fw.id
LEFT JOIN {schema}.person p ON p.id = pfw.person_id
LEFT JOIN {schema}.genre_film_work gfw ON gfw.film_work_id = fw.id
LEFT JOIN {schema}.genre g ON g.id = gfw.genre_id"#;

fn joins(schema: &str) -> String {
    ENRICH_JOINS.replace("{schema}", schema)
}

/// `$1` film work ids. One row per film work, persons and genres as JSON arrays.
pub fn enrich_aggregated(schema: &str) -> String {
    format!(
        r#"SELECT
    fw.id,
    fw.title,
    fw.description,
    fw.rating,
    fw.type,
    fw.creation_date,
    COALESCE(
        jsonb_agg(DISTINCT jsonb_build_object(
            'id', p.id,
            'full_name', p.full_name,
            'role', pfw.role
        )) FILTER (WHERE p.id IS NOT NULL),
        '[]'::jsonb
    ) AS persons,
    COALESCE(
        jsonb_agg(DISTINCT jsonb_build_object(
            'id', g.id,
            'name', g.name,
            'description', g.description
        )) FILTER (WHERE g.id IS NOT NULL),
        '[]'::jsonb
    ) AS genres
FROM {schema}.film_work fw{joins}
WHERE fw.id = ANY($1)
GROUP BY fw.id
ORDER BY fw.id"#,
        joins = joins(schema),
    )
}

/// `$1` film work ids. One row per (film work, person link, genre).
pub fn enrich_flat(schema: &str) -> String {
    format!(
        r#"SELECT
    fw.id,
    fw.title,
    fw.description,
    fw.rating,
    fw.type,
    fw.creation_date,
    pfw.role,
    p.id AS person_id,
    p.full_name AS person_name,
    g.id AS genre_id,
    g.name AS genre_name
FROM {schema}.film_work fw{joins}
WHERE fw.id = ANY($1)
ORDER BY fw.id"#,
        joins = joins(schema),
    )
}
