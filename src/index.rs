//! Index definition for film work documents.
//!
//! Field names here must match [`FilmWorkDocument`](movies_etl_core::models::FilmWorkDocument).
//! `dynamic: strict` makes Elasticsearch reject a document that drifts
//! from the mapping instead of silently adding fields.

use serde_json::json;

use movies_etl_core::sink::IndexDefinition;

fn nested_ref() -> serde_json::Value {
    json!({
        "type": "nested",
        "dynamic": "strict",
        "properties": {
            "id": { "type": "keyword" },
            "name": text()
        }
    })
}

fn settings() -> serde_json::Value {
    json!({
        "refresh_interval": "1s",
        "analysis": {
            "filter": {
                "english_stop": { "type": "stop", "stopwords": "_english_" },
                "english_stemmer": { "type": "stemmer", "language": "english" },
                "english_possessive_stemmer": { "type": "stemmer", "language": "possessive_english" },
                "russian_stop": { "type": "stop", "stopwords": "_russian_" },
                "russian_stemmer": { "type": "stemmer", "language": "russian" }
            },
            "analyzer": {
                "movies_text": {
                    "tokenizer": "standard",
                    "filter": [
                        "lowercase",
                        "english_stop",
                        "english_stemmer",
                        "english_possessive_stemmer",
                        "russian_stop",
                        "russian_stemmer"
                    ]
                }
            }
        }
    })
}

fn text() -> serde_json::Value {
    json!({ "type": "text", "analyzer": "movies_text" })
}

fn mappings() -> serde_json::Value {
    json!({
        "dynamic": "strict",
        "properties": {
            "id": { "type": "keyword" },
            "imdb_rating": { "type": "float" },
            "title": {
                "type": "text",
                "analyzer": "movies_text",
                "fields": { "raw": { "type": "keyword" } }
            },
            "description": text(),
            "type": { "type": "keyword" },
            "creation_date": { "type": "date" },
            "genre": { "type": "keyword" },
            "genres": nested_ref(),
            "directors_names": text(),
            "actors_names": text(),
            "writers_names": text(),
            "directors": nested_ref(),
            "actors": nested_ref(),
            "writers": nested_ref()
        }
    })
}

pub fn film_work_index(name: &str) -> IndexDefinition {
    IndexDefinition {
        name: name.to_string(),
        body: json!({ "settings": settings(), "mappings": mappings() }),
    }
}
