//! Tag query translation to parameterized BigQuery Standard SQL.
//!
//! The table is append-only, so rows are first reduced to the latest row per
//! id. Each requested tag then becomes
//!
//! ```text
//! (EXISTS(SELECT 1 FROM UNNEST(b.user_tags) AS t WHERE t.name = @tag_name_N AND t.value = @tag_value_N)
//!  OR EXISTS(SELECT 1 FROM UNNEST(b.system_tags) AS t WHERE ...))
//! ```
//!
//! Tag names and values are bound exclusively as named parameters.

use crate::error::TranslationError;
use crate::query::check_tags;
use lakeside_core::Tag;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;

/// Columns returned by search, in decoding order.
pub const SEARCH_COLUMNS: [&str; 8] = [
    "id",
    "name",
    "content_type",
    "timestamp",
    "source",
    "user_tags",
    "system_tags",
    "size",
];

/// Table schema the rows and queries rely on, in the REST `TableSchema`
/// shape. `ingested_at` must be a TIMESTAMP so the latest-row ordering
/// compares instants rather than strings.
pub fn table_schema() -> Value {
    let column = |name: &str, kind: &str, mode: &str| json!({ "name": name, "type": kind, "mode": mode });
    let tags = |name: &str| {
        json!({
            "name": name,
            "type": "RECORD",
            "mode": "REPEATED",
            "fields": [column("name", "STRING", "REQUIRED"), column("value", "STRING", "NULLABLE")],
        })
    };

    json!({
        "fields": [
            column("id", "STRING", "REQUIRED"),
            column("name", "STRING", "REQUIRED"),
            column("content_type", "STRING", "REQUIRED"),
            column("timestamp", "TIMESTAMP", "REQUIRED"),
            column("source", "STRING", "REQUIRED"),
            tags("user_tags"),
            tags("system_tags"),
            column("size", "INT64", "REQUIRED"),
            column("file", "STRING", "REQUIRED"),
            column("ingested_at", "TIMESTAMP", "REQUIRED"),
        ]
    })
}

/// Fully qualified table name.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    /// Identifiers are interpolated into SQL, so only plain identifier
    /// characters are accepted.
    pub fn validate(&self) -> Result<(), String> {
        let project_ok = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':');
        let name_ok = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-');

        if self.project.is_empty() || !self.project.chars().all(project_ok) {
            return Err(format!("invalid BigQuery project: {:?}", self.project));
        }
        if self.dataset.is_empty() || !self.dataset.chars().all(name_ok) {
            return Err(format!("invalid BigQuery dataset: {:?}", self.dataset));
        }
        if self.table.is_empty() || !self.table.chars().all(name_ok) {
            return Err(format!("invalid BigQuery table: {:?}", self.table));
        }
        Ok(())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}.{}.{}`", self.project, self.dataset, self.table)
    }
}

/// A named STRING query parameter (name without the `@`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryParameter {
    pub name: String,
    pub value: String,
}

/// A rendered warehouse query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarehouseQuery {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
}

impl WarehouseQuery {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

pub fn name_parameter(n: usize) -> String {
    format!("tag_name_{n}")
}

pub fn value_parameter(n: usize) -> String {
    format!("tag_value_{n}")
}

fn tag_exists(field: &str, n: usize, has_value: bool) -> String {
    let value_test = if has_value {
        format!("t.value = @{}", value_parameter(n))
    } else {
        "t.value IS NULL".to_string()
    };
    format!(
        "EXISTS(SELECT 1 FROM UNNEST(b.{field}) AS t WHERE t.name = @{} AND {value_test})",
        name_parameter(n)
    )
}

/// Build the search query for `tags` against `table`, ordered by id.
pub fn translate(table: &TableRef, tags: &[Tag]) -> Result<WarehouseQuery, TranslationError> {
    check_tags(tags)?;

    let mut clauses = Vec::with_capacity(tags.len());
    let mut parameters = Vec::with_capacity(tags.len() * 2);
    for (n, tag) in tags.iter().enumerate() {
        let has_value = tag.value.is_some();
        clauses.push(format!(
            "({} OR {})",
            tag_exists("user_tags", n, has_value),
            tag_exists("system_tags", n, has_value)
        ));

        parameters.push(QueryParameter {
            name: name_parameter(n),
            value: tag.name.clone(),
        });
        if let Some(value) = &tag.value {
            parameters.push(QueryParameter {
                name: value_parameter(n),
                value: value.clone(),
            });
        }
    }

    let columns = SEARCH_COLUMNS
        .iter()
        .map(|c| format!("b.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let filter = if clauses.is_empty() {
        "TRUE".to_string()
    } else {
        clauses.join(" AND ")
    };

    let sql = format!(
        "SELECT {columns} FROM (\
         SELECT * FROM {table} WHERE TRUE \
         QUALIFY ROW_NUMBER() OVER (PARTITION BY id ORDER BY ingested_at DESC) = 1\
         ) AS b WHERE {filter} ORDER BY b.id"
    );

    Ok(WarehouseQuery { sql, parameters })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableRef {
        TableRef {
            project: "acme-prod".to_string(),
            dataset: "lakeside".to_string(),
            table: "blobs".to_string(),
        }
    }

    #[test]
    fn test_empty_query_dedups_and_orders() {
        let query = translate(&table(), &[]).unwrap();
        assert!(query.sql.contains("FROM `acme-prod.lakeside.blobs`"));
        assert!(query.sql.contains("PARTITION BY id ORDER BY ingested_at DESC"));
        assert!(query.sql.ends_with("WHERE TRUE ORDER BY b.id"));
        assert!(query.parameters.is_empty());
    }

    #[test]
    fn test_clauses_use_exists_per_category() {
        let query = translate(&table(), &[Tag::new("a", "1"), Tag::bare("flag")]).unwrap();

        assert!(query.sql.contains(
            "(EXISTS(SELECT 1 FROM UNNEST(b.user_tags) AS t WHERE t.name = @tag_name_0 AND t.value = @tag_value_0) \
             OR EXISTS(SELECT 1 FROM UNNEST(b.system_tags) AS t WHERE t.name = @tag_name_0 AND t.value = @tag_value_0)) \
             AND (EXISTS(SELECT 1 FROM UNNEST(b.user_tags) AS t WHERE t.name = @tag_name_1 AND t.value IS NULL) \
             OR EXISTS(SELECT 1 FROM UNNEST(b.system_tags) AS t WHERE t.name = @tag_name_1 AND t.value IS NULL))"
        ));
        assert!(!query.sql.contains("CROSS JOIN"));
        assert_eq!(query.parameter("tag_name_0"), Some("a"));
        assert_eq!(query.parameter("tag_value_0"), Some("1"));
        assert_eq!(query.parameter("tag_name_1"), Some("flag"));
        assert_eq!(query.parameter("tag_value_1"), None);
    }

    #[test]
    fn test_values_are_never_interpolated() {
        let hostile = "'; DROP TABLE blobs; --";
        let query = translate(&table(), &[Tag::new(hostile, hostile)]).unwrap();
        assert!(!query.sql.contains(hostile));
    }

    #[test]
    fn test_table_ref_validation() {
        assert!(table().validate().is_ok());
        assert!(
            TableRef {
                project: "example.com:proj".to_string(),
                ..table()
            }
            .validate()
            .is_ok()
        );
        assert!(
            TableRef {
                table: "blobs` WHERE 1=1 --".to_string(),
                ..table()
            }
            .validate()
            .is_err()
        );
        assert!(
            TableRef {
                dataset: String::new(),
                ..table()
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn test_schema_covers_search_columns() {
        let schema = table_schema();
        let fields = schema["fields"].as_array().unwrap();
        let column = |name: &str| fields.iter().find(|f| f["name"] == name).unwrap();

        for name in SEARCH_COLUMNS {
            column(name);
        }
        assert_eq!(column("ingested_at")["type"], "TIMESTAMP");
        assert_eq!(column("timestamp")["type"], "TIMESTAMP");
        assert_eq!(column("user_tags")["mode"], "REPEATED");
    }

    #[test]
    fn test_empty_tag_name_rejected() {
        assert_eq!(
            translate(&table(), &[Tag::new("", "1")]),
            Err(TranslationError::EmptyTagName { position: 0 })
        );
    }
}
