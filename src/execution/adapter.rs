//! # Statement Adapter
//!
//! Rewrites the caller's action statement so it can consume either a single row bound as
//! top-level parameters or a whole batch bound as a list.
//!
//! ```text
//! SINGLE        WITH $id AS id  <action>
//! BATCH         UNWIND $_batch AS _batch WITH _batch.id AS id  <action>
//! BATCH_SINGLE  <action>                      (caller unwinds $_batch itself)
//! ```
//!
//! Statements that already bind a column explicitly (`$id AS ...`) are left untouched,
//! which also makes the rewrite idempotent.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PeriodicError, Result};

/// Strategy for binding rows into the action statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchMode {
    /// One execution per row, all rows of a batch in one transaction
    Single,
    /// Batch bound as a list and unwound by a generated prefix
    #[default]
    Batch,
    /// Batch bound as a list, the statement unwinds it itself
    BatchSingle,
}

impl BatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchMode::Single => "SINGLE",
            BatchMode::Batch => "BATCH",
            BatchMode::BatchSingle => "BATCH_SINGLE",
        }
    }

    /// Mode selected by the legacy `iterateList` flag.
    pub fn from_iterate_list(iterate_list: bool) -> Self {
        if iterate_list {
            BatchMode::Batch
        } else {
            BatchMode::Single
        }
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchMode {
    type Err = PeriodicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SINGLE" => Ok(BatchMode::Single),
            "BATCH" => Ok(BatchMode::Batch),
            "BATCH_SINGLE" => Ok(BatchMode::BatchSingle),
            _ => Err(PeriodicError::InvalidBatchMode(s.to_string())),
        }
    }
}

/// Rewritten action statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub statement: String,
    /// Rows arrive as a list under the batch parameter rather than one at a time
    pub batched: bool,
}

impl PreparedStatement {
    fn new(statement: impl Into<String>, batched: bool) -> Self {
        Self {
            statement: statement.into(),
            batched,
        }
    }
}

/// Rewrite `action` for `mode`, given the read statement's output `columns` and the name
/// the batch list is bound to.
pub fn prepare_inner_statement(
    action: &str,
    mode: BatchMode,
    columns: &[String],
    iterator_variable: &str,
) -> Result<PreparedStatement> {
    if !columns.is_empty() {
        let names = columns
            .iter()
            .map(|c| regex::escape(&quote(c)))
            .collect::<Vec<_>>()
            .join("|");
        if case_insensitive(&format!(r"[{{$]({names})\}}?\s+AS\s+"))?.is_match(action) {
            return Ok(PreparedStatement::new(action, false));
        }
    }

    match mode {
        BatchMode::Single => {
            let with = with_mapping(columns.iter().map(|c| format!("{} AS {}", param(c), quote(c))));
            Ok(PreparedStatement::new(format!("{with}{action}"), false))
        }
        BatchMode::Batch => {
            let unwind = format!(
                r"UNWIND\s+[{{$]{}\}}?\s+AS\s+",
                regex::escape(iterator_variable)
            );
            if case_insensitive(&unwind)?.is_match(action) {
                return Ok(PreparedStatement::new(action, true));
            }
            let iterator = quote(iterator_variable);
            let with = with_mapping(
                columns
                    .iter()
                    .map(|c| format!("{iterator}.{} AS {}", quote(c), quote(c))),
            );
            Ok(PreparedStatement::new(
                format!(
                    "UNWIND {} AS {iterator}{with} {action}",
                    param(iterator_variable)
                ),
                true,
            ))
        }
        BatchMode::BatchSingle => Ok(PreparedStatement::new(action, true)),
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| PeriodicError::ConfigurationError(format!("Invalid binding pattern: {e}")))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Backtick-quote names that are not plain identifiers.
fn quote(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        format!("`{name}`")
    }
}

fn param(name: &str) -> String {
    if name.starts_with('$') {
        name.to_string()
    } else {
        format!("${}", quote(name))
    }
}

fn with_mapping(bindings: impl Iterator<Item = String>) -> String {
    let joined = bindings.collect::<Vec<_>>().join(",");
    if joined.is_empty() {
        String::new()
    } else {
        format!(" WITH {joined} ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BATCH_PARAM;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn single_mode_binds_each_column_from_a_parameter() {
        let prepared =
            prepare_inner_statement("CREATE (:Foo {id: id})", BatchMode::Single, &cols(&["id"]), BATCH_PARAM)
                .unwrap();
        assert_eq!(prepared.statement, " WITH $id AS id CREATE (:Foo {id: id})");
        assert!(!prepared.batched);
        assert!(!prepared.statement.contains("UNWIND"));
    }

    #[test]
    fn batch_mode_prefixes_one_unwind_and_per_column_aliases() {
        let prepared =
            prepare_inner_statement("CREATE null", BatchMode::Batch, &cols(&["id"]), BATCH_PARAM).unwrap();
        assert_eq!(
            prepared.statement,
            "UNWIND $_batch AS _batch WITH _batch.id AS id  CREATE null"
        );
        assert!(prepared.batched);
        assert_eq!(prepared.statement.matches("UNWIND").count(), 1);
    }

    #[test]
    fn batch_mode_keeps_explicit_unwind() {
        let action = "unwind $_batch as row\nSET row.p.done = true";
        let prepared =
            prepare_inner_statement(action, BatchMode::Batch, &cols(&["p"]), BATCH_PARAM).unwrap();
        assert_eq!(prepared.statement, action);
        assert!(prepared.batched);
    }

    #[test]
    fn explicit_column_binding_is_left_unbatched() {
        let action = "WITH $p as p SET p.lastname = p.name";
        for mode in [BatchMode::Single, BatchMode::Batch, BatchMode::BatchSingle] {
            let prepared = prepare_inner_statement(action, mode, &cols(&["p"]), BATCH_PARAM).unwrap();
            assert_eq!(prepared.statement, action);
            assert!(!prepared.batched);
        }
    }

    #[test]
    fn legacy_brace_parameters_count_as_explicit_binding() {
        let action = "WITH {p}\n  AS p SET p.x = 1";
        let prepared =
            prepare_inner_statement(action, BatchMode::Batch, &cols(&["p"]), BATCH_PARAM).unwrap();
        assert_eq!(prepared.statement, action);
        assert!(!prepared.batched);
    }

    #[test]
    fn batch_single_passes_through() {
        let action = "UNWIND $_batch AS batch WITH batch.p AS p SET p.x = 1";
        let prepared =
            prepare_inner_statement(action, BatchMode::BatchSingle, &cols(&["q"]), BATCH_PARAM).unwrap();
        assert_eq!(prepared.statement, action);
        assert!(prepared.batched);
    }

    #[test]
    fn non_identifier_columns_are_quoted() {
        let prepared = prepare_inner_statement(
            "RETURN 1",
            BatchMode::Batch,
            &cols(&["first name", "id"]),
            BATCH_PARAM,
        )
        .unwrap();
        assert_eq!(
            prepared.statement,
            "UNWIND $_batch AS _batch WITH _batch.`first name` AS `first name`,_batch.id AS id  RETURN 1"
        );
    }

    #[test]
    fn no_columns_in_single_mode_leaves_statement_alone() {
        let prepared = prepare_inner_statement("RETURN 1", BatchMode::Single, &[], BATCH_PARAM).unwrap();
        assert_eq!(prepared.statement, "RETURN 1");
        assert!(!prepared.batched);
    }

    #[test]
    fn rewrite_is_idempotent() {
        let columns = cols(&["id", "name"]);
        for mode in [BatchMode::Single, BatchMode::Batch, BatchMode::BatchSingle] {
            let once = prepare_inner_statement("SET n.x = 1", mode, &columns, BATCH_PARAM).unwrap();
            let twice = prepare_inner_statement(&once.statement, mode, &columns, BATCH_PARAM).unwrap();
            assert_eq!(once.statement, twice.statement, "mode {mode}");
        }
    }

    #[test]
    fn batch_mode_parses_case_insensitively() {
        assert_eq!("batch_single".parse::<BatchMode>().unwrap(), BatchMode::BatchSingle);
        assert_eq!("SINGLE".parse::<BatchMode>().unwrap(), BatchMode::Single);
        assert!(matches!(
            "PAIRS".parse::<BatchMode>(),
            Err(PeriodicError::InvalidBatchMode(_))
        ));
    }
}
