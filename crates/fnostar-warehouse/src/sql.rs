//! Statement builders shared by the bulk loaders.

use std::fmt::Write;

use ::duckdb::types::Type;
use ::duckdb::Row;
use fnostar_core::from_epoch_day;
use time::Date;

/// Natural keys sent per conditional insert / lookup statement.
pub(crate) const KEY_CHUNK: usize = 500;

/// Build a `VALUES` row list of numbered, cast placeholders.
///
/// `values_list(&["BIGINT", "VARCHAR"], 2)` yields
/// `(CAST($1 AS BIGINT), CAST($2 AS VARCHAR)), (CAST($3 AS BIGINT), CAST($4 AS VARCHAR))`.
/// Placeholders are numbered so a statement can reference extra parameters
/// after the list as `$n` with `n = casts.len() * rows + 1`.
pub(crate) fn values_list(casts: &[&str], rows: usize) -> String {
    let mut sql = String::with_capacity(rows * casts.len() * 24);
    let mut index = 1;
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (column, cast) in casts.iter().enumerate() {
            if column > 0 {
                sql.push_str(", ");
            }
            let _ = write!(sql, "CAST(${index} AS {cast})");
            index += 1;
        }
        sql.push(')');
    }
    sql
}

/// Escape a string for inclusion in a SQL literal.
///
/// Only for statements that cannot take bind parameters.
pub(crate) fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Read a date selected as `date_diff('day', DATE '1970-01-01', col)`.
pub(crate) fn epoch_day_column(row: &Row<'_>, index: usize) -> Result<Date, ::duckdb::Error> {
    let days: i64 = row.get(index)?;
    from_epoch_day(days)
        .map_err(|error| ::duckdb::Error::FromSqlConversionFailure(index, Type::BigInt, Box::new(error)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_placeholders_across_rows() {
        assert_eq!(
            values_list(&["BIGINT", "VARCHAR"], 2),
            "(CAST($1 AS BIGINT), CAST($2 AS VARCHAR)), (CAST($3 AS BIGINT), CAST($4 AS VARCHAR))"
        );
    }

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(escape_sql_string("4'GB"), "4''GB");
    }
}
