use govseed_types::{ColumnType, TableSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placeholder {
    /// `?` markers (SQLite).
    Question,
    /// `$n::TYPE` markers (Postgres). The cast lets an int8 parameter land in
    /// an int4 column of a pre-existing table.
    Numbered,
}

/// Builds `INSERT INTO t (..) VALUES (..), (..) ON CONFLICT (key) DO NOTHING`
/// for `rows` rows of `table`.
pub(crate) fn insert_skip_conflicts(table: &TableSpec, rows: usize, style: Placeholder) -> String {
    let columns: Vec<&str> = table.column_names().collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        table.name,
        columns.join(", ")
    );
    let mut next = 1;
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (idx, column) in table.columns.iter().enumerate() {
            if idx > 0 {
                sql.push_str(", ");
            }
            match style {
                Placeholder::Question => sql.push('?'),
                Placeholder::Numbered => {
                    let cast = match column.ty {
                        ColumnType::Integer => "BIGINT",
                        ColumnType::Text => "TEXT",
                    };
                    sql.push_str(&format!("${}::{}", next, cast));
                }
            }
            next += 1;
        }
        sql.push(')');
    }
    sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", table.conflict_key));
    sql
}

/// Number of bind parameters a batch of `rows` rows needs.
pub(crate) fn bind_count(table: &TableSpec, rows: usize) -> usize {
    rows.saturating_mul(table.columns.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use govseed_types::{DEPARTMENT_TABLE, MINISTRY_TABLE};

    #[test]
    fn builds_question_mark_insert() {
        let sql = insert_skip_conflicts(&MINISTRY_TABLE, 2, Placeholder::Question);
        assert_eq!(
            sql,
            "INSERT INTO ministry (id, name, google_map_script) VALUES (?, ?, ?), (?, ?, ?) \
             ON CONFLICT (id) DO NOTHING"
        );
    }

    #[test]
    fn builds_numbered_insert_with_casts() {
        let sql = insert_skip_conflicts(&DEPARTMENT_TABLE, 2, Placeholder::Numbered);
        assert!(sql.starts_with(
            "INSERT INTO department (id, name, google_map_script, ministry_id) VALUES \
             ($1::BIGINT, $2::TEXT, $3::TEXT, $4::BIGINT), ($5::BIGINT"
        ));
        assert!(sql.ends_with("$8::BIGINT) ON CONFLICT (id) DO NOTHING"));
        assert_eq!(bind_count(&DEPARTMENT_TABLE, 2), 8);
    }
}
