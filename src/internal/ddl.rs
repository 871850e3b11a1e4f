//! DDL against the internal store: table and column lifecycle.
//!
//! Every identifier passes validation before interpolation. The column type
//! strings come from the field-to-column mapper and are engine-controlled;
//! DDL accepts no placeholders, so they are interpolated directly.
//! All statements are idempotent where MySQL allows (`IF NOT EXISTS` /
//! `IF EXISTS`); `ADD COLUMN`/`DROP COLUMN` are not, and concurrent DDL on
//! the same table is serialized by the database's own DDL locking.

use crate::dialect::Dialect;
use crate::error::{EngineError, Result};
use crate::identifier;
use crate::mapping;
use crate::models::FieldDefinition;
use crate::sql::Statement;

use super::{InternalStore, CREATED_AT_COLUMN, CREATED_BY_COLUMN, PK_COLUMN, SYSTEM_COLUMNS, UPDATED_AT_COLUMN};

impl InternalStore {
    /// Creates the physical table for an application schema: auto-increment
    /// primary key, one column per field, and the audit columns. Idempotent.
    pub async fn create_table(&self, table: &str, fields: &[FieldDefinition]) -> Result<()> {
        let sql = build_create_table(table, fields)?;
        self.execute(&Statement::new(sql), &format!("create table '{}'", table))
            .await?;
        Ok(())
    }

    /// Drops the physical table. Idempotent; dropping a nonexistent table is
    /// a no-op.
    pub async fn drop_table(&self, table: &str) -> Result<()> {
        let sql = build_drop_table(table)?;
        self.execute(&Statement::new(sql), &format!("drop table '{}'", table))
            .await?;
        Ok(())
    }

    /// Adds one column for a new field. Existing rows read back null for it;
    /// no backfill is performed.
    pub async fn add_column(&self, table: &str, field: &FieldDefinition) -> Result<()> {
        let sql = build_add_column(table, field)?;
        self.execute(
            &Statement::new(sql),
            &format!("add column '{}' to '{}'", field.code, table),
        )
        .await?;
        Ok(())
    }

    /// Drops a field's column. Destructive and irreversible.
    pub async fn drop_column(&self, table: &str, field_code: &str) -> Result<()> {
        let sql = build_drop_column(table, field_code)?;
        self.execute(
            &Statement::new(sql),
            &format!("drop column '{}' from '{}'", field_code, table),
        )
        .await?;
        Ok(())
    }
}

fn quote(name: &str) -> Result<String> {
    identifier::quote(Dialect::Internal, name)
}

/// Rejects field codes that collide with engine-owned columns.
fn check_not_system(code: &str) -> Result<()> {
    if SYSTEM_COLUMNS.contains(&code) {
        return Err(EngineError::configuration(format!(
            "field code '{}' collides with a system column",
            code
        )));
    }
    Ok(())
}

pub(crate) fn build_create_table(table: &str, fields: &[FieldDefinition]) -> Result<String> {
    let table = quote(table)?;

    let mut columns = Vec::with_capacity(fields.len() + 4);
    columns.push(format!(
        "{} BIGINT UNSIGNED NOT NULL AUTO_INCREMENT",
        quote(PK_COLUMN)?
    ));
    for field in fields {
        check_not_system(&field.code)?;
        columns.push(format!(
            "{} {} NULL",
            quote(&field.code)?,
            mapping::column_type(field.field_type)
        ));
    }
    columns.push(format!("{} BIGINT NULL", quote(CREATED_BY_COLUMN)?));
    columns.push(format!(
        "{} DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3)",
        quote(CREATED_AT_COLUMN)?
    ));
    columns.push(format!(
        "{} DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3) ON UPDATE CURRENT_TIMESTAMP(3)",
        quote(UPDATED_AT_COLUMN)?
    ));
    columns.push(format!("PRIMARY KEY ({})", quote(PK_COLUMN)?));

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        table,
        columns.join(", ")
    ))
}

pub(crate) fn build_drop_table(table: &str) -> Result<String> {
    Ok(format!("DROP TABLE IF EXISTS {}", quote(table)?))
}

pub(crate) fn build_add_column(table: &str, field: &FieldDefinition) -> Result<String> {
    check_not_system(&field.code)?;
    Ok(format!(
        "ALTER TABLE {} ADD COLUMN {} {} NULL",
        quote(table)?,
        quote(&field.code)?,
        mapping::column_type(field.field_type)
    ))
}

pub(crate) fn build_drop_column(table: &str, field_code: &str) -> Result<String> {
    check_not_system(field_code)?;
    Ok(format!(
        "ALTER TABLE {} DROP COLUMN {}",
        quote(table)?,
        quote(field_code)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldType;

    fn sample_fields() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("title", "Title", FieldType::Text),
            FieldDefinition::new("amount", "Amount", FieldType::Number),
            FieldDefinition::new("notes", "Notes", FieldType::LongText),
        ]
    }

    #[test]
    fn test_create_table_shape() {
        let sql = build_create_table("t_app_7", &sample_fields()).unwrap();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `t_app_7` ("));
        assert!(sql.contains("`id` BIGINT UNSIGNED NOT NULL AUTO_INCREMENT"));
        assert!(sql.contains("`title` VARCHAR(255) NULL"));
        assert!(sql.contains("`amount` DECIMAL(20,6) NULL"));
        assert!(sql.contains("`notes` TEXT NULL"));
        assert!(sql.contains("`created_by` BIGINT NULL"));
        assert!(sql.contains(
            "`updated_at` DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3) ON UPDATE CURRENT_TIMESTAMP(3)"
        ));
        assert!(sql.contains("PRIMARY KEY (`id`)"));
        assert!(sql.ends_with(") ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"));
    }

    #[test]
    fn test_create_table_rejects_bad_table_name() {
        let result = build_create_table("t; DROP TABLE x", &sample_fields());
        assert!(matches!(result, Err(EngineError::InvalidIdentifier { .. })));
    }

    #[test]
    fn test_create_table_rejects_system_collision() {
        let fields = vec![FieldDefinition::new("updated_at", "Clash", FieldType::Text)];
        let result = build_create_table("t_app_7", &fields);
        assert!(matches!(result, Err(EngineError::Configuration { .. })));
    }

    #[test]
    fn test_drop_table_idempotent_form() {
        assert_eq!(
            build_drop_table("t_app_7").unwrap(),
            "DROP TABLE IF EXISTS `t_app_7`"
        );
    }

    #[test]
    fn test_add_column() {
        let field = FieldDefinition::new("due_date", "Due", FieldType::Date);
        assert_eq!(
            build_add_column("t_app_7", &field).unwrap(),
            "ALTER TABLE `t_app_7` ADD COLUMN `due_date` DATE NULL"
        );
    }

    #[test]
    fn test_drop_column() {
        assert_eq!(
            build_drop_column("t_app_7", "due_date").unwrap(),
            "ALTER TABLE `t_app_7` DROP COLUMN `due_date`"
        );
        assert!(build_drop_column("t_app_7", "id").is_err());
    }

    #[test]
    fn test_add_column_rejects_hostile_code() {
        let field = FieldDefinition::new("x`; DROP TABLE y", "X", FieldType::Text);
        assert!(build_add_column("t_app_7", &field).is_err());
    }
}
