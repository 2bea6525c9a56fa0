//! Ledger schema.
//!
//! Tables are built with `sea_query` and executed through any
//! [`SqlExecutor`]. Every statement is `IF NOT EXISTS`, so applying the
//! schema to an initialized database is a no-op.

use crate::executor::{DbError, SqlExecutor};
use sea_query::{
    Alias, ColumnDef, Expr, ForeignKey, ForeignKeyCreateStatement, Index, IndexCreateStatement,
    PostgresQueryBuilder, Table, TableCreateStatement,
};

/// Executes DDL statements against an executor
pub struct SchemaManager<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> SchemaManager<'a> {
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self { executor }
    }

    pub fn create_table(&self, table: TableCreateStatement) -> Result<(), DbError> {
        let sql = table.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    pub fn create_index(&self, index: IndexCreateStatement) -> Result<(), DbError> {
        let sql = index.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }
}

fn quantity(name: &str) -> ColumnDef {
    ColumnDef::new(Alias::new(name))
        .decimal_len(15, 3)
        .not_null()
        .to_owned()
}

fn id_column() -> ColumnDef {
    ColumnDef::new("id")
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn material_reference(table: &str) -> ForeignKeyCreateStatement {
    ForeignKey::create()
        .name(format!("fk_{table}_material"))
        .from(Alias::new(table), "material_id")
        .to("materials", "id")
        .to_owned()
}

pub fn materials_table() -> TableCreateStatement {
    Table::create()
        .table("materials")
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new("code").string_len(64).not_null().unique_key())
        .col(ColumnDef::new("name").string_len(255).not_null())
        .col(ColumnDef::new("description").text().not_null().default(""))
        .col(ColumnDef::new("category").string_len(100).not_null())
        .col(ColumnDef::new("supplier").string_len(255).not_null())
        .col(ColumnDef::new("unit").string_len(50).not_null())
        .col(quantity("current_quantity"))
        .col(quantity("min_stock_level"))
        .col(quantity("reorder_level"))
        .col(quantity("max_stock_level"))
        .col(ColumnDef::new("current_cost").decimal_len(12, 2).not_null())
        .col(ColumnDef::new("is_active").boolean().not_null().default(true))
        .col(ColumnDef::new("created_at").timestamp_with_time_zone().not_null())
        .col(ColumnDef::new("updated_at").timestamp_with_time_zone().not_null())
        .to_owned()
}

pub fn stock_transactions_table() -> TableCreateStatement {
    Table::create()
        .table("stock_transactions")
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new("material_id").big_integer().not_null())
        .col(ColumnDef::new("transaction_type").string_len(32).not_null())
        .col(quantity("quantity"))
        .col(quantity("balance_after_transaction"))
        .col(ColumnDef::new("reference_number").string_len(100).null())
        .col(ColumnDef::new("project_code").string_len(50).null())
        .col(ColumnDef::new("department").string_len(100).null())
        .col(ColumnDef::new("notes").text().null())
        .col(ColumnDef::new("created_by").string_len(100).not_null())
        .col(ColumnDef::new("created_at").timestamp_with_time_zone().not_null())
        .foreign_key(&mut material_reference("stock_transactions"))
        .to_owned()
}

pub fn daily_usage_table() -> TableCreateStatement {
    Table::create()
        .table("daily_usage")
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new("material_id").big_integer().not_null())
        .col(ColumnDef::new("transaction_id").big_integer().not_null())
        .col(ColumnDef::new("usage_date").date().not_null())
        .col(quantity("quantity_used"))
        .col(ColumnDef::new("project_code").string_len(50).null())
        .col(ColumnDef::new("department").string_len(100).null())
        .col(ColumnDef::new("recorded_by").string_len(100).not_null())
        .col(ColumnDef::new("notes").text().null())
        .col(ColumnDef::new("created_at").timestamp_with_time_zone().not_null())
        .foreign_key(&mut material_reference("daily_usage"))
        .foreign_key(
            ForeignKey::create()
                .name("fk_daily_usage_transaction")
                .from("daily_usage", "transaction_id")
                .to("stock_transactions", "id"),
        )
        .to_owned()
}

pub fn stock_alerts_table() -> TableCreateStatement {
    Table::create()
        .table("stock_alerts")
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new("material_id").big_integer().not_null())
        .col(ColumnDef::new("alert_type").string_len(16).not_null())
        .col(quantity("current_quantity"))
        .col(quantity("threshold_quantity"))
        .col(ColumnDef::new("alert_message").text().not_null())
        .col(ColumnDef::new("is_resolved").boolean().not_null().default(false))
        .col(ColumnDef::new("resolved_by").string_len(100).null())
        .col(ColumnDef::new("resolved_at").timestamp_with_time_zone().null())
        .col(ColumnDef::new("created_at").timestamp_with_time_zone().not_null())
        .foreign_key(&mut material_reference("stock_alerts"))
        .to_owned()
}

fn index(name: &str, table: &str, columns: &[&str]) -> IndexCreateStatement {
    let mut index = Index::create();
    index.if_not_exists().name(name).table(Alias::new(table));
    for column in columns {
        index.col(Expr::col(Alias::new(*column)));
    }
    index.to_owned()
}

pub fn ledger_indexes() -> Vec<IndexCreateStatement> {
    vec![
        index("idx_materials_name", "materials", &["name"]),
        index("idx_stock_transactions_material", "stock_transactions", &["material_id", "id"]),
        index("idx_daily_usage_date", "daily_usage", &["usage_date"]),
        index("idx_stock_alerts_open", "stock_alerts", &["material_id", "is_resolved"]),
    ]
}

/// Create every ledger table and index that does not exist yet.
pub fn apply_schema(executor: &dyn SqlExecutor) -> Result<(), DbError> {
    let manager = SchemaManager::new(executor);
    for table in [
        materials_table(),
        stock_transactions_table(),
        daily_usage_table(),
        stock_alerts_table(),
    ] {
        manager.create_table(table)?;
    }
    for index in ledger_indexes() {
        manager.create_index(index)?;
    }
    log::info!("Ledger schema is up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materials_code_is_unique() {
        let sql = materials_table().build(PostgresQueryBuilder);
        assert!(sql.contains("IF NOT EXISTS"));
        assert!(sql.contains("\"materials\""));
        assert!(sql.contains("UNIQUE"));
    }

    #[test]
    fn test_history_tables_reference_materials() {
        for table in [stock_transactions_table(), daily_usage_table(), stock_alerts_table()] {
            let sql = table.build(PostgresQueryBuilder);
            assert!(sql.contains("REFERENCES \"materials\""), "{sql}");
        }
    }

    #[test]
    fn test_indexes_are_idempotent() {
        for index in ledger_indexes() {
            assert!(index.build(PostgresQueryBuilder).contains("IF NOT EXISTS"));
        }
    }
}
