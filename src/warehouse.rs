//! Warehouse connection, schema reflection and DDL.

use crate::config::WarehouseConfig;
use crate::error::{EtlError, Result};
use crate::types::{ColumnSpec, ForeignKey, TableSchema, Value};
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params, Connection};
use tracing::{debug, info};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        let v = match self {
            Value::Null => Sql::Null,
            Value::Bool(b) => Sql::Integer(*b as i64),
            Value::Int(n) => Sql::Integer(*n),
            Value::Float(x) => Sql::Real(*x),
            Value::Text(s) => Sql::Text(s.clone()),
        };
        Ok(ToSqlOutput::Owned(v))
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE IF NOT EXISTS` statement for a declared table.
pub fn create_table_sql(schema_name: &str, table: &TableSchema) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("    {} {}", quote_ident(&c.name), c.sql_type);
            if !c.nullable {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();
    let pk = table.primary_key();
    if !pk.is_empty() {
        let cols: Vec<String> = pk.iter().map(|c| quote_ident(c)).collect();
        parts.push(format!("    PRIMARY KEY ({})", cols.join(", ")));
    }
    for fk in &table.foreign_keys {
        parts.push(format!(
            "    FOREIGN KEY ({}) REFERENCES {}({})",
            quote_ident(&fk.column),
            quote_ident(&fk.references_table),
            quote_ident(&fk.references_column)
        ));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} (\n{}\n);",
        quote_ident(schema_name),
        quote_ident(&table.name),
        parts.join(",\n")
    )
}

/// Open handle to the destination database. One per job.
pub struct Warehouse {
    conn: Connection,
    schema: String,
}

impl Warehouse {
    /// Open the configured database and check it answers `SELECT 1`.
    ///
    /// With the `main` schema the file is opened directly; any other schema
    /// name attaches the file under that name.
    pub fn connect(config: &WarehouseConfig) -> Result<Self> {
        let path = config.path.to_string_lossy().to_string();
        let conn = if config.schema == "main" {
            Connection::open(&path)
        } else {
            Connection::open_in_memory().and_then(|conn| {
                conn.execute(
                    &format!("ATTACH DATABASE ?1 AS {}", quote_ident(&config.schema)),
                    [&path],
                )?;
                Ok(conn)
            })
        }
        .map_err(|e| EtlError::Connection(format!("{}: {}", path, e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| EtlError::Connection(e.to_string()))?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| EtlError::Connection(e.to_string()))?;
        info!(database = %path, schema = %config.schema, "connected to warehouse");

        Ok(Self {
            conn,
            schema: config.schema.clone(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn qualified(&self, table: &str) -> String {
        qualified(&self.schema, table)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            quote_ident(&self.schema)
        );
        let n: i64 = self
            .conn
            .query_row(&sql, [table], |row| row.get(0))
            .map_err(|e| EtlError::load(table, e))?;
        Ok(n > 0)
    }

    pub fn create_table(&self, table: &TableSchema) -> Result<()> {
        let ddl = create_table_sql(&self.schema, table);
        debug!(table = %table.name, "ensuring table exists");
        self.conn
            .execute_batch(&ddl)
            .map_err(|e| EtlError::load(&table.name, e))
    }

    /// Create `table` if allowed and absent, then return its reflected schema.
    pub fn ensure_table(&self, table: &TableSchema, create: bool) -> Result<TableSchema> {
        if !self.table_exists(&table.name)? {
            if !create {
                return Err(EtlError::Load {
                    table: table.name.clone(),
                    reason: format!("table not found in schema '{}'", self.schema),
                });
            }
            self.create_table(table)?;
            info!(table = %table.name, "created table");
        }
        self.describe_table(&table.name)
    }

    /// Reflect a table's columns, nullability, primary key and foreign keys.
    pub fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let err = |e: rusqlite::Error| EtlError::load(table, e);
        let mut stmt = self
            .conn
            .prepare(r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1, ?2) ORDER BY cid"#)
            .map_err(err)?;
        let columns = stmt
            .query_map(params![table, self.schema], |row| {
                Ok(ColumnSpec {
                    name: row.get(0)?,
                    sql_type: row.get(1)?,
                    nullable: row.get::<_, i64>(2)? == 0,
                    primary_key: row.get::<_, i64>(3)? > 0,
                })
            })
            .map_err(err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(err)?;
        if columns.is_empty() {
            return Err(EtlError::Load {
                table: table.to_string(),
                reason: format!("table not found in schema '{}'", self.schema),
            });
        }
        let foreign_keys = foreign_keys(&self.conn, &self.schema, table).map_err(err)?;
        Ok(TableSchema {
            name: table.to_string(),
            columns,
            foreign_keys,
        })
    }

    /// Read-after-write row count.
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.qualified(table));
        self.conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| EtlError::load(table, e))
    }
}

pub(crate) fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

pub(crate) fn foreign_keys(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> rusqlite::Result<Vec<ForeignKey>> {
    let mut stmt = conn.prepare(
        r#"SELECT "from", "table", "to" FROM pragma_foreign_key_list(?1, ?2) ORDER BY id, seq"#,
    )?;
    let rows = stmt.query_map(params![table, schema], |row| {
        Ok(ForeignKey {
            column: row.get(0)?,
            references_table: row.get(1)?,
            references_column: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        })
    })?;
    rows.collect()
}

/// Tables whose foreign keys point at `table`.
pub(crate) fn referencing_tables(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> rusqlite::Result<Vec<String>> {
    let sql = format!(
        "SELECT name FROM {}.sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        quote_ident(schema)
    );
    let mut stmt = conn.prepare(&sql)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut out = Vec::new();
    for name in names {
        let fks = foreign_keys(conn, schema, &name)?;
        if fks
            .iter()
            .any(|fk| fk.references_table.eq_ignore_ascii_case(table))
            && !name.eq_ignore_ascii_case(table)
        {
            out.push(name);
        }
    }
    Ok(out)
}

/// Number of rows in `table` whose foreign keys have no parent row.
pub(crate) fn foreign_key_violations(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> rusqlite::Result<usize> {
    let sql = format!(
        "PRAGMA {}.foreign_key_check({})",
        quote_ident(schema),
        quote_ident(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut n = 0usize;
    while rows.next()?.is_some() {
        n += 1;
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> (TableSchema, TableSchema) {
        let dim = TableSchema::new("dim_user")
            .key("user_sk", "TEXT")
            .required("userid", "INTEGER");
        let fact = TableSchema::new("fact_app_events")
            .column("user_sk", "TEXT")
            .column("amount", "REAL")
            .references("user_sk", "dim_user", "user_sk");
        (dim, fact)
    }

    #[test]
    fn test_create_and_describe_round_trip() {
        let wh = Warehouse::connect(&WarehouseConfig::in_memory()).unwrap();
        let (dim, fact) = dims();
        let reflected_dim = wh.ensure_table(&dim, true).unwrap();
        let reflected_fact = wh.ensure_table(&fact, true).unwrap();
        assert_eq!(reflected_dim.column_names(), vec!["user_sk", "userid"]);
        assert_eq!(reflected_dim.primary_key(), vec!["user_sk"]);
        assert!(!reflected_dim.columns[1].nullable);
        assert_eq!(reflected_fact.foreign_keys, fact.foreign_keys);
        assert_eq!(wh.count_rows("dim_user").unwrap(), 0);
    }

    #[test]
    fn test_missing_table_without_create() {
        let wh = Warehouse::connect(&WarehouseConfig::in_memory()).unwrap();
        let (dim, _) = dims();
        let err = wh.ensure_table(&dim, false).unwrap_err();
        assert!(matches!(err, EtlError::Load { .. }));
        assert!(matches!(
            wh.describe_table("nope"),
            Err(EtlError::Load { .. })
        ));
    }

    #[test]
    fn test_referencing_tables() {
        let wh = Warehouse::connect(&WarehouseConfig::in_memory()).unwrap();
        let (dim, fact) = dims();
        wh.create_table(&dim).unwrap();
        wh.create_table(&fact).unwrap();
        let refs = referencing_tables(wh.connection(), "main", "dim_user").unwrap();
        assert_eq!(refs, vec!["fact_app_events".to_string()]);
        assert!(referencing_tables(wh.connection(), "main", "fact_app_events")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_attached_schema() {
        let dir = tempfile::tempdir().unwrap();
        let config = WarehouseConfig {
            path: dir.path().join("dw.db"),
            schema: "dw".to_string(),
            create_tables: true,
        };
        let wh = Warehouse::connect(&config).unwrap();
        let (dim, _) = dims();
        wh.ensure_table(&dim, true).unwrap();
        assert_eq!(wh.qualified("dim_user"), "\"dw\".\"dim_user\"");
        assert!(wh.table_exists("dim_user").unwrap());
    }

    #[test]
    fn test_create_table_sql() {
        let (_, fact) = dims();
        let ddl = create_table_sql("main", &fact);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"main\".\"fact_app_events\""));
        assert!(ddl.contains("FOREIGN KEY (\"user_sk\") REFERENCES \"dim_user\"(\"user_sk\")"));
    }
}
