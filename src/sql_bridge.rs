//! SQL passthrough
//!
//! Statements go verbatim to an external driver. Row-returning results are
//! copied into an in-memory cursor opened as `sqlresult`, so the scan,
//! locate and name-resolution machinery works on them unchanged.
//!
//! Handles are positive integers. Driver failures never raise: the call
//! returns -1 and the message is kept for `sql_last_error`.

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::schema::{FieldDef, FieldType, Schema};
use crate::table::Table;
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Alias of the cursor holding the last result set
pub const RESULT_ALIAS: &str = "sqlresult";

/// How to reach a data source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectParams {
    Dsn(String),
    /// `key=value;...` pairs, keys lower-cased
    ConnectionString(BTreeMap<String, String>),
}

impl ConnectParams {
    pub fn parse(conn_str: &str) -> Self {
        let pairs = conn_str
            .split(';')
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=')?;
                let k = k.trim().to_lowercase();
                (!k.is_empty()).then(|| (k, v.trim().to_string()))
            })
            .collect();
        ConnectParams::ConnectionString(pairs)
    }

    /// The DSN named directly or by a `dsn=` entry
    pub fn dsn(&self) -> Option<&str> {
        match self {
            ConnectParams::Dsn(dsn) => Some(dsn),
            ConnectParams::ConnectionString(pairs) => pairs.get("dsn").map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlColumn {
    pub name: String,
    pub field_type: FieldType,
    pub width: u16,
    pub decimals: u8,
}

impl SqlColumn {
    pub fn new(name: &str, field_type: FieldType, width: u16, decimals: u8) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            width,
            decimals,
        }
    }

    pub fn character(name: &str, width: u16) -> Self {
        Self::new(name, FieldType::Character, width, 0)
    }

    pub fn numeric(name: &str, width: u16, decimals: u8) -> Self {
        Self::new(name, FieldType::Numeric, width, decimals)
    }

    pub fn logical(name: &str) -> Self {
        Self::new(name, FieldType::Logical, 1, 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<SqlColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Copy the rows into a cursor; every column accepts NULL
    pub fn to_cursor(&self, name: &str) -> Result<Table> {
        let fields = self
            .columns
            .iter()
            .map(|c| FieldDef::new(&c.name, c.field_type, c.width, c.decimals).with_nullable(true))
            .collect();
        let mut table = Table::cursor(name, Schema::new(fields)?);
        for row in &self.rows {
            table.append(row.clone())?;
        }
        Ok(table)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    Rows(ResultSet),
    Affected(u64),
    Done,
}

pub trait SqlDriver {
    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn SqlConnection>>;
}

pub trait SqlConnection {
    fn execute(&mut self, statement: &str) -> Result<StatementResult>;

    /// Catalogue of the source's tables; must include a `table_name` column
    fn tables(&mut self) -> Result<ResultSet>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct Connection {
    inner: Box<dyn SqlConnection>,
    rows_affected: i64,
}

/// Connection registry owned by the runtime
#[derive(Default)]
pub struct SqlBridge {
    driver: Option<Arc<dyn SqlDriver>>,
    connections: BTreeMap<i64, Connection>,
    next_handle: i64,
    last_error: Option<String>,
}

impl SqlBridge {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            ..Self::default()
        }
    }

    pub fn set_driver(&mut self, driver: Arc<dyn SqlDriver>) {
        self.driver = Some(driver);
    }

    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    fn connect(&mut self, params: ConnectParams) -> i64 {
        let Some(driver) = self.driver.clone() else {
            return self.fail("no SQL driver configured");
        };
        match driver.connect(&params) {
            Ok(inner) => {
                let handle = self.next_handle;
                self.next_handle += 1;
                self.connections.insert(
                    handle,
                    Connection {
                        inner,
                        rows_affected: -1,
                    },
                );
                info!("SQL connection {} opened ({:?})", handle, params.dsn());
                handle
            }
            Err(e) => self.fail(&e.to_string()),
        }
    }

    fn connection(&mut self, handle: i64) -> Result<&mut Connection> {
        self.connections
            .get_mut(&handle)
            .ok_or(Error::InvalidSqlHandle(handle))
    }

    fn fail(&mut self, message: &str) -> i64 {
        warn!("SQL failure: {}", message);
        self.last_error = Some(message.to_string());
        -1
    }

    /// 1 on success, -1 (with the error recorded) on failure
    fn status(&mut self, outcome: Result<()>) -> i64 {
        match outcome {
            Ok(()) => 1,
            Err(e) => self.fail(&e.to_string()),
        }
    }
}

impl Runtime {
    pub fn set_sql_driver(&mut self, driver: Arc<dyn SqlDriver>) {
        self.sql.set_driver(driver);
    }

    /// Connect to a named data source; a positive handle or -1
    pub fn sql_connect(&mut self, dsn: &str) -> i64 {
        self.sql.connect(ConnectParams::Dsn(dsn.trim().to_string()))
    }

    /// Connect with a `key=value;...` connection string; a positive handle or -1
    pub fn sql_string_connect(&mut self, conn_str: &str) -> i64 {
        self.sql.connect(ConnectParams::parse(conn_str))
    }

    /// Run a statement. Rows land in the `sqlresult` cursor, which becomes
    /// the selected area.
    pub fn sql_exec(&mut self, handle: i64, statement: &str) -> Result<i64> {
        let connection = self.sql.connection(handle)?;
        let outcome = connection.inner.execute(statement);
        match outcome {
            Ok(StatementResult::Rows(rows)) => {
                connection.rows_affected = rows.rows.len() as i64;
                let materialized = self.materialize(&rows);
                Ok(self.sql.status(materialized))
            }
            Ok(StatementResult::Affected(n)) => {
                connection.rows_affected = n as i64;
                Ok(1)
            }
            Ok(StatementResult::Done) => {
                connection.rows_affected = 0;
                Ok(1)
            }
            Err(e) => Ok(self.sql.fail(&e.to_string())),
        }
    }

    /// Rows touched by the last statement on `handle`; -1 before any statement
    pub fn sql_rows_affected(&mut self, handle: i64) -> Result<i64> {
        Ok(self.sql.connection(handle)?.rows_affected)
    }

    /// Materialize the driver's table catalogue into `sqlresult`
    pub fn sql_tables(&mut self, handle: i64) -> Result<i64> {
        let tables = self.sql.connection(handle)?.inner.tables();
        match tables {
            Ok(rows) => {
                let materialized = self.materialize(&rows);
                Ok(self.sql.status(materialized))
            }
            Err(e) => Ok(self.sql.fail(&e.to_string())),
        }
    }

    pub fn sql_commit(&mut self, handle: i64) -> Result<i64> {
        let outcome = self.sql.connection(handle)?.inner.commit();
        Ok(self.sql.status(outcome))
    }

    pub fn sql_rollback(&mut self, handle: i64) -> Result<i64> {
        let outcome = self.sql.connection(handle)?.inner.rollback();
        Ok(self.sql.status(outcome))
    }

    /// Release a connection; the handle is invalid afterwards
    pub fn sql_disconnect(&mut self, handle: i64) -> Result<i64> {
        let mut connection = self
            .sql
            .connections
            .remove(&handle)
            .ok_or(Error::InvalidSqlHandle(handle))?;
        info!("SQL connection {} closed", handle);
        let outcome = connection.inner.close();
        Ok(self.sql.status(outcome))
    }

    pub fn sql_last_error(&self) -> Option<&str> {
        self.sql.last_error.as_deref()
    }

    fn materialize(&mut self, rows: &ResultSet) -> Result<()> {
        let cursor = rows.to_cursor(RESULT_ALIAS)?;
        let area = self.db.open_cursor(cursor, RESULT_ALIAS)?;
        self.db.select_number(area)?;
        self.db.go_top(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connection_string() {
        let params = ConnectParams::parse("DSN=testodbc; UID = sa ;broken;");
        assert_eq!(params.dsn(), Some("testodbc"));
        match params {
            ConnectParams::ConnectionString(pairs) => {
                assert_eq!(pairs.get("uid").map(String::as_str), Some("sa"));
                assert_eq!(pairs.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_result_set_to_cursor() {
        let rows = ResultSet {
            columns: vec![SqlColumn::character("NAME", 10), SqlColumn::numeric("QTY", 5, 0)],
            rows: vec![
                vec![Value::from("Norma"), Value::from(84)],
                vec![Value::Null, Value::from(51)],
            ],
        };
        let table = rows.to_cursor(RESULT_ALIAS).unwrap();
        assert_eq!(table.reccount(), 2);
        assert_eq!(table.schema().field_index("name"), Some(0));
        assert!(table.value(2, 0).unwrap().is_null());
    }

    #[test]
    fn test_no_driver_fails_softly() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut rt =
            Runtime::new(crate::config::RuntimeConfig::with_data_dir(dir.path())).unwrap();
        assert_eq!(rt.sql_connect("testodbc"), -1);
        assert!(rt.sql_last_error().is_some());
        assert!(matches!(rt.sql_exec(1, "SELECT 1"), Err(Error::InvalidSqlHandle(1))));
    }
}
