// SQL passthrough against a scripted in-memory driver
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;
use xbase_core::error::{Error, Result};
use xbase_core::{
    cond, ConnectParams, FieldType, ResultSet, Runtime, RuntimeConfig, Scope, SqlColumn,
    SqlConnection, SqlDriver, StatementResult, Value,
};

#[derive(Default)]
struct MockState {
    table: Option<Vec<Vec<Value>>>,
    committed: Option<Vec<Vec<Value>>>,
    connects: Vec<ConnectParams>,
}

struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl SqlDriver for MockDriver {
    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn SqlConnection>> {
        if params.dsn() != Some("testodbc") {
            return Err(Error::SqlError(format!("unknown data source {:?}", params)));
        }
        self.state.lock().connects.push(params.clone());
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

fn report_columns() -> Vec<SqlColumn> {
    vec![
        SqlColumn::character("NAME", 50),
        SqlColumn::character("ST", 2),
        SqlColumn::numeric("QUANTITY", 5, 0),
        SqlColumn::logical("RECEIVED"),
    ]
}

/// `insert into REPORT values ('a','b',1,0)`
fn parse_insert(statement: &str) -> Vec<Value> {
    let open = statement.find('(').unwrap_or(0);
    let close = statement.rfind(')').unwrap_or(statement.len());
    let fields: Vec<&str> = statement[open + 1..close].split(',').collect();
    vec![
        Value::from(fields[0].trim().trim_matches('\'')),
        Value::from(fields[1].trim().trim_matches('\'')),
        Value::from(fields[2].trim().parse::<f64>().unwrap_or(0.0)),
        Value::from(fields[3].trim() == "1"),
    ]
}

impl SqlConnection for MockConnection {
    fn execute(&mut self, statement: &str) -> Result<StatementResult> {
        let mut state = self.state.lock();
        let upper = statement.trim().to_uppercase();
        if upper.starts_with("CREATE TABLE") {
            state.table = Some(Vec::new());
            return Ok(StatementResult::Done);
        }
        if upper.starts_with("DROP TABLE") {
            state.table = None;
            return Ok(StatementResult::Done);
        }
        let rows = state
            .table
            .as_mut()
            .ok_or_else(|| Error::SqlError("no such table: REPORT".to_string()))?;
        if upper.starts_with("INSERT") {
            rows.push(parse_insert(statement));
            Ok(StatementResult::Affected(1))
        } else if upper.starts_with("DELETE") {
            let n = rows.len() as u64;
            rows.clear();
            Ok(StatementResult::Affected(n))
        } else if upper.starts_with("SELECT") {
            Ok(StatementResult::Rows(ResultSet {
                columns: report_columns(),
                rows: rows.clone(),
            }))
        } else {
            Err(Error::SqlError(format!("syntax error: {}", statement)))
        }
    }

    fn tables(&mut self) -> Result<ResultSet> {
        let state = self.state.lock();
        Ok(ResultSet {
            columns: vec![
                SqlColumn::character("TABLE_NAME", 128),
                SqlColumn::new("TABLE_TYPE", FieldType::Character, 20, 0),
            ],
            rows: state
                .table
                .iter()
                .map(|_| vec![Value::from("REPORT"), Value::from("TABLE")])
                .collect(),
        })
    }

    fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.committed = state.table.clone();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.table = state.committed.clone();
        Ok(())
    }
}

fn runtime(dir: &TempDir) -> Result<(Runtime, Arc<Mutex<MockState>>)> {
    let mut rt = Runtime::new(RuntimeConfig::with_data_dir(dir.path()))?;
    let state = Arc::new(Mutex::new(MockState::default()));
    rt.set_sql_driver(Arc::new(MockDriver {
        state: Arc::clone(&state),
    }));
    Ok((rt, state))
}

fn add_record(rt: &mut Runtime, conn: i64, name: &str, st: &str, qty: i32, received: bool) -> Result<i64> {
    rt.push_scope();
    rt.declare_local("sqlconn", Value::from(conn as f64));
    let cmd = format!(
        "insert into REPORT values ('{}','{}',{},{})",
        name,
        st,
        qty,
        i32::from(received)
    );
    rt.declare_local("sqlcmd", Value::from(cmd));
    let handle = rt.get("sqlconn").number() as i64;
    let statement = rt.get("sqlcmd").text().to_string();
    let result = rt.sql_exec(handle, &statement)?;
    let ret = rt.pop_scope(Some(Value::from(result)))?;
    Ok(ret.map(|v| v.number() as i64).unwrap_or(-1))
}

#[test]
fn test_sql_round_trip() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (mut rt, state) = runtime(&dir)?;

    let conn = rt.sql_connect("testodbc");
    assert!(conn > 0);
    assert!(
        rt.sql_exec(
            conn,
            "CREATE TABLE REPORT (NAME varchar(50), ST char(2), QUANTITY int(5), RECEIVED bit)"
        )? > 0
    );
    assert!(add_record(&mut rt, conn, "Norma Fisher", "ID", 84, true)? > 0);
    assert!(add_record(&mut rt, conn, "Lisa Hansen", "CA", 51, false)? > 0);
    assert!(add_record(&mut rt, conn, "Ryan Gallagher", "ID", 63, true)? > 0);
    assert!(add_record(&mut rt, conn, "Joshua Wood", "NV", 12, false)? > 0);
    assert_eq!(rt.sql_rows_affected(conn)?, 1);

    assert!(rt.sql_exec(conn, "SELECT * FROM REPORT")? > 0);
    rt.db_mut().select("sqlresult")?;
    assert_eq!(rt.get("name").text().trim(), "Norma Fisher");
    assert_eq!(rt.db().reccount(None), 4);
    assert_eq!(rt.sql_rows_affected(conn)?, 4);

    // the result is an ordinary workarea
    let is_id = cond(|rt| rt.get("st").text() == "ID");
    assert_eq!(rt.count(None, Scope::All, Some(is_id), None)?, 2);

    assert_eq!(rt.sql_commit(conn)?, 1);
    assert_eq!(rt.sql_disconnect(conn)?, 1);
    assert!(matches!(rt.sql_commit(conn), Err(Error::InvalidSqlHandle(_))));

    let conn = rt.sql_string_connect("dsn=testodbc");
    assert!(conn > 0);
    assert!(rt.sql_tables(conn)? > 0);
    rt.db_mut().select("sqlresult")?;
    assert_eq!(rt.get("table_name").text().trim().to_lowercase(), "report");

    assert!(rt.sql_exec(conn, "DELETE FROM REPORT;")? > 0);
    assert_eq!(rt.sql_rows_affected(conn)?, 4);
    assert!(rt.sql_rollback(conn)? > 0);
    assert!(rt.sql_exec(conn, "SELECT * FROM REPORT")? > 0);
    rt.db_mut().select("sqlresult")?;
    assert_eq!(rt.get("name").text().trim(), "Norma Fisher");

    assert!(rt.sql_exec(conn, "DROP TABLE REPORT")? > 0);
    rt.sql_commit(conn)?;
    rt.sql_disconnect(conn)?;

    assert_eq!(state.lock().connects.len(), 2);
    Ok(())
}

#[test]
fn test_sql_failures_return_minus_one() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (mut rt, _) = runtime(&dir)?;

    assert_eq!(rt.sql_connect("nowhere"), -1);
    assert!(rt.sql_last_error().unwrap_or("").contains("nowhere"));

    let conn = rt.sql_connect("testodbc");
    assert_eq!(rt.sql_exec(conn, "SELECT * FROM REPORT")?, -1);
    assert!(rt.sql_last_error().unwrap_or("").contains("no such table"));
    assert_eq!(rt.db().select_area(&xbase_core::AreaQuery::Alias("sqlresult".into())), 0);
    Ok(())
}

#[test]
fn test_sqlresult_is_replaced_in_place() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (mut rt, _) = runtime(&dir)?;
    let conn = rt.sql_connect("testodbc");
    rt.sql_exec(conn, "CREATE TABLE REPORT (NAME varchar(50))")?;
    rt.sql_exec(conn, "insert into REPORT values ('Norma Fisher','ID',84,1)")?;

    rt.sql_exec(conn, "SELECT * FROM REPORT")?;
    let first_area = rt.db().selected();
    rt.db_mut().select("0")?;
    rt.sql_exec(conn, "SELECT * FROM REPORT")?;
    assert_eq!(rt.db().selected(), first_area);
    assert_eq!(rt.db().select_area(&xbase_core::AreaQuery::HighestUsed), first_area);
    Ok(())
}
