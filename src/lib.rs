//! xbase-core: an embedded workarea database runtime
//!
//! Tables are opened into numbered workareas, each with its own record
//! pointer, controlling index and LOCATE state. A scope stack provides
//! public, private and local variables, and the name resolver falls back
//! to the fields of the current record when no variable matches, so
//! record navigation changes what unqualified names read.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod index;
pub mod runtime;
pub mod scan;
pub mod schema;
pub mod scope;
pub mod sql_bridge;
pub mod store;
pub mod table;
pub mod value;
pub mod workarea;

pub use config::{init_logging, LoggingConfig, RuntimeConfig};
pub use error::{Error, Result};
pub use index::IndexSpec;
pub use runtime::{Binding, Runtime};
pub use scan::{cond, expr, Condition, Expr, Scanner, Scope};
pub use schema::{FieldDef, FieldType, Schema};
pub use sql_bridge::{
    ConnectParams, ResultSet, SqlColumn, SqlConnection, SqlDriver, StatementResult,
};
pub use store::{AlterAction, AreaQuery, AreaSlot, PackMode, WorkareaStore};
pub use table::{PackReport, TableKind};
pub use value::{ArrayValue, Value};
pub use workarea::LockMode;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
