use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("File is in use: {0}")]
    FileInUse(String),

    #[error("Alias name is already in use: {0}")]
    AliasInUse(String),

    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    #[error("No table is open in the current work area")]
    NoTableOpen,

    #[error("File does not exist: {0}")]
    TableNotFound(String),

    #[error("Invalid table structure: {0}")]
    InvalidSchema(String),

    #[error("Variable or field not found: {0}")]
    UnknownField(String),

    #[error("Data type mismatch for {field}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: char,
        found: char,
    },

    #[error("No current record")]
    NoCurrentRecord,

    #[error("Too many values: table has {fields} fields, got {values}")]
    TooManyValues { fields: usize, values: usize },

    #[error("Index tag not found: {0}")]
    IndexNotFound(String),

    #[error("Invalid key expression: {0}")]
    InvalidKeyExpression(String),

    #[error("Table has no index order set")]
    SeekWithoutIndex,

    #[error("CONTINUE without LOCATE")]
    ContinueWithoutLocate,

    #[error("File must be opened exclusively: {0}")]
    ExclusiveRequired(String),

    #[error("Record numbers were invalidated by pack or zap")]
    RecordsInvalidated,

    #[error("Binding is no longer valid: {0}")]
    StaleBinding(String),

    #[error("Cannot release the public scope")]
    ScopeUnderflow,

    #[error("Variable not found: {0}")]
    UnresolvedIdentifier(String),

    #[error("Array subscript out of range: {0}")]
    ArrayIndexOutOfRange(String),

    #[error("Invalid work area: {0}")]
    InvalidArea(i64),

    #[error("Connection handle is invalid: {0}")]
    InvalidSqlHandle(i64),

    #[error("SQL error: {0}")]
    SqlError(String),

    #[error("Table file is corrupt: {0}")]
    CorruptTable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Legacy error text shown to translated programs (`MESSAGE()`)
    pub fn message(&self) -> String {
        match self {
            Error::FileInUse(_) => "File is in use.".to_string(),
            Error::AliasInUse(_) => "Alias name is already in use.".to_string(),
            Error::SeekWithoutIndex => "Table has no index order set.".to_string(),
            Error::ContinueWithoutLocate => "CONTINUE without LOCATE.".to_string(),
            Error::NoCurrentRecord => "Record is out of range.".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_messages() {
        let err = Error::FileInUse("report".to_string());
        assert_eq!(err.message(), "File is in use.");
        assert_eq!(err.to_string(), "File is in use: report");
        assert_eq!(Error::ContinueWithoutLocate.message(), "CONTINUE without LOCATE.");
    }
}
