//! Dynamically typed values shared by variables and record fields

use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A runtime value. Field values never hold `Array`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Character(String),
    Numeric(f64),
    Date(Option<NaiveDate>),
    DateTime(Option<NaiveDateTime>),
    Logical(bool),
    Null,
    Array(ArrayValue),
}

impl Value {
    /// Value read from an identifier that resolves to nothing
    pub const UNSET: Value = Value::Logical(false);

    /// Legacy one-letter type code (`VARTYPE()`)
    pub fn vartype(&self) -> char {
        match self {
            Value::Character(_) => 'C',
            Value::Numeric(_) => 'N',
            Value::Date(_) => 'D',
            Value::DateTime(_) => 'T',
            Value::Logical(_) => 'L',
            Value::Null => 'X',
            Value::Array(_) => 'A',
        }
    }

    /// Character contents, or `""` for other types
    pub fn text(&self) -> &str {
        match self {
            Value::Character(s) => s,
            _ => "",
        }
    }

    /// Numeric contents, or `0.0` for other types
    pub fn number(&self) -> f64 {
        match self {
            Value::Numeric(n) => *n,
            _ => 0.0,
        }
    }

    /// Logical contents, or `false` for other types
    pub fn truthy(&self) -> bool {
        matches!(self, Value::Logical(true))
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => *d,
            Value::DateTime(dt) => dt.map(|dt| dt.date()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut ArrayValue> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Legacy `EMPTY()`: blank text, zero, empty date, false, null
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Character(s) => s.trim().is_empty(),
            Value::Numeric(n) => *n == 0.0,
            Value::Date(d) => d.is_none(),
            Value::DateTime(dt) => dt.is_none(),
            Value::Logical(b) => !b,
            Value::Null => true,
            Value::Array(a) => a.cells.is_empty(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::UNSET
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Character(s) => write!(f, "{}", s),
            Value::Numeric(n) => write!(f, "{}", n),
            Value::Date(Some(d)) => write!(f, "{}", d.format("%m/%d/%Y")),
            Value::DateTime(Some(dt)) => write!(f, "{}", dt.format("%m/%d/%Y %I:%M:%S %p")),
            Value::Date(None) | Value::DateTime(None) => write!(f, "/  /"),
            Value::Logical(true) => write!(f, ".T."),
            Value::Logical(false) => write!(f, ".F."),
            Value::Null => write!(f, ".NULL."),
            Value::Array(a) => write!(f, "<array {}>", a.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Character(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Character(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Numeric(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Numeric(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Numeric(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Logical(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(Some(d))
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(Some(dt))
    }
}

impl From<ArrayValue> for Value {
    fn from(a: ArrayValue) -> Self {
        Value::Array(a)
    }
}

/// One- or two-dimensional array with 1-based subscripts.
///
/// Cells start as `.F.`. A two-dimensional array can also be addressed
/// with a single linear subscript in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    rows: usize,
    cols: usize,
    cells: Vec<Value>,
}

impl ArrayValue {
    pub fn new(len: usize) -> Self {
        Self {
            rows: len,
            cols: 0,
            cells: vec![Value::UNSET; len],
        }
    }

    pub fn new_2d(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Value::UNSET; rows * cols],
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// `(rows, cols)`; `cols` is 0 for a one-dimensional array
    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, index: usize) -> Result<&Value> {
        let slot = self.linear(index)?;
        Ok(&self.cells[slot])
    }

    pub fn get_2d(&self, row: usize, col: usize) -> Result<&Value> {
        let slot = self.cell(row, col)?;
        Ok(&self.cells[slot])
    }

    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        let slot = self.linear(index)?;
        self.cells[slot] = value;
        Ok(())
    }

    pub fn set_2d(&mut self, row: usize, col: usize, value: Value) -> Result<()> {
        let slot = self.cell(row, col)?;
        self.cells[slot] = value;
        Ok(())
    }

    /// Assign the same value to every cell (`STORE x TO arr`)
    pub fn fill(&mut self, value: Value) {
        for cell in self.cells.iter_mut() {
            *cell = value.clone();
        }
    }

    fn linear(&self, index: usize) -> Result<usize> {
        if index == 0 || index > self.cells.len() {
            return Err(Error::ArrayIndexOutOfRange(format!("{}", index)));
        }
        Ok(index - 1)
    }

    fn cell(&self, row: usize, col: usize) -> Result<usize> {
        if self.cols == 0 {
            if col != 1 {
                return Err(Error::ArrayIndexOutOfRange(format!("{}, {}", row, col)));
            }
            return self.linear(row);
        }
        if row == 0 || row > self.rows || col == 0 || col > self.cols {
            return Err(Error::ArrayIndexOutOfRange(format!("{}, {}", row, col)));
        }
        Ok((row - 1) * self.cols + (col - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vartype_codes() {
        let date = NaiveDate::from_ymd_opt(2017, 6, 30).unwrap();
        assert_eq!(Value::from("abc").vartype(), 'C');
        assert_eq!(Value::from(3.14).vartype(), 'N');
        assert_eq!(Value::from(date).vartype(), 'D');
        assert_eq!(Value::from(date.and_hms_opt(0, 0, 0).unwrap()).vartype(), 'T');
        assert_eq!(Value::UNSET.vartype(), 'L');
        assert_eq!(Value::Null.vartype(), 'X');
    }

    #[test]
    fn test_array_defaults_to_false() {
        let def = ArrayValue::new(10);
        assert_eq!(def.get(1).unwrap(), &Value::Logical(false));
        assert!(def.get(0).is_err());
        assert!(def.get(11).is_err());
    }

    #[test]
    fn test_two_dimensional_array() {
        let mut arr = ArrayValue::new_2d(2, 5);
        arr.set_2d(1, 4, Value::from(3)).unwrap();
        assert_eq!(arr.get_2d(1, 4).unwrap().number(), 3.0);
        // row-major linear addressing
        assert_eq!(arr.get(4).unwrap().number(), 3.0);
        assert!(arr.get_2d(3, 1).is_err());
        assert_eq!(arr.dimensions(), (2, 5));
    }

    #[test]
    fn test_empty_rules() {
        assert!(Value::from("   ").is_empty());
        assert!(!Value::from(" a ").is_empty());
        assert!(Value::from(0).is_empty());
        assert!(Value::Date(None).is_empty());
        assert!(!Value::from(true).is_empty());
    }
}
