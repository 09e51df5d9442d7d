//! Table structure: field definitions and schema descriptors
//!
//! A descriptor is a `;`-separated list of `name type(width[,decimals])`
//! entries, e.g. `name c(50); st c(2); quantity n(5, 0); received l`.

use crate::error::{Error, Result};
use crate::value::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static::lazy_static! {
    static ref FIELD_SPEC: Regex = Regex::new(
        r"(?i)^\s*([a-z_][a-z0-9_]*)\s+([cndtl])\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*(null|not\s+null)?\s*$"
    ).expect("field spec pattern");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Character,
    Numeric,
    Date,
    DateTime,
    Logical,
}

impl FieldType {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            'c' => Some(FieldType::Character),
            'n' => Some(FieldType::Numeric),
            'd' => Some(FieldType::Date),
            't' => Some(FieldType::DateTime),
            'l' => Some(FieldType::Logical),
            _ => None,
        }
    }

    /// Type letter as used in descriptors and `VARTYPE()`
    pub fn letter(&self) -> char {
        match self {
            FieldType::Character => 'C',
            FieldType::Numeric => 'N',
            FieldType::Date => 'D',
            FieldType::DateTime => 'T',
            FieldType::Logical => 'L',
        }
    }

    fn default_width(&self) -> Option<u16> {
        match self {
            FieldType::Character => None,
            FieldType::Numeric => Some(10),
            FieldType::Date | FieldType::DateTime => Some(8),
            FieldType::Logical => Some(1),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A single field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub width: u16,
    pub decimals: u8,
    pub nullable: bool,
}

impl FieldDef {
    pub fn new(name: &str, field_type: FieldType, width: u16, decimals: u8) -> Self {
        Self {
            name: name.to_lowercase(),
            field_type,
            width,
            decimals,
            nullable: false,
        }
    }

    pub fn character(name: &str, width: u16) -> Self {
        Self::new(name, FieldType::Character, width, 0)
    }

    pub fn numeric(name: &str, width: u16, decimals: u8) -> Self {
        Self::new(name, FieldType::Numeric, width, decimals)
    }

    pub fn date(name: &str) -> Self {
        Self::new(name, FieldType::Date, 8, 0)
    }

    pub fn datetime(name: &str) -> Self {
        Self::new(name, FieldType::DateTime, 8, 0)
    }

    pub fn logical(name: &str) -> Self {
        Self::new(name, FieldType::Logical, 1, 0)
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Parse one descriptor entry such as `quantity n(5, 0)`
    pub fn parse(spec: &str) -> Result<Self> {
        let caps = FIELD_SPEC
            .captures(spec)
            .ok_or_else(|| Error::InvalidSchema(format!("cannot parse field '{}'", spec.trim())))?;

        let name = &caps[1];
        let letter = caps[2].chars().next().unwrap_or(' ');
        let field_type = FieldType::from_letter(letter)
            .ok_or_else(|| Error::InvalidSchema(format!("unknown field type '{}'", letter)))?;

        let width = match caps.get(3) {
            Some(w) => w
                .as_str()
                .parse::<u16>()
                .map_err(|_| Error::InvalidSchema(format!("bad width for '{}'", name)))?,
            None => field_type
                .default_width()
                .ok_or_else(|| Error::InvalidSchema(format!("field '{}' needs a width", name)))?,
        };
        if width == 0 {
            return Err(Error::InvalidSchema(format!("field '{}' has zero width", name)));
        }

        let decimals = match caps.get(4) {
            Some(d) => d
                .as_str()
                .parse::<u8>()
                .map_err(|_| Error::InvalidSchema(format!("bad decimals for '{}'", name)))?,
            None => 0,
        };
        if decimals > 0 && (field_type != FieldType::Numeric || decimals as u16 >= width) {
            return Err(Error::InvalidSchema(format!(
                "field '{}' cannot have {} decimals",
                name, decimals
            )));
        }

        let nullable = caps
            .get(5)
            .map(|m| m.as_str().eq_ignore_ascii_case("null"))
            .unwrap_or(false);

        Ok(Self::new(name, field_type, width, decimals).with_nullable(nullable))
    }

    /// Blank default for a freshly appended or backfilled record
    pub fn blank(&self) -> Value {
        match self.field_type {
            FieldType::Character => Value::Character(" ".repeat(self.width as usize)),
            FieldType::Numeric => Value::Numeric(0.0),
            FieldType::Date => Value::Date(None),
            FieldType::DateTime => Value::DateTime(None),
            FieldType::Logical => Value::Logical(false),
        }
    }

    /// Convert a value into this field's storage form.
    ///
    /// Character data is padded or truncated to the field width and
    /// numbers are rounded to the declared decimals.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        let mismatch = |found: char| Error::TypeMismatch {
            field: self.name.clone(),
            expected: self.field_type.letter(),
            found,
        };

        match (self.field_type, value) {
            (_, Value::Null) if self.nullable => Ok(Value::Null),
            (FieldType::Character, Value::Character(s)) => {
                let width = self.width as usize;
                let truncated: String = s.chars().take(width).collect();
                Ok(Value::Character(format!("{:<width$}", truncated, width = width)))
            }
            (FieldType::Numeric, Value::Numeric(n)) => {
                let scale = 10f64.powi(self.decimals as i32);
                Ok(Value::Numeric((n * scale).round() / scale))
            }
            (FieldType::Date, Value::Date(d)) => Ok(Value::Date(d)),
            (FieldType::Date, Value::DateTime(dt)) => Ok(Value::Date(dt.map(|dt| dt.date()))),
            (FieldType::DateTime, Value::DateTime(dt)) => Ok(Value::DateTime(dt)),
            (FieldType::DateTime, Value::Date(d)) => {
                Ok(Value::DateTime(d.and_then(|d| d.and_hms_opt(0, 0, 0))))
            }
            (FieldType::Logical, Value::Logical(b)) => Ok(Value::Logical(b)),
            (_, other) => Err(mismatch(other.vartype())),
        }
    }
}

impl fmt::Display for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field_type {
            FieldType::Character => write!(f, "{} c({})", self.name, self.width),
            FieldType::Numeric => write!(f, "{} n({}, {})", self.name, self.width, self.decimals),
            other => write!(f, "{} {}", self.name, other.letter().to_ascii_lowercase()),
        }?;
        if self.nullable {
            write!(f, " null")?;
        }
        Ok(())
    }
}

/// An immutable schema snapshot. Altering a table yields a new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    version: u32,
    fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDef>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::InvalidSchema("a table needs at least one field".to_string()));
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::InvalidSchema(format!("duplicate field '{}'", field.name)));
            }
        }
        Ok(Self { version: 1, fields })
    }

    /// Parse a `;`-separated descriptor
    pub fn parse(descriptor: &str) -> Result<Self> {
        let fields = descriptor
            .split(';')
            .filter(|entry| !entry.trim().is_empty())
            .map(FieldDef::parse)
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&FieldDef> {
        self.fields.get(index)
    }

    /// Case-insensitive field lookup
    pub fn field_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.fields.iter().position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn blank_record(&self) -> Vec<Value> {
        self.fields.iter().map(FieldDef::blank).collect()
    }

    /// New version with `field` appended
    pub fn with_field(&self, field: FieldDef) -> Result<Self> {
        if self.field_index(&field.name).is_some() {
            return Err(Error::InvalidSchema(format!("duplicate field '{}'", field.name)));
        }
        let mut fields = self.fields.clone();
        fields.push(field);
        Ok(Self {
            version: self.version + 1,
            fields,
        })
    }

    /// New version without `name`, plus the removed field's position
    pub fn without_field(&self, name: &str) -> Result<(Self, usize)> {
        let index = self
            .field_index(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        if self.fields.len() == 1 {
            return Err(Error::InvalidSchema("cannot drop the last field".to_string()));
        }
        let mut fields = self.fields.clone();
        fields.remove(index);
        Ok((
            Self {
                version: self.version + 1,
                fields,
            },
            index,
        ))
    }

    /// Fresh version-1 copy (`COPY STRUCTURE`)
    pub fn structure_copy(&self) -> Self {
        Self {
            version: 1,
            fields: self.fields.clone(),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self.fields.iter().map(|field| field.to_string()).collect();
        write!(f, "{}", entries.join("; "))
    }
}
