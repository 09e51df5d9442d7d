//! Ordered key -> record-number index
//!
//! Entries map a computed key to the set of record numbers sharing it.
//! Direction and uniqueness are applied at navigation time: a unique index
//! exposes only the lowest record number of each key.

use crate::error::{Error, Result};
use crate::schema::{FieldDef, FieldType, Schema};
use crate::value::Value;
use ahash::AHashMap;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Included, Unbounded};

/// Persisted index definition (a tag of the table's structural index)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub tag: String,
    pub key_expr: String,
    pub descending: bool,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(key_expr: &str, tag: &str) -> Self {
        Self {
            tag: tag.trim().to_lowercase(),
            key_expr: key_expr.trim().to_string(),
            descending: false,
            unique: false,
        }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// f64 with a total order so it can live in a BTreeMap key
#[derive(Debug, Clone, Copy)]
pub struct NumberKey(f64);

impl NumberKey {
    fn new(n: f64) -> Self {
        // -0.0 and 0.0 must collide
        Self(if n == 0.0 { 0.0 } else { n })
    }
}

impl PartialEq for NumberKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumberKey {}

impl PartialOrd for NumberKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumberKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    Null,
    Logical(bool),
    Number(NumberKey),
    Date(Option<NaiveDate>),
    DateTime(Option<NaiveDateTime>),
    Text(String),
}

impl IndexKey {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Character(s) => IndexKey::Text(s.clone()),
            Value::Numeric(n) => IndexKey::Number(NumberKey::new(*n)),
            Value::Date(d) => IndexKey::Date(*d),
            Value::DateTime(dt) => IndexKey::DateTime(*dt),
            Value::Logical(b) => IndexKey::Logical(*b),
            Value::Null | Value::Array(_) => IndexKey::Null,
        }
    }

    /// Does an index key satisfy a SEEK for `wanted`?
    fn matches(&self, wanted: &IndexKey, exact: bool) -> bool {
        match (self, wanted) {
            (IndexKey::Text(have), IndexKey::Text(want)) => {
                if exact {
                    have.trim_end() == want.trim_end()
                } else {
                    have.starts_with(want.as_str())
                }
            }
            (have, want) => have == want,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Case {
    Keep,
    Upper,
    Lower,
}

#[derive(Debug, Clone)]
struct KeyTerm {
    field: usize,
    def: FieldDef,
    case: Case,
}

/// Compiled key expression: `field`, `UPPER(field)`, `LOWER(field)`, or
/// `+`-joined terms concatenated as text
#[derive(Debug, Clone)]
pub struct KeyExpr {
    terms: Vec<KeyTerm>,
}

impl KeyExpr {
    pub fn compile(expr: &str, schema: &Schema) -> Result<Self> {
        let mut terms = Vec::new();
        for raw in expr.split('+') {
            let raw = raw.trim();
            let (case, name) = match raw.find('(') {
                Some(open) if raw.ends_with(')') => {
                    let func = raw[..open].trim().to_lowercase();
                    let inner = raw[open + 1..raw.len() - 1].trim();
                    let case = match func.as_str() {
                        "upper" => Case::Upper,
                        "lower" => Case::Lower,
                        _ => return Err(Error::InvalidKeyExpression(expr.to_string())),
                    };
                    (case, inner)
                }
                _ => (Case::Keep, raw),
            };
            if name.is_empty() {
                return Err(Error::InvalidKeyExpression(expr.to_string()));
            }
            let field = schema
                .field_index(name)
                .ok_or_else(|| Error::UnknownField(name.to_string()))?;
            let def = schema.fields()[field].clone();
            if case != Case::Keep && def.field_type != FieldType::Character {
                return Err(Error::InvalidKeyExpression(expr.to_string()));
            }
            terms.push(KeyTerm { field, def, case });
        }
        Ok(Self { terms })
    }

    /// True when the expression reads `field_name`
    pub fn references(&self, field_name: &str) -> bool {
        self.terms
            .iter()
            .any(|t| t.def.name.eq_ignore_ascii_case(field_name))
    }

    pub fn evaluate(&self, values: &[Value]) -> IndexKey {
        if let [term] = self.terms.as_slice() {
            return match (&values[term.field], term.case) {
                (Value::Character(s), Case::Upper) => IndexKey::Text(s.to_uppercase()),
                (Value::Character(s), Case::Lower) => IndexKey::Text(s.to_lowercase()),
                (value, _) => IndexKey::from_value(value),
            };
        }

        let mut text = String::new();
        for term in &self.terms {
            let piece = key_text(&values[term.field], &term.def);
            match term.case {
                Case::Keep => text.push_str(&piece),
                Case::Upper => text.push_str(&piece.to_uppercase()),
                Case::Lower => text.push_str(&piece.to_lowercase()),
            }
        }
        IndexKey::Text(text)
    }
}

/// Fixed-width text form of a value inside a composite key
fn key_text(value: &Value, def: &FieldDef) -> String {
    let width = def.width as usize;
    match value {
        Value::Character(s) => s.clone(),
        Value::Numeric(n) => format!("{:>w$.d$}", n, w = width, d = def.decimals as usize),
        Value::Date(Some(d)) => d.format("%Y%m%d").to_string(),
        Value::Date(None) => " ".repeat(8),
        Value::DateTime(Some(dt)) => dt.format("%Y%m%d%H%M%S").to_string(),
        Value::DateTime(None) => " ".repeat(14),
        Value::Logical(b) => (if *b { "T" } else { "F" }).to_string(),
        Value::Null | Value::Array(_) => " ".repeat(width),
    }
}

/// An index over one table
#[derive(Debug, Clone)]
pub struct Index {
    spec: IndexSpec,
    expr: KeyExpr,
    entries: BTreeMap<IndexKey, BTreeSet<u32>>,
    keys: AHashMap<u32, IndexKey>,
}

impl Index {
    pub fn new(spec: IndexSpec, schema: &Schema) -> Result<Self> {
        let expr = KeyExpr::compile(&spec.key_expr, schema)?;
        Ok(Self {
            spec,
            expr,
            entries: BTreeMap::new(),
            keys: AHashMap::new(),
        })
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn tag(&self) -> &str {
        &self.spec.tag
    }

    pub fn references(&self, field_name: &str) -> bool {
        self.expr.references(field_name)
    }

    /// Number of indexed records (including hidden unique duplicates)
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }

    /// Rebuild from `(recno, values)` pairs
    pub fn rebuild<'a, I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = (u32, &'a [Value])>,
    {
        self.clear();
        for (recno, values) in rows {
            self.insert(recno, values);
        }
    }

    pub fn insert(&mut self, recno: u32, values: &[Value]) {
        let key = self.expr.evaluate(values);
        self.entries.entry(key.clone()).or_default().insert(recno);
        self.keys.insert(recno, key);
    }

    /// Re-key a record after one of its values changed
    pub fn update(&mut self, recno: u32, values: &[Value]) {
        let key = self.expr.evaluate(values);
        if self.keys.get(&recno) == Some(&key) {
            return;
        }
        self.remove(recno);
        self.entries.entry(key.clone()).or_default().insert(recno);
        self.keys.insert(recno, key);
    }

    pub fn remove(&mut self, recno: u32) {
        if let Some(old) = self.keys.remove(&recno) {
            if let Some(set) = self.entries.get_mut(&old) {
                set.remove(&recno);
                if set.is_empty() {
                    self.entries.remove(&old);
                }
            }
        }
    }

    pub fn key_of(&self, recno: u32) -> Option<&IndexKey> {
        self.keys.get(&recno)
    }

    /// Would `recno` satisfy a SEEK for `wanted`?
    pub fn key_matches(&self, recno: u32, wanted: &Value, exact: bool) -> bool {
        let wanted = IndexKey::from_value(wanted);
        self.keys
            .get(&recno)
            .map(|key| key.matches(&wanted, exact))
            .unwrap_or(false)
    }

    /// Record numbers in index order, honoring direction and uniqueness
    pub fn ordered(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.keys.len());
        let mut push = |set: &BTreeSet<u32>| {
            if self.spec.unique {
                out.extend(set.iter().next().copied());
            } else {
                out.extend(set.iter().copied());
            }
        };
        if self.spec.descending {
            self.entries.values().rev().for_each(&mut push);
        } else {
            self.entries.values().for_each(&mut push);
        }
        out
    }

    pub fn first(&self) -> Option<u32> {
        let set = if self.spec.descending {
            self.entries.values().next_back()
        } else {
            self.entries.values().next()
        }?;
        self.first_visible(set)
    }

    pub fn last(&self) -> Option<u32> {
        let set = if self.spec.descending {
            self.entries.values().next()
        } else {
            self.entries.values().next_back()
        }?;
        self.last_visible(set)
    }

    /// Record following `recno` in index order
    pub fn next(&self, recno: u32) -> Option<u32> {
        let key = self.keys.get(&recno)?;
        if !self.spec.unique {
            if let Some(next) = self.entries.get(key).and_then(|set| {
                set.range((Excluded(recno), Unbounded)).next().copied()
            }) {
                return Some(next);
            }
        }
        let (_, set) = if self.spec.descending {
            self.entries.range((Unbounded, Excluded(key))).next_back()
        } else {
            self.entries.range((Excluded(key), Unbounded)).next()
        }?;
        self.first_visible(set)
    }

    /// Record preceding `recno` in index order
    pub fn prev(&self, recno: u32) -> Option<u32> {
        let key = self.keys.get(&recno)?;
        if !self.spec.unique {
            if let Some(prev) = self
                .entries
                .get(key)
                .and_then(|set| set.range(..recno).next_back().copied())
            {
                return Some(prev);
            }
        } else if let Some(first) = self.entries.get(key).and_then(|set| set.iter().next()) {
            // a hidden duplicate steps back onto its visible twin
            if *first != recno {
                return Some(*first);
            }
        }
        let (_, set) = if self.spec.descending {
            self.entries.range((Excluded(key), Unbounded)).next()
        } else {
            self.entries.range((Unbounded, Excluded(key))).next_back()
        }?;
        self.last_visible(set)
    }

    /// First record, in index order, whose key matches `wanted`
    pub fn seek(&self, wanted: &Value, exact: bool) -> Option<u32> {
        let wanted = IndexKey::from_value(wanted);
        let matching: Vec<&BTreeSet<u32>> = match &wanted {
            IndexKey::Text(text) => {
                let start = if exact {
                    IndexKey::Text(text.trim_end().to_string())
                } else {
                    wanted.clone()
                };
                let prefix = match &start {
                    IndexKey::Text(p) => p.clone(),
                    _ => String::new(),
                };
                self.entries
                    .range((Included(start), Unbounded))
                    .take_while(|(key, _)| matches!(key, IndexKey::Text(k) if k.starts_with(&prefix)))
                    .filter(|(key, _)| key.matches(&wanted, exact))
                    .map(|(_, set)| set)
                    .collect()
            }
            _ => self.entries.get(&wanted).into_iter().collect(),
        };

        let set = if self.spec.descending {
            matching.last()
        } else {
            matching.first()
        }?;
        self.first_visible(set)
    }

    fn first_visible(&self, set: &BTreeSet<u32>) -> Option<u32> {
        set.iter().next().copied()
    }

    fn last_visible(&self, set: &BTreeSet<u32>) -> Option<u32> {
        if self.spec.unique {
            set.iter().next().copied()
        } else {
            set.iter().next_back().copied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::parse("name c(10); st c(2); quantity n(5, 0)").unwrap()
    }

    fn rows() -> Vec<Vec<Value>> {
        let schema = schema();
        [("Norma", "ID", 84.0), ("Lisa", "CA", 51.0), ("Ryan", "ID", 63.0), ("Joshua", "WA", 12.0)]
            .iter()
            .map(|(n, s, q)| {
                vec![
                    schema.fields()[0].coerce(Value::from(*n)).unwrap(),
                    schema.fields()[1].coerce(Value::from(*s)).unwrap(),
                    Value::from(*q),
                ]
            })
            .collect()
    }

    fn build(spec: IndexSpec) -> Index {
        let mut index = Index::new(spec, &schema()).unwrap();
        let rows = rows();
        index.rebuild(rows.iter().enumerate().map(|(i, r)| (i as u32 + 1, r.as_slice())));
        index
    }

    #[test]
    fn test_ascending_order_and_navigation() {
        let index = build(IndexSpec::new("st", "st"));
        assert_eq!(index.ordered(), vec![2, 1, 3, 4]);
        assert_eq!(index.first(), Some(2));
        assert_eq!(index.next(1), Some(3));
        assert_eq!(index.prev(1), Some(2));
        assert_eq!(index.last(), Some(4));
        assert_eq!(index.next(4), None);
    }

    #[test]
    fn test_descending_numeric() {
        let index = build(IndexSpec::new("quantity", "qty").descending());
        assert_eq!(index.ordered(), vec![1, 3, 2, 4]);
        assert_eq!(index.prev(3), Some(1));
        assert_eq!(index.prev(1), None);
    }

    #[test]
    fn test_unique_hides_duplicates() {
        let index = build(IndexSpec::new("st", "st").unique());
        assert_eq!(index.ordered(), vec![2, 1, 4]);
        assert_eq!(index.next(1), Some(4));
        // record 3 is a hidden duplicate of record 1
        assert_eq!(index.next(3), Some(4));
        assert_eq!(index.prev(3), Some(1));
    }

    #[test]
    fn test_seek_prefix_and_exact() {
        let index = build(IndexSpec::new("st", "st"));
        assert_eq!(index.seek(&Value::from("CA"), false), Some(2));
        assert_eq!(index.seek(&Value::from("I"), false), Some(1));
        assert_eq!(index.seek(&Value::from("I"), true), None);
        assert_eq!(index.seek(&Value::from("ZZ"), false), None);
    }

    #[test]
    fn test_update_rekeys() {
        let mut index = build(IndexSpec::new("upper(name)", "name"));
        let mut row = rows()[3].clone();
        row[0] = Value::from("aaron     ");
        index.update(4, &row);
        assert_eq!(index.first(), Some(4));
        assert_eq!(index.key_of(4), Some(&IndexKey::Text("AARON     ".to_string())));
        index.remove(4);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_composite_key_is_text() {
        let schema = schema();
        let expr = KeyExpr::compile("st + quantity", &schema).unwrap();
        let key = expr.evaluate(&rows()[1]);
        assert_eq!(key, IndexKey::Text("CA   51".to_string()));
        assert!(expr.references("QUANTITY"));
        assert!(KeyExpr::compile("missing", &schema).is_err());
        assert!(KeyExpr::compile("upper(quantity)", &schema).is_err());
    }
}
