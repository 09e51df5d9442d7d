//! Table storage: an arena of records plus the table's indexes
//!
//! Record numbers are arena positions (1-based) and stay stable until
//! `pack` or `zap`, which bump the table epoch so every handle can detect
//! that its saved positions are gone.
//!
//! Free tables persist to `<name>.dbf`: an 8-byte magic tag, a format
//! version, an xxh3 checksum of the payload, then the bincode payload.
//! Opening one also takes an advisory lock on `<name>.lck`, which `save`
//! never replaces, so handles in other runtimes and processes see it.

use crate::error::{Error, Result};
use crate::index::{Index, IndexSpec};
use crate::schema::{FieldDef, Schema};
use crate::value::Value;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

const FILE_MAGIC: [u8; 8] = *b"XBASEDB1";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 8;

/// A table shared by every workarea opened on it
pub type SharedTable = Arc<RwLock<Table>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    /// Persisted free table
    Free,
    /// In-memory cursor (query results, temporary tables)
    Cursor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: Vec<Value>,
    deleted: bool,
}

impl Record {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, field: usize) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

#[derive(Serialize, Deserialize)]
struct TableFile {
    schema: Schema,
    records: Vec<Record>,
    indexes: Vec<IndexSpec>,
}

/// What `pack` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackReport {
    pub removed: usize,
    pub remaining: usize,
}

#[derive(Debug)]
pub struct Table {
    name: String,
    kind: TableKind,
    path: Option<PathBuf>,
    schema: Arc<Schema>,
    records: Vec<Record>,
    index_specs: Vec<IndexSpec>,
    indexes: Vec<Index>,
    indexes_valid: bool,
    epoch: u64,
    dirty: bool,
}

impl Table {
    /// Location of a free table's file
    pub fn file_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.dbf", name.trim().to_lowercase()))
    }

    pub fn exists(dir: &Path, name: &str) -> bool {
        Self::file_path(dir, name).is_file()
    }

    /// Create an empty free table and write its file
    pub fn create(dir: &Path, name: &str, schema: Schema) -> Result<Self> {
        let mut table = Self::empty(name, TableKind::Free, schema);
        table.path = Some(Self::file_path(dir, name));
        table.save()?;
        Ok(table)
    }

    /// Create an in-memory cursor
    pub fn cursor(name: &str, schema: Schema) -> Self {
        Self::empty(name, TableKind::Cursor, schema)
    }

    fn empty(name: &str, kind: TableKind, schema: Schema) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            kind,
            path: None,
            schema: Arc::new(schema),
            records: Vec::new(),
            index_specs: Vec::new(),
            indexes: Vec::new(),
            indexes_valid: true,
            epoch: 0,
            dirty: false,
        }
    }

    /// Load a free table. Indexes are rebuilt lazily on first use.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = Self::file_path(dir, name);
        if !path.is_file() {
            return Err(Error::TableNotFound(path.display().to_string()));
        }

        let mut bytes = Vec::new();
        File::open(&path)?.read_to_end(&mut bytes)?;
        let corrupt = |why: &str| Error::CorruptTable(format!("{}: {}", path.display(), why));

        if bytes.len() < HEADER_LEN || bytes[..8] != FILE_MAGIC {
            return Err(corrupt("bad header"));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[8..12]);
        if u32::from_le_bytes(version) != FORMAT_VERSION {
            return Err(corrupt("unsupported format version"));
        }
        let mut checksum = [0u8; 8];
        checksum.copy_from_slice(&bytes[12..20]);
        let payload = &bytes[HEADER_LEN..];
        if xxh3_64(payload) != u64::from_le_bytes(checksum) {
            return Err(corrupt("checksum mismatch"));
        }

        let file: TableFile = bincode::deserialize(payload)
            .map_err(|e| Error::SerializationError(e.to_string()))?;
        if file.records.iter().any(|r| r.values.len() != file.schema.len()) {
            return Err(corrupt("record does not match schema"));
        }

        let mut table = Self::empty(name, TableKind::Free, file.schema);
        table.path = Some(path);
        table.records = file.records;
        table.index_specs = file.indexes;
        table.indexes_valid = false;
        Ok(table)
    }

    /// Write a free table to disk; cursors have nothing to write
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        let file = TableFile {
            schema: (*self.schema).clone(),
            records: self.records.clone(),
            indexes: self.index_specs.clone(),
        };
        let payload =
            bincode::serialize(&file).map_err(|e| Error::SerializationError(e.to_string()))?;

        let tmp = path.with_extension("dbf.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(&FILE_MAGIC)?;
            writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&xxh3_64(&payload).to_le_bytes())?;
            writer.write_all(&payload)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;

        self.dirty = false;
        debug!("Saved table {} ({} records)", self.name, self.records.len());
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn reccount(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn record(&self, recno: u32) -> Option<&Record> {
        if recno == 0 {
            return None;
        }
        self.records.get(recno as usize - 1)
    }

    pub fn value(&self, recno: u32, field: usize) -> Option<&Value> {
        self.record(recno)?.value(field)
    }

    pub fn is_deleted(&self, recno: u32) -> bool {
        self.record(recno).map(Record::is_deleted).unwrap_or(false)
    }

    /// Append a record from positional values; missing values are blank
    pub fn append(&mut self, values: Vec<Value>) -> Result<u32> {
        let fields = self.schema.len();
        if values.len() > fields {
            return Err(Error::TooManyValues {
                fields,
                values: values.len(),
            });
        }

        let mut row = Vec::with_capacity(fields);
        let mut supplied = values.into_iter();
        for def in self.schema.fields() {
            match supplied.next() {
                Some(value) => row.push(def.coerce(value)?),
                None => row.push(def.blank()),
            }
        }

        self.records.push(Record {
            values: row,
            deleted: false,
        });
        let recno = self.reccount();
        if self.indexes_valid {
            let values = &self.records[recno as usize - 1].values;
            for index in self.indexes.iter_mut() {
                index.insert(recno, values);
            }
        }
        self.dirty = true;
        Ok(recno)
    }

    /// Overwrite one field, keeping every index consistent
    pub fn set_value(&mut self, recno: u32, field: usize, value: Value) -> Result<()> {
        let def = self
            .schema
            .field(field)
            .ok_or_else(|| Error::UnknownField(format!("#{}", field + 1)))?;
        let value = def.coerce(value)?;
        let slot = self.slot(recno)?;

        self.records[slot].values[field] = value;
        if self.indexes_valid {
            let values = &self.records[slot].values;
            for index in self.indexes.iter_mut() {
                index.update(recno, values);
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Set or clear the tombstone. Indexes keep tombstoned records.
    pub fn set_deleted(&mut self, recno: u32, deleted: bool) -> Result<()> {
        let slot = self.slot(recno)?;
        if self.records[slot].deleted != deleted {
            self.records[slot].deleted = deleted;
            self.dirty = true;
        }
        Ok(())
    }

    /// Discard tombstoned records and renumber survivors 1..M
    pub fn pack(&mut self) -> PackReport {
        let before = self.records.len();
        if !self.records.iter().any(|r| r.deleted) {
            return PackReport {
                removed: 0,
                remaining: before,
            };
        }

        // stays false if we never reach the rebuild below
        self.indexes_valid = false;
        self.records.retain(|r| !r.deleted);
        self.epoch += 1;
        self.dirty = true;
        self.rebuild_indexes();

        PackReport {
            removed: before - self.records.len(),
            remaining: self.records.len(),
        }
    }

    /// Discard every record; schema and index definitions survive
    pub fn zap(&mut self) {
        self.indexes_valid = false;
        self.records.clear();
        self.epoch += 1;
        self.dirty = true;
        self.rebuild_indexes();
    }

    /// New schema version with `def` appended; existing records get its blank
    pub fn add_field(&mut self, def: FieldDef) -> Result<()> {
        let schema = self.schema.with_field(def)?;
        let blank = schema.fields()[schema.len() - 1].blank();
        for record in self.records.iter_mut() {
            record.values.push(blank.clone());
        }
        self.schema = Arc::new(schema);
        self.recompile_indexes(&[]);
        self.dirty = true;
        Ok(())
    }

    /// New schema version without `name`. Returns the index tags that read it.
    pub fn drop_field(&mut self, name: &str) -> Result<Vec<String>> {
        let (schema, position) = self.schema.without_field(name)?;
        let dropped_tags: Vec<String> = self
            .indexes
            .iter()
            .filter(|index| index.references(name))
            .map(|index| index.tag().to_string())
            .collect();

        for record in self.records.iter_mut() {
            record.values.remove(position);
        }
        self.schema = Arc::new(schema);
        self.recompile_indexes(&dropped_tags);
        self.dirty = true;
        Ok(dropped_tags)
    }

    /// Build (or replace) an index tag
    pub fn add_index(&mut self, spec: IndexSpec) -> Result<()> {
        self.ensure_indexes();
        let mut index = Index::new(spec.clone(), &self.schema)?;
        index.rebuild(self.rows());
        debug!("Built index {} on {} ({} keys)", spec.tag, self.name, index.len());

        match self.index_specs.iter().position(|s| s.tag == spec.tag) {
            Some(pos) => {
                self.index_specs[pos] = spec;
                self.indexes[pos] = index;
            }
            None => {
                self.index_specs.push(spec);
                self.indexes.push(index);
            }
        }
        self.dirty = true;
        Ok(())
    }

    pub fn index_specs(&self) -> &[IndexSpec] {
        &self.index_specs
    }

    pub fn has_index(&self, tag: &str) -> bool {
        self.index_specs.iter().any(|s| s.tag.eq_ignore_ascii_case(tag))
    }

    /// Index by tag; `None` while indexes await a rebuild
    pub fn index(&self, tag: &str) -> Option<&Index> {
        if !self.indexes_valid {
            return None;
        }
        self.indexes.iter().find(|i| i.tag().eq_ignore_ascii_case(tag))
    }

    pub fn indexes_valid(&self) -> bool {
        self.indexes_valid
    }

    /// Rebuild indexes left invalid by a load or an interrupted pack
    pub fn ensure_indexes(&mut self) {
        if !self.indexes_valid {
            if !self.index_specs.is_empty() {
                debug!("Rebuilding {} index tags of {}", self.index_specs.len(), self.name);
            }
            self.recompile_indexes(&[]);
        }
    }

    fn recompile_indexes(&mut self, skip: &[String]) {
        let schema = Arc::clone(&self.schema);
        let mut specs = Vec::new();
        let mut indexes = Vec::new();
        for spec in self.index_specs.drain(..) {
            if skip.contains(&spec.tag) {
                continue;
            }
            match Index::new(spec.clone(), &schema) {
                Ok(index) => {
                    specs.push(spec);
                    indexes.push(index);
                }
                Err(e) => warn!("Dropping index {} of {}: {}", spec.tag, self.name, e),
            }
        }
        self.index_specs = specs;
        self.indexes = indexes;
        self.rebuild_indexes();
    }

    fn rebuild_indexes(&mut self) {
        let rows: Vec<(u32, &[Value])> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (i as u32 + 1, r.values.as_slice()))
            .collect();
        for index in self.indexes.iter_mut() {
            index.rebuild(rows.iter().copied());
        }
        self.indexes_valid = true;
    }

    fn rows(&self) -> impl Iterator<Item = (u32, &[Value])> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (i as u32 + 1, r.values.as_slice()))
    }

    fn slot(&self, recno: u32) -> Result<usize> {
        if recno == 0 || recno > self.reccount() {
            return Err(Error::NoCurrentRecord);
        }
        Ok(recno as usize - 1)
    }
}

/// OS advisory lock held for as long as a runtime has a free table open
#[derive(Debug)]
pub struct TableLock {
    name: String,
    file: File,
    exclusive: bool,
}

impl TableLock {
    pub fn lock_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.lck", name.trim().to_lowercase()))
    }

    /// Take the lock without waiting; a conflicting holder is `FileInUse`
    pub fn acquire(dir: &Path, name: &str, exclusive: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(Self::lock_path(dir, name))?;
        let name = name.trim().to_lowercase();
        try_lock(&file, exclusive).map_err(|e| contended(&name, e))?;
        debug!("Locked {} ({})", name, if exclusive { "exclusive" } else { "shared" });
        Ok(Self {
            name,
            file,
            exclusive,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Convert between shared and exclusive without waiting
    pub fn set_exclusive(&mut self, exclusive: bool) -> Result<()> {
        if self.exclusive == exclusive {
            return Ok(());
        }
        if let Err(e) = try_lock(&self.file, exclusive) {
            // a failed conversion may have dropped the old lock
            if let Err(relock) = try_lock(&self.file, self.exclusive) {
                warn!("Lost lock on {}: {}", self.name, relock);
            }
            return Err(contended(&self.name, e));
        }
        self.exclusive = exclusive;
        Ok(())
    }
}

fn try_lock(file: &File, exclusive: bool) -> std::io::Result<()> {
    if exclusive {
        fs2::FileExt::try_lock_exclusive(file)
    } else {
        fs2::FileExt::try_lock_shared(file)
    }
}

fn contended(name: &str, e: std::io::Error) -> Error {
    if e.kind() == fs2::lock_contended_error().kind() {
        Error::FileInUse(name.to_string())
    } else {
        Error::IoError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report(dir: &Path) -> Table {
        let schema = Schema::parse("name c(20); st c(2); quantity n(5, 0)").unwrap();
        let mut table = Table::create(dir, "report", schema).unwrap();
        for (name, st, qty) in [("Norma", "ID", 84), ("Lisa", "CA", 51), ("Ryan", "ID", 63)] {
            table
                .append(vec![Value::from(name), Value::from(st), Value::from(qty)])
                .unwrap();
        }
        table
    }

    #[test]
    fn test_append_pads_and_blanks() {
        let dir = TempDir::new().unwrap();
        let mut table = report(dir.path());
        let recno = table.append(vec![Value::from("Short")]).unwrap();
        assert_eq!(recno, 4);
        assert_eq!(table.value(4, 0).unwrap().text().len(), 20);
        assert_eq!(table.value(4, 1).unwrap(), &Value::from("  "));
        assert_eq!(table.value(4, 2).unwrap(), &Value::from(0));
        assert!(table.append(vec![Value::from(1), Value::from("x")]).is_err());
    }

    #[test]
    fn test_pack_renumbers_and_bumps_epoch() {
        let dir = TempDir::new().unwrap();
        let mut table = report(dir.path());
        table.add_index(IndexSpec::new("st", "st")).unwrap();
        table.set_deleted(1, true).unwrap();

        let report = table.pack();
        assert_eq!(report, PackReport { removed: 1, remaining: 2 });
        assert_eq!(table.epoch(), 1);
        assert_eq!(table.value(1, 0).unwrap().text().trim(), "Lisa");
        assert_eq!(table.index("st").unwrap().ordered(), vec![1, 2]);
    }

    #[test]
    fn test_pack_without_tombstones_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut table = report(dir.path());
        table.add_index(IndexSpec::new("quantity", "qty")).unwrap();
        let before = table.index("qty").unwrap().ordered();
        assert_eq!(table.pack().removed, 0);
        assert_eq!(table.epoch(), 0);
        assert_eq!(table.index("qty").unwrap().ordered(), before);
    }

    #[test]
    fn test_set_value_rekeys_index() {
        let dir = TempDir::new().unwrap();
        let mut table = report(dir.path());
        table.add_index(IndexSpec::new("quantity", "qty")).unwrap();
        table.set_value(1, 2, Value::from(1)).unwrap();
        assert_eq!(table.index("qty").unwrap().first(), Some(1));
        assert!(table.set_value(9, 2, Value::from(1)).is_err());
        assert!(table.set_value(1, 2, Value::from("x")).is_err());
    }

    #[test]
    fn test_alter_add_and_drop() {
        let dir = TempDir::new().unwrap();
        let mut table = report(dir.path());
        table.add_index(IndexSpec::new("st", "st")).unwrap();
        table.add_field(FieldDef::parse("age n(3, 0)").unwrap()).unwrap();
        assert_eq!(table.schema().len(), 4);
        assert_eq!(table.value(2, 3).unwrap(), &Value::from(0));

        let dropped = table.drop_field("st").unwrap();
        assert_eq!(dropped, vec!["st".to_string()]);
        assert!(!table.has_index("st"));
        assert_eq!(table.schema().len(), 3);
        assert_eq!(table.record(1).unwrap().values().len(), 3);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut table = report(dir.path());
        table.add_index(IndexSpec::new("st", "st").descending()).unwrap();
        table.set_deleted(2, true).unwrap();
        table.save().unwrap();
        assert!(Table::exists(dir.path(), "REPORT"));

        let mut loaded = Table::load(dir.path(), "report").unwrap();
        assert_eq!(loaded.reccount(), 3);
        assert!(loaded.is_deleted(2));
        assert!(loaded.index("st").is_none());
        loaded.ensure_indexes();
        assert_eq!(loaded.index("st").unwrap().first(), Some(1));
    }

    #[test]
    fn test_load_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let mut table = report(dir.path());
        table.save().unwrap();
        let path = Table::file_path(dir.path(), "report");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            Table::load(dir.path(), "report"),
            Err(Error::CorruptTable(_))
        ));
    }

    #[test]
    fn test_table_lock_conflicts() {
        let dir = TempDir::new().unwrap();
        let shared = TableLock::acquire(dir.path(), "report", false).unwrap();
        let mut other = TableLock::acquire(dir.path(), "report", false).unwrap();
        assert!(matches!(
            TableLock::acquire(dir.path(), "report", true),
            Err(Error::FileInUse(_))
        ));
        assert!(matches!(other.set_exclusive(true), Err(Error::FileInUse(_))));
        assert!(!other.is_exclusive());

        drop(shared);
        other.set_exclusive(true).unwrap();
        assert!(matches!(
            TableLock::acquire(dir.path(), "REPORT", false),
            Err(Error::FileInUse(_))
        ));
        drop(other);
        TableLock::acquire(dir.path(), "report", true).unwrap();
    }
}
