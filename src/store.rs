//! Workarea store: the registry of open workareas and the table catalog
//!
//! Every open table has one catalog entry shared by all of its handles, so
//! lock conflicts are decided in one place and a table is written back to
//! disk when its last handle closes. The entry of a free table also holds
//! its OS lock: exclusive while any handle is exclusive, shared otherwise.

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::index::IndexSpec;
use crate::schema::{FieldDef, Schema};
use crate::table::{PackReport, SharedTable, Table, TableKind, TableLock};
use crate::value::Value;
use crate::workarea::{LockMode, Nav, Workarea};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Highest work area number
pub const MAX_AREA: u16 = 32767;

/// Where `use_table` opens a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaSlot {
    /// The selected area, closing its occupant
    Current,
    /// Lowest unused area; the selection does not change
    NextFree,
    Number(u16),
}

/// Queries answered by `select_area` (the legacy `SELECT()` function)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AreaQuery {
    Current,
    HighestUnused,
    HighestUsed,
    Alias(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterAction {
    Add,
    Drop,
}

/// What `pack` compacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackMode {
    Memo,
    Dbf,
    Both,
}

#[derive(Debug)]
struct CatalogEntry {
    table: SharedTable,
    handles: usize,
    exclusive: usize,
    lock: Option<TableLock>,
}

#[derive(Debug)]
pub struct WorkareaStore {
    data_dir: PathBuf,
    sync_on_write: bool,
    deleted: bool,
    exact: bool,
    areas: BTreeMap<u16, Workarea>,
    catalog: AHashMap<String, CatalogEntry>,
    selected: u16,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn alter(t: &mut Table, action: AlterAction, field_spec: &str) -> Result<()> {
    match action {
        AlterAction::Add => t.add_field(FieldDef::parse(field_spec)?)?,
        AlterAction::Drop => {
            let dropped = t.drop_field(field_spec)?;
            if !dropped.is_empty() {
                info!("Dropped index tags {:?} of {}", dropped, t.name());
            }
        }
    }
    t.save()?;
    info!(
        "Altered {}: {:?} {} (schema v{})",
        t.name(),
        action,
        field_spec,
        t.schema().version()
    );
    Ok(())
}

impl WorkareaStore {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            sync_on_write: config.sync_on_write,
            deleted: config.deleted,
            exact: config.exact,
            areas: BTreeMap::new(),
            catalog: AHashMap::new(),
            selected: 1,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `SET DELETED`
    pub fn set_deleted_filter(&mut self, on: bool) {
        self.deleted = on;
    }

    pub fn deleted_filter(&self) -> bool {
        self.deleted
    }

    /// `SET EXACT`
    pub fn set_exact(&mut self, on: bool) {
        self.exact = on;
    }

    pub fn exact(&self) -> bool {
        self.exact
    }

    pub fn selected(&self) -> u16 {
        self.selected
    }

    // ---- lifecycle ----

    /// Create an empty table and open it exclusively in the selected area
    pub fn create_table(&mut self, name: &str, descriptor: &str, kind: TableKind) -> Result<u16> {
        let name = key(name);
        if self.catalog.contains_key(&name) {
            return Err(Error::FileInUse(name));
        }
        let area = self.selected;
        self.check_alias(&name, area)?;

        let schema = Schema::parse(descriptor)?;
        let (table, lock) = match kind {
            TableKind::Free => {
                let lock = TableLock::acquire(&self.data_dir, &name, true)?;
                (Table::create(&self.data_dir, &name, schema)?, Some(lock))
            }
            TableKind::Cursor => (Table::cursor(&name, schema), None),
        };
        self.close_area(area)?;
        self.attach(area, &name, Arc::new(RwLock::new(table)), LockMode::Exclusive, lock);

        info!("Created table {} in area {}", name, area);
        Ok(area)
    }

    /// Open an existing free table
    pub fn use_table(
        &mut self,
        name: &str,
        slot: AreaSlot,
        mode: LockMode,
        alias: Option<&str>,
    ) -> Result<u16> {
        let name = key(name);
        let alias = key(alias.unwrap_or(&name));
        let area = match slot {
            AreaSlot::Current => self.selected,
            AreaSlot::NextFree => self.lowest_unused()?,
            AreaSlot::Number(n) => Self::valid_area(n as i64)?,
        };

        // a handle on the same table in the target area is about to be released
        let (released, released_exclusive) = match self.areas.get(&area) {
            Some(wa) if wa.table_name() == name => {
                (1, usize::from(wa.mode() == LockMode::Exclusive))
            }
            _ => (0, 0),
        };
        if let Some(entry) = self.catalog.get(&name) {
            let conflict = match mode {
                LockMode::Exclusive => entry.handles > released,
                LockMode::Shared | LockMode::None => entry.exclusive > released_exclusive,
            };
            if conflict {
                debug!("Refusing {:?} open of {}: {} handles", mode, name, entry.handles);
                return Err(Error::FileInUse(name));
            }
        }
        self.check_alias(&alias, area)?;

        let exclusive = mode == LockMode::Exclusive;
        let (table, lock) = match self.catalog.get_mut(&name) {
            Some(entry) => {
                if let Some(lock) = entry.lock.as_mut().filter(|_| exclusive) {
                    lock.set_exclusive(true)?;
                }
                (Arc::clone(&entry.table), None)
            }
            None => {
                if !Table::exists(&self.data_dir, &name) {
                    let path = Table::file_path(&self.data_dir, &name);
                    return Err(Error::TableNotFound(path.display().to_string()));
                }
                let lock = TableLock::acquire(&self.data_dir, &name, exclusive)?;
                let table = Table::load(&self.data_dir, &name)?;
                (Arc::new(RwLock::new(table)), Some(lock))
            }
        };
        // closing the last handle in this area hands its lock back for reuse
        let carried = self.detach(area)?.filter(|held| held.name() == name);
        self.attach(area, &alias, table, mode, lock.or(carried));

        info!("Opened {} as {} in area {} ({:?})", name, alias, area, mode);
        Ok(area)
    }

    /// Open an in-memory table under `alias` in a free area (or the area already
    /// using that alias)
    pub fn open_cursor(&mut self, table: Table, alias: &str) -> Result<u16> {
        let alias = key(alias);
        let name = key(table.name());
        // a cursor already open under this alias is replaced
        let area = match self.area_of_alias(&alias) {
            Some(area) => area,
            None => self.lowest_unused()?,
        };
        let released = match self.areas.get(&area) {
            Some(wa) if wa.table_name() == name => 1,
            _ => 0,
        };
        if self.catalog.get(&name).is_some_and(|entry| entry.handles > released) {
            return Err(Error::FileInUse(name));
        }
        self.close_area(area)?;
        self.attach(area, &alias, Arc::new(RwLock::new(table)), LockMode::None, None);
        Ok(area)
    }

    fn attach(
        &mut self,
        area: u16,
        alias: &str,
        table: SharedTable,
        mode: LockMode,
        lock: Option<TableLock>,
    ) {
        let name = key(table.read().name());
        let entry = self.catalog.entry(name).or_insert_with(|| CatalogEntry {
            table: Arc::clone(&table),
            handles: 0,
            exclusive: 0,
            lock: None,
        });
        if entry.lock.is_none() {
            entry.lock = lock;
        }
        entry.handles += 1;
        if mode == LockMode::Exclusive {
            entry.exclusive += 1;
        }
        if entry.exclusive == 0 {
            if let Some(lock) = entry.lock.as_mut() {
                if let Err(e) = lock.set_exclusive(false) {
                    warn!("Keeping exclusive lock on {}: {}", table.read().name(), e);
                }
            }
        }
        let workarea = Workarea::open(area, alias, table, mode, self.deleted);
        self.areas.insert(area, workarea);
    }

    /// Close the workarea named by `target`; an empty area is a no-op
    pub fn close(&mut self, target: Option<&str>) -> Result<()> {
        let area = match target {
            None => self.selected,
            Some(t) => match self.area_of_target(t) {
                Ok(area) => area,
                Err(Error::AliasNotFound(_)) => return Ok(()),
                Err(e) => return Err(e),
            },
        };
        self.close_area(area)
    }

    pub fn close_all(&mut self) -> Result<()> {
        let areas: Vec<u16> = self.areas.keys().copied().collect();
        for area in areas {
            self.close_area(area)?;
        }
        self.selected = 1;
        Ok(())
    }

    pub(crate) fn close_area(&mut self, area: u16) -> Result<()> {
        self.detach(area).map(drop)
    }

    /// Close a workarea. When it held the table's last handle the table is
    /// saved and its lock handed back, so a reopen can keep it.
    fn detach(&mut self, area: u16) -> Result<Option<TableLock>> {
        let Some(workarea) = self.areas.remove(&area) else {
            return Ok(None);
        };
        let name = workarea.table_name().to_string();
        let Some(entry) = self.catalog.get_mut(&name) else {
            return Ok(None);
        };
        entry.handles -= 1;
        if workarea.mode() == LockMode::Exclusive {
            entry.exclusive -= 1;
        }
        if entry.handles > 0 {
            return Ok(None);
        }
        let Some(entry) = self.catalog.remove(&name) else {
            return Ok(None);
        };
        entry.table.write().save()?;
        info!("Closed table {}", name);
        Ok(entry.lock)
    }

    /// Persist a file-backed table without closing it
    pub fn flush(&mut self, target: Option<&str>) -> Result<()> {
        let area = self.area_of(target)?;
        let table = Arc::clone(self.workarea(area)?.table());
        let mut t = table.write();
        t.save()
    }

    // ---- selection ----

    /// Select by alias, table name or area number (`0` picks the lowest unused area)
    pub fn select(&mut self, target: &str) -> Result<u16> {
        let area = match self.area_of_name(target) {
            Some(area) => area,
            None => match target.trim().parse::<i64>() {
                Ok(0) => self.lowest_unused()?,
                Ok(n) => Self::valid_area(n)?,
                Err(_) => return Err(Error::AliasNotFound(target.to_string())),
            },
        };
        self.selected = area;
        Ok(area)
    }

    pub fn select_number(&mut self, area: u16) -> Result<u16> {
        self.selected = Self::valid_area(area as i64)?;
        Ok(self.selected)
    }

    pub fn select_area(&self, query: &AreaQuery) -> u16 {
        match query {
            AreaQuery::Current => self.selected,
            AreaQuery::HighestUnused => (1..=MAX_AREA)
                .rev()
                .find(|a| !self.areas.contains_key(a))
                .unwrap_or(0),
            AreaQuery::HighestUsed => self.areas.keys().next_back().copied().unwrap_or(0),
            AreaQuery::Alias(alias) => self.area_of_alias(&key(alias)).unwrap_or(0),
        }
    }

    // ---- inspection ----

    /// Is a workarea open under `alias`? Table names do not count.
    pub fn used(&self, alias: &str) -> bool {
        self.area_of_alias(&key(alias)).is_some()
    }

    /// Alias of the target area; empty when nothing is open there
    pub fn alias(&self, target: Option<&str>) -> String {
        self.peek(target)
            .map(|wa| wa.alias().to_string())
            .unwrap_or_default()
    }

    pub fn fcount(&self, target: Option<&str>) -> usize {
        self.peek(target)
            .map(|wa| wa.table().read().schema().len())
            .unwrap_or(0)
    }

    /// Name of field `n` (1-based); empty when out of range
    pub fn field(&self, n: usize, target: Option<&str>) -> String {
        self.peek(target)
            .and_then(|wa| {
                let t = wa.table().read();
                n.checked_sub(1)
                    .and_then(|i| t.schema().field(i))
                    .map(|def| def.name.clone())
            })
            .unwrap_or_default()
    }

    pub fn reccount(&self, target: Option<&str>) -> u32 {
        self.peek(target)
            .map(|wa| wa.table().read().reccount())
            .unwrap_or(0)
    }

    pub fn recno(&self, target: Option<&str>) -> u32 {
        self.peek(target).map(Workarea::recno).unwrap_or(0)
    }

    pub fn eof(&self, target: Option<&str>) -> bool {
        self.peek(target)
            .map(|wa| wa.is_eof(&wa.table().read()))
            .unwrap_or(false)
    }

    pub fn bof(&self, target: Option<&str>) -> bool {
        self.peek(target).map(Workarea::is_bof).unwrap_or(false)
    }

    pub fn found(&self, target: Option<&str>) -> bool {
        self.peek(target).map(Workarea::found).unwrap_or(false)
    }

    /// Is the current record tombstoned?
    pub fn deleted(&self, target: Option<&str>) -> bool {
        self.peek(target)
            .map(|wa| wa.table().read().is_deleted(wa.recno()))
            .unwrap_or(false)
    }

    pub fn order(&self, target: Option<&str>) -> Option<String> {
        self.peek(target)
            .and_then(|wa| wa.order().map(str::to_string))
    }

    fn peek(&self, target: Option<&str>) -> Option<&Workarea> {
        let area = self.area_of(target).ok()?;
        self.areas.get(&area)
    }

    // ---- navigation ----

    pub fn goto(&mut self, target: Option<&str>, position: i64) -> Result<()> {
        let area = self.area_of(target)?;
        self.navigate(area, |wa, nav| wa.goto(nav, position))
    }

    pub fn skip(&mut self, target: Option<&str>, count: i64) -> Result<()> {
        let area = self.area_of(target)?;
        self.navigate(area, |wa, nav| wa.skip(nav, count))
    }

    pub fn go_top(&mut self, target: Option<&str>) -> Result<()> {
        let area = self.area_of(target)?;
        self.navigate(area, |wa, nav| wa.go_top(nav))
    }

    pub fn go_bottom(&mut self, target: Option<&str>) -> Result<()> {
        let area = self.area_of(target)?;
        self.navigate(area, |wa, nav| wa.go_bottom(nav))
    }

    /// Sync the workarea with its table, then run `f` with a navigator
    pub(crate) fn navigate<R, F>(&mut self, area: u16, f: F) -> Result<R>
    where
        F: FnOnce(&mut Workarea, &Nav) -> R,
    {
        let deleted = self.deleted;
        let workarea = self.areas.get_mut(&area).ok_or(Error::NoTableOpen)?;
        let table = Arc::clone(workarea.table());
        let mut t = table.write();
        workarea.sync(&mut t, deleted);
        let nav = Nav::new(&t, workarea.order(), deleted);
        Ok(f(workarea, &nav))
    }

    // ---- records ----

    /// Append a record from positional values and position on it
    pub fn insert(&mut self, target: Option<&str>, values: Vec<Value>) -> Result<u32> {
        let area = self.area_of(target)?;
        let deleted = self.deleted;
        let sync_on_write = self.sync_on_write;
        let workarea = self.areas.get_mut(&area).ok_or(Error::NoTableOpen)?;
        let table = Arc::clone(workarea.table());
        let mut t = table.write();
        workarea.sync(&mut t, deleted);
        let recno = t.append(values)?;
        workarea.position(recno);
        if sync_on_write {
            t.save()?;
        }
        Ok(recno)
    }

    pub fn append_blank(&mut self, target: Option<&str>) -> Result<u32> {
        self.insert(target, Vec::new())
    }

    /// Value of `field` in `recno`, provided record numbers are still from `epoch`
    pub fn read_field(&self, area: u16, recno: u32, field: usize, epoch: u64) -> Result<Value> {
        let workarea = self.workarea(area)?;
        let t = workarea.table().read();
        if t.epoch() != epoch {
            return Err(Error::StaleBinding(format!("{}#{}", workarea.alias(), recno)));
        }
        match t.value(recno, field) {
            Some(value) => Ok(value.clone()),
            None => t
                .schema()
                .field(field)
                .map(FieldDef::blank)
                .ok_or_else(|| Error::UnknownField(format!("#{}", field + 1))),
        }
    }

    /// Position of a field name in the area's current schema
    pub fn field_index(&self, area: u16, name: &str) -> Option<usize> {
        let workarea = self.areas.get(&area)?;
        let t = workarea.table().read();
        t.schema().field_index(name)
    }

    /// Record and epoch a field write would land on
    pub fn field_target(&self, area: u16) -> Option<(u32, u64)> {
        let workarea = self.areas.get(&area)?;
        let t = workarea.table().read();
        Some((workarea.recno(), t.epoch()))
    }

    /// Write one field of `recno`, provided record numbers are still from `epoch`
    pub fn write_field(
        &mut self,
        area: u16,
        recno: u32,
        field: usize,
        epoch: u64,
        value: Value,
    ) -> Result<()> {
        let workarea = self.areas.get(&area).ok_or(Error::NoTableOpen)?;
        let mut t = workarea.table().write();
        if t.epoch() != epoch {
            return Err(Error::StaleBinding(format!("{}#{}", workarea.alias(), recno)));
        }
        if recno == 0 || recno > t.reccount() {
            return Err(Error::NoCurrentRecord);
        }
        t.set_value(recno, field, value)?;
        if self.sync_on_write {
            t.save()?;
        }
        Ok(())
    }

    /// Set or clear the tombstone on one record
    pub fn mark_deleted(&mut self, area: u16, recno: u32, deleted: bool) -> Result<()> {
        let workarea = self.areas.get(&area).ok_or(Error::NoTableOpen)?;
        let mut t = workarea.table().write();
        t.set_deleted(recno, deleted)?;
        if self.sync_on_write {
            t.save()?;
        }
        Ok(())
    }

    // ---- structure ----

    /// Add or drop a field on a table, opening its file when no handle has it
    pub fn alter_table(&mut self, name: &str, action: AlterAction, field_spec: &str) -> Result<()> {
        let name = key(name);
        let Some(table) = self.catalog.get(&name).map(|entry| Arc::clone(&entry.table)) else {
            if !Table::exists(&self.data_dir, &name) {
                let path = Table::file_path(&self.data_dir, &name);
                return Err(Error::TableNotFound(path.display().to_string()));
            }
            let _lock = TableLock::acquire(&self.data_dir, &name, true)?;
            let mut t = Table::load(&self.data_dir, &name)?;
            return alter(&mut t, action, field_spec);
        };

        self.exclusively(&name, |t| alter(t, action, field_spec))?;
        let deleted = self.deleted;
        for workarea in self.areas.values_mut().filter(|wa| wa.table_name() == name) {
            workarea.sync(&mut table.write(), deleted);
        }
        Ok(())
    }

    /// Create an empty table with the selected table's structure; it is not opened
    pub fn copy_structure(&mut self, new_name: &str) -> Result<()> {
        let new_name = key(new_name);
        if self.catalog.contains_key(&new_name) {
            return Err(Error::FileInUse(new_name));
        }
        let workarea = self.workarea(self.selected)?;
        let schema = workarea.table().read().schema().structure_copy();
        let _lock = TableLock::acquire(&self.data_dir, &new_name, true)?;
        Table::create(&self.data_dir, &new_name, schema)?;
        info!("Copied structure of {} to {}", workarea.table_name(), new_name);
        Ok(())
    }

    pub fn pack(&mut self, target: Option<&str>, mode: PackMode) -> Result<PackReport> {
        let area = self.area_of(target)?;
        let name = self.workarea(area)?.table_name().to_string();
        let report = self.exclusively(&name, |t| {
            if mode == PackMode::Memo {
                return Ok(PackReport {
                    removed: 0,
                    remaining: t.reccount() as usize,
                });
            }
            let report = t.pack();
            t.save()?;
            info!("Packed {}: removed {}, {} remain", t.name(), report.removed, report.remaining);
            Ok(report)
        })?;
        if mode != PackMode::Memo {
            self.navigate(area, |wa, nav| wa.go_top(nav))?;
        }
        Ok(report)
    }

    pub fn zap(&mut self, target: Option<&str>) -> Result<()> {
        let area = self.area_of(target)?;
        let name = self.workarea(area)?.table_name().to_string();
        self.exclusively(&name, |t| {
            t.zap();
            t.save()?;
            info!("Zapped {}", t.name());
            Ok(())
        })?;
        self.navigate(area, |wa, nav| wa.go_top(nav))
    }

    /// Run a structural change that needs the only handle on an open table.
    /// A shared OS lock is raised to exclusive for the duration.
    fn exclusively<R, F>(&mut self, name: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Table) -> Result<R>,
    {
        let entry = self.catalog.get_mut(name).ok_or(Error::NoTableOpen)?;
        if entry.handles > 1 {
            return Err(Error::ExclusiveRequired(name.to_string()));
        }
        let raised = match entry.lock.as_mut() {
            Some(lock) if !lock.is_exclusive() => {
                lock.set_exclusive(true).map_err(|e| match e {
                    Error::FileInUse(_) => Error::ExclusiveRequired(name.to_string()),
                    other => other,
                })?;
                true
            }
            _ => false,
        };

        let result = {
            let mut t = entry.table.write();
            f(&mut *t)
        };
        if raised {
            if let Some(lock) = entry.lock.as_mut() {
                if let Err(e) = lock.set_exclusive(false) {
                    warn!("Keeping exclusive lock on {}: {}", name, e);
                }
            }
        }
        result
    }

    // ---- indexes ----

    /// Build an index tag, make it controlling and go to its first record
    pub fn index_on(&mut self, target: Option<&str>, spec: IndexSpec) -> Result<()> {
        let area = self.area_of(target)?;
        let tag = spec.tag.clone();
        {
            let workarea = self.workarea(area)?;
            let mut t = workarea.table().write();
            t.add_index(spec)?;
            if self.sync_on_write {
                t.save()?;
            }
        }
        self.workarea_mut(area)?.set_order(Some(&tag));
        self.navigate(area, |wa, nav| wa.go_top(nav))
    }

    /// Select or clear the controlling index; the pointer stays put
    pub fn set_order(&mut self, target: Option<&str>, tag: Option<&str>) -> Result<()> {
        let area = self.area_of(target)?;
        let workarea = self.areas.get_mut(&area).ok_or(Error::NoTableOpen)?;
        if let Some(tag) = tag {
            if !workarea.table().read().has_index(tag) {
                return Err(Error::IndexNotFound(tag.to_string()));
            }
        }
        workarea.set_order(tag);
        Ok(())
    }

    /// Jump to the first record whose controlling key matches `key`
    pub fn seek(&mut self, target: Option<&str>, key: &Value) -> Result<bool> {
        let area = self.area_of(target)?;
        let exact = self.exact;
        let found = self.navigate(area, |wa, nav| -> Result<bool> {
            let index = nav.index().ok_or(Error::SeekWithoutIndex)?;
            let mut candidate = index.seek(key, exact);
            while let Some(recno) = candidate {
                if nav.visible(recno) {
                    break;
                }
                candidate = index
                    .next(recno)
                    .filter(|next| index.key_matches(*next, key, exact));
            }
            match candidate {
                Some(recno) => wa.position(recno),
                None => wa.park_eof(nav),
            }
            wa.set_found(candidate.is_some());
            Ok(candidate.is_some())
        })??;
        debug!("SEEK {} in area {}: found={}", key, area, found);
        Ok(found)
    }

    // ---- lookup ----

    pub fn workarea(&self, area: u16) -> Result<&Workarea> {
        self.areas.get(&area).ok_or(Error::NoTableOpen)
    }

    pub fn workarea_mut(&mut self, area: u16) -> Result<&mut Workarea> {
        self.areas.get_mut(&area).ok_or(Error::NoTableOpen)
    }

    /// Area named by an optional target; `None` is the selected area
    pub fn area_of(&self, target: Option<&str>) -> Result<u16> {
        match target {
            None => Ok(self.selected),
            Some(t) => self.area_of_target(t),
        }
    }

    fn area_of_target(&self, target: &str) -> Result<u16> {
        if let Some(area) = self.area_of_name(target) {
            return Ok(area);
        }
        match target.trim().parse::<i64>() {
            Ok(n) => Self::valid_area(n),
            Err(_) => Err(Error::AliasNotFound(target.to_string())),
        }
    }

    /// Area open under `name` as an alias, or failing that as a table name
    pub fn area_of_name(&self, name: &str) -> Option<u16> {
        let name = key(name);
        self.area_of_alias(&name).or_else(|| {
            self.areas
                .values()
                .find(|wa| wa.table_name() == name)
                .map(Workarea::area)
        })
    }

    fn area_of_alias(&self, alias: &str) -> Option<u16> {
        self.areas
            .values()
            .find(|wa| wa.alias() == alias)
            .map(Workarea::area)
    }

    fn check_alias(&self, alias: &str, area: u16) -> Result<()> {
        match self.area_of_alias(alias) {
            Some(other) if other != area => Err(Error::AliasInUse(alias.to_string())),
            _ => Ok(()),
        }
    }

    fn lowest_unused(&self) -> Result<u16> {
        (1..=MAX_AREA)
            .find(|a| !self.areas.contains_key(a))
            .ok_or(Error::InvalidArea(0))
    }

    fn valid_area(n: i64) -> Result<u16> {
        if (1..=MAX_AREA as i64).contains(&n) {
            Ok(n as u16)
        } else {
            Err(Error::InvalidArea(n))
        }
    }
}
