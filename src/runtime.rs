//! Runtime facade and name resolution
//!
//! An identifier resolves in two tiers. Declared variables come first:
//! current locals, then privates walking outward, then publics. Failing
//! that, a field of the selected workarea (or of `alias.field` /
//! `alias->field`) is bound to the current record. `m.name` forces the
//! variable tier.

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::scope::{ScopeStack, VarSlot};
use crate::sql_bridge::SqlBridge;
use crate::store::WorkareaStore;
use crate::value::Value;
use tracing::debug;

/// A resolved cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Variable(VarSlot),
    Field {
        area: u16,
        recno: u32,
        field: usize,
        epoch: u64,
    },
}

enum Qualifier<'a> {
    None,
    Memvar,
    Alias(&'a str),
}

/// Split `alias.field`, `alias->field` and `m.name`
fn qualify(name: &str) -> (Qualifier<'_>, &str) {
    let name = name.trim();
    let split = name
        .find("->")
        .map(|at| (&name[..at], &name[at + 2..]))
        .or_else(|| name.find('.').map(|at| (&name[..at], &name[at + 1..])));
    match split {
        Some((alias, rest)) if alias.eq_ignore_ascii_case("m") => (Qualifier::Memvar, rest.trim()),
        Some((alias, rest)) => (Qualifier::Alias(alias.trim()), rest.trim()),
        None => (Qualifier::None, name),
    }
}

pub struct Runtime {
    pub(crate) config: RuntimeConfig,
    pub(crate) scopes: ScopeStack,
    pub(crate) db: WorkareaStore,
    pub(crate) sql: SqlBridge,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;
        let db = WorkareaStore::new(&config);
        Ok(Self {
            config,
            scopes: ScopeStack::new(),
            db,
            sql: SqlBridge::new(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn db(&self) -> &WorkareaStore {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut WorkareaStore {
        &mut self.db
    }

    pub fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    /// `SET DELETED ON|OFF`
    pub fn set_deleted(&mut self, on: bool) {
        self.db.set_deleted_filter(on);
    }

    /// `SET EXACT ON|OFF`
    pub fn set_exact(&mut self, on: bool) {
        self.db.set_exact(on);
    }

    // ---- scopes ----

    pub fn push_scope(&mut self) {
        self.scopes.push();
    }

    /// Unwind the current frame, handing back the routine's return value
    pub fn pop_scope(&mut self, value: Option<Value>) -> Result<Option<Value>> {
        self.scopes.pop()?;
        Ok(value)
    }

    pub fn declare_local(&mut self, name: &str, default: Value) {
        self.scopes.declare_local(name, default);
    }

    pub fn declare_private(&mut self, name: &str, default: Value) {
        self.scopes.declare_private(name, default);
    }

    pub fn declare_public(&mut self, name: &str, default: Value) {
        self.scopes.declare_public(name, default);
    }

    /// Remove the nearest binding of `name`; unbound names are ignored
    pub fn release(&mut self, name: &str) {
        let (_, name) = qualify(name);
        if !self.scopes.release(name) {
            debug!("RELEASE of unbound {}", name);
        }
    }

    // ---- resolution ----

    pub fn resolve(&self, name: &str) -> Option<Binding> {
        let (qualifier, bare) = qualify(name);
        let area = match qualifier {
            Qualifier::Memvar => return self.scopes.find(bare).map(Binding::Variable),
            Qualifier::Alias(alias) => self.db.area_of_name(alias)?,
            Qualifier::None => {
                if let Some(slot) = self.scopes.find(bare) {
                    return Some(Binding::Variable(slot));
                }
                self.db.selected()
            }
        };

        let field = self.db.field_index(area, bare)?;
        let (recno, epoch) = self.db.field_target(area)?;
        Some(Binding::Field {
            area,
            recno,
            field,
            epoch,
        })
    }

    pub fn read(&self, binding: &Binding) -> Result<Value> {
        match binding {
            Binding::Variable(slot) => self.scopes.slot(slot).cloned(),
            Binding::Field {
                area,
                recno,
                field,
                epoch,
            } => self.db.read_field(*area, *recno, *field, *epoch),
        }
    }

    pub fn write(&mut self, binding: &Binding, value: Value) -> Result<()> {
        match binding {
            Binding::Variable(slot) => {
                *self.scopes.slot_mut(slot)? = value;
                Ok(())
            }
            Binding::Field {
                area,
                recno,
                field,
                epoch,
            } => self.db.write_field(*area, *recno, *field, *epoch, value),
        }
    }

    /// Strict read: unbound names are an error
    pub fn lookup(&self, name: &str) -> Result<Value> {
        let binding = self
            .resolve(name)
            .ok_or_else(|| Error::UnresolvedIdentifier(name.to_string()))?;
        self.read(&binding)
    }

    /// Lenient read: unbound names read as `.F.`
    pub fn get(&self, name: &str) -> Value {
        match self.lookup(name) {
            Ok(value) => value,
            Err(e) => {
                debug!("Reading {} as .F.: {}", name, e);
                Value::UNSET
            }
        }
    }

    /// Assign a variable or the current record's field. An unbound name
    /// becomes a private of the current frame.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if let Some(binding) = self.resolve(name) {
            return self.write(&binding, value);
        }
        match qualify(name) {
            (Qualifier::Alias(alias), bare) => Err(Error::UnknownField(format!("{}.{}", alias, bare))),
            (_, bare) => {
                self.scopes.declare_private(bare, value);
                Ok(())
            }
        }
    }

    /// Read one array element; `col` addresses the second dimension
    pub fn element(&self, name: &str, row: usize, col: Option<usize>) -> Result<Value> {
        let value = self.lookup(name)?;
        let array = value
            .as_array()
            .ok_or_else(|| Error::ArrayIndexOutOfRange(format!("{} is not an array", name)))?;
        match col {
            Some(col) => array.get_2d(row, col).cloned(),
            None => array.get(row).cloned(),
        }
    }

    pub fn set_element(&mut self, name: &str, row: usize, col: Option<usize>, value: Value) -> Result<()> {
        let slot = match self.resolve(name) {
            Some(Binding::Variable(slot)) => slot,
            _ => return Err(Error::UnresolvedIdentifier(name.to_string())),
        };
        let array = self
            .scopes
            .slot_mut(&slot)?
            .as_array_mut()
            .ok_or_else(|| Error::ArrayIndexOutOfRange(format!("{} is not an array", name)))?;
        match col {
            Some(col) => array.set_2d(row, col, value),
            None => array.set(row, value),
        }
    }
}
