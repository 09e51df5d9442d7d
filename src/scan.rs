//! Scope-bounded scans, LOCATE/CONTINUE and the record mutations built on them
//!
//! A `Scanner` is a detached cursor: it remembers where it is and pulls the
//! next candidate from the store on each `next` call, moving the workarea's
//! record pointer as it goes. Predicates see the runtime, so they read
//! variables and live fields through the normal name resolution.
//!
//! Commands that write the records they walk (REPLACE, DELETE, RECALL) fix
//! the visit order when the scan starts. A key update moves a record within
//! the controlling tag, so pulling "next in key order" afterwards would skip
//! records or revisit the moved one.

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::value::Value;
use crate::workarea::Nav;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// FOR / WHILE predicate
pub type Condition = Arc<dyn Fn(&Runtime) -> bool>;

/// Per-record expression (REPLACE ... WITH, SUM, AVERAGE)
pub type Expr = Arc<dyn Fn(&Runtime) -> Value>;

pub fn cond<F>(f: F) -> Condition
where
    F: Fn(&Runtime) -> bool + 'static,
{
    Arc::new(f)
}

pub fn expr<F>(f: F) -> Expr
where
    F: Fn(&Runtime) -> Value + 'static,
{
    Arc::new(f)
}

/// Record range of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every record, starting from the top
    All,
    /// From the current record to the end
    Rest,
    /// At most n records starting with the current one
    Next(u64),
    /// Only this record number
    Record(u32),
}

#[derive(Debug, Clone, Copy)]
enum Step {
    First,
    From(u32),
    After(u32),
    Only(u32),
}

impl Step {
    /// Record the next pull lands on
    fn candidate(self, nav: &Nav) -> Option<u32> {
        let reccount = nav.table().reccount();
        match self {
            Step::First => nav.first(),
            Step::From(recno) if recno <= reccount && nav.visible(recno) => Some(recno),
            Step::From(recno) | Step::After(recno) => nav.next(recno),
            Step::Only(recno) => (recno >= 1 && recno <= reccount).then_some(recno),
        }
    }
}

#[derive(Clone)]
pub struct Scanner {
    area: u16,
    table: String,
    epoch: u64,
    step: Step,
    remaining: Option<u64>,
    for_cond: Option<Condition>,
    while_cond: Option<Condition>,
    /// Fixed visit order; `None` follows the live order
    planned: Option<VecDeque<u32>>,
    done: bool,
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("area", &self.area)
            .field("table", &self.table)
            .field("epoch", &self.epoch)
            .field("step", &self.step)
            .field("remaining", &self.remaining)
            .field("planned", &self.planned.as_ref().map(VecDeque::len))
            .field("done", &self.done)
            .finish()
    }
}

impl Scanner {
    pub fn area(&self) -> u16 {
        self.area
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Advance to the next qualifying record and make it current
    pub fn next(&mut self, rt: &mut Runtime) -> Result<Option<u32>> {
        if self.done {
            return Ok(None);
        }

        loop {
            if self.remaining == Some(0) {
                self.done = true;
                return Ok(None);
            }

            let planned = self.planned.as_mut().map(VecDeque::pop_front);
            let (step, epoch, table) = (self.step, self.epoch, self.table.as_str());
            let pulled = rt.db.navigate(self.area, |wa, nav| {
                if wa.table_name() != table || nav.table().epoch() != epoch {
                    return Err(Error::RecordsInvalidated);
                }
                let candidate = match planned {
                    Some(next) => next,
                    None => step.candidate(nav),
                };
                match candidate {
                    Some(recno) => wa.position(recno),
                    None => wa.park_eof(nav),
                }
                Ok(candidate)
            });

            let candidate = match pulled.and_then(|inner| inner) {
                Ok(candidate) => candidate,
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            };
            let Some(recno) = candidate else {
                self.done = true;
                return Ok(None);
            };
            self.step = Step::After(recno);
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }

            if let Some(while_cond) = &self.while_cond {
                if !while_cond(rt) {
                    self.done = true;
                    return Ok(None);
                }
            }
            if let Some(for_cond) = &self.for_cond {
                if !for_cond(rt) {
                    continue;
                }
            }
            return Ok(Some(recno));
        }
    }

    /// Pull every remaining record, calling `f` on each
    pub fn run<F>(&mut self, rt: &mut Runtime, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Runtime, u32) -> Result<()>,
    {
        while let Some(recno) = self.next(rt)? {
            f(rt, recno)?;
        }
        Ok(())
    }
}

impl Runtime {
    /// Start a scan of `target` (the selected area when `None`)
    pub fn scan(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<Scanner> {
        let area = self.db.area_of(target)?;
        let (table, epoch, step, done) = self.db.navigate(area, |wa, nav| {
            let at_end = wa.is_eof(nav.table());
            let (step, done) = match scope {
                Scope::All => (Step::First, false),
                Scope::Record(recno) => (Step::Only(recno), false),
                Scope::Rest | Scope::Next(_) if wa.is_bof() => (Step::First, false),
                Scope::Rest | Scope::Next(_) => (Step::From(wa.recno()), at_end),
            };
            (wa.table_name().to_string(), wa.epoch(), step, done)
        })?;

        Ok(Scanner {
            area,
            table,
            epoch,
            step,
            remaining: match scope {
                Scope::Next(n) => Some(n),
                Scope::Record(_) => Some(1),
                Scope::All | Scope::Rest => None,
            },
            for_cond,
            while_cond,
            planned: None,
            done,
        })
    }

    /// Start a scan whose visit order is fixed now
    fn scan_fixed(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<Scanner> {
        let mut scanner = self.scan(target, scope, for_cond, while_cond)?;
        if scanner.done {
            scanner.planned = Some(VecDeque::new());
            return Ok(scanner);
        }

        let (step, limit) = (scanner.step, scanner.remaining);
        let planned = self.db.navigate(scanner.area, |_, nav| {
            let mut order = VecDeque::new();
            let mut candidate = step.candidate(nav);
            while let Some(recno) = candidate {
                if limit.is_some_and(|n| order.len() as u64 >= n) {
                    break;
                }
                order.push_back(recno);
                candidate = match step {
                    Step::Only(_) => None,
                    _ => nav.next(recno),
                };
            }
            order
        })?;
        debug!("Fixed scan order of {} records in area {}", planned.len(), scanner.area);
        scanner.planned = Some(planned);
        Ok(scanner)
    }

    /// Position on the first match and remember the search for `continue_locate`
    pub fn locate(
        &mut self,
        target: Option<&str>,
        scope: Option<Scope>,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<bool> {
        let mut scanner = self.scan(target, scope.unwrap_or(Scope::Rest), for_cond, while_cond)?;
        let hit = scanner.next(self)?;
        let workarea = self.db.workarea_mut(scanner.area())?;
        workarea.set_found(hit.is_some());
        workarea.set_locate(scanner);
        debug!("LOCATE in area {}: {:?}", workarea.area(), hit);
        Ok(hit.is_some())
    }

    /// Resume the last LOCATE after its previous match
    pub fn continue_locate(&mut self, target: Option<&str>) -> Result<bool> {
        let area = self.db.area_of(target)?;
        // drops LOCATE state that a pack or zap invalidated
        self.db.navigate(area, |_, _| ())?;
        let mut scanner = self
            .db
            .workarea_mut(area)?
            .take_locate()
            .ok_or(Error::ContinueWithoutLocate)?;

        let hit = scanner.next(self)?;
        let workarea = self.db.workarea_mut(area)?;
        workarea.set_found(hit.is_some());
        workarea.set_locate(scanner);
        debug!("CONTINUE in area {}: {:?}", area, hit);
        Ok(hit.is_some())
    }

    /// Jump to the first record whose controlling key matches `key`
    pub fn seek(&mut self, target: Option<&str>, key: impl Into<Value>) -> Result<bool> {
        self.db.seek(target, &key.into())
    }

    /// Assign a constant to `field` on every scanned record
    pub fn replace(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        field: &str,
        value: impl Into<Value>,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<u64> {
        let value = value.into();
        self.replace_with(target, scope, field, expr(move |_| value.clone()), for_cond, while_cond)
    }

    /// Assign `with` evaluated per record to `field` on every scanned record
    pub fn replace_with(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        field: &str,
        with: Expr,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<u64> {
        let area = self.db.area_of(target)?;
        let field_index = self
            .db
            .field_index(area, field)
            .ok_or_else(|| Error::UnknownField(field.to_string()))?;

        let mut replaced = 0;
        let mut scanner = self.scan_fixed(target, scope, for_cond, while_cond)?;
        scanner.run(self, |rt, recno| {
            let value = with(rt);
            let epoch = rt.db.workarea(area)?.epoch();
            rt.db.write_field(area, recno, field_index, epoch, value)?;
            replaced += 1;
            Ok(())
        })?;
        Ok(replaced)
    }

    /// Tombstone every scanned record
    pub fn delete_records(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<u64> {
        self.mark_records(target, scope, for_cond, while_cond, true)
    }

    /// Clear the tombstone on every scanned record
    pub fn recall_records(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<u64> {
        self.mark_records(target, scope, for_cond, while_cond, false)
    }

    fn mark_records(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
        deleted: bool,
    ) -> Result<u64> {
        let mut marked = 0;
        let mut scanner = self.scan_fixed(target, scope, for_cond, while_cond)?;
        let area = scanner.area();
        scanner.run(self, |rt, recno| {
            rt.db.mark_deleted(area, recno, deleted)?;
            marked += 1;
            Ok(())
        })?;
        Ok(marked)
    }
}
