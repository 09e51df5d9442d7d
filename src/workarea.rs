//! Workarea: one open handle onto a shared table
//!
//! The handle owns its cursor state (record pointer, controlling order,
//! found flag, pending LOCATE). Pointer 0 is BOF, `reccount + 1` is EOF.

use crate::index::Index;
use crate::scan::Scanner;
use crate::table::{SharedTable, Table};
use std::sync::Arc;

/// How a handle holds its table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Exclusive,
    Shared,
    /// Cursors and query results; never conflicts
    None,
}

/// Record navigation under a controlling order and the DELETED filter
pub struct Nav<'a> {
    table: &'a Table,
    index: Option<&'a Index>,
    deleted: bool,
}

impl<'a> Nav<'a> {
    pub fn new(table: &'a Table, order: Option<&str>, deleted: bool) -> Self {
        Self {
            table,
            index: order.and_then(|tag| table.index(tag)),
            deleted,
        }
    }

    pub fn table(&self) -> &'a Table {
        self.table
    }

    pub fn index(&self) -> Option<&'a Index> {
        self.index
    }

    pub fn eof(&self) -> u32 {
        self.table.reccount() + 1
    }

    pub fn visible(&self, recno: u32) -> bool {
        !(self.deleted && self.table.is_deleted(recno))
    }

    pub fn first(&self) -> Option<u32> {
        let first = match self.index {
            Some(index) => index.first(),
            None => (self.table.reccount() > 0).then_some(1),
        }?;
        self.forward_from(first)
    }

    pub fn last(&self) -> Option<u32> {
        let last = match self.index {
            Some(index) => index.last(),
            None => (self.table.reccount() > 0).then(|| self.table.reccount()),
        }?;
        self.backward_from(last)
    }

    pub fn next(&self, recno: u32) -> Option<u32> {
        self.raw_next(recno).and_then(|r| self.forward_from(r))
    }

    pub fn prev(&self, recno: u32) -> Option<u32> {
        self.raw_prev(recno).and_then(|r| self.backward_from(r))
    }

    fn raw_next(&self, recno: u32) -> Option<u32> {
        match self.index {
            Some(index) => index.next(recno),
            None => (recno < self.table.reccount()).then_some(recno + 1),
        }
    }

    fn raw_prev(&self, recno: u32) -> Option<u32> {
        match self.index {
            Some(index) => index.prev(recno),
            None => (recno > 1).then(|| recno - 1),
        }
    }

    fn forward_from(&self, mut recno: u32) -> Option<u32> {
        while !self.visible(recno) {
            recno = self.raw_next(recno)?;
        }
        Some(recno)
    }

    fn backward_from(&self, mut recno: u32) -> Option<u32> {
        while !self.visible(recno) {
            recno = self.raw_prev(recno)?;
        }
        Some(recno)
    }
}

#[derive(Debug)]
pub struct Workarea {
    area: u16,
    alias: String,
    table: SharedTable,
    table_name: String,
    mode: LockMode,
    recno: u32,
    order: Option<String>,
    found: bool,
    locate: Option<Scanner>,
    epoch: u64,
}

impl Workarea {
    /// Attach to `table`, positioned on its first record
    pub fn open(area: u16, alias: &str, table: SharedTable, mode: LockMode, deleted: bool) -> Self {
        let (table_name, epoch) = {
            let t = table.read();
            (t.name().to_string(), t.epoch())
        };
        let mut workarea = Self {
            area,
            alias: alias.trim().to_lowercase(),
            table,
            table_name,
            mode,
            recno: 0,
            order: None,
            found: false,
            locate: None,
            epoch,
        };
        let table = Arc::clone(&workarea.table);
        let mut t = table.write();
        workarea.sync(&mut t, deleted);
        workarea.go_top(&Nav::new(&t, None, deleted));
        workarea
    }

    pub fn area(&self) -> u16 {
        self.area
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn table(&self) -> &SharedTable {
        &self.table
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn recno(&self) -> u32 {
        self.recno
    }

    pub fn order(&self) -> Option<&str> {
        self.order.as_deref()
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn set_order(&mut self, tag: Option<&str>) {
        self.order = tag.map(str::to_string);
    }

    pub fn set_found(&mut self, found: bool) {
        self.found = found;
    }

    pub fn take_locate(&mut self) -> Option<Scanner> {
        self.locate.take()
    }

    pub fn set_locate(&mut self, scanner: Scanner) {
        self.locate = Some(scanner);
    }

    /// Catch up with structural changes made through any handle.
    ///
    /// Returns true when record numbers were invalidated since the last sync,
    /// in which case the pointer moves to the top and LOCATE state is dropped.
    pub fn sync(&mut self, table: &mut Table, deleted: bool) -> bool {
        table.ensure_indexes();
        if let Some(tag) = &self.order {
            if !table.has_index(tag) {
                self.order = None;
            }
        }
        if self.recno > table.reccount() + 1 {
            self.recno = table.reccount() + 1;
        }
        if table.epoch() == self.epoch {
            return false;
        }

        self.epoch = table.epoch();
        self.locate = None;
        self.found = false;
        let nav = Nav::new(table, self.order.as_deref(), deleted);
        self.go_top(&nav);
        true
    }

    pub fn is_bof(&self) -> bool {
        self.recno == 0
    }

    pub fn is_eof(&self, table: &Table) -> bool {
        self.recno > table.reccount()
    }

    /// Current record number when the pointer is on a record
    pub fn current(&self, table: &Table) -> Option<u32> {
        (self.recno >= 1 && self.recno <= table.reccount()).then_some(self.recno)
    }

    pub fn position(&mut self, recno: u32) {
        self.recno = recno;
    }

    pub fn park_eof(&mut self, nav: &Nav) {
        self.recno = nav.eof();
    }

    pub fn go_top(&mut self, nav: &Nav) {
        self.recno = nav.first().unwrap_or_else(|| nav.eof());
    }

    pub fn go_bottom(&mut self, nav: &Nav) {
        self.recno = nav.last().unwrap_or_else(|| nav.eof());
    }

    /// 0 is the top, negative counts back from the bottom, positive is a
    /// physical record number
    pub fn goto(&mut self, nav: &Nav, position: i64) {
        if position == 0 {
            self.go_top(nav);
        } else if position < 0 {
            let Some(mut recno) = nav.last() else {
                self.park_eof(nav);
                return;
            };
            for _ in 1..position.unsigned_abs() {
                match nav.prev(recno) {
                    Some(prev) => recno = prev,
                    None => break,
                }
            }
            self.recno = recno;
        } else if position > nav.table().reccount() as i64 {
            self.park_eof(nav);
        } else {
            self.recno = position as u32;
        }
    }

    /// Move `count` records in controlling order, parking at BOF or EOF
    pub fn skip(&mut self, nav: &Nav, count: i64) {
        let eof = nav.eof();
        for _ in 0..count.unsigned_abs() {
            let next = if count > 0 {
                match self.recno {
                    0 => nav.first(),
                    r if r >= eof => None,
                    r => nav.next(r),
                }
            } else {
                match self.recno {
                    0 => None,
                    r if r >= eof => nav.last(),
                    r => nav.prev(r),
                }
            };
            match next {
                Some(recno) => self.recno = recno,
                None => {
                    self.recno = if count > 0 { eof } else { 0 };
                    return;
                }
            }
        }
    }
}
