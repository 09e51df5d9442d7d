//! Declaration-based variable lifetime
//!
//! The stack mirrors the call chain. Frame 0 is the process-wide frame and
//! holds public variables; every other frame holds its own locals and the
//! privates it declared. Privates stay visible to callees until the
//! declaring frame is popped.

use crate::error::{Error, Result};
use crate::value::Value;
use ahash::AHashMap;

/// How a variable was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Local,
    Private,
    Public,
}

/// A resolved variable slot, tagged with the generation of its frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarSlot {
    pub name: String,
    pub depth: usize,
    pub generation: u64,
    pub kind: VarKind,
}

#[derive(Debug, Default)]
struct Frame {
    generation: u64,
    locals: AHashMap<String, Value>,
    privates: AHashMap<String, Value>,
}

#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
    next_generation: u64,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
            next_generation: 1,
        }
    }

    /// Number of frames above the public frame
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn push(&mut self) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.frames.push(Frame {
            generation,
            ..Frame::default()
        });
    }

    /// Drop the top frame together with every binding it introduced
    pub fn pop(&mut self) -> Result<()> {
        if self.frames.len() == 1 {
            return Err(Error::ScopeUnderflow);
        }
        self.frames.pop();
        Ok(())
    }

    pub fn declare_local(&mut self, name: &str, default: Value) {
        self.top_mut().locals.insert(key(name), default);
    }

    pub fn declare_private(&mut self, name: &str, default: Value) {
        self.top_mut().privates.insert(key(name), default);
    }

    pub fn declare_public(&mut self, name: &str, default: Value) {
        self.frames[0].privates.insert(key(name), default);
    }

    /// Nearest visible binding: current locals, then privates outward, then publics
    pub fn find(&self, name: &str) -> Option<VarSlot> {
        let name = key(name);
        let top = self.frames.len() - 1;

        if self.frames[top].locals.contains_key(&name) {
            return Some(VarSlot {
                generation: self.frames[top].generation,
                depth: top,
                kind: VarKind::Local,
                name,
            });
        }

        for depth in (0..=top).rev() {
            let frame = &self.frames[depth];
            if frame.privates.contains_key(&name) {
                return Some(VarSlot {
                    generation: frame.generation,
                    depth,
                    kind: if depth == 0 {
                        VarKind::Public
                    } else {
                        VarKind::Private
                    },
                    name,
                });
            }
        }

        None
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let slot = self.find(name)?;
        self.slot(&slot).ok()
    }

    pub fn slot(&self, slot: &VarSlot) -> Result<&Value> {
        let frame = self.frame_for(slot)?;
        let map = match slot.kind {
            VarKind::Local => &frame.locals,
            VarKind::Private | VarKind::Public => &frame.privates,
        };
        map.get(&slot.name)
            .ok_or_else(|| Error::StaleBinding(slot.name.clone()))
    }

    pub fn slot_mut(&mut self, slot: &VarSlot) -> Result<&mut Value> {
        self.frame_for(slot)?;
        let frame = &mut self.frames[slot.depth];
        let map = match slot.kind {
            VarKind::Local => &mut frame.locals,
            VarKind::Private | VarKind::Public => &mut frame.privates,
        };
        map.get_mut(&slot.name)
            .ok_or_else(|| Error::StaleBinding(slot.name.clone()))
    }

    /// Assign to an existing binding. Returns false when `name` is unbound.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.find(name) {
            Some(slot) => match self.slot_mut(&slot) {
                Ok(cell) => {
                    *cell = value;
                    true
                }
                Err(_) => false,
            },
            None => false,
        }
    }

    /// Remove the nearest binding of `name`; unbound names are ignored
    pub fn release(&mut self, name: &str) -> bool {
        let Some(slot) = self.find(name) else {
            return false;
        };
        let frame = &mut self.frames[slot.depth];
        match slot.kind {
            VarKind::Local => frame.locals.remove(&slot.name).is_some(),
            VarKind::Private | VarKind::Public => frame.privates.remove(&slot.name).is_some(),
        }
    }

    fn top_mut(&mut self) -> &mut Frame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    fn frame_for(&self, slot: &VarSlot) -> Result<&Frame> {
        match self.frames.get(slot.depth) {
            Some(frame) if frame.generation == slot.generation => Ok(frame),
            _ => Err(Error::StaleBinding(slot.name.clone())),
        }
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_not_visible_to_callee() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare_local("x", Value::from(1));
        scopes.push();
        assert!(scopes.find("x").is_none());
        scopes.pop().unwrap();
        assert_eq!(scopes.get("X").unwrap().number(), 1.0);
    }

    #[test]
    fn test_private_visible_down_the_chain() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare_private("test", Value::from("outer"));
        scopes.push();
        scopes.push();
        assert_eq!(scopes.get("test").unwrap().text(), "outer");

        // a nested private hides the outer one until its frame unwinds
        scopes.declare_private("test", Value::from("inner"));
        assert_eq!(scopes.get("test").unwrap().text(), "inner");
        scopes.pop().unwrap();
        assert_eq!(scopes.get("test").unwrap().text(), "outer");

        scopes.pop().unwrap();
        scopes.pop().unwrap();
        assert!(scopes.get("test").is_none());
    }

    #[test]
    fn test_public_outlives_frames() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare_public("counter", Value::from(0));
        scopes.pop().unwrap();
        let slot = scopes.find("counter").unwrap();
        assert_eq!(slot.kind, VarKind::Public);
    }

    #[test]
    fn test_local_shadows_public() {
        let mut scopes = ScopeStack::new();
        scopes.declare_public("v", Value::from("public"));
        scopes.push();
        scopes.declare_local("v", Value::from("local"));
        assert!(scopes.assign("v", Value::from("changed")));
        scopes.pop().unwrap();
        assert_eq!(scopes.get("v").unwrap().text(), "public");
    }

    #[test]
    fn test_stale_slot_after_pop() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare_local("tmp", Value::from(1));
        let slot = scopes.find("tmp").unwrap();
        scopes.pop().unwrap();
        scopes.push();
        scopes.declare_local("tmp", Value::from(2));
        assert!(matches!(scopes.slot(&slot), Err(Error::StaleBinding(_))));
    }

    #[test]
    fn test_release_unbound_is_noop() {
        let mut scopes = ScopeStack::new();
        assert!(!scopes.release("nonexistantvariable"));
        scopes.declare_public("p", Value::from(1));
        assert!(scopes.release("p"));
        assert!(scopes.get("p").is_none());
    }

    #[test]
    fn test_public_frame_cannot_pop() {
        let mut scopes = ScopeStack::new();
        assert!(matches!(scopes.pop(), Err(Error::ScopeUnderflow)));
    }
}
