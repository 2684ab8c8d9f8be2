/// Sparse binding table indexed by binding number
///
/// The backing array grows on demand to the highest index bound so far.
/// A slot is `None` until something is bound to it. Updates only touch the
/// indices they name.
///
/// # Example
///
/// ```ignore
/// let mut slots = BindingSlots::new(BindingKind::VertexBuffer, 64);
/// slots.set(3, "vbo")?;    // slots 0..=2 exist and are empty
/// assert_eq!(slots.len(), 4);
/// assert_eq!(slots.bound_count(), 1);
/// ```

use crate::error::{BindingKind, Error, Result};

pub struct BindingSlots<T> {
    kind: BindingKind,
    max_slots: u32,
    slots: Vec<Option<T>>,
}

impl<T> BindingSlots<T> {
    /// Create an empty table accepting indices below `max_slots`
    pub fn new(kind: BindingKind, max_slots: u32) -> Self {
        Self {
            kind,
            max_slots,
            slots: Vec::new(),
        }
    }

    /// Fail if `index` is beyond the configured capacity
    pub fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.max_slots {
            return Err(Error::BindingIndexOutOfRange {
                kind: self.kind,
                index,
                max: self.max_slots,
            });
        }
        Ok(())
    }

    /// Bind `value` at `index`, growing the table if needed
    pub fn set(&mut self, index: u32, value: T) -> Result<()> {
        self.check_index(index)?;
        let i = index as usize;
        if i >= self.slots.len() {
            self.slots.resize_with(i + 1, || None);
        }
        self.slots[i] = Some(value);
        Ok(())
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize).and_then(|slot| slot.as_ref())
    }

    /// Unbind every slot
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Bound slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|value| (i as u32, value)))
    }

    /// Highest bound index + 1 (size of the backing array)
    pub fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of slots currently holding a binding
    pub fn bound_count(&self) -> u32 {
        self.slots.iter().filter(|slot| slot.is_some()).count() as u32
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }
}

#[cfg(test)]
#[path = "binding_slots_tests.rs"]
mod tests;
