use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one surface for one lifetime of its table slot.
///
/// Two handles are equal only when both the index and the generation match,
/// so a handle kept past `SurfaceTable::remove` never aliases the surface that
/// later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceHandle {
    pub index: u32,
    pub generation: u16,
}

impl SurfaceHandle {
    /// Carried by buffers that are not scoped to any surface.
    pub const NONE: SurfaceHandle = SurfaceHandle {
        index: u32::MAX,
        generation: 0,
    };

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("none");
        }
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// Generational slot table mapping [`SurfaceHandle`]s to live values.
#[derive(Debug)]
pub struct SurfaceTable<T> {
    slots: Vec<Slot<T>>,
    vacant: Vec<u32>,
    len: usize,
}

impl<T> Default for SurfaceTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            len: 0,
        }
    }
}

impl<T> SurfaceTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> Result<SurfaceHandle> {
        if let Some(index) = self.vacant.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.len += 1;
            return Ok(SurfaceHandle {
                index,
                generation: slot.generation,
            });
        }

        let index = u32::try_from(self.slots.len())
            .ok()
            .filter(|index| *index != SurfaceHandle::NONE.index)
            .ok_or_else(|| anyhow!("surface table is full"))?;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        self.len += 1;
        Ok(SurfaceHandle {
            index,
            generation: 1,
        })
    }

    /// Removes the value and advances the slot generation, invalidating
    /// every outstanding copy of `handle`.
    pub fn remove(&mut self, handle: SurfaceHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = next_generation(slot.generation);
        self.vacant.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, handle: SurfaceHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: SurfaceHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: SurfaceHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (SurfaceHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SurfaceHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn handles(&self) -> Vec<SurfaceHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }
}

// Generation 0 is reserved for `SurfaceHandle::NONE`.
fn next_generation(generation: u16) -> u16 {
    generation.wrapping_add(1).max(1)
}
