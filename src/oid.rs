// src/oid.rs
// Object id table. Each id maps to a type tag and an arena chunk holding the
// object's state; lookups must name the right type.

use crate::arena::{self, Arena, Chunk, Record};
use crate::protocol::ShutdownReason;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ObjectKind {
    DigitalOut = 1,
    PwmOut = 2,
}

/// Arena resident state owned by one object id.
pub trait OidObject: Record {
    const KIND: ObjectKind;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct OidEntry {
    kind: u8,
    data: Chunk,
}

impl OidEntry {
    const UNASSIGNED: u8 = 0;
}

impl Record for OidEntry {
    const SIZE: usize = 8;

    fn decode(bytes: &[u8]) -> Self {
        OidEntry {
            kind: bytes[0],
            data: Chunk {
                len: arena::get_u16(bytes, 2) as u32,
                offset: arena::get_u32(bytes, 4),
            },
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        bytes[0] = self.kind;
        bytes[1] = 0;
        arena::put_u16(bytes, 2, self.data.len as u16);
        arena::put_u32(bytes, 4, self.data.offset);
    }
}

#[derive(Debug, Default)]
pub struct OidTable {
    table: Option<Chunk>,
    count: u8,
    finalized: bool,
}

impl OidTable {
    pub const fn new() -> Self {
        Self {
            table: None,
            count: 0,
            finalized: false,
        }
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    /// Size the table. Only allowed once per configuration, before finalize.
    pub fn allocate(&mut self, arena: &mut Arena<'_>, count: u8) -> Result<(), ShutdownReason> {
        if self.finalized || self.table.is_some() {
            return Err(ShutdownReason::OidsAlreadyAllocated);
        }
        let table = arena.alloc(count as usize * OidEntry::SIZE)?;
        self.table = Some(table);
        self.count = count;
        Ok(())
    }

    /// Freeze the table; later `assign` calls fail.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Give `oid` the type of `T` and fresh zeroed storage for it.
    pub fn assign<T: OidObject>(&mut self, arena: &mut Arena<'_>, oid: u8) -> Result<Chunk, ShutdownReason> {
        let slot = self.entry_chunk(oid).ok_or(ShutdownReason::OidCantAssign)?;
        if self.finalized || arena.read::<OidEntry>(slot).kind != OidEntry::UNASSIGNED {
            return Err(ShutdownReason::OidCantAssign);
        }
        let data = arena.alloc(T::SIZE)?;
        arena.write(slot, &OidEntry { kind: T::KIND as u8, data });
        Ok(data)
    }

    pub fn lookup<T: OidObject>(&self, arena: &Arena<'_>, oid: u8) -> Result<Chunk, ShutdownReason> {
        self.lookup_kind(arena, oid, T::KIND)
    }

    pub fn lookup_kind(&self, arena: &Arena<'_>, oid: u8, kind: ObjectKind) -> Result<Chunk, ShutdownReason> {
        let slot = self.entry_chunk(oid).ok_or(ShutdownReason::OidInvalid)?;
        let entry: OidEntry = arena.read(slot);
        if entry.kind != kind as u8 {
            return Err(ShutdownReason::OidInvalid);
        }
        Ok(entry.data)
    }

    /// First object of `kind` with an id greater than `after` (or from the
    /// start when `after` is None). A restartable cursor for callers that
    /// mutate the arena between steps.
    pub fn next_of_kind(&self, arena: &Arena<'_>, kind: ObjectKind, after: Option<u8>) -> Option<(u8, Chunk)> {
        let start = after.map_or(0, |oid| oid as usize + 1);
        (start..self.count as usize).find_map(|oid| {
            let entry: OidEntry = arena.read(self.entry_chunk(oid as u8)?);
            (entry.kind == kind as u8).then_some((oid as u8, entry.data))
        })
    }

    pub fn iter<'a>(&'a self, arena: &'a Arena<'a>, kind: ObjectKind) -> impl Iterator<Item = (u8, Chunk)> + 'a {
        let mut cursor = None;
        core::iter::from_fn(move || {
            let next = self.next_of_kind(arena, kind, cursor)?;
            cursor = Some(next.0);
            Some(next)
        })
    }

    /// Forget every object. The arena itself is reset by the caller.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn entry_chunk(&self, oid: u8) -> Option<Chunk> {
        let table = self.table?;
        if oid >= self.count {
            return None;
        }
        Some(table.slot(OidEntry::SIZE as u32, oid as u32))
    }
}
