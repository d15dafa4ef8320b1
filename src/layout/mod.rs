//! Layout descriptors: the per-record dispatch table and its builder.
//!
//! A [`DispatchTable`] is the contract between a record's schema and the
//! decoder: 32 slots of `(parser, field_data)` indexed by five bits of the
//! first tag byte, plus the record size and the child tables of its
//! sub-record fields.  `field_data` packs everything a specialised parser
//! needs into one word:
//!
//! | bits   | contents                                            |
//! |--------|-----------------------------------------------------|
//! | 0..16  | expected tag bytes (mismatch detection by XOR)      |
//! | 16..24 | sub-record table index                              |
//! | 24..32 | presence-bit index (singular) / field number (oneof)|
//! | 32..48 | oneof case offset inside the record                 |
//! | 48..64 | field offset inside the record                      |
//!
//! [`TableBuilder`] checks the fast-path constraints (field numbers 1..=31,
//! presence bits inside the leading word, offsets inside the record) and
//! picks the matching parser entry point for every
//! {cardinality × kind × tag-length} combination.

use std::sync::{Arc, Weak};

use crate::decode::DecodeState;
use crate::decode::{fixed_fields as ff, generic, message_fields as mf, string_fields as sf, varint_fields as vf};
use crate::wire::types::{encode_tag, wiretype, MAX_FAST_FIELD};

/// Specialised field parser: `(state, ptr, msg, table, hasbits, data)` to
/// the cursor past the field, or null with the error recorded on the state.
pub type FieldParser = unsafe fn(
    &mut DecodeState,
    *const u8,
    *mut u8,
    &DispatchTable,
    &mut u64,
    u64,
) -> *const u8;

/// One dispatch-table slot.
#[derive(Clone, Copy)]
pub struct Slot {
    pub parser: FieldParser,
    pub data: u64,
}

/// A slot no field claims: the fallback parser with a tag pattern that
/// never matches.
const UNUSED_SLOT: Slot = Slot {
    parser: generic::fallback,
    data: 0xFFFF,
};

/// Child-table reference.  `Recursive` links a record to itself (or an
/// ancestor) through the `Arc` under construction.
#[derive(Clone)]
pub enum Submsg {
    Table(Arc<DispatchTable>),
    Recursive(Weak<DispatchTable>),
}

/// Per-record layout descriptor consumed by the dispatch core.
pub struct DispatchTable {
    /// Record size in bytes (multiple of 8, presence word included).
    pub size: u32,
    /// Child layouts addressed by the sub-record index in `field_data`.
    pub submsgs: Vec<Submsg>,
    /// The 32-slot jump table.
    pub fasttable: [Slot; 32],
}

impl DispatchTable {
    /// Resolve a child table by index.
    #[inline(always)]
    pub(crate) fn submsg(&self, idx: usize) -> &DispatchTable {
        match &self.submsgs[idx] {
            Submsg::Table(t) => &**t,
            // SAFETY: a recursive entry points back into the Arc that owns
            // this table; any decode using it holds that Arc alive.
            Submsg::Recursive(w) => unsafe { &*w.as_ptr() },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field description
// ─────────────────────────────────────────────────────────────────────────────

/// Value shape of a field, naming the parser family and storage width.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldKind {
    /// Varint collapsed to 0/1, stored in one byte.
    Bool,
    /// Varint stored as 4 bytes.
    Varint32,
    /// Varint stored as 8 bytes.
    Varint64,
    /// Zigzag-decoded varint stored as 4 bytes.
    Zigzag32,
    /// Zigzag-decoded varint stored as 8 bytes.
    Zigzag64,
    /// 4-byte little-endian value.
    Fixed32,
    /// 8-byte little-endian value.
    Fixed64,
}

/// How many values of a field a record holds, and where presence goes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cardinality {
    /// At most one value; presence recorded in the given bit of the leading
    /// word.
    Singular { hasbit: u8 },
    /// Member of a oneof; the field number is written to the case word at
    /// the given offset.
    Oneof { case_offset: u16 },
    /// Any number of values, each carrying its own tag.
    Repeated,
    /// Any number of numeric values in one length-delimited region.
    Packed,
}

/// Problems a layout description can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("field number {0} outside the fast-path range 1..=31")]
    FieldNumber(u32),
    #[error("dispatch slot for field {0} already occupied")]
    SlotTaken(u32),
    #[error("presence bit {0} outside the 32-bit presence word")]
    PresenceBit(u8),
    #[error("field at offset {0} escapes the record")]
    Offset(u16),
    #[error("cardinality not supported for this field kind")]
    Cardinality,
    #[error("sub-record index space exhausted")]
    TooManySubRecords,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a [`DispatchTable`] field by field.
pub struct TableBuilder {
    size: u32,
    submsgs: Vec<Submsg>,
    slots: [Option<Slot>; 32],
}

impl TableBuilder {
    /// Start a layout for a record of `record_size` bytes.  The size is
    /// rounded up to 8 and holds at least the presence word.
    pub fn new(record_size: u32) -> Self {
        let size = record_size.max(8).div_ceil(8) * 8;
        TableBuilder {
            size,
            submsgs: Vec::new(),
            slots: [None; 32],
        }
    }

    /// Add a numeric field.
    pub fn scalar(
        &mut self,
        num: u32,
        kind: FieldKind,
        card: Cardinality,
        offset: u16,
    ) -> Result<&mut Self, LayoutError> {
        let width = match card {
            Cardinality::Repeated | Cardinality::Packed => 8,
            _ => match kind {
                FieldKind::Bool => 1,
                FieldKind::Varint32 | FieldKind::Zigzag32 | FieldKind::Fixed32 => 4,
                _ => 8,
            },
        };
        let wt = match (kind, card) {
            (_, Cardinality::Packed) => wiretype::LEN,
            (FieldKind::Fixed32, _) => wiretype::FIXED32,
            (FieldKind::Fixed64, _) => wiretype::FIXED64,
            _ => wiretype::VARINT,
        };
        let (tag, tagbytes) = self.check_field(num, wt, card, offset, width)?;
        let parser = scalar_parser(kind, &card, tagbytes);
        self.install(num, parser, pack_data(tag, 0, card, offset))
    }

    /// Add a string/bytes field.  `Packed` is not a string cardinality.
    pub fn string(
        &mut self,
        num: u32,
        card: Cardinality,
        offset: u16,
    ) -> Result<&mut Self, LayoutError> {
        if matches!(card, Cardinality::Packed) {
            return Err(LayoutError::Cardinality);
        }
        let width = match card {
            Cardinality::Repeated => 8,
            _ => core::mem::size_of::<crate::StringView>() as u16,
        };
        let (tag, tagbytes) = self.check_field(num, wiretype::LEN, card, offset, width)?;
        let parser = string_parser(&card, tagbytes);
        self.install(num, parser, pack_data(tag, 0, card, offset))
    }

    /// Add a sub-record field decoded with `sub`'s layout.
    pub fn message(
        &mut self,
        num: u32,
        card: Cardinality,
        offset: u16,
        sub: Submsg,
    ) -> Result<&mut Self, LayoutError> {
        if matches!(card, Cardinality::Packed) {
            return Err(LayoutError::Cardinality);
        }
        if self.submsgs.len() >= 256 {
            return Err(LayoutError::TooManySubRecords);
        }
        let (tag, tagbytes) = self.check_field(num, wiretype::LEN, card, offset, 8)?;
        // A recursive child's size is unknowable mid-construction; it gets
        // the unbounded ceiling.
        let ceiling = match &sub {
            Submsg::Table(t) => pick_ceiling(t.size),
            Submsg::Recursive(_) => 0,
        };
        let submsg_idx = self.submsgs.len() as u8;
        self.submsgs.push(sub);
        let parser = message_parser(&card, tagbytes, ceiling);
        self.install(num, parser, pack_data(tag, submsg_idx, card, offset))
    }

    /// Finish the table.  Unclaimed slots route to the generic fallback.
    pub fn build(self) -> DispatchTable {
        let mut fasttable = [UNUSED_SLOT; 32];
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(s) = slot {
                fasttable[i] = *s;
            }
        }
        DispatchTable {
            size: self.size,
            submsgs: self.submsgs,
            fasttable,
        }
    }

    fn check_field(
        &self,
        num: u32,
        wt: u32,
        card: Cardinality,
        offset: u16,
        width: u16,
    ) -> Result<(u16, usize), LayoutError> {
        if num == 0 || num > MAX_FAST_FIELD {
            return Err(LayoutError::FieldNumber(num));
        }
        if offset < 4 || offset as u32 + width as u32 > self.size {
            return Err(LayoutError::Offset(offset));
        }
        match card {
            Cardinality::Singular { hasbit } if hasbit >= 32 => {
                return Err(LayoutError::PresenceBit(hasbit));
            }
            Cardinality::Oneof { case_offset }
                if case_offset < 4 || case_offset as u32 + 4 > self.size =>
            {
                return Err(LayoutError::Offset(case_offset));
            }
            _ => {}
        }
        Ok(encode_tag(num, wt))
    }

    fn install(
        &mut self,
        num: u32,
        parser: FieldParser,
        data: u64,
    ) -> Result<&mut Self, LayoutError> {
        let idx = num as usize;
        if self.slots[idx].is_some() {
            return Err(LayoutError::SlotTaken(num));
        }
        self.slots[idx] = Some(Slot { parser, data });
        Ok(self)
    }
}

/// Pack the non-tag `field_data` bits for a field.
fn pack_data(tag: u16, submsg_idx: u8, card: Cardinality, offset: u16) -> u64 {
    let mut data = tag as u64 | ((submsg_idx as u64) << 16) | ((offset as u64) << 48);
    match card {
        Cardinality::Singular { hasbit } => data |= (hasbit as u64) << 24,
        Cardinality::Oneof { case_offset } => {
            // The case word receives the field number, recovered from the
            // tag's wiretype-stripped bits.
            let num = decode_field_number(tag);
            data |= (num as u64) << 24 | ((case_offset as u64) << 32);
        }
        _ => {}
    }
    data
}

/// Field number back out of packed tag bytes.
fn decode_field_number(tag: u16) -> u32 {
    let b0 = (tag & 0xFF) as u32;
    let b1 = (tag >> 8) as u32;
    (((b0 & 0x7F) | (b1 << 7)) >> 3) as u32
}

/// Tightest generated ceiling at or above `size`, or 0 for unbounded.
fn pick_ceiling(size: u32) -> usize {
    match size {
        0..=64 => 64,
        65..=128 => 128,
        129..=192 => 192,
        193..=256 => 256,
        _ => 0,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parser selection
// ─────────────────────────────────────────────────────────────────────────────

fn card_index(card: &Cardinality) -> usize {
    match card {
        Cardinality::Singular { .. } => 0,
        Cardinality::Oneof { .. } => 1,
        Cardinality::Repeated => 2,
        Cardinality::Packed => 3,
    }
}

fn scalar_parser(kind: FieldKind, card: &Cardinality, tagbytes: usize) -> FieldParser {
    let two = tagbytes == 2;
    match (kind, card_index(card), two) {
        (FieldKind::Bool, 0, false) => vf::psb1_1bt,
        (FieldKind::Bool, 0, true) => vf::psb1_2bt,
        (FieldKind::Bool, 1, false) => vf::pob1_1bt,
        (FieldKind::Bool, 1, true) => vf::pob1_2bt,
        (FieldKind::Bool, 2, false) => vf::prb1_1bt,
        (FieldKind::Bool, 2, true) => vf::prb1_2bt,
        (FieldKind::Bool, _, false) => vf::ppb1_1bt,
        (FieldKind::Bool, _, true) => vf::ppb1_2bt,

        (FieldKind::Varint32, 0, false) => vf::psv4_1bt,
        (FieldKind::Varint32, 0, true) => vf::psv4_2bt,
        (FieldKind::Varint32, 1, false) => vf::pov4_1bt,
        (FieldKind::Varint32, 1, true) => vf::pov4_2bt,
        (FieldKind::Varint32, 2, false) => vf::prv4_1bt,
        (FieldKind::Varint32, 2, true) => vf::prv4_2bt,
        (FieldKind::Varint32, _, false) => vf::ppv4_1bt,
        (FieldKind::Varint32, _, true) => vf::ppv4_2bt,

        (FieldKind::Varint64, 0, false) => vf::psv8_1bt,
        (FieldKind::Varint64, 0, true) => vf::psv8_2bt,
        (FieldKind::Varint64, 1, false) => vf::pov8_1bt,
        (FieldKind::Varint64, 1, true) => vf::pov8_2bt,
        (FieldKind::Varint64, 2, false) => vf::prv8_1bt,
        (FieldKind::Varint64, 2, true) => vf::prv8_2bt,
        (FieldKind::Varint64, _, false) => vf::ppv8_1bt,
        (FieldKind::Varint64, _, true) => vf::ppv8_2bt,

        (FieldKind::Zigzag32, 0, false) => vf::psz4_1bt,
        (FieldKind::Zigzag32, 0, true) => vf::psz4_2bt,
        (FieldKind::Zigzag32, 1, false) => vf::poz4_1bt,
        (FieldKind::Zigzag32, 1, true) => vf::poz4_2bt,
        (FieldKind::Zigzag32, 2, false) => vf::prz4_1bt,
        (FieldKind::Zigzag32, 2, true) => vf::prz4_2bt,
        (FieldKind::Zigzag32, _, false) => vf::ppz4_1bt,
        (FieldKind::Zigzag32, _, true) => vf::ppz4_2bt,

        (FieldKind::Zigzag64, 0, false) => vf::psz8_1bt,
        (FieldKind::Zigzag64, 0, true) => vf::psz8_2bt,
        (FieldKind::Zigzag64, 1, false) => vf::poz8_1bt,
        (FieldKind::Zigzag64, 1, true) => vf::poz8_2bt,
        (FieldKind::Zigzag64, 2, false) => vf::prz8_1bt,
        (FieldKind::Zigzag64, 2, true) => vf::prz8_2bt,
        (FieldKind::Zigzag64, _, false) => vf::ppz8_1bt,
        (FieldKind::Zigzag64, _, true) => vf::ppz8_2bt,

        (FieldKind::Fixed32, 0, false) => ff::psf4_1bt,
        (FieldKind::Fixed32, 0, true) => ff::psf4_2bt,
        (FieldKind::Fixed32, 1, false) => ff::pof4_1bt,
        (FieldKind::Fixed32, 1, true) => ff::pof4_2bt,
        (FieldKind::Fixed32, 2, false) => ff::prf4_1bt,
        (FieldKind::Fixed32, 2, true) => ff::prf4_2bt,
        (FieldKind::Fixed32, _, false) => ff::ppf4_1bt,
        (FieldKind::Fixed32, _, true) => ff::ppf4_2bt,

        (FieldKind::Fixed64, 0, false) => ff::psf8_1bt,
        (FieldKind::Fixed64, 0, true) => ff::psf8_2bt,
        (FieldKind::Fixed64, 1, false) => ff::pof8_1bt,
        (FieldKind::Fixed64, 1, true) => ff::pof8_2bt,
        (FieldKind::Fixed64, 2, false) => ff::prf8_1bt,
        (FieldKind::Fixed64, 2, true) => ff::prf8_2bt,
        (FieldKind::Fixed64, _, false) => ff::ppf8_1bt,
        (FieldKind::Fixed64, _, true) => ff::ppf8_2bt,
    }
}

fn string_parser(card: &Cardinality, tagbytes: usize) -> FieldParser {
    // The alias-capable family is installed unconditionally; it degrades to
    // the copy family at run time whenever the state says the buffer is not
    // stable.
    match (card_index(card), tagbytes == 2) {
        (0, false) => sf::pss_1bt,
        (0, true) => sf::pss_2bt,
        (1, false) => sf::pos_1bt,
        (1, true) => sf::pos_2bt,
        (_, false) => sf::prs_1bt,
        (_, true) => sf::prs_2bt,
    }
}

fn message_parser(card: &Cardinality, tagbytes: usize, ceiling: usize) -> FieldParser {
    match (card_index(card), tagbytes == 2, ceiling) {
        (0, false, 64) => mf::psm_1bt_max64b,
        (0, false, 128) => mf::psm_1bt_max128b,
        (0, false, 192) => mf::psm_1bt_max192b,
        (0, false, 256) => mf::psm_1bt_max256b,
        (0, false, _) => mf::psm_1bt_maxmaxb,
        (0, true, 64) => mf::psm_2bt_max64b,
        (0, true, 128) => mf::psm_2bt_max128b,
        (0, true, 192) => mf::psm_2bt_max192b,
        (0, true, 256) => mf::psm_2bt_max256b,
        (0, true, _) => mf::psm_2bt_maxmaxb,
        (1, false, 64) => mf::pom_1bt_max64b,
        (1, false, 128) => mf::pom_1bt_max128b,
        (1, false, 192) => mf::pom_1bt_max192b,
        (1, false, 256) => mf::pom_1bt_max256b,
        (1, false, _) => mf::pom_1bt_maxmaxb,
        (1, true, 64) => mf::pom_2bt_max64b,
        (1, true, 128) => mf::pom_2bt_max128b,
        (1, true, 192) => mf::pom_2bt_max192b,
        (1, true, 256) => mf::pom_2bt_max256b,
        (1, true, _) => mf::pom_2bt_maxmaxb,
        (_, false, 64) => mf::prm_1bt_max64b,
        (_, false, 128) => mf::prm_1bt_max128b,
        (_, false, 192) => mf::prm_1bt_max192b,
        (_, false, 256) => mf::prm_1bt_max256b,
        (_, false, _) => mf::prm_1bt_maxmaxb,
        (_, true, 64) => mf::prm_2bt_max64b,
        (_, true, 128) => mf::prm_2bt_max128b,
        (_, true, 192) => mf::prm_2bt_max192b,
        (_, true, 256) => mf::prm_2bt_max256b,
        (_, true, _) => mf::prm_2bt_maxmaxb,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_data_bit_allocation() {
        let mut b = TableBuilder::new(32);
        b.scalar(
            3,
            FieldKind::Varint32,
            Cardinality::Singular { hasbit: 5 },
            16,
        )
        .unwrap();
        let table = b.build();
        let slot = table.fasttable[3];
        let (tag, _) = encode_tag(3, wiretype::VARINT);
        assert_eq!(slot.data & 0xFFFF, tag as u64);
        assert_eq!((slot.data >> 24) & 0xFF, 5);
        assert_eq!(slot.data >> 48, 16);
    }

    #[test]
    fn oneof_packs_number_and_case_offset() {
        let mut b = TableBuilder::new(32);
        b.scalar(
            17,
            FieldKind::Fixed64,
            Cardinality::Oneof { case_offset: 4 },
            8,
        )
        .unwrap();
        let table = b.build();
        let slot = table.fasttable[17];
        assert_eq!((slot.data >> 24) & 0xFF, 17);
        assert_eq!((slot.data >> 32) & 0xFFFF, 4);
        assert_eq!(slot.data >> 48, 8);
    }

    #[test]
    fn rejects_out_of_range_descriptions() {
        let mut b = TableBuilder::new(16);
        assert_eq!(
            b.scalar(32, FieldKind::Bool, Cardinality::Repeated, 8).err(),
            Some(LayoutError::FieldNumber(32))
        );
        assert_eq!(
            b.scalar(1, FieldKind::Bool, Cardinality::Singular { hasbit: 32 }, 8)
                .err(),
            Some(LayoutError::PresenceBit(32))
        );
        assert_eq!(
            b.scalar(1, FieldKind::Fixed64, Cardinality::Singular { hasbit: 0 }, 12)
                .err(),
            Some(LayoutError::Offset(12))
        );
        assert!(b
            .scalar(2, FieldKind::Bool, Cardinality::Singular { hasbit: 0 }, 8)
            .is_ok());
        assert_eq!(
            b.scalar(2, FieldKind::Bool, Cardinality::Singular { hasbit: 1 }, 9)
                .err(),
            Some(LayoutError::SlotTaken(2))
        );
    }

    #[test]
    fn record_size_is_rounded() {
        let b = TableBuilder::new(13);
        assert_eq!(b.build().size, 16);
        assert_eq!(TableBuilder::new(0).build().size, 8);
    }

    #[test]
    fn ceilings_pick_tightest_bound() {
        assert_eq!(pick_ceiling(8), 64);
        assert_eq!(pick_ceiling(64), 64);
        assert_eq!(pick_ceiling(65), 128);
        assert_eq!(pick_ceiling(200), 256);
        assert_eq!(pick_ceiling(512), 0);
    }

    #[test]
    fn field_number_recovered_from_two_byte_tag() {
        for num in [1u32, 15, 16, 31] {
            let (tag, _) = encode_tag(num, wiretype::LEN);
            assert_eq!(decode_field_number(tag), num);
        }
    }
}
