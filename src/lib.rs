//! fastwire — tag-dispatched fast-path decoder for length-prefixed binary
//! wire formats.
//!
//! Records are decoded one field at a time through a 32-slot jump table of
//! specialised parsers (one per cardinality × value type × tag length),
//! writing into preallocated, arena-backed message records.  Runs of the
//! same repeated field are fused into a single dispatch; length-delimited
//! sub-records nest through a per-level byte limit that survives the
//! working buffer being re-anchored underneath; strings are zero-copy when
//! the caller promises the input outlives the message.
//!
//! ```
//! use fastwire::{decode, Arena, Cardinality, DecodeOptions, FieldKind, TableBuilder};
//!
//! // Layout: field 1 is a singular 32-bit varint stored at offset 8.
//! let mut builder = TableBuilder::new(16);
//! builder
//!     .scalar(1, FieldKind::Varint32, Cardinality::Singular { hasbit: 0 }, 8)
//!     .unwrap();
//! let table = builder.build();
//!
//! let arena = Arena::new();
//! let input = [0x08, 0x96, 0x01]; // field 1 = 150
//! let msg = decode(&input, &table, &arena, DecodeOptions::default()).unwrap();
//! assert!(msg.has(0));
//! assert_eq!(unsafe { msg.get::<u32>(8) }, 150);
//! ```

pub mod arena;
pub mod decode;
pub mod layout;
pub mod wire;

pub use arena::Arena;
pub use decode::{decode, DecodeError, DecodeOptions, Message, RepArray, DEFAULT_DEPTH_LIMIT};
pub use layout::{Cardinality, DispatchTable, FieldKind, LayoutError, Submsg, TableBuilder};
pub use wire::types::StringView;
