//! Atomic fuzzable primitives.
//!
//! A tagged enum over the finite set of built-in kinds, plus one
//! `Custom` variant carrying a capability record (a boxed trait object)
//! for user-defined primitives — an open-ended escape hatch without a
//! deep trait-object hierarchy for the common cases.

pub mod library;

use crate::keyed_store::KeyedStore;
use std::fmt;
use std::rc::Rc;

/// Per-primitive render context. Atomic primitives only ever need the
/// keyed store (for `PreElement`); compound nodes need more (sibling
/// renders) and are handled directly by `crate::block`, not through this
/// trait.
pub struct PrimitiveCtx<'a> {
    pub store: &'a KeyedStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// A finite-cardinality fuzzable primitive. `FuzzableBytes`,
/// `FuzzableInt`, and `FuzzableString` share the library/index/fuzzable
/// shape; `Group`, `Callback`, and `PreElement` are the optional
/// extensions layered on top of it.
pub enum Primitive {
    /// A non-fuzzable constant. Contributes zero mutations.
    Static { name: Option<String>, value: Vec<u8> },

    /// A byte-string primitive with an explicit mutation library.
    FuzzableBytes {
        name: Option<String>,
        default: Vec<u8>,
        library: Vec<Vec<u8>>,
        index: usize,
        fuzzable: bool,
    },

    /// A fixed-width integer primitive; the library holds raw integer
    /// values, rendered in the configured width/endianness at render
    /// time (so the same library works regardless of width).
    FuzzableInt {
        name: Option<String>,
        default: i64,
        width: u8,
        endian: Endian,
        signed: bool,
        library: Vec<i64>,
        index: usize,
        fuzzable: bool,
    },

    /// A length- or encoding-delimited string primitive.
    FuzzableString {
        name: Option<String>,
        default: String,
        library: Vec<String>,
        index: usize,
        fuzzable: bool,
    },

    /// A gating primitive: its current value selects which sibling
    /// `Block`s are enabled. Mutation cycles through `values` the same
    /// way any other fuzzable primitive does.
    Group {
        name: Option<String>,
        values: Vec<Vec<u8>>,
        index: usize,
        fuzzable: bool,
    },

    /// Fuzzable = false, renders to nothing; the hook runs when the
    /// containing node is sent. Kept distinct from the node-level
    /// on-receive callback, which runs after a response arrives rather
    /// than at render time.
    Callback {
        name: Option<String>,
        #[allow(clippy::type_complexity)]
        on_send: Rc<dyn Fn(&mut KeyedStore)>,
    },

    /// Renders by looking up `key` in the session's keyed store,
    /// formatting as `key:value\n` by default or via `formatter` if one
    /// was supplied, matching the default format in
    /// `original_source/boofuzz/primitives/pre_element.py`. A missing
    /// key renders empty bytes rather than panicking.
    PreElement {
        name: Option<String>,
        key: String,
        #[allow(clippy::type_complexity)]
        formatter: Option<Rc<dyn Fn(&str, Option<&[u8]>) -> Vec<u8>>>,
    },

    /// User-defined primitive, see `CustomPrimitiveState`.
    Custom {
        name: Option<String>,
        state: Box<dyn CustomPrimitiveState>,
    },
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Static { name, value } => {
                f.debug_struct("Static").field("name", name).field("value", value).finish()
            }
            Primitive::FuzzableBytes { name, default, library, index, fuzzable } => f
                .debug_struct("FuzzableBytes")
                .field("name", name)
                .field("default", default)
                .field("library", library)
                .field("index", index)
                .field("fuzzable", fuzzable)
                .finish(),
            Primitive::FuzzableInt { name, default, width, endian, signed, library, index, fuzzable } => f
                .debug_struct("FuzzableInt")
                .field("name", name)
                .field("default", default)
                .field("width", width)
                .field("endian", endian)
                .field("signed", signed)
                .field("library", library)
                .field("index", index)
                .field("fuzzable", fuzzable)
                .finish(),
            Primitive::FuzzableString { name, default, library, index, fuzzable } => f
                .debug_struct("FuzzableString")
                .field("name", name)
                .field("default", default)
                .field("library", library)
                .field("index", index)
                .field("fuzzable", fuzzable)
                .finish(),
            Primitive::Group { name, values, index, fuzzable } => f
                .debug_struct("Group")
                .field("name", name)
                .field("values", values)
                .field("index", index)
                .field("fuzzable", fuzzable)
                .finish(),
            Primitive::Callback { name, .. } => f.debug_struct("Callback").field("name", name).finish(),
            Primitive::PreElement { name, key, .. } => {
                f.debug_struct("PreElement").field("name", name).field("key", key).finish()
            }
            Primitive::Custom { name, state } => {
                f.debug_struct("Custom").field("name", name).field("state", state).finish()
            }
        }
    }
}

/// Boxed, mutable state for a `Custom` primitive. Kept as a plain trait
/// object rather than requiring `Clone` so implementers can hold
/// non-`Clone` state such as an `Rc<RefCell<_>>`.
pub trait CustomPrimitiveState: fmt::Debug {
    fn render(&self, ctx: &PrimitiveCtx<'_>) -> Vec<u8>;
    fn mutate(&mut self) -> bool;
    fn reset(&mut self);
    fn num_mutations(&self) -> usize;
    fn original_value(&self) -> Vec<u8>;
}

impl Primitive {
    pub fn name(&self) -> Option<&str> {
        match self {
            Primitive::Static { name, .. }
            | Primitive::FuzzableBytes { name, .. }
            | Primitive::FuzzableInt { name, .. }
            | Primitive::FuzzableString { name, .. }
            | Primitive::Group { name, .. }
            | Primitive::Callback { name, .. }
            | Primitive::PreElement { name, .. }
            | Primitive::Custom { name, .. } => name.as_deref(),
        }
    }

    pub fn mutant_index(&self) -> usize {
        match self {
            Primitive::FuzzableBytes { index, .. }
            | Primitive::FuzzableInt { index, .. }
            | Primitive::FuzzableString { index, .. }
            | Primitive::Group { index, .. } => *index,
            _ => 0,
        }
    }

    pub fn original_value(&self) -> Vec<u8> {
        match self {
            Primitive::Static { value, .. } => value.clone(),
            Primitive::FuzzableBytes { default, .. } => default.clone(),
            Primitive::FuzzableInt {
                default, width, endian, ..
            } => encode_int(*default, *width, *endian),
            Primitive::FuzzableString { default, .. } => default.clone().into_bytes(),
            Primitive::Group { values, .. } => values.first().cloned().unwrap_or_default(),
            Primitive::Callback { .. } => Vec::new(),
            Primitive::PreElement { .. } => Vec::new(),
            Primitive::Custom { state, .. } => state.original_value(),
        }
    }

    /// Size of the fuzz library when fuzzable, else zero: a non-fuzzable
    /// primitive's library is treated as empty.
    pub fn num_mutations(&self) -> usize {
        match self {
            Primitive::Static { .. } | Primitive::Callback { .. } | Primitive::PreElement { .. } => 0,
            Primitive::FuzzableBytes { library, fuzzable, .. } => {
                if *fuzzable {
                    library.len()
                } else {
                    0
                }
            }
            Primitive::FuzzableInt { library, fuzzable, .. } => {
                if *fuzzable {
                    library.len()
                } else {
                    0
                }
            }
            Primitive::FuzzableString { library, fuzzable, .. } => {
                if *fuzzable {
                    library.len()
                } else {
                    0
                }
            }
            Primitive::Group { values, fuzzable, .. } => {
                if *fuzzable {
                    values.len().saturating_sub(1)
                } else {
                    0
                }
            }
            Primitive::Custom { state, .. } => state.num_mutations(),
        }
    }

    pub fn render(&self, ctx: &PrimitiveCtx<'_>) -> Vec<u8> {
        match self {
            Primitive::Static { value, .. } => value.clone(),
            Primitive::FuzzableBytes {
                default, library, index, fuzzable, ..
            } => {
                if *fuzzable && *index > 0 {
                    library[*index - 1].clone()
                } else {
                    default.clone()
                }
            }
            Primitive::FuzzableInt {
                default,
                width,
                endian,
                library,
                index,
                fuzzable,
                ..
            } => {
                let value = if *fuzzable && *index > 0 {
                    library[*index - 1]
                } else {
                    *default
                };
                encode_int(value, *width, *endian)
            }
            Primitive::FuzzableString {
                default, library, index, fuzzable, ..
            } => {
                if *fuzzable && *index > 0 {
                    library[*index - 1].clone().into_bytes()
                } else {
                    default.clone().into_bytes()
                }
            }
            Primitive::Group {
                values, index, fuzzable, ..
            } => {
                if *fuzzable && *index > 0 {
                    values.get(*index).cloned().unwrap_or_default()
                } else {
                    values.first().cloned().unwrap_or_default()
                }
            }
            Primitive::Callback { .. } => Vec::new(),
            Primitive::PreElement { key, formatter, .. } => {
                let value = ctx.store.get(key);
                match formatter {
                    Some(f) => f(key, value),
                    None => match value {
                        Some(v) => {
                            let mut out = Vec::with_capacity(key.len() + v.len() + 2);
                            out.extend_from_slice(key.as_bytes());
                            out.push(b':');
                            out.extend_from_slice(v);
                            out.push(b'\n');
                            out
                        }
                        None => Vec::new(),
                    },
                }
            }
            Primitive::Custom { state, .. } => state.render(ctx),
        }
    }

    /// Returns the byte rendering of the value this primitive's current
    /// `Group` gate selects, used by `Block::is_enabled`.
    pub fn current_group_value(&self) -> Option<&[u8]> {
        match self {
            Primitive::Group {
                values, index, fuzzable, ..
            } => {
                if *fuzzable && *index > 0 {
                    values.get(*index).map(Vec::as_slice)
                } else {
                    values.first().map(Vec::as_slice)
                }
            }
            _ => None,
        }
    }

    /// Advance to the next mutation. Returns `true` if a new mutation
    /// state was produced; resets to default and returns `false` once
    /// exhausted.
    pub fn mutate(&mut self) -> bool {
        match self {
            Primitive::Static { .. } | Primitive::Callback { .. } | Primitive::PreElement { .. } => false,
            Primitive::FuzzableBytes {
                library, index, fuzzable, ..
            } => advance_index(index, library.len(), *fuzzable),
            Primitive::FuzzableInt {
                library, index, fuzzable, ..
            } => advance_index(index, library.len(), *fuzzable),
            Primitive::FuzzableString {
                library, index, fuzzable, ..
            } => advance_index(index, library.len(), *fuzzable),
            Primitive::Group {
                values, index, fuzzable, ..
            } => advance_index(index, values.len().saturating_sub(1), *fuzzable),
            Primitive::Custom { state, .. } => state.mutate(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Primitive::Static { .. } | Primitive::Callback { .. } | Primitive::PreElement { .. } => {}
            Primitive::FuzzableBytes { index, .. }
            | Primitive::FuzzableInt { index, .. }
            | Primitive::FuzzableString { index, .. }
            | Primitive::Group { index, .. } => *index = 0,
            Primitive::Custom { state, .. } => state.reset(),
        }
    }

    /// Is this primitive a `Group` gate? Used by the crash-threshold
    /// exhaustion rule, which treats repeats and groups differently from
    /// ordinary fuzzable primitives.
    pub fn is_group(&self) -> bool {
        matches!(self, Primitive::Group { .. })
    }
}

fn advance_index(index: &mut usize, library_len: usize, fuzzable: bool) -> bool {
    if !fuzzable || library_len == 0 {
        *index = 0;
        return false;
    }
    if *index < library_len {
        *index += 1;
        true
    } else {
        *index = 0;
        false
    }
}

/// Exposed to `crate::request` so `Size` elements can encode their
/// computed length with the same width/endianness rules as
/// `FuzzableInt` primitives.
pub(crate) fn encode_int(value: i64, width: u8, endian: Endian) -> Vec<u8> {
    let bytes = value.to_le_bytes();
    let mut out: Vec<u8> = bytes[..width as usize].to_vec();
    if matches!(endian, Endian::Big) {
        out.reverse();
    }
    out
}
