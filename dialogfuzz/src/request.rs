//! The compound element tree: `Request`, `Block`, `Size`, `Checksum`, and
//! `Repeat`.
//!
//! Names are resolved once at `Request` construction into direct
//! indices: the tree is a flat arena (`Vec<ElementSlot>`) rather than a
//! pointer-linked structure, so every forward/backward reference a
//! `Size` or `Checksum` makes to a sibling is resolved to an arena index
//! once, at build time, so rendering never does name lookups and a typo'd
//! target name is a construction-time error instead of a silent empty
//! render. The shape mirrors a slab-style arena with dense integer keys,
//! as used elsewhere for pools of interlinked values.

use crate::error::{FuzzError, FuzzResult};
use crate::keyed_store::KeyedStore;
use crate::primitive::{Endian, Primitive, PrimitiveCtx};
use ahash::AHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgo {
    Crc32,
    Md5,
    Sha1,
}

impl ChecksumAlgo {
    fn width(self) -> usize {
        match self {
            ChecksumAlgo::Crc32 => 4,
            ChecksumAlgo::Md5 => 16,
            ChecksumAlgo::Sha1 => 20,
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            ChecksumAlgo::Crc32 => crc32fast::hash(data).to_be_bytes().to_vec(),
            ChecksumAlgo::Md5 => md5::compute(data).0.to_vec(),
            ChecksumAlgo::Sha1 => {
                use sha1::{Digest, Sha1};
                let mut hasher = Sha1::new();
                hasher.update(data);
                hasher.finalize().to_vec()
            }
        }
    }
}

/// Arena slot. Children/targets are stored as indices into the owning
/// `Request`'s arena.
#[derive(Debug)]
pub enum ElementSlot {
    Leaf(Primitive),

    /// A named grouping of children, optionally only rendered when a
    /// sibling `Group` primitive's current value matches `enable_when`.
    Block {
        name: Option<String>,
        children: Vec<usize>,
        enable_when: Option<(usize, Vec<u8>)>,
    },

    /// Renders as the byte length of `target`'s rendered bytes, in the
    /// given width/endianness. `inclusive` means the Size element's own
    /// width counts toward the measured length.
    Size {
        name: Option<String>,
        target: usize,
        width: u8,
        endian: Endian,
        inclusive: bool,
        fuzzable: bool,
        /// additive offsets applied to the true length, library of the
        /// "corrupt the length field" mutations.
        library: Vec<i64>,
        index: usize,
    },

    /// Renders as the digest of `target`'s rendered bytes.
    Checksum {
        name: Option<String>,
        target: usize,
        algo: ChecksumAlgo,
        fuzzable: bool,
        /// library of whole corrupted digests, index 0 unused (default
        /// is always "compute the real digest").
        library: Vec<Vec<u8>>,
        index: usize,
    },

    /// Renders `child` zero or more times. `fixed` pins the repeat count
    /// (not fuzzable); otherwise `k_values` is the mutation library of
    /// repeat counts and `cursor` the current position (0 = default
    /// count, the child's own natural one-shot render).
    Repeat {
        name: Option<String>,
        child: usize,
        default_count: usize,
        k_values: Vec<usize>,
        cursor: usize,
        fixed: bool,
    },
}

impl ElementSlot {
    fn name(&self) -> Option<&str> {
        match self {
            ElementSlot::Leaf(p) => p.name(),
            ElementSlot::Block { name, .. }
            | ElementSlot::Size { name, .. }
            | ElementSlot::Checksum { name, .. }
            | ElementSlot::Repeat { name, .. } => name.as_deref(),
        }
    }

    fn num_mutations(&self) -> usize {
        match self {
            ElementSlot::Leaf(p) => p.num_mutations(),
            ElementSlot::Block { .. } => 0,
            ElementSlot::Size { library, fuzzable, .. } => {
                if *fuzzable {
                    library.len()
                } else {
                    0
                }
            }
            ElementSlot::Checksum { library, fuzzable, .. } => {
                if *fuzzable {
                    library.len()
                } else {
                    0
                }
            }
            ElementSlot::Repeat { k_values, fixed, .. } => {
                if *fixed {
                    0
                } else {
                    k_values.len()
                }
            }
        }
    }

    /// True for `Repeat`/`Group` kinds, which the crash-threshold
    /// exhaustion rule excludes from "exhaust and skip".
    fn is_repeat_or_group(&self) -> bool {
        matches!(self, ElementSlot::Repeat { .. }) || matches!(self, ElementSlot::Leaf(p) if p.is_group())
    }

    fn mutant_index(&self) -> usize {
        match self {
            ElementSlot::Leaf(p) => p.mutant_index(),
            ElementSlot::Block { .. } => 0,
            ElementSlot::Size { index, .. } | ElementSlot::Checksum { index, .. } => *index,
            ElementSlot::Repeat { cursor, .. } => *cursor,
        }
    }

    fn mutate(&mut self) -> bool {
        match self {
            ElementSlot::Leaf(p) => p.mutate(),
            ElementSlot::Block { .. } => false,
            ElementSlot::Size { library, index, fuzzable, .. } => {
                advance(index, library.len(), *fuzzable)
            }
            ElementSlot::Checksum { library, index, fuzzable, .. } => {
                advance(index, library.len(), *fuzzable)
            }
            ElementSlot::Repeat { k_values, cursor, fixed, .. } => {
                advance(cursor, k_values.len(), !*fixed)
            }
        }
    }

    fn reset(&mut self) {
        match self {
            ElementSlot::Leaf(p) => p.reset(),
            ElementSlot::Block { .. } => {}
            ElementSlot::Size { index, .. } | ElementSlot::Checksum { index, .. } => *index = 0,
            ElementSlot::Repeat { cursor, .. } => *cursor = 0,
        }
    }
}

fn advance(index: &mut usize, library_len: usize, fuzzable: bool) -> bool {
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

/// User-facing tree description, consumed by [`Request::build`]. Targets
/// for `Size`/`Checksum` are given by name and resolved once at build
/// time.
pub enum ElementSpec {
    Leaf(Primitive),
    Block {
        name: Option<String>,
        children: Vec<ElementSpec>,
        enable_when: Option<(String, Vec<u8>)>,
    },
    Size {
        name: Option<String>,
        target: String,
        width: u8,
        endian: Endian,
        inclusive: bool,
        fuzzable: bool,
        library: Vec<i64>,
    },
    Checksum {
        name: Option<String>,
        target: String,
        algo: ChecksumAlgo,
        fuzzable: bool,
        library: Vec<Vec<u8>>,
    },
    Repeat {
        name: Option<String>,
        child: Box<ElementSpec>,
        default_count: usize,
        k_values: Vec<usize>,
        fixed: bool,
    },
}

impl ElementSpec {
    /// A fuzzable byte string seeded with `crate::primitive::library::bytes_library`,
    /// sized off `default`'s own length.
    pub fn fuzzable_bytes(name: impl Into<String>, default: Vec<u8>) -> Self {
        let library = crate::primitive::library::bytes_library(default.len());
        ElementSpec::Leaf(Primitive::FuzzableBytes {
            name: Some(name.into()),
            default,
            library,
            index: 0,
            fuzzable: true,
        })
    }

    /// A fuzzable fixed-width integer seeded with
    /// `crate::primitive::library::int_library` for the given width/signedness.
    pub fn fuzzable_int(name: impl Into<String>, default: i64, width: u8, endian: Endian, signed: bool) -> Self {
        ElementSpec::Leaf(Primitive::FuzzableInt {
            name: Some(name.into()),
            default,
            width,
            endian,
            signed,
            library: crate::primitive::library::int_library(width, signed),
            index: 0,
            fuzzable: true,
        })
    }

    /// A fuzzable string seeded with `crate::primitive::library::string_library`.
    pub fn fuzzable_string(name: impl Into<String>, default: impl Into<String>) -> Self {
        ElementSpec::Leaf(Primitive::FuzzableString {
            name: Some(name.into()),
            default: default.into(),
            library: crate::primitive::library::string_library(),
            index: 0,
            fuzzable: true,
        })
    }
}

/// A request: the graph node payload. Owns a flat arena of elements, a
/// name index, the list of fuzzable descendants in tree order, and the
/// mutation cursor into that list.
#[derive(Debug)]
pub struct Request {
    pub name: String,
    pub id: Option<u64>,
    arena: Vec<ElementSlot>,
    roots: Vec<usize>,
    by_name: AHashMap<String, usize>,
    /// Fuzzable descendants in tree (construction) order — the order the
    /// mutation cursor walks.
    fuzzable: Vec<usize>,
    /// Position in `fuzzable` of the element currently mutating. `None`
    /// means "all defaults".
    cursor: Option<usize>,
}

impl Request {
    pub fn build(name: impl Into<String>, children: Vec<ElementSpec>) -> FuzzResult<Self> {
        let mut arena = Vec::new();
        let mut by_name = AHashMap::new();
        // (arena_index, target_name, is_checksum) deferred resolutions
        let mut pending_size: Vec<(usize, String)> = Vec::new();
        let mut pending_checksum: Vec<(usize, String)> = Vec::new();
        let mut pending_enable: Vec<(usize, String)> = Vec::new();

        let roots = children
            .into_iter()
            .map(|c| insert(c, &mut arena, &mut by_name, &mut pending_size, &mut pending_checksum, &mut pending_enable))
            .collect::<Vec<_>>();

        for (idx, target_name) in pending_size {
            let target = *by_name
                .get(&target_name)
                .ok_or_else(|| FuzzError::Configuration(format!("size element refers to unknown target '{target_name}'")))?;
            if let ElementSlot::Size { target: t, .. } = &mut arena[idx] {
                *t = target;
            }
        }
        for (idx, target_name) in pending_checksum {
            let target = *by_name
                .get(&target_name)
                .ok_or_else(|| FuzzError::Configuration(format!("checksum element refers to unknown target '{target_name}'")))?;
            if let ElementSlot::Checksum { target: t, .. } = &mut arena[idx] {
                *t = target;
            }
        }
        for (idx, gate_name) in pending_enable {
            let gate = *by_name
                .get(&gate_name)
                .ok_or_else(|| FuzzError::Configuration(format!("block refers to unknown group '{gate_name}'")))?;
            if let ElementSlot::Block { enable_when: Some((g, _)), .. } = &mut arena[idx] {
                *g = gate;
            }
        }

        let fuzzable: Vec<usize> = (0..arena.len()).filter(|i| arena[*i].num_mutations() > 0).collect();

        Ok(Self {
            name: name.into(),
            id: None,
            arena,
            roots,
            by_name,
            fuzzable,
            cursor: None,
        })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Sum over fuzzable descendants of their library sizes.
    pub fn total_num_mutations(&self) -> u64 {
        self.fuzzable.iter().map(|i| self.arena[*i].num_mutations() as u64).sum()
    }

    /// Offset of the currently-mutating element within `total_num_mutations`,
    /// i.e. how many cases precede the current one (0 = all-defaults).
    pub fn mutant_index(&self) -> u64 {
        let Some(cursor) = self.cursor else { return 0 };
        let preceding: u64 = self.fuzzable[..cursor]
            .iter()
            .map(|i| self.arena[*i].num_mutations() as u64)
            .sum();
        preceding + self.arena[self.fuzzable[cursor]].mutant_index() as u64
    }

    /// Advance the mutation cursor by one case. Returns `false` (and
    /// resets every element to its default) once the full descendant
    /// list has been exhausted, matching `Primitive::mutate`'s contract
    /// at the request level.
    pub fn mutate(&mut self) -> bool {
        if self.fuzzable.is_empty() {
            return false;
        }
        let mut cursor = self.cursor.unwrap_or(0);
        loop {
            if cursor >= self.fuzzable.len() {
                self.cursor = None;
                return false;
            }
            let idx = self.fuzzable[cursor];
            if self.arena[idx].mutate() {
                self.cursor = Some(cursor);
                return true;
            }
            // exhausted this descendant, move to the next one
            cursor += 1;
        }
    }

    pub fn reset(&mut self) {
        for slot in &mut self.arena {
            slot.reset();
        }
        self.cursor = None;
    }

    /// Name of the element currently mutating, if any.
    pub fn current_mutant_name(&self) -> Option<&str> {
        self.cursor.map(|c| self.arena[self.fuzzable[c]].name()).flatten()
    }

    /// Identity of the descendant currently mutating, stable across its
    /// whole library regardless of which library position it is on —
    /// unlike `mutant_index`, which changes with every case. Used to key
    /// per-primitive crash-failure counters.
    pub fn current_descendant_cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Does the currently-mutating element ignore the crash-threshold
    /// exhaustion shortcut (true for repeats and groups)?
    pub fn current_mutant_is_repeat_or_group(&self) -> bool {
        self.cursor
            .map(|c| self.arena[self.fuzzable[c]].is_repeat_or_group())
            .unwrap_or(false)
    }

    /// Remaining mutation count for the current descendant, used by the
    /// crash-threshold "skip forward by num_mutations - mutant_index"
    /// rule. Returns 0 if nothing is currently mutating.
    pub fn current_mutant_remaining(&self) -> u64 {
        let Some(cursor) = self.cursor else { return 0 };
        let idx = self.fuzzable[cursor];
        let total = self.arena[idx].num_mutations() as u64;
        let at = self.arena[idx].mutant_index() as u64;
        total.saturating_sub(at)
    }

    /// Skip the rest of the current descendant's library and advance the
    /// cursor to the next one, as if it had been mutated to exhaustion.
    pub fn skip_current_to_exhaustion(&mut self) {
        if let Some(cursor) = self.cursor {
            let idx = self.fuzzable[cursor];
            self.arena[idx].reset();
        }
        self.cursor = self.cursor.map(|c| c + 1).or(Some(0));
    }

    pub fn render(&self, store: &KeyedStore) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut ranges: AHashMap<usize, (usize, usize)> = AHashMap::new();
        let mut size_checksum_slots: Vec<usize> = Vec::new();
        let ctx = PrimitiveCtx { store };

        for &root in &self.roots {
            render_node(&self.arena, root, &mut buf, &mut ranges, &mut size_checksum_slots, &ctx);
        }

        for idx in size_checksum_slots {
            let (start, end) = ranges[&idx];
            match &self.arena[idx] {
                ElementSlot::Size {
                    target,
                    width,
                    endian,
                    inclusive,
                    library,
                    index,
                    fuzzable,
                    ..
                } => {
                    let (t_start, t_end) = ranges.get(target).copied().unwrap_or((0, 0));
                    let mut length = (t_end - t_start) as i64;
                    if *inclusive {
                        length += (end - start) as i64;
                    }
                    if *fuzzable && *index > 0 {
                        length += library[*index - 1];
                    }
                    let encoded = crate::primitive::encode_int(length, *width, *endian);
                    buf[start..end].copy_from_slice(&encoded);
                }
                ElementSlot::Checksum {
                    target, algo, library, index, fuzzable, ..
                } => {
                    let (t_start, t_end) = ranges.get(target).copied().unwrap_or((0, 0));
                    let digest = if *fuzzable && *index > 0 {
                        library[*index - 1].clone()
                    } else {
                        algo.digest(&buf[t_start..t_end])
                    };
                    buf[start..end].copy_from_slice(&digest);
                }
                _ => unreachable!("size_checksum_slots only holds Size/Checksum indices"),
            }
        }

        buf
    }
}

fn render_node(
    arena: &[ElementSlot],
    idx: usize,
    buf: &mut Vec<u8>,
    ranges: &mut AHashMap<usize, (usize, usize)>,
    size_checksum_slots: &mut Vec<usize>,
    ctx: &PrimitiveCtx<'_>,
) {
    let start = buf.len();
    match &arena[idx] {
        ElementSlot::Leaf(p) => buf.extend_from_slice(&p.render(ctx)),
        ElementSlot::Block { children, enable_when, .. } => {
            let enabled = match enable_when {
                None => true,
                Some((gate, expected)) => match &arena[*gate] {
                    ElementSlot::Leaf(p) => p.current_group_value() == Some(expected.as_slice()),
                    _ => true,
                },
            };
            if enabled {
                for &child in children {
                    render_node(arena, child, buf, ranges, size_checksum_slots, ctx);
                }
            }
        }
        ElementSlot::Size { width, .. } => {
            buf.extend(std::iter::repeat(0u8).take(*width as usize));
            size_checksum_slots.push(idx);
        }
        ElementSlot::Checksum { algo, .. } => {
            buf.extend(std::iter::repeat(0u8).take(algo.width()));
            size_checksum_slots.push(idx);
        }
        ElementSlot::Repeat {
            child,
            default_count,
            k_values,
            cursor,
            fixed,
            ..
        } => {
            let count = if *fixed || *cursor == 0 {
                *default_count
            } else {
                k_values[*cursor - 1]
            };
            for _ in 0..count {
                render_node(arena, *child, buf, ranges, size_checksum_slots, ctx);
            }
        }
    }
    ranges.insert(idx, (start, buf.len()));
}

#[allow(clippy::too_many_arguments)]
fn insert(
    spec: ElementSpec,
    arena: &mut Vec<ElementSlot>,
    by_name: &mut AHashMap<String, usize>,
    pending_size: &mut Vec<(usize, String)>,
    pending_checksum: &mut Vec<(usize, String)>,
    pending_enable: &mut Vec<(usize, String)>,
) -> usize {
    match spec {
        ElementSpec::Leaf(p) => {
            let name = p.name().map(str::to_owned);
            arena.push(ElementSlot::Leaf(p));
            let idx = arena.len() - 1;
            if let Some(n) = name {
                by_name.insert(n, idx);
            }
            idx
        }
        ElementSpec::Block { name, children, enable_when } => {
            let child_indices: Vec<usize> = children
                .into_iter()
                .map(|c| insert(c, arena, by_name, pending_size, pending_checksum, pending_enable))
                .collect();
            arena.push(ElementSlot::Block {
                name: name.clone(),
                children: child_indices,
                enable_when: enable_when.as_ref().map(|(_, v)| (0usize, v.clone())),
            });
            let idx = arena.len() - 1;
            if let Some((gate_name, _)) = enable_when {
                pending_enable.push((idx, gate_name));
            }
            if let Some(n) = name {
                by_name.insert(n, idx);
            }
            idx
        }
        ElementSpec::Size {
            name,
            target,
            width,
            endian,
            inclusive,
            fuzzable,
            library,
        } => {
            arena.push(ElementSlot::Size {
                name: name.clone(),
                target: 0,
                width,
                endian,
                inclusive,
                fuzzable,
                library,
                index: 0,
            });
            let idx = arena.len() - 1;
            pending_size.push((idx, target));
            if let Some(n) = name {
                by_name.insert(n, idx);
            }
            idx
        }
        ElementSpec::Checksum {
            name,
            target,
            algo,
            fuzzable,
            library,
        } => {
            arena.push(ElementSlot::Checksum {
                name: name.clone(),
                target: 0,
                algo,
                fuzzable,
                library,
                index: 0,
            });
            let idx = arena.len() - 1;
            pending_checksum.push((idx, target));
            if let Some(n) = name {
                by_name.insert(n, idx);
            }
            idx
        }
        ElementSpec::Repeat {
            name,
            child,
            default_count,
            k_values,
            fixed,
        } => {
            let child_idx = insert(*child, arena, by_name, pending_size, pending_checksum, pending_enable);
            arena.push(ElementSlot::Repeat {
                name: name.clone(),
                child: child_idx,
                default_count,
                k_values,
                cursor: 0,
                fixed,
            });
            let idx = arena.len() - 1;
            if let Some(n) = name {
                by_name.insert(n, idx);
            }
            idx
        }
    }
}
