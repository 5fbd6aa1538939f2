//! Per-function analysis results ("metadata"), computed lazily and cached in
//! [`FuncDefBody::metadata`].
//!
//! Any pass mutating a function body must call [`FuncDefBody::preserve_metadata`]
//! afterwards, listing only the facts it knows to still hold: everything else
//! gets dropped, and will be recomputed on the next [`FuncDefBody::require_metadata`].

use crate::cf::dominance::DomTree;
use crate::{EntityOrientedDenseMap, FuncDefBody, Region};

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Metadata: u8 {
        /// Numbering of every [`Region`] in the function (see [`BlockIndices`]).
        const BLOCK_INDEX = 1 << 0;

        /// Dominator tree of the function's CFG (see [`DomTree`]).
        const DOMINANCE = 1 << 1;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataCache {
    block_indices: Option<BlockIndices>,
    dom_tree: Option<DomTree>,
}

/// Dense numbering of all the [`Region`]s of a function, in definition order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockIndices {
    indices: EntityOrientedDenseMap<Region, u32>,
    count: u32,
}

impl BlockIndices {
    pub fn compute(func_def_body: &FuncDefBody) -> Self {
        let mut indices = EntityOrientedDenseMap::new();
        let mut count = 0;
        for region in func_def_body.regions.keys() {
            indices.insert(region, count);
            count += 1;
        }
        Self { indices, count }
    }

    pub fn index_of(&self, region: Region) -> Option<u32> {
        self.indices.get(region).copied()
    }

    pub fn block_count(&self) -> u32 {
        self.count
    }
}

impl MetadataCache {
    /// The set of facts currently cached (and therefore assumed valid).
    pub fn valid(&self) -> Metadata {
        let mut valid = Metadata::empty();
        valid.set(Metadata::BLOCK_INDEX, self.block_indices.is_some());
        valid.set(Metadata::DOMINANCE, self.dom_tree.is_some());
        valid
    }

    pub fn block_indices(&self) -> Option<&BlockIndices> {
        self.block_indices.as_ref()
    }

    pub fn dom_tree(&self) -> Option<&DomTree> {
        self.dom_tree.as_ref()
    }
}

impl FuncDefBody {
    /// Ensure all of `required` is cached in `self.metadata`, computing
    /// whatever is missing.
    pub fn require_metadata(&mut self, required: Metadata) {
        let missing = required - self.metadata.valid();
        if missing.contains(Metadata::BLOCK_INDEX) {
            self.metadata.block_indices = Some(BlockIndices::compute(self));
        }
        if missing.contains(Metadata::DOMINANCE) {
            self.metadata.dom_tree = Some(DomTree::compute(self));
        }
    }

    /// Drop every cached fact that isn't in `preserved`.
    pub fn preserve_metadata(&mut self, preserved: Metadata) {
        if !preserved.contains(Metadata::BLOCK_INDEX) {
            self.metadata.block_indices = None;
        }
        if !preserved.contains(Metadata::DOMINANCE) {
            self.metadata.dom_tree = None;
        }
    }
}
