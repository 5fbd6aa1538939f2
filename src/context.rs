//! [`Context`] and related types/traits.

use crate::{ConstDef, FxIndexMap, ScalarType, TypeDef};
use rustc_hash::FxHasher;
use std::cell::Cell;
use std::hash::{BuildHasherDefault, Hash};
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::ops::{Deref, DerefMut, Index, IndexMut};

/// Context object with global resources for the IR.
///
/// Those resources currently are:
/// * interners, for anything without an identity, and which can be deduplicated
/// * "entity" allocator, for everything else - i.e. anything with an identity
///   that needs to remain unique across an entire [`Context`]
///   * the *definition* of an entity isn't kept in the [`Context`], but rather in
///     some [`EntityDefs`] collection somewhere in a [`Module`](crate::Module) (or further nested),
///     with only the entity *indices* being allocated by the [`Context`]
//
// NOTE(eddyb) `Context` is `!Sync` (because of the interners), sharing between
// modules happens through `Rc<Context>` instead.
#[derive(Default)]
pub struct Context {
    interners: Interners,
    next_entity_idx: Cell<Option<NonZeroU32>>,
}

type FxBuildHasher = BuildHasherDefault<FxHasher>;

#[derive(Default)]
struct Interners {
    strs: elsa::FrozenIndexSet<Box<str>, FxBuildHasher>,
    types: elsa::FrozenIndexSet<Box<TypeDef>, FxBuildHasher>,
    consts: elsa::FrozenIndexSet<Box<ConstDef>, FxBuildHasher>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern<T: InternInCx<I>, I>(&self, x: T) -> I {
        x.intern_in_cx(self)
    }

    fn alloc_entity<E: Entity>(&self) -> E {
        let idx = self.next_entity_idx.get().unwrap_or(NonZeroU32::MIN);
        self.next_entity_idx
            .set(Some(idx.checked_add(1).expect("Context: ran out of entity indices")));
        E::from_non_zero_u32(idx)
    }
}

/// Implicit conversion into an interned handle, used by [`Context::intern`].
pub trait InternInCx<I> {
    #[must_use]
    fn intern_in_cx(self, cx: &Context) -> I;
}

macro_rules! interners {
    ($($(#[$attr:meta])* $name:ident => $field:ident: $def:ty),+ $(,)?) => {$(
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl Index<$name> for Context {
            type Output = $def;

            fn index(&self, interned: $name) -> &Self::Output {
                self.interners.$field.get_index(interned.0 as usize).unwrap_or_else(|| {
                    panic!(concat!(stringify!($name), " not interned in this `Context`"))
                })
            }
        }
    )+};
}

interners! {
    /// Interned handle for a [`str`].
    InternedStr => strs: str,

    /// Interned handle for a [`TypeDef`].
    Type => types: TypeDef,

    /// Interned handle for a [`ConstDef`] (a constant value).
    Const => consts: ConstDef,
}

impl InternInCx<InternedStr> for &str {
    fn intern_in_cx(self, cx: &Context) -> InternedStr {
        let (idx, _) = cx.interners.strs.insert_full(self.into());
        InternedStr(idx.try_into().expect("Context: too many interned strings"))
    }
}

impl InternInCx<InternedStr> for String {
    fn intern_in_cx(self, cx: &Context) -> InternedStr {
        let (idx, _) = cx.interners.strs.insert_full(self.into_boxed_str());
        InternedStr(idx.try_into().expect("Context: too many interned strings"))
    }
}

impl InternInCx<Type> for TypeDef {
    fn intern_in_cx(self, cx: &Context) -> Type {
        let (idx, _) = cx.interners.types.insert_full(Box::new(self));
        Type(idx.try_into().expect("Context: too many interned types"))
    }
}

// HACK(eddyb) this behaves like an implicit conversion for `cx.intern(...)`.
impl InternInCx<Type> for ScalarType {
    fn intern_in_cx(self, cx: &Context) -> Type {
        cx.intern(TypeDef::Scalar(self))
    }
}

impl InternInCx<Const> for ConstDef {
    fn intern_in_cx(self, cx: &Context) -> Const {
        let (idx, _) = cx.interners.consts.insert_full(Box::new(self));
        Const(idx.try_into().expect("Context: too many interned consts"))
    }
}

/// Handle type for an entity, i.e. anything with an identity, allocated by a
/// [`Context`], and whose definition is stored in an [`EntityDefs`].
pub trait Entity: Copy + Eq + Hash + 'static {
    type Def;

    #[doc(hidden)]
    fn from_non_zero_u32(idx: NonZeroU32) -> Self;
    #[doc(hidden)]
    fn to_non_zero_u32(self) -> NonZeroU32;
}

macro_rules! entities {
    ($($(#[$attr:meta])* $name:ident => $def:ty),+ $(,)?) => {$(
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(NonZeroU32);

        impl Entity for $name {
            type Def = $def;

            fn from_non_zero_u32(idx: NonZeroU32) -> Self {
                Self(idx)
            }
            fn to_non_zero_u32(self) -> NonZeroU32 {
                self.0
            }
        }
    )+};
}

entities! {
    /// Entity handle for a [`GlobalVarDecl`](crate::GlobalVarDecl) (a global variable).
    GlobalVar => crate::GlobalVarDecl,

    /// Entity handle for a [`FuncDecl`](crate::FuncDecl) (a function).
    Func => crate::FuncDecl,

    /// Entity handle for a [`RegionDef`](crate::RegionDef) (a basic block).
    Region => crate::RegionDef,

    /// Entity handle for a [`DataInstDef`](crate::DataInstDef) (an instruction).
    DataInst => EntityListNode<DataInst, crate::DataInstDef>,
}

/// Collection holding the actual definitions for [`Context`]-allocated entities.
///
/// Iteration follows definition order, which is also what e.g. block numbering
/// (see [`Metadata::BLOCK_INDEX`](crate::metadata::Metadata::BLOCK_INDEX)) reflects.
pub struct EntityDefs<E: Entity> {
    defs: FxIndexMap<E, E::Def>,
}

impl<E: Entity> Default for EntityDefs<E> {
    fn default() -> Self {
        Self { defs: FxIndexMap::default() }
    }
}

impl<E: Entity> Clone for EntityDefs<E>
where
    E::Def: Clone,
{
    fn clone(&self) -> Self {
        Self { defs: self.defs.clone() }
    }
}

impl<E: Entity> EntityDefs<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, cx: &Context, def: E::Def) -> E {
        let entity = cx.alloc_entity();
        assert!(self.defs.insert(entity, def).is_none());
        entity
    }

    /// Remove (and return) the definition of `entity`, keeping the relative
    /// order of all remaining definitions intact.
    pub fn remove(&mut self, entity: E) -> Option<E::Def> {
        self.defs.shift_remove(&entity)
    }

    /// Like [`EntityDefs::remove`], but in constant time, by moving the last
    /// definition into the place of the removed one.
    ///
    /// Only usable where nothing depends on definition order (e.g. unlike
    /// [`Region`](crate::Region)s, whose block indices follow that order).
    pub fn swap_remove(&mut self, entity: E) -> Option<E::Def> {
        self.defs.swap_remove(&entity)
    }

    pub fn contains(&self, entity: E) -> bool {
        self.defs.contains_key(&entity)
    }

    pub fn get(&self, entity: E) -> Option<&E::Def> {
        self.defs.get(&entity)
    }

    pub fn get_mut(&mut self, entity: E) -> Option<&mut E::Def> {
        self.defs.get_mut(&entity)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = E> + ExactSizeIterator + '_ {
        self.defs.keys().copied()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (E, &E::Def)> + '_ {
        self.defs.iter().map(|(&e, def)| (e, def))
    }

    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = (E, &mut E::Def)> + '_ {
        self.defs.iter_mut().map(|(&e, def)| (e, def))
    }
}

impl<E: Entity> Index<E> for EntityDefs<E> {
    type Output = E::Def;

    #[track_caller]
    fn index(&self, entity: E) -> &Self::Output {
        self.defs.get(&entity).unwrap_or_else(|| {
            panic!("{} not defined in this `EntityDefs`", std::any::type_name::<E>())
        })
    }
}

impl<E: Entity> IndexMut<E> for EntityDefs<E> {
    #[track_caller]
    fn index_mut(&mut self, entity: E) -> &mut Self::Output {
        self.defs.get_mut(&entity).unwrap_or_else(|| {
            panic!("{} not defined in this `EntityDefs`", std::any::type_name::<E>())
        })
    }
}

/// Doubly-linked list, "intrusively" going through `E::Def`, which must be an
/// [`EntityListNode<E, _>`] (to hold the "previous/next node" links).
///
/// Fields are private to avoid arbitrary user interactions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EntityList<E: Entity>(Option<FirstLast<E>>);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct FirstLast<E> {
    first: E,
    last: E,
}

impl<E: Entity> Default for EntityList<E> {
    fn default() -> Self {
        Self(None)
    }
}

impl<E: Entity> EntityList<E> {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(self) -> bool {
        self.0.is_none()
    }

    pub fn first(self) -> Option<E> {
        self.0.map(|list| list.first)
    }

    pub fn last(self) -> Option<E> {
        self.0.map(|list| list.last)
    }

    pub fn iter(self) -> EntityListIter<E> {
        EntityListIter { first: self.first(), last: self.last() }
    }
}

impl<E: Entity<Def = EntityListNode<E, D>>, D> EntityList<E> {
    /// Insert `new_node` (defined in `defs`) at the start of `self`.
    #[track_caller]
    pub fn insert_first(&mut self, new_node: E, defs: &mut EntityDefs<E>) {
        assert_unlinked(new_node, defs);

        self.0 = Some(match self.0 {
            None => FirstLast { first: new_node, last: new_node },
            Some(old) => {
                defs[new_node].next = Some(old.first);
                defs[old.first].prev = Some(new_node);
                FirstLast { first: new_node, last: old.last }
            }
        });
    }

    /// Insert `new_node` (defined in `defs`) at the end of `self`.
    #[track_caller]
    pub fn insert_last(&mut self, new_node: E, defs: &mut EntityDefs<E>) {
        assert_unlinked(new_node, defs);

        self.0 = Some(match self.0 {
            None => FirstLast { first: new_node, last: new_node },
            Some(old) => {
                defs[new_node].prev = Some(old.last);
                defs[old.last].next = Some(new_node);
                FirstLast { first: old.first, last: new_node }
            }
        });
    }

    /// Insert `new_node` (defined in `defs`) immediately after `prev`, which
    /// must already be part of `self`.
    #[track_caller]
    pub fn insert_after(&mut self, new_node: E, prev: E, defs: &mut EntityDefs<E>) {
        assert_unlinked(new_node, defs);
        let list = self.0.as_mut().expect("EntityList::insert_after: empty list");

        let next = defs[prev].next.replace(new_node);
        defs[new_node].prev = Some(prev);
        defs[new_node].next = next;
        match next {
            Some(next) => defs[next].prev = Some(new_node),
            None => {
                assert!(list.last == prev, "EntityList::insert_after: `prev` not in this list");
                list.last = new_node;
            }
        }
    }

    /// Insert `new_node` (defined in `defs`) immediately before `next`, which
    /// must already be part of `self`.
    #[track_caller]
    pub fn insert_before(&mut self, new_node: E, next: E, defs: &mut EntityDefs<E>) {
        assert_unlinked(new_node, defs);
        let list = self.0.as_mut().expect("EntityList::insert_before: empty list");

        let prev = defs[next].prev.replace(new_node);
        defs[new_node].prev = prev;
        defs[new_node].next = Some(next);
        match prev {
            Some(prev) => defs[prev].next = Some(new_node),
            None => {
                assert!(list.first == next, "EntityList::insert_before: `next` not in this list");
                list.first = new_node;
            }
        }
    }

    /// Unlink `node` from `self` (its definition is left in `defs`).
    #[track_caller]
    pub fn remove(&mut self, node: E, defs: &mut EntityDefs<E>) {
        let list = self.0.expect("EntityList::remove: empty list");

        let prev = defs[node].prev.take();
        let next = defs[node].next.take();

        match prev {
            Some(prev) => defs[prev].next = next,
            None => assert!(list.first == node, "EntityList::remove: node not in this list"),
        }
        match next {
            Some(next) => defs[next].prev = prev,
            None => assert!(list.last == node, "EntityList::remove: node not in this list"),
        }

        self.0 = match (prev, next) {
            (None, None) => None,
            (None, Some(next)) => Some(FirstLast { first: next, last: list.last }),
            (Some(prev), None) => Some(FirstLast { first: list.first, last: prev }),
            (Some(_), Some(_)) => Some(list),
        };
    }
}

#[track_caller]
fn assert_unlinked<E: Entity<Def = EntityListNode<E, D>>, D>(node: E, defs: &EntityDefs<E>) {
    let EntityListNode { prev, next, inner_def: _ } = &defs[node];
    assert!(prev.is_none() && next.is_none(), "EntityList: node is already linked into a list");
}

/// [`EntityList<E>`] iterator, but with a different API than [`Iterator`].
///
/// This can also be considered a (non-random-access) "subscript" of the list,
/// as it only tracks its own `first`/`last` ends: the link out of the current
/// node is read *before* it's yielded, so removing yielded nodes (or inserting
/// new ones right after them) doesn't disturb the rest of the iteration.
#[derive(Copy, Clone)]
pub struct EntityListIter<E: Entity> {
    pub first: Option<E>,
    pub last: Option<E>,
}

impl<E: Entity<Def = EntityListNode<E, D>>, D> EntityListIter<E> {
    #[must_use]
    pub fn split_first(self, defs: &EntityDefs<E>) -> Option<(E, Self)> {
        let Self { first, last } = self;
        let current = first?;
        let rest = if Some(current) == last {
            Self { first: None, last: None }
        } else {
            Self { first: defs[current].next, last }
        };
        Some((current, rest))
    }

    #[must_use]
    pub fn split_last(self, defs: &EntityDefs<E>) -> Option<(E, Self)> {
        let Self { first, last } = self;
        let current = last?;
        let rest = if Some(current) == first {
            Self { first: None, last: None }
        } else {
            Self { first, last: defs[current].prev }
        };
        Some((current, rest))
    }
}

/// [`Entity`] definition, wrapped with links to the previous/next nodes in an
/// [`EntityList`] (only usable through [`EntityList`]'s methods).
#[derive(Clone)]
pub struct EntityListNode<E: Entity, D> {
    prev: Option<E>,
    next: Option<E>,

    inner_def: D,
}

impl<E: Entity, D> From<D> for EntityListNode<E, D> {
    fn from(inner_def: D) -> Self {
        Self { prev: None, next: None, inner_def }
    }
}

impl<E: Entity, D> EntityListNode<E, D> {
    pub fn prev_in_list(&self) -> Option<E> {
        self.prev
    }

    pub fn next_in_list(&self) -> Option<E> {
        self.next
    }

    pub fn into_inner_def(self) -> D {
        self.inner_def
    }
}

impl<E: Entity, D> Deref for EntityListNode<E, D> {
    type Target = D;
    fn deref(&self) -> &D {
        &self.inner_def
    }
}

impl<E: Entity, D> DerefMut for EntityListNode<E, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.inner_def
    }
}

/// Map with [`Entity`] keys, densely packed (by entity index) into a `Vec`.
///
/// Entity indices are [`Context`]-wide, so this works best for entities which
/// were allocated close together (e.g. all the blocks of one function).
#[derive(Clone, Debug)]
pub struct EntityOrientedDenseMap<K: Entity, V> {
    values: Vec<Option<V>>,
    _marker: PhantomData<K>,
}

impl<K: Entity, V> Default for EntityOrientedDenseMap<K, V> {
    fn default() -> Self {
        Self { values: vec![], _marker: PhantomData }
    }
}

impl<K: Entity, V: PartialEq> PartialEq for EntityOrientedDenseMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl<K: Entity, V: Eq> Eq for EntityOrientedDenseMap<K, V> {}

impl<K: Entity, V> EntityOrientedDenseMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_idx(key: K) -> usize {
        (key.to_non_zero_u32().get() - 1) as usize
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let idx = Self::slot_idx(key);
        if idx >= self.values.len() {
            self.values.resize_with(idx + 1, || None);
        }
        self.values[idx].replace(value)
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.values.get(Self::slot_idx(key))?.as_ref()
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.values.get_mut(Self::slot_idx(key))?.as_mut()
    }

    pub fn remove(&mut self, key: K) -> Option<V> {
        self.values.get_mut(Self::slot_idx(key))?.take()
    }

    pub fn contains_key(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over all entries, in entity allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.values.iter().enumerate().filter_map(|(idx, value)| {
            let key = K::from_non_zero_u32(NonZeroU32::new(idx as u32 + 1)?);
            Some((key, value.as_ref()?))
        })
    }
}

impl<K: Entity, V> Index<K> for EntityOrientedDenseMap<K, V> {
    type Output = V;

    #[track_caller]
    fn index(&self, key: K) -> &V {
        self.get(key).expect("EntityOrientedDenseMap: missing entry")
    }
}

impl<K: Entity, V> IndexMut<K> for EntityOrientedDenseMap<K, V> {
    #[track_caller]
    fn index_mut(&mut self, key: K) -> &mut V {
        self.get_mut(key).expect("EntityOrientedDenseMap: missing entry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataInstDef, DataInstKind};

    fn dummy_inst(defs: &mut EntityDefs<DataInst>, cx: &Context, component: u8) -> DataInst {
        defs.define(
            cx,
            DataInstDef {
                kind: DataInstKind::VectorExtract(component),
                inputs: Default::default(),
                output_type: None,
            }
            .into(),
        )
    }

    fn collect(list: EntityList<DataInst>, defs: &EntityDefs<DataInst>) -> Vec<DataInst> {
        let mut out = vec![];
        let mut iter = list.iter();
        while let Some((inst, rest)) = iter.split_first(defs) {
            out.push(inst);
            iter = rest;
        }
        out
    }

    #[test]
    fn insert_and_remove_keep_links_consistent() {
        let cx = Context::new();
        let mut defs = EntityDefs::new();
        let [a, b, c, d] = [0, 1, 2, 3].map(|i| dummy_inst(&mut defs, &cx, i));

        let mut list = EntityList::empty();
        list.insert_last(b, &mut defs);
        list.insert_first(a, &mut defs);
        list.insert_last(d, &mut defs);
        list.insert_after(c, b, &mut defs);
        assert_eq!(collect(list, &defs), [a, b, c, d]);

        list.remove(a, &mut defs);
        list.remove(d, &mut defs);
        assert_eq!(collect(list, &defs), [b, c]);
        assert_eq!((list.first(), list.last()), (Some(b), Some(c)));

        list.insert_before(a, b, &mut defs);
        assert_eq!(collect(list, &defs), [a, b, c]);

        for inst in [a, b, c] {
            list.remove(inst, &mut defs);
        }
        assert!(list.is_empty());
    }

    #[test]
    fn iteration_survives_removing_the_current_node() {
        let cx = Context::new();
        let mut defs = EntityDefs::new();
        let insts = [0, 1, 2, 3, 4].map(|i| dummy_inst(&mut defs, &cx, i));

        let mut list = EntityList::empty();
        for inst in insts {
            list.insert_last(inst, &mut defs);
        }

        let mut visited = vec![];
        let mut iter = list.iter();
        while let Some((inst, rest)) = iter.split_first(&defs) {
            visited.push(inst);
            // Remove every even node, while also inserting a fresh node after
            // it, which must not be visited by this same iteration.
            if visited.len() % 2 == 1 {
                let fresh = dummy_inst(&mut defs, &cx, 9);
                list.insert_after(fresh, inst, &mut defs);
                list.remove(inst, &mut defs);
            }
            iter = rest;
        }
        assert_eq!(visited, insts);
        assert_eq!(collect(list, &defs).len(), insts.len());
    }

    #[test]
    fn removal_order() {
        let cx = Context::new();
        let mut defs = EntityDefs::new();
        let [a, b, c, d] = [0, 1, 2, 3].map(|i| dummy_inst(&mut defs, &cx, i));

        assert!(defs.remove(b).is_some());
        assert_eq!(defs.keys().collect::<Vec<_>>(), [a, c, d]);

        // `d` takes the place of `a`, without touching any list links.
        let mut list = EntityList::empty();
        list.insert_last(c, &mut defs);
        list.insert_last(d, &mut defs);
        assert!(defs.swap_remove(a).is_some());
        assert_eq!(defs.keys().collect::<Vec<_>>(), [d, c]);
        assert_eq!(collect(list, &defs), [c, d]);

        assert!(defs.swap_remove(a).is_none());
        assert!(!defs.contains(a));
    }

    #[test]
    #[should_panic(expected = "already linked")]
    fn double_insertion_panics() {
        let cx = Context::new();
        let mut defs = EntityDefs::new();
        let [a, b] = [0, 1].map(|i| dummy_inst(&mut defs, &cx, i));

        let mut list = EntityList::empty();
        list.insert_last(a, &mut defs);
        list.insert_last(b, &mut defs);
        list.insert_last(a, &mut defs);
    }

    #[test]
    fn interning_deduplicates() {
        let cx = Context::new();
        let u32_a: Type = cx.intern(ScalarType::U32);
        let u32_b: Type = cx.intern(TypeDef::Scalar(ScalarType::U32));
        let bool_ty: Type = cx.intern(ScalarType::Bool);
        assert_eq!(u32_a, u32_b);
        assert_ne!(u32_a, bool_ty);

        let s: InternedStr = cx.intern("main");
        assert_eq!(&cx[s], "main");
        let owned: InternedStr = cx.intern("main".to_string());
        assert_eq!(owned, s);
    }

    #[test]
    fn dense_map_equality_ignores_capacity() {
        let cx = Context::new();
        let mut defs = EntityDefs::new();
        let [a, b] = [0, 1].map(|i| dummy_inst(&mut defs, &cx, i));

        let mut x = EntityOrientedDenseMap::new();
        x.insert(a, 1);
        let mut y = EntityOrientedDenseMap::new();
        y.insert(a, 1);
        y.insert(b, 2);
        assert_ne!(x, y);
        assert_eq!(y.remove(b), Some(2));
        assert_eq!(x, y);
    }
}
