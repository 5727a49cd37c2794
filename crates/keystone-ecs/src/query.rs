//! Boolean queries over archetype signatures.
//!
//! A [`Query`] is a predicate over component-type ids. It is evaluated
//! against archetype *signatures*, never against individual entities: an
//! archetype either matches (every entity in every chunk of it is yielded)
//! or it does not.
//!
//! [`QueryCache`] remembers which archetypes matched. Archetypes are never
//! destroyed and their signatures never change, so the cache only has to
//! look at archetypes created since the last refresh.
//!
//! ```
//! use keystone_ecs::prelude::*;
//!
//! #[derive(Debug, Clone)]
//! struct Health(f32);
//! #[derive(Debug, Clone)]
//! struct Frozen;
//!
//! let mut store = EntityStore::new(StoreConfig::default()).unwrap();
//! let health = store.register_component::<Health>("health").unwrap();
//! let frozen = store.register_component::<Frozen>("frozen").unwrap();
//!
//! let alive_and_thawed = Query::from(health) & !Query::from(frozen);
//! assert!(alive_and_thawed.matches_signature(&[health.id()]));
//! assert!(!alive_and_thawed.matches_signature(&[health.id(), frozen.id()]));
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr, Not};

use crate::archetype::{Archetype, ArchetypeId};
use crate::component::{ComponentType, ComponentTypeId};

// ---------------------------------------------------------------------------
// QueryExpr
// ---------------------------------------------------------------------------

/// Domain-free expression tree behind a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryExpr {
    /// Matches every archetype, including the empty one.
    Any,
    /// Matches archetypes containing the component.
    Has(ComponentTypeId),
    /// Matches when every operand matches. Empty `And` matches everything.
    And(Vec<QueryExpr>),
    /// Matches when at least one operand matches. Empty `Or` matches nothing.
    Or(Vec<QueryExpr>),
    /// Matches when the operand does not.
    Not(Box<QueryExpr>),
}

impl QueryExpr {
    /// Evaluate against a sorted signature.
    pub fn matches(&self, signature: &[ComponentTypeId]) -> bool {
        match self {
            QueryExpr::Any => true,
            QueryExpr::Has(id) => signature.binary_search(id).is_ok(),
            QueryExpr::And(terms) => terms.iter().all(|t| t.matches(signature)),
            QueryExpr::Or(terms) => terms.iter().any(|t| t.matches(signature)),
            QueryExpr::Not(inner) => !inner.matches(signature),
        }
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A composable predicate over the component types of domain `D`.
pub struct Query<D> {
    expr: QueryExpr,
    _marker: PhantomData<fn() -> D>,
}

impl<D> Query<D> {
    fn from_expr(expr: QueryExpr) -> Self {
        Self {
            expr,
            _marker: PhantomData,
        }
    }

    /// Matches every archetype.
    pub fn any() -> Self {
        Self::from_expr(QueryExpr::Any)
    }

    /// Matches archetypes containing `ty`.
    pub fn has<T>(ty: &ComponentType<D, T>) -> Self {
        Self::from_expr(QueryExpr::Has(ty.id()))
    }

    /// Matches archetypes satisfying every term.
    pub fn and<I>(terms: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Query<D>>,
    {
        Self::from_expr(QueryExpr::And(
            terms.into_iter().map(|t| t.into().expr).collect(),
        ))
    }

    /// Matches archetypes satisfying at least one term.
    pub fn or<I>(terms: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Query<D>>,
    {
        Self::from_expr(QueryExpr::Or(
            terms.into_iter().map(|t| t.into().expr).collect(),
        ))
    }

    /// Matches archetypes not satisfying `term`.
    pub fn not(term: impl Into<Query<D>>) -> Self {
        Self::from_expr(QueryExpr::Not(Box::new(term.into().expr)))
    }

    /// The underlying expression.
    pub fn expr(&self) -> &QueryExpr {
        &self.expr
    }

    /// Evaluate against a sorted signature.
    pub fn matches_signature(&self, signature: &[ComponentTypeId]) -> bool {
        self.expr.matches(signature)
    }

    /// Evaluate against an archetype.
    pub fn matches(&self, archetype: &Archetype) -> bool {
        self.expr.matches(archetype.signature())
    }
}

impl<D> Clone for Query<D> {
    fn clone(&self) -> Self {
        Self::from_expr(self.expr.clone())
    }
}

impl<D> PartialEq for Query<D> {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl<D> Eq for Query<D> {}

impl<D> fmt::Debug for Query<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Query").field(&self.expr).finish()
    }
}

impl<D> Default for Query<D> {
    fn default() -> Self {
        Self::any()
    }
}

impl<D, T> From<ComponentType<D, T>> for Query<D> {
    fn from(ty: ComponentType<D, T>) -> Self {
        Self::has(&ty)
    }
}

impl<D, T> From<&ComponentType<D, T>> for Query<D> {
    fn from(ty: &ComponentType<D, T>) -> Self {
        Self::has(ty)
    }
}

impl<D> BitAnd for Query<D> {
    type Output = Query<D>;

    fn bitand(self, rhs: Self) -> Self::Output {
        Query::and([self, rhs])
    }
}

impl<D> BitOr for Query<D> {
    type Output = Query<D>;

    fn bitor(self, rhs: Self) -> Self::Output {
        Query::or([self, rhs])
    }
}

impl<D> Not for Query<D> {
    type Output = Query<D>;

    fn not(self) -> Self::Output {
        Query::from_expr(QueryExpr::Not(Box::new(self.expr)))
    }
}

// ---------------------------------------------------------------------------
// QueryCache
// ---------------------------------------------------------------------------

/// Incrementally maintained list of archetypes matching a query.
pub struct QueryCache<D> {
    query: Query<D>,
    matched: Vec<ArchetypeId>,
    /// Number of archetypes already evaluated.
    seen: usize,
}

impl<D> QueryCache<D> {
    /// An empty cache; call [`refresh`](Self::refresh) before use.
    pub fn new(query: Query<D>) -> Self {
        Self {
            query,
            matched: Vec::new(),
            seen: 0,
        }
    }

    /// Evaluate archetypes created since the last refresh.
    ///
    /// Returns how many archetypes were evaluated.
    pub fn refresh(&mut self, archetypes: &[Archetype]) -> usize {
        let fresh = archetypes.get(self.seen..).unwrap_or_default();
        for archetype in fresh {
            if self.query.matches(archetype) {
                self.matched.push(archetype.id());
            }
        }
        self.seen = archetypes.len();
        fresh.len()
    }

    /// The cached query.
    pub fn query(&self) -> &Query<D> {
        &self.query
    }

    /// Matching archetypes, in creation order.
    pub fn matched(&self) -> &[ArchetypeId] {
        &self.matched
    }

    /// Whether `id` matched.
    pub fn contains(&self, id: ArchetypeId) -> bool {
        self.matched.binary_search(&id).is_ok()
    }
}

impl<D> fmt::Debug for QueryCache<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("query", &self.query)
            .field("matched", &self.matched)
            .field("seen", &self.seen)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
