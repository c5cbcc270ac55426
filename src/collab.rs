//! Collaborator interfaces the core pipeline delegates to: heuristics that
//! are out of scope for the core itself (SBU discovery/coalescing) and
//! exact building blocks that are core but swappable for testing (the
//! linear solver, dimensionality analysis). This mirrors how the teacher
//! keeps e.g. its Hall-symbol table behind a narrow lookup rather than
//! wiring database access into the algorithm that consumes it.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use num_bigint::BigInt;
use num_rational::BigRational;
use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::error::NetError;
use crate::graph::PeriodicGraph3D;
use crate::rational::RVec3;

/// Dense integer matrix, row-major.
pub type IntMatrix = Vec<Vec<BigInt>>;
/// Dense exact-rational matrix, row-major.
pub type RationalMatrix = Vec<Vec<BigRational>>;

/// Tag: this [`Crystal`] carries a cluster assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithClusters;
/// Tag: this [`Crystal`] has no cluster assignment, one vertex per atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithoutClusters;

/// A partition of vertex indices into clusters (secondary building units).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clusters {
    pub members: Vec<Vec<usize>>,
}

/// A crystal at some stage of the clustering pipeline. `State` tags whether
/// a cluster assignment is present; the clustering selector dispatches on
/// it, following the teacher's tagged-cell-parameter style rather than two
/// unrelated structs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct Crystal<State> {
    pub cell: Cell,
    pub types: Vec<String>,
    pub graph: PeriodicGraph3D,
    pub pos: Vec<RVec3>,
    pub clusters: Option<Clusters>,
    _state: PhantomData<State>,
}

impl<State> Crystal<State> {
    pub fn new(
        cell: Cell,
        types: Vec<String>,
        graph: PeriodicGraph3D,
        pos: Vec<RVec3>,
        clusters: Option<Clusters>,
    ) -> Self {
        Self {
            cell,
            types,
            graph,
            pos,
            clusters,
            _state: PhantomData,
        }
    }

    /// Re-tag without touching the payload; used when a transform changes
    /// only whether a cluster assignment is considered present.
    pub fn retag<Other>(self) -> Crystal<Other> {
        Crystal {
            cell: self.cell,
            types: self.types,
            graph: self.graph,
            pos: self.pos,
            clusters: self.clusters,
            _state: PhantomData,
        }
    }
}

pub trait SbuFinder {
    fn find_sbus(&self, crystal: &Crystal<WithoutClusters>) -> Result<Clusters, NetError>;
}

pub trait SbuCoalescer {
    fn coalesce(&self, crystal: &Crystal<WithClusters>) -> Crystal<WithoutClusters>;
}

pub trait DimensionalityAnalyzer {
    fn dimensionality(&self, graph: &PeriodicGraph3D) -> BTreeMap<u8, Vec<Vec<usize>>>;
}

pub trait LinearSolver {
    fn dixon_solve(&self, a: &IntMatrix, y: &IntMatrix) -> Result<RationalMatrix, NetError>;
}

/// Default [`DimensionalityAnalyzer`]: connected components plus
/// rank-of-offset-span via union-find, matching the teacher's use of
/// `union_find::QuickFindUf` in `orbits_from_permutations`. Not a heuristic
/// collaborator in the sense `SbuFinder` is — the algorithm is fully
/// determined, so a default ships unconditionally.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDimensionalityAnalyzer;

impl DimensionalityAnalyzer for DefaultDimensionalityAnalyzer {
    fn dimensionality(&self, graph: &PeriodicGraph3D) -> BTreeMap<u8, Vec<Vec<usize>>> {
        crate::graph::dimensionality(graph).unwrap_or_default()
    }
}
