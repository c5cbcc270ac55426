//! Periodic graph data model and the topological reducer of spec component
//! C6: degree-based pruning/contraction and dimensionality filtering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use union_find::{QuickFindUf, UnionByRank, UnionFind};

use crate::error::NetError;

/// One lattice edge `(u, v, o)`: `v`'s image is `o` lattice vectors away
/// from `u`. The mirror `(v, u, -o)` is implicitly present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicEdge3D {
    pub u: usize,
    pub v: usize,
    pub offset: [i32; 3],
}

impl PeriodicEdge3D {
    pub fn new(u: usize, v: usize, offset: [i32; 3]) -> Self {
        Self { u, v, offset }
    }

    pub fn reversed(&self) -> Self {
        Self {
            u: self.v,
            v: self.u,
            offset: [-self.offset[0], -self.offset[1], -self.offset[2]],
        }
    }
}

/// A multigraph on `{0..n}` whose edges carry integer lattice offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicGraph3D {
    pub n: usize,
    pub edges: Vec<PeriodicEdge3D>,
}

impl PeriodicGraph3D {
    pub fn new(n: usize, edges: Vec<PeriodicEdge3D>) -> Self {
        Self { n, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Neighbor descriptors `(other, offset from v to other's image)` of
    /// vertex `v`, covering both directions of each stored edge.
    pub fn neighbors(&self, v: usize) -> Vec<(usize, [i32; 3])> {
        let mut out = Vec::new();
        for e in &self.edges {
            if e.u == v {
                out.push((e.v, e.offset));
            }
            if e.v == v && e.u != v {
                out.push((e.u, negate(e.offset)));
            }
            if e.v == v && e.u == v {
                // self-loop: contributes in both directions
                out.push((e.u, negate(e.offset)));
            }
        }
        out
    }

    /// Periodic degree of `v` (a self-loop with non-zero offset counts 2).
    pub fn degree(&self, v: usize) -> usize {
        self.neighbors(v).len()
    }
}

fn negate(o: [i32; 3]) -> [i32; 3] {
    [-o[0], -o[1], -o[2]]
}

/// Remove degree-<=1 vertices, then splice out degree-2 vertices, until
/// neither applies. Returns the reduced graph and a `vmap` from reduced
/// indices to original ones.
pub fn trim_topology(graph: &PeriodicGraph3D) -> (PeriodicGraph3D, Vec<usize>) {
    let mut vmap: Vec<usize> = (0..graph.n).collect();
    let mut edges = graph.edges.clone();

    loop {
        let n = vmap.len();
        let degrees = compute_degrees(n, &edges);

        let low_degree: Vec<usize> = (0..n).filter(|&v| degrees[v] <= 1).collect();
        if !low_degree.is_empty() {
            let (new_edges, new_vmap) = remove_vertices(n, &edges, &vmap, &low_degree);
            edges = new_edges;
            vmap = new_vmap;
            continue;
        }

        // A degree-2 vertex whose two neighbor descriptors both point back
        // to itself (a lone self-loop, e.g. after a prior splice collapsed
        // onto it) cannot be spliced: the replacement edge would reference
        // a vertex being deleted. Such a vertex is a terminal state, not a
        // candidate for further reduction.
        let splice_target = (0..n).filter(|&v| degrees[v] == 2).find(|&v| {
            let nbrs = neighbors_of(n, &edges, v);
            nbrs.len() == 2 && (nbrs[0].0 != v || nbrs[1].0 != v)
        });

        if let Some(v) = splice_target {
            let nbrs = neighbors_of(n, &edges, v);
            debug_assert_eq!(nbrs.len(), 2);
            let (n1, o1) = nbrs[0];
            let (n2, o2) = nbrs[1];
            let spliced_offset = [o2[0] - o1[0], o2[1] - o1[1], o2[2] - o1[2]];

            let mut kept: Vec<PeriodicEdge3D> = edges
                .iter()
                .copied()
                .filter(|e| e.u != v && e.v != v)
                .collect();
            kept.push(PeriodicEdge3D::new(n1, n2, spliced_offset));

            let remaining: Vec<usize> = (0..n).filter(|&x| x != v).collect();
            let (reindexed_edges, new_vmap) = reindex(&kept, &remaining, &vmap);
            edges = reindexed_edges;
            vmap = new_vmap;
            continue;
        }

        break;
    }

    (PeriodicGraph3D::new(vmap.len(), edges), vmap)
}

fn compute_degrees(n: usize, edges: &[PeriodicEdge3D]) -> Vec<usize> {
    let mut deg = vec![0usize; n];
    for e in edges {
        deg[e.u] += 1;
        deg[e.v] += 1;
    }
    deg
}

fn neighbors_of(n: usize, edges: &[PeriodicEdge3D], v: usize) -> Vec<(usize, [i32; 3])> {
    let g = PeriodicGraph3D::new(n, edges.to_vec());
    g.neighbors(v)
}

/// Delete `to_remove` (indices into the current `n`-vertex graph), relabel
/// survivors densely, and extend `vmap` accordingly.
fn remove_vertices(
    n: usize,
    edges: &[PeriodicEdge3D],
    vmap: &[usize],
    to_remove: &[usize],
) -> (Vec<PeriodicEdge3D>, Vec<usize>) {
    let remaining: Vec<usize> = (0..n).filter(|v| !to_remove.contains(v)).collect();
    let filtered: Vec<PeriodicEdge3D> = edges
        .iter()
        .copied()
        .filter(|e| !to_remove.contains(&e.u) && !to_remove.contains(&e.v))
        .collect();
    reindex(&filtered, &remaining, vmap)
}

fn reindex(
    edges: &[PeriodicEdge3D],
    remaining: &[usize],
    vmap: &[usize],
) -> (Vec<PeriodicEdge3D>, Vec<usize>) {
    let mut new_index = vec![usize::MAX; remaining.iter().copied().max().map_or(0, |m| m + 1)];
    for (new_i, &old_i) in remaining.iter().enumerate() {
        new_index[old_i] = new_i;
    }
    let new_edges: Vec<PeriodicEdge3D> = edges
        .iter()
        .map(|e| PeriodicEdge3D::new(new_index[e.u], new_index[e.v], e.offset))
        .collect();
    let new_vmap: Vec<usize> = remaining.iter().map(|&old_i| vmap[old_i]).collect();
    (new_edges, new_vmap)
}

/// The rank of the lattice spanned by a connected component's accumulated
/// offsets, `0..=3`.
pub fn dimensionality(
    graph: &PeriodicGraph3D,
) -> Result<BTreeMap<u8, Vec<Vec<usize>>>, NetError> {
    if graph.n == 0 {
        return Err(NetError::EmptyGraph);
    }

    let mut uf = QuickFindUf::<UnionByRank>::new(graph.n);
    for e in &graph.edges {
        uf.union(e.u, e.v);
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for v in 0..graph.n {
        components.entry(uf.find(v)).or_default().push(v);
    }

    let mut out: BTreeMap<u8, Vec<Vec<usize>>> = BTreeMap::new();
    for (root, members) in components {
        let rank = component_rank(graph, root, &members, &mut uf);
        out.entry(rank).or_default().push(members);
    }
    Ok(out)
}

/// Rank of the sublattice of Z^3 spanned by offsets accumulated while
/// walking a spanning tree of the component: every cycle in the component
/// (including a self-loop) contributes its net offset as a lattice vector.
fn component_rank(
    graph: &PeriodicGraph3D,
    _root: usize,
    members: &[usize],
    _uf: &mut QuickFindUf<UnionByRank>,
) -> u8 {
    use std::collections::HashSet;

    let member_set: HashSet<usize> = members.iter().copied().collect();
    let mut visited = HashSet::new();
    let mut potential: BTreeMap<usize, [i64; 3]> = BTreeMap::new();
    let mut spanned: Vec<[i64; 3]> = Vec::new();

    let start = members[0];
    potential.insert(start, [0, 0, 0]);
    visited.insert(start);
    let mut stack = vec![start];

    while let Some(v) = stack.pop() {
        let pv = potential[&v];
        for (w, o) in graph.neighbors(v) {
            if !member_set.contains(&w) {
                continue;
            }
            let target = [
                pv[0] + o[0] as i64,
                pv[1] + o[1] as i64,
                pv[2] + o[2] as i64,
            ];
            if let Some(&existing) = potential.get(&w) {
                let diff = [
                    target[0] - existing[0],
                    target[1] - existing[1],
                    target[2] - existing[2],
                ];
                if diff != [0, 0, 0] {
                    spanned.push(diff);
                }
            } else {
                potential.insert(w, target);
                visited.insert(w);
                stack.push(w);
            }
        }
    }

    rank_of_span(&spanned)
}

/// Rank (0..=3) of the Z-span of a set of integer 3-vectors, via Gaussian
/// elimination over Q.
fn rank_of_span(vectors: &[[i64; 3]]) -> u8 {
    let mut rows: Vec<[f64; 3]> = vectors
        .iter()
        .map(|v| [v[0] as f64, v[1] as f64, v[2] as f64])
        .collect();

    let mut rank = 0usize;
    for col in 0..3 {
        let pivot = (rank..rows.len()).find(|&r| rows[r][col].abs() > 1e-9);
        let Some(pivot) = pivot else { continue };
        rows.swap(rank, pivot);
        let pivot_val = rows[rank][col];
        for r in 0..rows.len() {
            if r == rank {
                continue;
            }
            let factor = rows[r][col] / pivot_val;
            if factor != 0.0 {
                for c in 0..3 {
                    rows[r][c] -= factor * rows[rank][c];
                }
            }
        }
        rank += 1;
        if rank == 3 {
            break;
        }
    }
    rank as u8
}
