//! Net canonicalization (spec component C8): fold every vertex into the
//! unit cell, sort vertices lexicographically, and compensate edge offsets
//! for the resulting relabeling.

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::graph::{PeriodicEdge3D, PeriodicGraph3D};
use crate::rational::{Rat, RVec3};

/// A fully reduced, canonicalized crystal net: the asymmetric-unit form
/// consumed by downstream tooling. `equivalents` on `cell` is always empty
/// here — the net is expressed directly, not via a symmetry orbit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrystalNet {
    pub cell: Cell,
    pub types: Vec<String>,
    pub pos: Vec<RVec3>,
    pub graph: PeriodicGraph3D,
}

/// Split each vertex's placement into an integer lattice offset and a
/// fractional part in `[0,1)^3`, sort vertices lexicographically by that
/// fractional part, relabel the graph, and compensate every edge's offset
/// for the per-vertex shift.
pub fn canonicalize(
    cell: &Cell,
    types: &[String],
    graph: &PeriodicGraph3D,
    placement: &[RVec3],
) -> CrystalNet {
    let n = placement.len();
    let mut offsets: Vec<[Rat; 3]> = Vec::with_capacity(n);
    let mut fracs: Vec<RVec3> = Vec::with_capacity(n);

    for p in placement {
        let mut offset = [Rat::zero(), Rat::zero(), Rat::zero()];
        let mut frac = [Rat::zero(), Rat::zero(), Rat::zero()];
        for (i, x) in p.iter().enumerate() {
            let floor = x.floor_big();
            offset[i] = Rat::Big(num_rational::BigRational::from_integer(floor.clone())).narrow();
            frac[i] = x.back_to_unit();
        }
        offsets.push(offset);
        fracs.push(frac);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| fracs[a].cmp(&fracs[b]));

    // old index -> new index
    let mut new_index = vec![0usize; n];
    for (new_i, &old_i) in order.iter().enumerate() {
        new_index[old_i] = new_i;
    }

    let new_pos: Vec<RVec3> = order.iter().map(|&old_i| fracs[old_i].clone()).collect();
    let new_types: Vec<String> = order.iter().map(|&old_i| types[old_i].clone()).collect();

    let new_edges: Vec<PeriodicEdge3D> = graph
        .edges
        .iter()
        .map(|e| {
            let u_offset = &offsets[e.u];
            let v_offset = &offsets[e.v];
            let compensate = |axis: usize| -> i32 {
                use num_traits::ToPrimitive;
                let shift = v_offset[axis].sub(&u_offset[axis]);
                shift
                    .floor_big()
                    .to_i32()
                    .expect("lattice offset compensation fits in i32")
            };
            let new_offset = [
                e.offset[0] + compensate(0),
                e.offset[1] + compensate(1),
                e.offset[2] + compensate(2),
            ];
            PeriodicEdge3D::new(new_index[e.u], new_index[e.v], new_offset)
        })
        .collect();

    CrystalNet {
        cell: cell.with_equivalents(Vec::new()),
        types: new_types,
        pos: new_pos,
        graph: PeriodicGraph3D::new(n, new_edges),
    }
}
