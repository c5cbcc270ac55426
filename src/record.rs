//! The parsed CIF record this crate consumes, and the pure cleanup
//! transforms of spec component C4: duplicate-atom removal, collision
//! pruning, symmetry expansion, and atom filtering.

use std::collections::HashMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::operation::{discover_reference_identifiers, parse_symmetry_operator};

/// A metadata value as produced by the (external) CIF tokenizer: either a
/// single string or a sequence of strings (for looped CIF tags).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Scalar(String),
    List(Vec<String>),
}

/// Fractional position of a single atom.
pub type FracPos = Vector3<f64>;

/// A parsed, not-yet-reduced CIF description of a crystal: cell, element
/// palette, per-atom fractional positions, and a symmetric bond matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CifRecord {
    pub metadata: HashMap<String, MetaValue>,
    pub cell: crate::cell::Cell,
    /// `types[ids[i] - 1]` is the element symbol of atom `i`.
    pub types: Vec<String>,
    pub ids: Vec<usize>,
    pub pos: Vec<FracPos>,
    /// Symmetric, zero-diagonal adjacency matrix, row-major.
    pub bonds: Vec<Vec<bool>>,
}

impl CifRecord {
    pub fn num_atoms(&self) -> usize {
        self.pos.len()
    }

    pub fn symbol(&self, i: usize) -> &str {
        &self.types[self.ids[i] - 1]
    }

    /// Reference identifiers discovered from this record's symmetry-operator
    /// strings, or the default `("x", "y", "z")`.
    pub fn reference_identifiers(symmetry_strings: &[String]) -> [String; 3] {
        discover_reference_identifiers(symmetry_strings)
    }

    /// Parse a set of `"x,y,z"`-style operator strings into this record's
    /// cell, using identifiers discovered from the set itself.
    pub fn equivalents_from_strings(
        symmetry_strings: &[String],
    ) -> Result<Vec<crate::operation::EquivalentPosition>, crate::error::NetError> {
        let ids = Self::reference_identifiers(symmetry_strings);
        symmetry_strings
            .iter()
            .map(|s| parse_symmetry_operator(s, &ids))
            .collect()
    }
}

/// Euclidean norm of a fractional-coordinate difference, folded to
/// `(-0.5, 0.5]` in each component before taking the norm — the "periodic
/// distance" used throughout C4/C5.
pub fn periodic_distance_frac(a: &FracPos, b: &FracPos) -> FracPos {
    let mut d = a - b;
    for k in 0..3 {
        d[k] -= d[k].round();
        // fold exact 0.5 boundary into (-0.5, 0.5] consistently
        if d[k] <= -0.5 {
            d[k] += 1.0;
        }
    }
    d
}

fn periodic_distance_cartesian(
    cell: &crate::cell::Cell,
    a: &FracPos,
    b: &FracPos,
) -> f64 {
    let folded = periodic_distance_frac(a, b);
    cell.cartesian(&folded).norm()
}

/// Sort vertices by fractional position lexicographically; collapse runs of
/// consecutive positions within `threshold` Euclidean (fractional) norm of
/// each other, keeping the smallest original index. Emits a warning through
/// `warn` when anything is removed.
pub fn remove_partial_occupancy(
    record: &CifRecord,
    threshold: f64,
    warn: impl Fn(&str),
) -> CifRecord {
    let mut order: Vec<usize> = (0..record.num_atoms()).collect();
    order.sort_by(|&i, &j| {
        lexicographic_cmp(&record.pos[i], &record.pos[j]).then(i.cmp(&j))
    });

    let mut keep: Vec<bool> = vec![true; record.num_atoms()];
    let mut removed = 0usize;
    let mut i = 0;
    while i + 1 < order.len() {
        let a = order[i];
        let b = order[i + 1];
        let dist = (record.pos[a] - record.pos[b]).norm();
        if dist < threshold {
            let (survivor, loser) = if a < b { (a, b) } else { (b, a) };
            keep[loser] = false;
            removed += 1;
            // continue comparing the survivor against the next entry
            order[i + 1] = survivor;
        }
        i += 1;
    }

    if removed > 0 {
        warn(&format!(
            "remove_partial_occupancy: dropped {removed} duplicate atom(s)"
        ));
    }

    let keep_set: Vec<usize> = (0..record.num_atoms()).filter(|&i| keep[i]).collect();
    keep_atoms(record, &keep_set)
}

/// Remove every vertex participating in any pair whose periodic distance is
/// below `threshold` Angstrom.
pub fn prune_collisions(record: &CifRecord, threshold: f64, warn: impl Fn(&str)) -> CifRecord {
    let n = record.num_atoms();
    let mut bad = vec![false; n];
    for i in 0..n {
        for j in (i + 1)..n {
            if periodic_distance_cartesian(&record.cell, &record.pos[i], &record.pos[j]) < threshold
            {
                bad[i] = true;
                bad[j] = true;
            }
        }
    }
    let removed = bad.iter().filter(|&&b| b).count();
    if removed > 0 {
        warn(&format!(
            "prune_collisions: removed {removed} colliding atom(s)"
        ));
    }
    let keep_set: Vec<usize> = (0..n).filter(|&i| !bad[i]).collect();
    keep_atoms(record, &keep_set)
}

/// Apply every equivalent position attached to the cell to every current
/// vertex, folding images into `[0,1)^3` and merging onto an existing
/// vertex within 0.5 Angstrom periodic distance, or appending a new one.
/// Bonds are propagated to every generated image pair, then the result is
/// passed through [`prune_collisions`].
pub fn expand_symmetry(
    record: &CifRecord,
    collision_threshold: f64,
    warn: impl Fn(&str) + Copy,
) -> CifRecord {
    const MERGE_THRESHOLD: f64 = 0.5;

    let mut pos = record.pos.clone();
    let mut ids = record.ids.clone();
    let n0 = record.num_atoms();

    // image_of[(gen_index, atom_index)] = vertex index the image maps to
    let mut image_of = vec![vec![0usize; n0]; record.cell.equivalents.len()];

    for (g, eq) in record.cell.equivalents.iter().enumerate() {
        for v in 0..n0 {
            let p = apply_fractional(eq, &record.pos[v]);
            let p = fold_unit_cube(&p);

            let existing = (0..pos.len()).find(|&w| {
                periodic_distance_cartesian(&record.cell, &p, &pos[w]) < MERGE_THRESHOLD
            });
            let target = match existing {
                Some(w) => w,
                None => {
                    pos.push(p);
                    ids.push(ids[v]);
                    pos.len() - 1
                }
            };
            image_of[g][v] = target;
        }
    }

    let n = pos.len();
    let mut bonds = vec![vec![false; n]; n];
    for i in 0..n0 {
        for j in 0..n0 {
            if record.bonds[i][j] {
                for g in 0..record.cell.equivalents.len() {
                    let (a, b) = (image_of[g][i], image_of[g][j]);
                    if a != b {
                        bonds[a][b] = true;
                        bonds[b][a] = true;
                    }
                }
            }
        }
    }
    // identity is always implicitly present
    for i in 0..n0 {
        for j in 0..n0 {
            if record.bonds[i][j] {
                bonds[i][j] = true;
                bonds[j][i] = true;
            }
        }
    }

    let expanded = CifRecord {
        metadata: record.metadata.clone(),
        cell: record.cell.clone(),
        types: record.types.clone(),
        ids,
        pos,
        bonds,
    };
    prune_collisions(&expanded, collision_threshold, warn)
}

/// Restrict to the given set of vertex indices, dropping element-palette
/// entries no remaining vertex references and remapping ids densely.
pub fn keep_atoms(record: &CifRecord, keep: &[usize]) -> CifRecord {
    let mut index_of_old: Vec<Option<usize>> = vec![None; record.num_atoms()];
    for (new_i, &old_i) in keep.iter().enumerate() {
        index_of_old[old_i] = Some(new_i);
    }

    let pos: Vec<FracPos> = keep.iter().map(|&i| record.pos[i]).collect();
    let old_ids: Vec<usize> = keep.iter().map(|&i| record.ids[i]).collect();

    let mut used_old_type_ids: Vec<usize> = old_ids.clone();
    used_old_type_ids.sort_unstable();
    used_old_type_ids.dedup();
    let remap: HashMap<usize, usize> = used_old_type_ids
        .iter()
        .enumerate()
        .map(|(new_idx, &old_idx)| (old_idx, new_idx + 1))
        .collect();

    let types: Vec<String> = used_old_type_ids
        .iter()
        .map(|&old_idx| record.types[old_idx - 1].clone())
        .collect();
    let ids: Vec<usize> = old_ids.iter().map(|old| remap[old]).collect();

    let n = keep.len();
    let mut bonds = vec![vec![false; n]; n];
    for (a, &old_a) in keep.iter().enumerate() {
        for (b, &old_b) in keep.iter().enumerate() {
            bonds[a][b] = record.bonds[old_a][old_b];
        }
    }

    CifRecord {
        metadata: record.metadata.clone(),
        cell: record.cell.clone(),
        types,
        ids,
        pos,
        bonds,
    }
}

fn lexicographic_cmp(a: &FracPos, b: &FracPos) -> std::cmp::Ordering {
    for k in 0..3 {
        match a[k].partial_cmp(&b[k]) {
            Some(std::cmp::Ordering::Equal) | None => continue,
            Some(ord) => return ord,
        }
    }
    std::cmp::Ordering::Equal
}

fn fold_unit_cube(v: &FracPos) -> FracPos {
    Vector3::new(
        v[0] - v[0].floor(),
        v[1] - v[1].floor(),
        v[2] - v[2].floor(),
    )
}

/// Apply an exact-rational equivalent position to an approximate (f64)
/// fractional position: CIF atom coordinates are themselves only
/// approximate, so there is nothing to gain from routing them through
/// [`Rat`](crate::rational::Rat) arithmetic here — only the final
/// barycentric placement computed later, from the reduced graph, needs
/// to be exact.
fn apply_fractional(eq: &crate::operation::EquivalentPosition, v: &FracPos) -> FracPos {
    let m = |i: usize, j: usize| eq.m[i][j].to_f64();
    let t = |i: usize| eq.t[i].to_f64();
    Vector3::new(
        m(0, 0) * v[0] + m(0, 1) * v[1] + m(0, 2) * v[2] + t(0),
        m(1, 0) * v[0] + m(1, 1) * v[1] + m(1, 2) * v[2] + t(1),
        m(2, 0) * v[0] + m(2, 1) * v[1] + m(2, 2) * v[2] + t(2),
    )
}
