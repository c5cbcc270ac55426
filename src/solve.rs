//! Equilibrium solver (spec component C7): builds the barycentric linear
//! system for a periodic graph and solves it exactly over Q via Dixon's
//! p-adic lifting, then picks a uniform integer width for the result.

use num_bigint::BigInt;
use num_integer::{Integer, Roots};
use num_rational::BigRational;
use num_traits::{One, ToPrimitive, Zero};

use crate::collab::{IntMatrix, LinearSolver, RationalMatrix};
use crate::error::NetError;
use crate::graph::PeriodicGraph3D;
use crate::rational::{rvec3_zero, select_uniform_width, Rat, Width, RVec3};

/// A Mersenne prime comfortably inside `i64`, used as the lifting base.
const DIXON_PRIME: i64 = 2_147_483_647;
const MAX_LIFT_ITERS: usize = 48;

/// Default [`LinearSolver`]: Dixon's p-adic lifting algorithm. Solves
/// `A x = y` exactly over the rationals by computing `A^-1` once modulo a
/// prime, lifting the solution p-adically, and recovering each rational
/// entry via continued-fraction reconstruction.
#[derive(Debug, Default, Clone, Copy)]
pub struct DixonSolver;

impl LinearSolver for DixonSolver {
    fn dixon_solve(&self, a: &IntMatrix, y: &IntMatrix) -> Result<RationalMatrix, NetError> {
        let m = a.len();
        if m == 0 {
            return Ok(Vec::new());
        }
        let k = y[0].len();
        let p = DIXON_PRIME;

        let a_inv = invert_mod_p(a, p).ok_or_else(|| {
            NetError::Collaborator("coefficient matrix is singular modulo the lifting prime".into())
        })?;

        let mut r: Vec<Vec<BigInt>> = y.to_vec();
        let mut x: Vec<Vec<BigInt>> = vec![vec![BigInt::zero(); k]; m];
        let mut pk = BigInt::one();
        let p_big = BigInt::from(p);

        for _ in 0..MAX_LIFT_ITERS {
            if is_zero_matrix(&r) {
                break;
            }

            let mut c = vec![vec![0i64; k]; m];
            for i in 0..m {
                for col in 0..k {
                    let mut acc: i128 = 0;
                    for j in 0..m {
                        let rj = mod_i64(&r[j][col], p);
                        acc += a_inv[i][j] as i128 * rj as i128;
                    }
                    c[i][col] = acc.rem_euclid(p as i128) as i64;
                }
            }

            for i in 0..m {
                for col in 0..k {
                    x[i][col] += BigInt::from(c[i][col]) * &pk;
                }
            }

            let mut new_r = vec![vec![BigInt::zero(); k]; m];
            for i in 0..m {
                for col in 0..k {
                    let mut acc = BigInt::zero();
                    for j in 0..m {
                        acc += &a[i][j] * BigInt::from(c[j][col]);
                    }
                    let diff = &r[i][col] - &acc;
                    new_r[i][col] = &diff / &p_big;
                }
            }
            r = new_r;
            pk *= &p_big;
        }

        let modulus = pk;
        let mut out = vec![vec![BigRational::zero(); k]; m];
        for i in 0..m {
            for col in 0..k {
                let (num, den) = rational_reconstruct(&x[i][col], &modulus)
                    .ok_or(NetError::SolverOverflow)?;
                out[i][col] = BigRational::new(num, den);
            }
        }

        for i in 0..m {
            for col in 0..k {
                let mut acc = BigRational::zero();
                for j in 0..m {
                    acc = acc + BigRational::from_integer(a[i][j].clone()) * out[j][col].clone();
                }
                if acc != BigRational::from_integer(y[i][col].clone()) {
                    return Err(NetError::SolverOverflow);
                }
            }
        }

        Ok(out)
    }
}

fn is_zero_matrix(m: &[Vec<BigInt>]) -> bool {
    m.iter().all(|row| row.iter().all(|v| v.is_zero()))
}

fn mod_i64(x: &BigInt, p: i64) -> i64 {
    let pb = BigInt::from(p);
    x.mod_floor(&pb).to_i64().expect("reduced mod p fits in i64")
}

fn mod_inverse(a: i64, p: i64) -> Option<i64> {
    let (mut old_r, mut r) = (a.rem_euclid(p), p);
    let (mut old_s, mut s) = (1i64, 0i64);
    while r != 0 {
        let q = old_r / r;
        let new_r = old_r - q * r;
        old_r = r;
        r = new_r;
        let new_s = old_s - q * s;
        old_s = s;
        s = new_s;
    }
    if old_r != 1 {
        None
    } else {
        Some(old_s.rem_euclid(p))
    }
}

/// Gauss-Jordan inversion of `a` modulo the prime `p`. `None` if `a` is
/// singular mod `p` (the caller is expected to treat this as unlucky-prime
/// failure; with `DIXON_PRIME` fixed rather than retried, such a failure
/// surfaces as a collaborator error).
fn invert_mod_p(a: &IntMatrix, p: i64) -> Option<Vec<Vec<i64>>> {
    let m = a.len();
    let mut aug = vec![vec![0i64; 2 * m]; m];
    for i in 0..m {
        for j in 0..m {
            aug[i][j] = mod_i64(&a[i][j], p);
        }
        aug[i][m + i] = 1;
    }

    for col in 0..m {
        let pivot = (col..m).find(|&row| aug[row][col] != 0)?;
        aug.swap(col, pivot);
        let inv = mod_inverse(aug[col][col], p)?;
        for j in 0..2 * m {
            aug[col][j] = ((aug[col][j] as i128 * inv as i128).rem_euclid(p as i128)) as i64;
        }
        for row in 0..m {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0 {
                continue;
            }
            for j in 0..2 * m {
                let v = aug[row][j] as i128 - factor as i128 * aug[col][j] as i128;
                aug[row][j] = v.rem_euclid(p as i128) as i64;
            }
        }
    }

    Some(aug.into_iter().map(|row| row[m..].to_vec()).collect())
}

/// Recover `(num, den)` with `num/den ≡ a (mod m)` and
/// `|num|, den <= sqrt(m/2)`, via the extended Euclidean algorithm halted
/// early (Wang's rational reconstruction).
fn rational_reconstruct(a: &BigInt, m: &BigInt) -> Option<(BigInt, BigInt)> {
    let bound = (m / BigInt::from(2)).sqrt();
    let mut old_r = m.clone();
    let mut r = a.mod_floor(m);
    let mut old_s = BigInt::zero();
    let mut s = BigInt::one();

    while r > bound {
        if r.is_zero() {
            return None;
        }
        let q = &old_r / &r;
        let new_r = &old_r - &q * &r;
        old_r = r;
        r = new_r;
        let new_s = &old_s - &q * &s;
        old_s = s;
        s = new_s;
    }

    if s.is_zero() {
        return None;
    }
    if s < BigInt::zero() {
        Some((-r, -s))
    } else {
        Some((r, s))
    }
}

/// Build the reduced Laplacian-like system anchoring vertex 0 at the
/// origin, solve it, and select one uniform width for the whole placement.
pub fn equilibrium_placement(
    graph: &PeriodicGraph3D,
    solver: &dyn LinearSolver,
) -> Result<Vec<RVec3>, NetError> {
    let n = graph.n;
    if n == 0 {
        return Err(NetError::EmptyGraph);
    }
    if n == 1 {
        return Ok(vec![rvec3_zero()]);
    }

    let m = n - 1;
    let mut a: IntMatrix = vec![vec![BigInt::zero(); m]; m];
    let mut y: IntMatrix = vec![vec![BigInt::zero(); 3]; m];

    for i in 1..n {
        let row = i - 1;
        let mut deg: i64 = 0;
        let mut offset_sum = [0i64; 3];
        for (j, o) in graph.neighbors(i) {
            if j == i {
                continue;
            }
            deg += 1;
            offset_sum[0] += o[0] as i64;
            offset_sum[1] += o[1] as i64;
            offset_sum[2] += o[2] as i64;
            if j != 0 {
                let col = j - 1;
                a[row][col] += BigInt::one();
            }
        }
        a[row][row] -= BigInt::from(deg);
        for k in 0..3 {
            y[row][k] = BigInt::from(-offset_sum[k]);
        }
    }

    let solved = solver.dixon_solve(&a, &y)?;

    let mut placement = vec![rvec3_zero(); n];
    for i in 1..n {
        let row = &solved[i - 1];
        placement[i] = [
            Rat::Big(row[0].clone()).narrow(),
            Rat::Big(row[1].clone()).narrow(),
            Rat::Big(row[2].clone()).narrow(),
        ];
    }

    let all_values: Vec<Rat> = placement.iter().flatten().cloned().collect();
    let width = select_uniform_width(&all_values);
    for v in placement.iter_mut() {
        for x in v.iter_mut() {
            *x = x.to_width(width);
        }
    }

    Ok(placement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PeriodicEdge3D;

    #[test]
    fn test_two_vertex_chain_places_midpoint() {
        // 0-1 bonded across a single cell boundary: X[0]=0. Vertex 1's only
        // neighbor descriptor (from its own side of the edge) is (0,[-1,0,0]),
        // so equilibrium requires X[1] = X[0] + (-1,0,0) = (-1,0,0) exactly.
        let edges = vec![PeriodicEdge3D::new(0, 1, [1, 0, 0])];
        let g = PeriodicGraph3D::new(2, edges);
        let placement = equilibrium_placement(&g, &DixonSolver).unwrap();
        assert_eq!(placement[0], rvec3_zero());
        assert_eq!(placement[1], [Rat::from_i64(-1), Rat::zero(), Rat::zero()]);

        // Testable property 7: deg(i)*X[i] == sum over neighbors of (X[j]+o).
        for i in 0..g.n {
            let deg = g.degree(i);
            let mut rhs = rvec3_zero();
            for (j, o) in g.neighbors(i) {
                for k in 0..3 {
                    rhs[k] = rhs[k].add(&placement[j][k].add(&Rat::from_i64(o[k] as i64)));
                }
            }
            for k in 0..3 {
                let lhs = placement[i][k].mul(&Rat::from_i64(deg as i64));
                assert_eq!(lhs, rhs[k], "vertex {i} component {k}");
            }
        }
    }

    #[test]
    fn test_single_vertex_graph_places_at_origin() {
        let g = PeriodicGraph3D::new(1, vec![]);
        let placement = equilibrium_placement(&g, &DixonSolver).unwrap();
        assert_eq!(placement, vec![rvec3_zero()]);
    }

    #[test]
    fn test_cubic_corner_graph_places_all_at_origin() {
        // Primitive cubic: single vertex bonded to its own images along
        // all three axes. No reduction needed (n=1); equilibrium places
        // the only vertex at the origin trivially.
        let edges = vec![
            PeriodicEdge3D::new(0, 0, [1, 0, 0]),
            PeriodicEdge3D::new(0, 0, [0, 1, 0]),
            PeriodicEdge3D::new(0, 0, [0, 0, 1]),
        ];
        let g = PeriodicGraph3D::new(1, edges);
        let placement = equilibrium_placement(&g, &DixonSolver).unwrap();
        assert_eq!(placement, vec![rvec3_zero()]);
    }

    /// Scenario 5's width claim ("width selection picks `Int8`"), exercised
    /// against the reduced Laplacian directly rather than only checking
    /// that folded positions land on the origin: this is the 8-vertex
    /// quotient graph of a primitive cubic net (one vertex per corner of
    /// the unit cell, bonded to its neighbor along each axis with the
    /// offset that crosses that axis's cell boundary). No vertex is
    /// degree <= 2, so `trim_topology` leaves all 8 in place and the
    /// solver runs on the full system rather than the trivial n=1 case.
    #[test]
    fn test_cube_quotient_graph_selects_width_i8() {
        let idx = |bx: usize, by: usize, bz: usize| bx * 4 + by * 2 + bz;
        let mut edges = Vec::new();
        for &by in &[0usize, 1] {
            for &bz in &[0usize, 1] {
                edges.push(PeriodicEdge3D::new(idx(0, by, bz), idx(1, by, bz), [-1, 0, 0]));
            }
        }
        for &bx in &[0usize, 1] {
            for &bz in &[0usize, 1] {
                edges.push(PeriodicEdge3D::new(idx(bx, 0, bz), idx(bx, 1, bz), [0, -1, 0]));
            }
        }
        for &bx in &[0usize, 1] {
            for &by in &[0usize, 1] {
                edges.push(PeriodicEdge3D::new(idx(bx, by, 0), idx(bx, by, 1), [0, 0, -1]));
            }
        }
        let g = PeriodicGraph3D::new(8, edges);
        let placement = equilibrium_placement(&g, &DixonSolver).unwrap();

        // Anchored at vertex 0 = (0,0,0), every other vertex's equilibrium
        // placement is exactly its own corner bit pattern.
        for bx in 0..2 {
            for by in 0..2 {
                for bz in 0..2 {
                    let v = idx(bx, by, bz);
                    assert_eq!(
                        placement[v],
                        [
                            Rat::from_i64(bx as i64),
                            Rat::from_i64(by as i64),
                            Rat::from_i64(bz as i64)
                        ]
                    );
                }
            }
        }

        let all_values: Vec<Rat> = placement.iter().flatten().cloned().collect();
        assert_eq!(select_uniform_width(&all_values), Width::W8);
        for v in &placement {
            for x in v {
                assert_eq!(x.width(), Width::W8);
            }
        }
    }
}
