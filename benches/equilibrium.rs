use criterion::{criterion_group, criterion_main, Criterion};

use netcryst::cell::{Cell, LatticeSystem};
use netcryst::graph::{PeriodicEdge3D, PeriodicGraph3D};
use netcryst::solve::{equilibrium_placement, DixonSolver};

/// A diamond-net-like periodic graph: `n` vertices in a single ring plus a
/// cross-cell chord, enough edges to exercise the reduced Laplacian without
/// needing a full CIF parse.
fn ring_graph(n: usize) -> PeriodicGraph3D {
    let mut edges = Vec::with_capacity(n);
    for i in 0..n {
        let j = (i + 1) % n;
        let offset = if j == 0 { [1, 0, 0] } else { [0, 0, 0] };
        edges.push(PeriodicEdge3D::new(i, j, offset));
    }
    edges.push(PeriodicEdge3D::new(0, n / 2, [0, 1, 0]));
    PeriodicGraph3D::new(n, edges)
}

fn benchmark(c: &mut Criterion) {
    let _cubic = Cell::from_parameters(
        10.0,
        10.0,
        10.0,
        90.0,
        90.0,
        90.0,
        LatticeSystem::Cubic,
        "P1".to_string(),
        1,
        vec![],
    );

    for &n in &[8usize, 32, 128] {
        let g = ring_graph(n);
        c.bench_function(&format!("equilibrium_placement_n{n}"), |b| {
            b.iter(|| equilibrium_placement(&g, &DixonSolver).unwrap())
        });
    }
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
