//! Clustering selector (spec component C9): decides how atoms group into
//! net vertices and dispatches to the appropriate collaborator.

use crate::collab::{Clusters, Crystal, SbuCoalescer, SbuFinder, WithClusters, WithoutClusters};
use crate::error::NetError;

/// Which clustering strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display)]
pub enum ClusteringMode {
    InputClustering,
    EachVertexClustering,
    MOFClustering,
    GuessClustering,
    AutomaticClustering,
}

/// Run the selected clustering mode, producing a crystal with no remaining
/// cluster assignment (one vertex per net site), ready for edge building.
pub fn select_clustering(
    mode: ClusteringMode,
    crystal: Crystal<WithClusters>,
    finder: &dyn SbuFinder,
    coalescer: &dyn SbuCoalescer,
) -> Result<Crystal<WithoutClusters>, NetError> {
    match mode {
        ClusteringMode::InputClustering => input_clustering(crystal, coalescer),
        ClusteringMode::EachVertexClustering => Ok(each_vertex_clustering(crystal)),
        ClusteringMode::MOFClustering => mof_clustering(crystal, finder, coalescer),
        ClusteringMode::GuessClustering => guess_clustering(crystal, finder, coalescer),
        ClusteringMode::AutomaticClustering => {
            automatic_clustering(crystal, finder, coalescer)
        }
    }
}

fn input_clustering(
    crystal: Crystal<WithClusters>,
    coalescer: &dyn SbuCoalescer,
) -> Result<Crystal<WithoutClusters>, NetError> {
    if crystal.clusters.is_none() {
        return Err(NetError::MissingClusters);
    }
    Ok(coalescer.coalesce(&crystal))
}

fn each_vertex_clustering(crystal: Crystal<WithClusters>) -> Crystal<WithoutClusters> {
    let mut out = crystal.retag::<WithoutClusters>();
    out.clusters = None;
    out
}

fn mof_clustering(
    crystal: Crystal<WithClusters>,
    finder: &dyn SbuFinder,
    coalescer: &dyn SbuCoalescer,
) -> Result<Crystal<WithoutClusters>, NetError> {
    let without = each_vertex_clustering(crystal);
    let found: Clusters = finder.find_sbus(&without)?;
    if found.members.len() <= 1 {
        return Err(NetError::MissingAtomInformation);
    }
    let mut with_clusters = without.retag::<WithClusters>();
    with_clusters.clusters = Some(found);
    Ok(coalescer.coalesce(&with_clusters))
}

fn guess_clustering(
    crystal: Crystal<WithClusters>,
    finder: &dyn SbuFinder,
    coalescer: &dyn SbuCoalescer,
) -> Result<Crystal<WithoutClusters>, NetError> {
    match mof_clustering(crystal.clone(), finder, coalescer) {
        Ok(result) if result.graph.n > 1 => Ok(result),
        Ok(_) | Err(NetError::MissingAtomInformation) => Ok(each_vertex_clustering(crystal)),
        Err(other) => Err(other),
    }
}

fn automatic_clustering(
    crystal: Crystal<WithClusters>,
    finder: &dyn SbuFinder,
    coalescer: &dyn SbuCoalescer,
) -> Result<Crystal<WithoutClusters>, NetError> {
    if crystal.clusters.is_some() {
        input_clustering(crystal, coalescer)
    } else {
        guess_clustering(crystal, finder, coalescer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, LatticeSystem};
    use crate::graph::PeriodicGraph3D;

    fn trivial_crystal(clusters: Option<Clusters>) -> Crystal<WithClusters> {
        let cell = Cell::from_parameters(
            10.0, 10.0, 10.0, 90.0, 90.0, 90.0, LatticeSystem::Cubic, "P1".to_string(), 1, vec![],
        );
        Crystal::new(
            cell,
            vec!["C".to_string()],
            PeriodicGraph3D::new(1, vec![]),
            vec![crate::rational::rvec3_zero()],
            clusters,
        )
    }

    struct IdentityCoalescer;
    impl SbuCoalescer for IdentityCoalescer {
        fn coalesce(&self, crystal: &Crystal<WithClusters>) -> Crystal<WithoutClusters> {
            crystal.clone().retag()
        }
    }

    struct NoSbuFinder;
    impl SbuFinder for NoSbuFinder {
        fn find_sbus(&self, _crystal: &Crystal<WithoutClusters>) -> Result<Clusters, NetError> {
            Ok(Clusters { members: vec![vec![0]] })
        }
    }

    #[test]
    fn test_input_clustering_requires_clusters() {
        let crystal = trivial_crystal(None);
        let result = select_clustering(
            ClusteringMode::InputClustering,
            crystal,
            &NoSbuFinder,
            &IdentityCoalescer,
        );
        assert!(matches!(result, Err(NetError::MissingClusters)));
    }

    #[test]
    fn test_mof_clustering_rejects_single_cluster() {
        let crystal = trivial_crystal(None);
        let result = select_clustering(
            ClusteringMode::MOFClustering,
            crystal,
            &NoSbuFinder,
            &IdentityCoalescer,
        );
        assert!(matches!(result, Err(NetError::MissingAtomInformation)));
    }

    #[test]
    fn test_guess_clustering_falls_back_to_each_vertex() {
        let crystal = trivial_crystal(None);
        let result = select_clustering(
            ClusteringMode::GuessClustering,
            crystal,
            &NoSbuFinder,
            &IdentityCoalescer,
        )
        .unwrap();
        assert_eq!(result.graph.n, 1);
    }
}
