use thiserror::Error;

#[derive(Error, Debug, Clone)]
/// Error types for the **netcryst** topology core
pub enum NetError {
    #[error("symmetry operator parse error: {0}")]
    SymmetryParseError(String),
    #[error("clustering mode requires atom-type information that is not available")]
    MissingAtomInformation,
    #[error("InputClustering requested but the crystal carries no clusters")]
    MissingClusters,
    #[error("input is not a single entangled 3-periodic net")]
    NonCrystallineInput,
    #[error("bond adjacency matrix is empty")]
    EmptyGraph,
    #[error("exact arithmetic exceeded arbitrary-precision resources")]
    SolverOverflow,
    #[error("collaborator failed: {0}")]
    Collaborator(String),
}
