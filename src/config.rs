//! Pipeline configuration: the two warning/export gates as plain booleans,
//! plus the tolerance constants used across the cleanup and edge-building
//! stages, gathered into one injectable, testable value.

/// Tunables and gates for a single pipeline run. Read once per run rather
/// than consulted as opaque per-call predicates: simpler to test while
/// keeping the core free of global mutable state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Emit warnings for duplicate-atom removal, collision pruning, and
    /// dimensionality stripping.
    pub emit_warnings: bool,
    /// Automatically export the resulting net after a successful run.
    pub auto_export: bool,
    /// Fractional-coordinate threshold below which two atoms are the same
    /// site (`remove_partial_occupancy`).
    pub duplicate_threshold: f64,
    /// Cartesian-distance threshold below which two atoms collide
    /// (`prune_collisions`).
    pub collision_threshold: f64,
    /// Tolerance for treating two candidate offsets in the periodic edge
    /// builder as tied for the minimum distance.
    pub tie_tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            emit_warnings: true,
            auto_export: false,
            duplicate_threshold: 4e-4,
            collision_threshold: 0.55,
            tie_tolerance: 1e-3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_named_tolerances() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.duplicate_threshold, 4e-4);
        assert_eq!(cfg.collision_threshold, 0.55);
        assert_eq!(cfg.tie_tolerance, 1e-3);
        assert!(cfg.emit_warnings);
        assert!(!cfg.auto_export);
    }
}
