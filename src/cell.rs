//! Triclinic cell geometry: `(a,b,c,alpha,beta,gamma)` in Angstrom/degrees
//! converted to and from a Cartesian basis matrix.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::operation::EquivalentPosition;

/// Lattice system tag, matching the IUCr triclinic/.../cubic classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatticeSystem {
    Triclinic,
    Monoclinic,
    Orthorhombic,
    Tetragonal,
    Trigonal,
    Hexagonal,
    Cubic,
}

/// Crystal cell geometry plus the symmetry operators attached to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub lattice_system: LatticeSystem,
    /// Hermann-Mauguin space-group symbol, e.g. `"P1"`.
    pub hm_symbol: String,
    /// Tabulated space-group number (1..230), 0 if unknown.
    pub group_number: u32,
    /// Columns are the Cartesian coordinates of the a, b, c basis vectors;
    /// upper-triangular with a along x and b in the xy-plane.
    pub basis: Matrix3<f64>,
    pub equivalents: Vec<EquivalentPosition>,
}

impl Cell {
    /// Build the Cartesian basis from `(a, b, c, alpha, beta, gamma)`
    /// (Angstrom, degrees).
    pub fn from_parameters(
        a: f64,
        b: f64,
        c: f64,
        alpha_deg: f64,
        beta_deg: f64,
        gamma_deg: f64,
        lattice_system: LatticeSystem,
        hm_symbol: String,
        group_number: u32,
        equivalents: Vec<EquivalentPosition>,
    ) -> Self {
        let alpha = alpha_deg.to_radians();
        let beta = beta_deg.to_radians();
        let gamma = gamma_deg.to_radians();

        let cos_a = alpha.cos();
        let cos_b = beta.cos();
        let cos_g = gamma.cos();
        let sin_g = gamma.sin();

        let omega_sq = 1.0 - cos_a * cos_a - cos_b * cos_b - cos_g * cos_g + 2.0 * cos_a * cos_b * cos_g;
        let omega = omega_sq.max(0.0).sqrt();

        #[rustfmt::skip]
        let basis = Matrix3::new(
            a, b * cos_g, c * cos_b,
            0.0, b * sin_g, c * (cos_a - cos_b * cos_g) / sin_g,
            0.0, 0.0, c * omega / sin_g,
        );

        Self {
            lattice_system,
            hm_symbol,
            group_number,
            basis,
            equivalents,
        }
    }

    /// Recover `(a, b, c, alpha, beta, gamma)` from the Cartesian basis.
    pub fn cell_parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let col = |i: usize| Vector3::new(self.basis[(0, i)], self.basis[(1, i)], self.basis[(2, i)]);
        let (a_vec, b_vec, c_vec) = (col(0), col(1), col(2));
        let a = a_vec.norm();
        let b = b_vec.norm();
        let c = c_vec.norm();
        let alpha = (b_vec.dot(&c_vec) / (b * c)).clamp(-1.0, 1.0).acos().to_degrees();
        let beta = (a_vec.dot(&c_vec) / (a * c)).clamp(-1.0, 1.0).acos().to_degrees();
        let gamma = (a_vec.dot(&b_vec) / (a * b)).clamp(-1.0, 1.0).acos().to_degrees();
        (a, b, c, alpha, beta, gamma)
    }

    /// Return a copy of this cell with its equivalents replaced.
    pub fn with_equivalents(&self, equivalents: Vec<EquivalentPosition>) -> Self {
        Self {
            equivalents,
            ..self.clone()
        }
    }

    /// Return a copy of this cell with its basis matrix replaced.
    pub fn with_basis(&self, basis: Matrix3<f64>) -> Self {
        Self {
            basis,
            ..self.clone()
        }
    }

    pub fn cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.basis * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cubic_cell_is_scaled_identity() {
        let cell = Cell::from_parameters(
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
        assert_relative_eq!(cell.basis, Matrix3::identity() * 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cell_parameters_roundtrip() {
        let cell = Cell::from_parameters(
            5.0,
            6.0,
            7.0,
            80.0,
            95.0,
            100.0,
            LatticeSystem::Triclinic,
            "P1".to_string(),
            1,
            vec![],
        );
        let (a, b, c, alpha, beta, gamma) = cell.cell_parameters();
        assert_relative_eq!(a, 5.0, epsilon = 1e-8);
        assert_relative_eq!(b, 6.0, epsilon = 1e-8);
        assert_relative_eq!(c, 7.0, epsilon = 1e-8);
        assert_relative_eq!(alpha, 80.0, epsilon = 1e-6);
        assert_relative_eq!(beta, 95.0, epsilon = 1e-6);
        assert_relative_eq!(gamma, 100.0, epsilon = 1e-6);
    }
}
