// src/energy.rs
//
// Whole-grid energy evaluation on top of the per-site kernel terms.

use crate::grid::Grid;
use crate::kernel;

/// Per-term energy totals over the grid (Joules).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyBreakdown {
    pub exchange: f64,
    pub dm: f64,
    pub field: f64,
    pub anisotropy: f64,
    pub cubic: f64,
}

impl EnergyBreakdown {
    pub fn total(&self) -> f64 {
        self.exchange + self.dm + self.field + self.anisotropy + self.cubic
    }
}

/// Evaluate every energy term against the committed grid, with the
/// external field already sampled at the time of interest.
pub fn compute_energy(grid: &Grid, field: [f64; 3]) -> EnergyBreakdown {
    let st = grid.stencil();
    let gp = &grid.global;
    let mut e = EnergyBreakdown::default();
    for (i, site) in grid.sites.iter().enumerate() {
        e.exchange += kernel::exchange_energy_at(&st, site, i);
        e.dm += kernel::dm_energy_at(&st, site, i);
        e.field += kernel::field_energy_at(&st, site, gp, i, field);
        e.anisotropy += kernel::anisotropy_energy_at(&st, site, i);
        e.cubic += kernel::cubic_energy_at(&st, site, i);
    }
    e
}

/// Total Hamiltonian of the committed grid.
pub fn total_energy(grid: &Grid, field: [f64; 3]) -> f64 {
    compute_energy(grid, field).total()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Boundary, Grid};
    use crate::params::{Anisotropy, QE};

    #[test]
    fn ferromagnetic_ground_state_energy() {
        // N aligned spins with periodic wrap: 4 bonds per site, each
        // counted half, E_exch = -N * 2J.
        let mut g = Grid::new(4, 4);
        g.boundary = Boundary::periodic_both();
        let j = 1.0e-3 * QE;
        g.set_exchange(j);
        let e = compute_energy(&g, [0.0, 0.0, 0.0]);
        let expected = -(g.len() as f64) * 2.0 * j;
        assert!((e.exchange - expected).abs() < 1e-25);
        assert_eq!(e.dm, 0.0);
        assert_eq!(e.field, 0.0);
    }

    #[test]
    fn anisotropy_energy_of_easy_axis_state() {
        let mut g = Grid::new(2, 2);
        let k = 0.1e-3 * QE;
        g.set_anisotropy(Anisotropy {
            k,
            axis: [0.0, 0.0, 1.0],
        });
        let e = compute_energy(&g, [0.0, 0.0, 0.0]);
        assert!((e.anisotropy - (-(g.len() as f64) * k)).abs() < 1e-28);
    }

    #[test]
    fn total_energy_is_clone_invariant() {
        let mut g = Grid::new(6, 6);
        g.boundary = Boundary::periodic_both();
        g.set_exchange(1.0e-3 * QE);
        g.spins[7] = [0.6, 0.0, 0.8];
        let copy = g.clone();
        let h = [0.0, 0.0, 0.3];
        assert_eq!(total_energy(&g, h), total_energy(&copy, h));
    }
}
