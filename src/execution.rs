// src/execution.rs
//
// Execution backends for the stepping loop. The host backend runs the
// stencil kernel over rayon; the device backend (src/device.rs) runs the
// same kernel as WGSL compute passes. Both follow the same protocol per
// step: update writes fresh spins into a scratch buffer from the
// committed grid only, then exchange publishes the scratch buffer as the
// new committed grid.

use crate::diagnostics::{SiteInfo, Summary};
use crate::device::DeviceExec;
use crate::drive::DriveSample;
use crate::error::Result;
use crate::grid::Grid;
use crate::integrator::Integrator;
use rayon::prelude::*;

/// CPU backend. Holds the scratch spin buffer between steps so the
/// per-step allocation cost is paid once.
pub struct HostExec {
    integrator: Integrator,
    scratch: Vec<[f64; 3]>,
}

impl HostExec {
    pub fn new(grid: &Grid, integrator: Integrator) -> Self {
        Self {
            integrator,
            scratch: vec![[0.0; 3]; grid.len()],
        }
    }

    /// Stage + commit every site into scratch. Neighbor reads go through
    /// the stencil over the committed grid, so site order is free and the
    /// loop parallelizes without locks.
    fn update(&mut self, grid: &Grid, dt: f64, stages: &[DriveSample; 3]) {
        let st = grid.stencil();
        let gp = &grid.global;
        let integ = self.integrator;
        self.scratch
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, out)| {
                *out = integ.commit(&st, &grid.sites[i], gp, i, dt, stages);
            });
    }

    /// Serial twin of `update`, kept for determinism checks against the
    /// parallel path.
    pub fn update_serial(&mut self, grid: &Grid, dt: f64, stages: &[DriveSample; 3]) {
        let st = grid.stencil();
        let gp = &grid.global;
        for i in 0..grid.len() {
            self.scratch[i] = self.integrator.commit(&st, &grid.sites[i], gp, i, dt, stages);
        }
    }

    /// Publish scratch as the committed grid.
    pub fn exchange(&mut self, grid: &mut Grid) {
        std::mem::swap(&mut grid.spins, &mut self.scratch);
    }

    pub fn step(&mut self, grid: &mut Grid, dt: f64, stages: &[DriveSample; 3]) {
        self.update(grid, dt, stages);
        self.exchange(grid);
    }

    pub fn step_serial(&mut self, grid: &mut Grid, dt: f64, stages: &[DriveSample; 3]) {
        self.update_serial(grid, dt, stages);
        self.exchange(grid);
    }

    pub fn diagnostics(&self, grid: &Grid, field: [f64; 3]) -> Summary {
        let st = grid.stencil();
        let gp = &grid.global;
        let records: Vec<SiteInfo> = (0..grid.len())
            .into_par_iter()
            .map(|i| SiteInfo::compute(&st, &grid.sites[i], gp, i, field))
            .collect();
        Summary::reduce(records.into_iter(), grid.len())
    }
}

/// A stepping backend, selected at run setup.
pub enum Execution {
    Host(HostExec),
    Device(DeviceExec),
}

impl Execution {
    pub fn host(grid: &Grid, integrator: Integrator) -> Self {
        Self::Host(HostExec::new(grid, integrator))
    }

    pub fn device(grid: &Grid, integrator: Integrator) -> Result<Self> {
        Ok(Self::Device(DeviceExec::new(grid, integrator)?))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Host(_) => "host",
            Self::Device(_) => "device",
        }
    }

    /// Advance the committed grid by one step. The device backend keeps
    /// the authoritative spins on the GPU; `sync_spins` pulls them back
    /// when the host needs them.
    pub fn step(
        &mut self,
        grid: &mut Grid,
        time: f64,
        dt: f64,
        stages: &[DriveSample; 3],
    ) -> Result<()> {
        match self {
            Self::Host(h) => {
                h.step(grid, dt, stages);
                Ok(())
            }
            Self::Device(d) => d.step(time, dt, stages),
        }
    }

    pub fn diagnostics(&mut self, grid: &Grid, field: [f64; 3]) -> Result<Summary> {
        match self {
            Self::Host(h) => Ok(h.diagnostics(grid, field)),
            Self::Device(d) => d.diagnostics(field, grid.len()),
        }
    }

    /// Make `grid.spins` reflect the committed state. A no-op on the
    /// host, a read-back on the device.
    pub fn sync_spins(&mut self, grid: &mut Grid) -> Result<()> {
        match self {
            Self::Host(_) => Ok(()),
            Self::Device(d) => d.read_back_spins(grid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::{sample_stages, CurrentDrive, FieldDrive, TemperatureDrive};
    use crate::grid::{Boundary, Grid};
    use crate::params::{suggested_dt, QE};
    use crate::vec3::norm;

    fn test_grid() -> Grid {
        let mut g = Grid::new(8, 8);
        g.boundary = Boundary::periodic_both();
        g.set_exchange(1.0e-3 * QE);
        for (i, s) in g.spins.iter_mut().enumerate() {
            let a = i as f64 * 0.37;
            *s = [a.cos(), a.sin(), 0.5];
        }
        g.normalize_all();
        g
    }

    fn stages(dt: f64) -> [crate::drive::DriveSample; 3] {
        sample_stages(
            &FieldDrive::Constant([0.0, 0.0, 0.05]),
            &CurrentDrive::None,
            &TemperatureDrive::Zero,
            0.0,
            dt,
        )
    }

    #[test]
    fn parallel_matches_serial_bitwise() {
        let dt = suggested_dt(1.0e-3 * QE);
        let s = stages(dt);

        let mut ga = test_grid();
        let mut gb = ga.clone();
        let mut pa = HostExec::new(&ga, Integrator::Rk4);
        let mut pb = HostExec::new(&gb, Integrator::Rk4);
        for _ in 0..10 {
            pa.step(&mut ga, dt, &s);
            pb.step_serial(&mut gb, dt, &s);
        }
        for (a, b) in ga.spins.iter().zip(gb.spins.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn step_preserves_unit_norm() {
        let dt = suggested_dt(1.0e-3 * QE);
        let s = stages(dt);
        let mut g = test_grid();
        let mut exec = HostExec::new(&g, Integrator::Rk2);
        for _ in 0..25 {
            exec.step(&mut g, dt, &s);
        }
        for spin in &g.spins {
            assert!((norm(*spin) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn pinned_site_stays_fixed() {
        let dt = suggested_dt(1.0e-3 * QE);
        let s = stages(dt);
        let mut g = test_grid();
        g.pin_site(3, 3, [0.0, 0.0, -1.0]);
        let mut exec = HostExec::new(&g, Integrator::Rk4);
        for _ in 0..10 {
            exec.step(&mut g, dt, &s);
        }
        let i = g.idx(3, 3);
        assert_eq!(g.spins[i], [0.0, 0.0, -1.0]);
    }
}
