// src/integrator.rs
//
// Fixed-step explicit integrators over the per-site torque. A stage
// only ever perturbs the site's own spin; neighbor lookups stay on the
// committed grid, which is what makes the site-parallel update safe.

use crate::drive::DriveSample;
use crate::grid::Stencil;
use crate::kernel::dsdtau;
use crate::params::{GlobalParams, SiteParams};
use crate::vec3::{add, normalize, scale};

/// Integration scheme, fixed at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrator {
    Euler,
    Rk2,
    Rk4,
}

impl Integrator {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "euler" => Some(Self::Euler),
            "rk2" => Some(Self::Rk2),
            "rk4" => Some(Self::Rk4),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Euler => "euler",
            Self::Rk2 => "rk2",
            Self::Rk4 => "rk4",
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            Self::Euler => 0,
            Self::Rk2 => 1,
            Self::Rk4 => 2,
        }
    }

    /// Combined per-site increment Δ over one step of size `dt`.
    ///
    /// `stages` holds drive samples at t, t+dt/2 and t+dt; Euler uses
    /// the first, RK2 the first and last, RK4 all three (the two middle
    /// RK4 stages share the t+dt/2 sample).
    pub fn step_delta(
        &self,
        st: &Stencil,
        site: &SiteParams,
        gp: &GlobalParams,
        i: usize,
        dt: f64,
        stages: &[DriveSample; 3],
    ) -> [f64; 3] {
        match self {
            Self::Euler => {
                let k1 = dsdtau(st, site, gp, i, [0.0; 3], &stages[0]);
                scale(k1, dt)
            }
            Self::Rk2 => {
                let k1 = dsdtau(st, site, gp, i, [0.0; 3], &stages[0]);
                let k2 = dsdtau(st, site, gp, i, scale(k1, dt), &stages[2]);
                scale(add(k1, k2), 0.5 * dt)
            }
            Self::Rk4 => {
                let k1 = dsdtau(st, site, gp, i, [0.0; 3], &stages[0]);
                let k2 = dsdtau(st, site, gp, i, scale(k1, 0.5 * dt), &stages[1]);
                let k3 = dsdtau(st, site, gp, i, scale(k2, 0.5 * dt), &stages[1]);
                let k4 = dsdtau(st, site, gp, i, scale(k3, dt), &stages[2]);
                let sum = add(add(k1, scale(k2, 2.0)), add(scale(k3, 2.0), k4));
                scale(sum, dt / 6.0)
            }
        }
    }

    /// Committed value for site `i`: pinned sites clamp to their fixed
    /// direction, free sites renormalize after the increment.
    pub fn commit(
        &self,
        st: &Stencil,
        site: &SiteParams,
        gp: &GlobalParams,
        i: usize,
        dt: f64,
        stages: &[DriveSample; 3],
    ) -> [f64; 3] {
        match site.pin {
            Some(dir) => dir,
            None => {
                let delta = self.step_delta(st, site, gp, i, dt, stages);
                normalize(add(st.at(i), delta))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::{sample_stages, CurrentDrive, FieldDrive, TemperatureDrive};
    use crate::grid::{Boundary, Grid};
    use crate::params::QE;
    use crate::vec3::norm;

    fn single_site_grid() -> Grid {
        let mut g = Grid::new(1, 1);
        g.boundary = Boundary::periodic_both();
        g.set_exchange(1.0e-3 * QE);
        g.global.alpha = 0.0;
        g.spins[0] = [1.0, 0.0, 0.0];
        g
    }

    #[test]
    fn commit_preserves_unit_norm() {
        let g = single_site_grid();
        let stages = sample_stages(
            &FieldDrive::Constant([0.0, 0.0, 0.5]),
            &CurrentDrive::None,
            &TemperatureDrive::Zero,
            0.0,
            1.0e-2,
        );
        for integ in [Integrator::Euler, Integrator::Rk2, Integrator::Rk4] {
            let st = g.stencil();
            let s = integ.commit(&st, &g.sites[0], &g.global, 0, 1.0e-2, &stages);
            assert!((norm(s) - 1.0).abs() < 1e-15, "{}", integ.as_str());
        }
    }

    #[test]
    fn commit_clamps_pinned_site() {
        let mut g = single_site_grid();
        g.pin_site(0, 0, [0.0, 1.0, 0.0]);
        let stages = sample_stages(
            &FieldDrive::Constant([0.0, 0.0, 0.5]),
            &CurrentDrive::None,
            &TemperatureDrive::Zero,
            0.0,
            1.0e-2,
        );
        let st = g.stencil();
        let s = Integrator::Rk4.commit(&st, &g.sites[0], &g.global, 0, 1.0e-2, &stages);
        assert_eq!(s, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn rk4_beats_euler_on_one_step() {
        // Single macrospin precessing about ẑ has a closed-form solution;
        // compare one coarse step of each scheme against it.
        let g = single_site_grid();
        let hz = 0.5;
        let dt = 0.05;
        let stages = sample_stages(
            &FieldDrive::Constant([0.0, 0.0, hz]),
            &CurrentDrive::None,
            &TemperatureDrive::Zero,
            0.0,
            dt,
        );
        // Angular rate in normalized time (see kernel::dsdtau): the
        // numeric value is irrelevant, only convergence order matters,
        // so measure against RK4 with a tiny step as reference.
        let st = g.stencil();
        let mut reference = g.clone();
        for k in 0..64 {
            let t = k as f64 * dt / 64.0;
            let fs = sample_stages(
                &FieldDrive::Constant([0.0, 0.0, hz]),
                &CurrentDrive::None,
                &TemperatureDrive::Zero,
                t,
                dt / 64.0,
            );
            let stref = reference.stencil();
            let s = Integrator::Rk4.commit(&stref, &reference.sites[0], &reference.global, 0, dt / 64.0, &fs);
            reference.spins[0] = s;
        }
        let exact = reference.spins[0];

        let err = |integ: Integrator| {
            let s = integ.commit(&st, &g.sites[0], &g.global, 0, dt, &stages);
            let d = [s[0] - exact[0], s[1] - exact[1], s[2] - exact[2]];
            norm(d)
        };
        assert!(err(Integrator::Rk4) < err(Integrator::Euler));
        assert!(err(Integrator::Rk4) <= err(Integrator::Rk2));
    }
}
