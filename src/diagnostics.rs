// src/diagnostics.rs
//
// Per-site diagnostic records and their host-side reduction, plus the
// CSV stream written at the information interval.
//
// The per-site record layout (INFO_STRIDE f64 slots) is shared with the
// device diagnostics kernel; `SiteInfo::from_slots` is the read-back
// path and `SiteInfo::compute` the host path.

use crate::grid::Stencil;
use crate::kernel;
use crate::params::{GlobalParams, SiteParams};
use crate::topology::{charge_center_at, charge_finite_at, charge_lattice_at};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// f64 slots per site in the packed diagnostics record.
pub const INFO_STRIDE: usize = 13;

/// One site's contribution to the step diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteInfo {
    pub energy: f64,
    pub exchange_energy: f64,
    pub dm_energy: f64,
    pub field_energy: f64,
    pub anisotropy_energy: f64,
    pub cubic_energy: f64,
    pub charge_finite: f64,
    pub charge_lattice: f64,
    pub m: [f64; 3],
    pub charge_center_x: f64,
    pub charge_center_y: f64,
}

impl SiteInfo {
    /// Host evaluation against the committed grid.
    pub fn compute(
        st: &Stencil,
        site: &SiteParams,
        gp: &GlobalParams,
        i: usize,
        field: [f64; 3],
    ) -> Self {
        let a = gp.lattice;
        let exchange_energy = kernel::exchange_energy_at(st, site, i);
        let dm_energy = kernel::dm_energy_at(st, site, i);
        let field_energy = kernel::field_energy_at(st, site, gp, i, field);
        let anisotropy_energy = kernel::anisotropy_energy_at(st, site, i);
        let cubic_energy = kernel::cubic_energy_at(st, site, i);
        let (charge_center_x, charge_center_y) = charge_center_at(st, i, a, a);
        Self {
            energy: exchange_energy + dm_energy + field_energy + anisotropy_energy + cubic_energy,
            exchange_energy,
            dm_energy,
            field_energy,
            anisotropy_energy,
            cubic_energy,
            charge_finite: charge_finite_at(st, i, a, a),
            charge_lattice: charge_lattice_at(st, i),
            m: st.at(i),
            charge_center_x,
            charge_center_y,
        }
    }

    /// Decode one record read back from the device info buffer.
    pub fn from_slots(slots: &[f64]) -> Self {
        debug_assert!(slots.len() >= INFO_STRIDE);
        Self {
            energy: slots[0],
            exchange_energy: slots[1],
            dm_energy: slots[2],
            field_energy: slots[3],
            anisotropy_energy: slots[4],
            cubic_energy: slots[5],
            charge_finite: slots[6],
            charge_lattice: slots[7],
            m: [slots[8], slots[9], slots[10]],
            charge_center_x: slots[11],
            charge_center_y: slots[12],
        }
    }
}

/// Reduced (grid-total) diagnostics for one recorded step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Summary {
    pub energy: f64,
    pub exchange_energy: f64,
    pub dm_energy: f64,
    pub field_energy: f64,
    pub anisotropy_energy: f64,
    pub cubic_energy: f64,
    pub charge_finite: f64,
    pub charge_lattice: f64,
    pub avg_m: [f64; 3],
    pub charge_center_x: f64,
    pub charge_center_y: f64,
}

impl Summary {
    /// Sum per-site records; magnetization is averaged over `n` sites.
    pub fn reduce(records: impl Iterator<Item = SiteInfo>, n: usize) -> Self {
        let inv_n = 1.0 / n as f64;
        let mut out = Self::default();
        for r in records {
            out.energy += r.energy;
            out.exchange_energy += r.exchange_energy;
            out.dm_energy += r.dm_energy;
            out.field_energy += r.field_energy;
            out.anisotropy_energy += r.anisotropy_energy;
            out.cubic_energy += r.cubic_energy;
            out.charge_finite += r.charge_finite;
            out.charge_lattice += r.charge_lattice;
            out.avg_m[0] += r.m[0] * inv_n;
            out.avg_m[1] += r.m[1] * inv_n;
            out.avg_m[2] += r.m[2] * inv_n;
            out.charge_center_x += r.charge_center_x;
            out.charge_center_y += r.charge_center_y;
        }
        out
    }
}

pub const INFO_HEADER: &str = "time,energy,exchange_energy,dm_energy,field_energy,anisotropy_energy,cubic_energy,charge_finite,charge_lattice,avg_mx,avg_my,avg_mz,field_x,field_y,field_z,field_deriv_x,field_deriv_y,field_deriv_z,charge_center_x,charge_center_y";

/// Buffered CSV writer for the diagnostics stream. I/O failures are
/// surfaced immediately — silently dropping scientific output is worse
/// than aborting the run.
pub struct InfoWriter {
    w: BufWriter<File>,
}

impl InfoWriter {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "{INFO_HEADER}")?;
        Ok(Self { w })
    }

    /// Write one row. Charge centers are normalized by the finite charge
    /// here, matching the recorded stream format.
    pub fn write_row(
        &mut self,
        time: f64,
        s: &Summary,
        field: [f64; 3],
        field_deriv: [f64; 3],
    ) -> std::io::Result<()> {
        write!(
            self.w,
            "{:.15e},{:.15e},{:.15e},{:.15e},{:.15e},{:.15e},{:.15e},",
            time,
            s.energy,
            s.exchange_energy,
            s.dm_energy,
            s.field_energy,
            s.anisotropy_energy,
            s.cubic_energy
        )?;
        write!(self.w, "{:.15e},{:.15e},", s.charge_finite, s.charge_lattice)?;
        write!(
            self.w,
            "{:.15e},{:.15e},{:.15e},",
            s.avg_m[0], s.avg_m[1], s.avg_m[2]
        )?;
        write!(self.w, "{:.15e},{:.15e},{:.15e},", field[0], field[1], field[2])?;
        write!(
            self.w,
            "{:.15e},{:.15e},{:.15e},",
            field_deriv[0], field_deriv[1], field_deriv[2]
        )?;
        writeln!(
            self.w,
            "{:.15e},{:.15e}",
            s.charge_center_x / s.charge_finite,
            s.charge_center_y / s.charge_finite
        )
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.w.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_has_twenty_columns() {
        assert_eq!(INFO_HEADER.split(',').count(), 20);
    }

    #[test]
    fn reduce_sums_energies_and_averages_m() {
        let a = SiteInfo {
            energy: 1.0,
            exchange_energy: 0.5,
            m: [1.0, 0.0, 0.0],
            ..Default::default()
        };
        let b = SiteInfo {
            energy: 2.0,
            exchange_energy: 1.5,
            m: [0.0, 1.0, 0.0],
            ..Default::default()
        };
        let s = Summary::reduce([a, b].into_iter(), 2);
        assert!((s.energy - 3.0).abs() < 1e-15);
        assert!((s.exchange_energy - 2.0).abs() < 1e-15);
        assert!((s.avg_m[0] - 0.5).abs() < 1e-15);
        assert!((s.avg_m[1] - 0.5).abs() < 1e-15);
    }

    #[test]
    fn slot_roundtrip_matches_field_order() {
        let slots: Vec<f64> = (0..INFO_STRIDE as u32).map(f64::from).collect();
        let r = SiteInfo::from_slots(&slots);
        assert_eq!(r.energy, 0.0);
        assert_eq!(r.cubic_energy, 5.0);
        assert_eq!(r.m, [8.0, 9.0, 10.0]);
        assert_eq!(r.charge_center_y, 12.0);
    }
}
