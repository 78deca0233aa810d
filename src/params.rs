// src/params.rs
//
// Global and per-site parameters for the atomistic spin lattice.
//
// Conventions:
// - Exchange J and anisotropy K carry Joules; dm is the DM magnitude in
//   Joules; per-site multipliers are dimensionless and default to 1.
// - The torque equation runs in normalized precession time, so dt is
//   naturally measured in units of ħ/J (see `suggested_dt`).

use serde::{Deserialize, Serialize};

/// Reduced Planck constant (J·s).
pub const HBAR: f64 = 1.054_571_817e-34;

/// Elementary charge (C). Handy for expressing J in meV: 1 meV = 1.0e-3 * QE.
pub const QE: f64 = 1.602_176_634e-19;

/// Electron gyromagnetic ratio magnitude (rad/(s·T)).
pub const GAMMA_E: f64 = 1.760_859_630_23e11;

/// Scalar constants shared by every lattice site.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GlobalParams {
    /// Gyromagnetic ratio (rad/(s·T)).
    pub gamma: f64,
    /// Gilbert damping.
    pub alpha: f64,
    /// Magnetic moment per site (J/T).
    pub mu_s: f64,
    /// Lattice spacing (m).
    pub lattice: f64,
    /// Average spin density entering the current-torque prefactors.
    pub avg_spin: f64,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            gamma: GAMMA_E,
            alpha: 0.3,
            mu_s: HBAR * GAMMA_E,
            lattice: 0.5e-9,
            avg_spin: 1.0,
        }
    }
}

/// Directional form of the DM bond vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DmSymmetry {
    /// D ∝ r_ij (bulk DM).
    BondVector,
    /// D ∝ ẑ × r_ij (interfacial DM).
    BondVectorCrossZ,
}

impl DmSymmetry {
    /// Stable wire/file encoding.
    pub fn to_u32(self) -> u32 {
        match self {
            Self::BondVector => 0,
            Self::BondVectorCrossZ => 1,
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::BondVector),
            1 => Some(Self::BondVectorCrossZ),
            _ => None,
        }
    }
}

/// Uniaxial anisotropy: energy −K (S·axis)².
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Anisotropy {
    pub k: f64,
    pub axis: [f64; 3],
}

impl Default for Anisotropy {
    fn default() -> Self {
        Self {
            k: 0.0,
            axis: [0.0, 0.0, 1.0],
        }
    }
}

/// Static per-site parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SiteParams {
    pub exchange: f64,
    pub exchange_mult: f64,
    pub dm: f64,
    pub dm_mult: f64,
    pub dm_symmetry: DmSymmetry,
    pub anisotropy: Anisotropy,
    pub cubic: f64,
    pub field_mult: f64,
    /// Pinned sites are clamped to this direction at every commit and
    /// excluded from torque accumulation.
    pub pin: Option<[f64; 3]>,
}

impl Default for SiteParams {
    fn default() -> Self {
        Self {
            exchange: 0.0,
            exchange_mult: 1.0,
            dm: 0.0,
            dm_mult: 1.0,
            dm_symmetry: DmSymmetry::BondVector,
            anisotropy: Anisotropy::default(),
            cubic: 0.0,
            field_mult: 1.0,
            pin: None,
        }
    }
}

/// Number of f64 slots per site in the packed layout shared by the
/// device upload and the grid file format.
pub const SITE_STRIDE: usize = 16;

impl SiteParams {
    /// Pack into the flat layout consumed by the device kernels and the
    /// grid file body. Slot 15 is reserved.
    pub fn pack(&self) -> [f64; SITE_STRIDE] {
        let (pinned, dir) = match self.pin {
            Some(d) => (1.0, d),
            None => (0.0, [0.0, 0.0, 0.0]),
        };
        [
            self.exchange,
            self.exchange_mult,
            self.dm,
            self.dm_mult,
            f64::from(self.dm_symmetry.to_u32()),
            self.anisotropy.k,
            self.anisotropy.axis[0],
            self.anisotropy.axis[1],
            self.anisotropy.axis[2],
            self.cubic,
            self.field_mult,
            pinned,
            dir[0],
            dir[1],
            dir[2],
            0.0,
        ]
    }

    /// Inverse of [`SiteParams::pack`]. Fails on an unknown DM symmetry tag.
    pub fn unpack(slots: &[f64; SITE_STRIDE]) -> Option<Self> {
        let dm_symmetry = DmSymmetry::from_u32(slots[4] as u32)?;
        let pin = if slots[11] > 0.5 {
            Some([slots[12], slots[13], slots[14]])
        } else {
            None
        };
        Some(Self {
            exchange: slots[0],
            exchange_mult: slots[1],
            dm: slots[2],
            dm_mult: slots[3],
            dm_symmetry,
            anisotropy: Anisotropy {
                k: slots[5],
                axis: [slots[6], slots[7], slots[8]],
            },
            cubic: slots[9],
            field_mult: slots[10],
            pin,
        })
    }
}

/// What kind of current drives the torque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentKind {
    None,
    /// Field-like + damping-like torque from an out-of-plane spin current
    /// (CPP geometry).
    BulkLike,
    /// Adiabatic + non-adiabatic spin-transfer torque from the in-plane
    /// spin-density gradient.
    SpatialGradient,
    Both,
}

impl CurrentKind {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::None => 0,
            Self::BulkLike => 1,
            Self::SpatialGradient => 2,
            Self::Both => 3,
        }
    }
}

/// Instantaneous current descriptor, as produced by a `CurrentDrive`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Current {
    pub kind: CurrentKind,
    /// Current density vector (A/m²).
    pub j: [f64; 3],
    /// Spin polarization.
    pub polarization: f64,
    /// Non-adiabaticity β.
    pub beta: f64,
    /// Free-layer thickness (m), used by the bulk-like prefactor.
    pub thickness: f64,
}

impl Current {
    pub fn none() -> Self {
        Self {
            kind: CurrentKind::None,
            j: [0.0, 0.0, 0.0],
            polarization: 0.0,
            beta: 0.0,
            thickness: 1.0,
        }
    }
}

/// Natural fixed step for a lattice dominated by exchange J: 0.01·ħ/J.
pub fn suggested_dt(exchange: f64) -> f64 {
    0.01 * HBAR / exchange.abs()
}
