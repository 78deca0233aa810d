// src/topology.rs
//
// Topological charge of the spin field, per site.
//
// Two discretizations are kept side by side:
//  - `charge_finite_at`: continuum density q = (1/4π) m·(∂x m × ∂y m)
//    with centered differences, times the cell area.
//  - `charge_lattice_at`: Berg–Lüscher solid angles of the two
//    triangles (C,R,U) and (C,L,D); exact integer total on a closed
//    texture, insensitive to discretization error.
//
// Their agreement on a smooth texture is a standard sanity check for
// skyrmion configurations (see tests/validation.rs).

use crate::grid::Stencil;
use crate::vec3::{cross, dot, scale, sub};
use std::f64::consts::PI;

/// Continuum (finite-difference) charge density contribution of site `i`.
pub fn charge_finite_at(st: &Stencil, i: usize, dx: f64, dy: f64) -> f64 {
    let nb = st.neighbors(i);
    let dgdx = scale(sub(nb.right, nb.left), 0.5 / dx);
    let dgdy = scale(sub(nb.up, nb.down), 0.5 / dy);
    1.0 / (4.0 * PI) * dx * dy * dot(cross(dgdx, dgdy), st.at(i))
}

/// Solid angle of the spherical triangle (a, b, c), signed.
fn solid_angle(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    let num = dot(a, cross(b, c));
    let den = 1.0 + dot(a, b) + dot(a, c) + dot(b, c);
    2.0 * num.atan2(den)
}

/// Lattice (Berg–Lüscher) charge contribution of site `i`.
pub fn charge_lattice_at(st: &Stencil, i: usize) -> f64 {
    let s = st.at(i);
    let nb = st.neighbors(i);
    (solid_angle(s, nb.right, nb.up) + solid_angle(s, nb.left, nb.down)) / (4.0 * PI)
}

/// Charge-weighted position of site `i` (meters). Summed over the grid
/// and divided by the total finite charge this gives the charge center.
pub fn charge_center_at(st: &Stencil, i: usize, dx: f64, dy: f64) -> (f64, f64) {
    let q = charge_finite_at(st, i, dx, dy);
    let row = (i / st.cols) as f64;
    let col = (i % st.cols) as f64;
    (q * col * dx, q * row * dy)
}
