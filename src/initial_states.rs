// src/initial_states.rs
//
// Initial spin textures. All generators write unit spins directly into
// the committed grid; coordinates are (row, col) in lattice units.

use crate::grid::Grid;
use crate::vec3::normalize;

/// Set a uniform direction (normalized).
pub fn init_uniform(grid: &mut Grid, dir: [f64; 3]) {
    let v = normalize(dir);
    for s in &mut grid.spins {
        *s = v;
    }
}

/// Uniform + small random tilt (useful to break symmetry).
pub fn init_uniform_with_noise(grid: &mut Grid, dir: [f64; 3], noise: f64, seed: u64) {
    let base = normalize(dir);
    let mut rng = XorShift64::new(seed);
    for s in &mut grid.spins {
        let dx = noise * (rng.next_f64() * 2.0 - 1.0);
        let dy = noise * (rng.next_f64() * 2.0 - 1.0);
        let dz = noise * (rng.next_f64() * 2.0 - 1.0);
        *s = normalize([base[0] + dx, base[1] + dy, base[2] + dz]);
    }
}

/// Random directions, seeded and reproducible.
pub fn init_random(grid: &mut Grid, seed: u64) {
    let mut rng = XorShift64::new(seed);
    for s in &mut grid.spins {
        let x = rng.next_f64() * 2.0 - 1.0;
        let y = rng.next_f64() * 2.0 - 1.0;
        let z = rng.next_f64() * 2.0 - 1.0;
        *s = normalize([x, y, z]);
    }
}

/// Write a skyrmion texture into a disk of radius `radius` (lattice
/// units) around (center_row, center_col). Sites outside the disk are
/// left untouched, so multiple textures compose on a prepared
/// background.
///
/// Inside the disk the polar angle goes θ(r) = π(1 − r/R), so the core
/// points opposite the `p`-polarized rim; the azimuth is
/// φ = q·atan2(dy, dx) + phase, with winding number `q` and helicity
/// offset `phase` (0 gives a Néel texture for bond-form DM, π/2 a
/// Bloch one).
pub fn create_skyrmion(
    grid: &mut Grid,
    radius: f64,
    center_row: f64,
    center_col: f64,
    q: f64,
    p: f64,
    phase: f64,
) {
    let cols = grid.cols();
    for i in 0..grid.len() {
        let row = (i / cols) as f64;
        let col = (i % cols) as f64;
        let dy = row - center_row;
        let dx = col - center_col;
        let r = (dx * dx + dy * dy).sqrt();
        if r > radius {
            continue;
        }
        let theta = std::f64::consts::PI * (1.0 - r / radius);
        let phi = q * dy.atan2(dx) + phase;
        grid.spins[i] = [
            theta.sin() * phi.cos(),
            theta.sin() * phi.sin(),
            p * theta.cos(),
        ];
    }
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        let s = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_f64(&mut self) -> f64 {
        // Map top 53 bits to [0,1)
        let u = self.next_u64() >> 11;
        (u as f64) * (1.0 / ((1u64 << 53) as f64))
    }
}
