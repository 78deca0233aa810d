// src/grid_io.rs
//
// Binary grid persistence. One file carries the lattice definition
// (header + per-site parameters) followed by any number of spin
// frames, so the same format serves both checkpoints and trajectory
// recording. All values little-endian.
//
// Layout:
//   magic      8  b"SPINGRID"
//   version    u32
//   rows       u64
//   cols       u64
//   boundary   u32
//   fallback   3 × f64
//   globals    5 × f64   (gamma, alpha, mu_s, lattice, avg_spin)
//   sites      rows·cols × SITE_STRIDE × f64
//   frames     k × rows·cols × 3 × f64

use crate::error::{Result, SimError};
use crate::grid::{Boundary, BoundaryKind, Grid};
use crate::params::{SiteParams, SITE_STRIDE};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const MAGIC: &[u8; 8] = b"SPINGRID";
const VERSION: u32 = 1;

fn write_f64s<W: Write>(w: &mut W, vals: &[f64]) -> std::io::Result<()> {
    for v in vals {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64<R: Read>(r: &mut R) -> std::io::Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

fn read_f64s<R: Read>(r: &mut R, out: &mut [f64]) -> std::io::Result<()> {
    let mut b = [0u8; 8];
    for v in out.iter_mut() {
        r.read_exact(&mut b)?;
        *v = f64::from_le_bytes(b);
    }
    Ok(())
}

fn header_len(n_sites: usize) -> u64 {
    (8 + 4 + 8 + 8 + 4 + 3 * 8 + 5 * 8 + n_sites * SITE_STRIDE * 8) as u64
}

fn frame_len(n_sites: usize) -> u64 {
    (n_sites * 3 * 8) as u64
}

/// Write the lattice definition plus the current spins as frame 0.
pub fn save(path: &Path, grid: &Grid) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&(grid.rows() as u64).to_le_bytes())?;
    w.write_all(&(grid.cols() as u64).to_le_bytes())?;
    w.write_all(&grid.boundary.kind.to_u32().to_le_bytes())?;
    write_f64s(&mut w, &grid.boundary.fallback)?;
    let gp = &grid.global;
    write_f64s(&mut w, &[gp.gamma, gp.alpha, gp.mu_s, gp.lattice, gp.avg_spin])?;
    write_f64s(&mut w, &grid.packed_sites())?;
    write_f64s(&mut w, &grid.packed_spins())?;
    w.flush()?;
    Ok(())
}

/// Append the current spins as a new frame.
pub fn append_frame(path: &Path, grid: &Grid) -> Result<()> {
    let mut w = BufWriter::new(OpenOptions::new().append(true).open(path)?);
    write_f64s(&mut w, &grid.packed_spins())?;
    w.flush()?;
    Ok(())
}

fn load_header<R: Read>(r: &mut R) -> Result<Grid> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(SimError::GridFormat("bad magic".into()));
    }
    let version = read_u32(r)?;
    if version != VERSION {
        return Err(SimError::GridFormat(format!("unknown version {version}")));
    }
    let rows = read_u64(r)? as usize;
    let cols = read_u64(r)? as usize;
    if rows == 0 || cols == 0 || rows.checked_mul(cols).is_none() {
        return Err(SimError::GridFormat(format!("bad dimensions {rows}x{cols}")));
    }
    let kind = read_u32(r)?;
    let kind = BoundaryKind::from_u32(kind)
        .ok_or_else(|| SimError::GridFormat(format!("unknown boundary code {kind}")))?;
    let mut fallback = [0.0; 3];
    read_f64s(r, &mut fallback)?;
    let mut globals = [0.0; 5];
    read_f64s(r, &mut globals)?;

    let mut grid = Grid::new(rows, cols);
    grid.boundary = Boundary { kind, fallback };
    grid.global.gamma = globals[0];
    grid.global.alpha = globals[1];
    grid.global.mu_s = globals[2];
    grid.global.lattice = globals[3];
    grid.global.avg_spin = globals[4];

    let mut slots = [0.0; SITE_STRIDE];
    for i in 0..grid.len() {
        read_f64s(r, &mut slots)?;
        grid.sites[i] = SiteParams::unpack(&slots)
            .ok_or_else(|| SimError::GridFormat(format!("bad site record at index {i}")))?;
    }
    Ok(grid)
}

fn read_frame_into<R: Read>(r: &mut R, grid: &mut Grid) -> Result<()> {
    let mut spin = [0.0; 3];
    for i in 0..grid.len() {
        read_f64s(r, &mut spin)?;
        grid.spins[i] = spin;
    }
    Ok(())
}

/// Load the lattice with its most recent frame.
pub fn load(path: &Path) -> Result<Grid> {
    let mut r = BufReader::new(File::open(path)?);
    let mut grid = load_header(&mut r)?;
    let frames = count_frames(path, grid.len())?;
    if frames == 0 {
        return Err(SimError::GridFormat("no spin frames".into()));
    }
    r.seek(SeekFrom::Start(
        header_len(grid.len()) + (frames - 1) as u64 * frame_len(grid.len()),
    ))?;
    read_frame_into(&mut r, &mut grid)?;
    Ok(grid)
}

/// Load the lattice with frame `k` (0-based).
pub fn load_frame(path: &Path, k: usize) -> Result<Grid> {
    let mut r = BufReader::new(File::open(path)?);
    let mut grid = load_header(&mut r)?;
    let frames = count_frames(path, grid.len())?;
    if k >= frames {
        return Err(SimError::GridFormat(format!(
            "frame {k} out of range ({frames} frames)"
        )));
    }
    r.seek(SeekFrom::Start(
        header_len(grid.len()) + k as u64 * frame_len(grid.len()),
    ))?;
    read_frame_into(&mut r, &mut grid)?;
    Ok(grid)
}

/// Number of complete spin frames following the header.
pub fn count_frames(path: &Path, n_sites: usize) -> Result<usize> {
    let total = std::fs::metadata(path)?.len();
    let header = header_len(n_sites);
    if total < header {
        return Err(SimError::GridFormat("truncated header".into()));
    }
    Ok(((total - header) / frame_len(n_sites)) as usize)
}
