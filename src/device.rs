// src/device.rs
//
// GPU backend. The stencil kernel and commit rule are mirrored in WGSL
// over `array<f64>` storage buffers; the committed spins live on the
// device between steps and come back to the host only for frame saves
// or at run end.
//
// Per step the host evaluates the drive at the three stage times,
// uploads the 35-slot drive block, and submits one command buffer:
// the update pass (stage + commit into scratch) followed by a
// buffer-to-buffer copy publishing scratch as the committed spins.
// The diagnostics pass runs separately, only at the recording interval.
//
// WGSL numeric notes: all f64 literals are written through `f64(...)`
// so no abstract literal can concretize to f32; sqrt is an f32-seeded
// Newton refinement (the f64 builtin is not universally available);
// atan2 falls back to f32 precision, which only touches the lattice
// charge diagnostic, never the dynamics.

use crate::diagnostics::{SiteInfo, Summary, INFO_STRIDE};
use crate::drive::DriveSample;
use crate::error::Result;
use crate::gpu::{GpuContext, WORKGROUP_SIZE};
use crate::grid::Grid;
use crate::integrator::Integrator;
use crate::params::{HBAR, SITE_STRIDE};

/// f64 slots per drive stage: field xyz, current xyz, polarization,
/// beta, thickness, temperature, current kind tag.
const STAGE_STRIDE: usize = 11;
/// time, dt, then three stage blocks.
const DRIVE_LEN: usize = 2 + 3 * STAGE_STRIDE;

/// Shared WGSL preamble: f64 vector helpers, the boundary lookup and
/// the dH/dS / dS/dτ kernel over the common bindings 0..3 and 5.
const PRELUDE: &str = r#"
struct Dims {
    rows: u32,
    cols: u32,
    boundary: u32,
    integrator: u32,
    n: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
}

@group(0) @binding(0) var<uniform> dims: Dims;
@group(0) @binding(1) var<storage, read> globals: array<f64>;
@group(0) @binding(2) var<storage, read> sites: array<f64>;
@group(0) @binding(3) var<storage, read> spins: array<f64>;
@group(0) @binding(5) var<storage, read> drive: array<f64>;

// globals slots: 0..2 fallback spin, 3 gamma, 4 alpha, 5 mu_s,
// 6 lattice, 7 avg_spin, 8 hbar.

struct V3 { x: f64, y: f64, z: f64 }

fn v_add(a: V3, b: V3) -> V3 { return V3(a.x + b.x, a.y + b.y, a.z + b.z); }
fn v_sub(a: V3, b: V3) -> V3 { return V3(a.x - b.x, a.y - b.y, a.z - b.z); }
fn v_scale(a: V3, k: f64) -> V3 { return V3(a.x * k, a.y * k, a.z * k); }
fn v_dot(a: V3, b: V3) -> f64 { return a.x * b.x + a.y * b.y + a.z * b.z; }

fn v_cross(a: V3, b: V3) -> V3 {
    return V3(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    );
}

fn abs_f64(x: f64) -> f64 {
    if (x < f64(0.0)) { return -x; }
    return x;
}

// f32 seed, three Newton steps: full f64 accuracy for unit-scale input.
fn sqrt_f64(x: f64) -> f64 {
    if (x <= f64(0.0)) { return f64(0.0); }
    var r = f64(sqrt(f32(x)));
    r = f64(0.5) * (r + x / r);
    r = f64(0.5) * (r + x / r);
    r = f64(0.5) * (r + x / r);
    return r;
}

fn v_normalize(a: V3) -> V3 {
    let n2 = v_dot(a, a);
    if (n2 == f64(0.0)) { return V3(f64(0.0), f64(0.0), f64(1.0)); }
    return v_scale(a, f64(1.0) / sqrt_f64(n2));
}

fn spin_at(i: u32) -> V3 {
    return V3(spins[3u * i], spins[3u * i + 1u], spins[3u * i + 2u]);
}

// Boundary codes: 0 open, 1 periodic rows, 2 periodic cols, 3 both.
fn lookup(row: i32, col: i32) -> V3 {
    let rows = i32(dims.rows);
    let cols = i32(dims.cols);
    var r = row;
    var c = col;
    if (r < 0 || r >= rows) {
        if (dims.boundary != 1u && dims.boundary != 3u) {
            return V3(globals[0], globals[1], globals[2]);
        }
        r = ((r % rows) + rows) % rows;
    }
    if (c < 0 || c >= cols) {
        if (dims.boundary != 2u && dims.boundary != 3u) {
            return V3(globals[0], globals[1], globals[2]);
        }
        c = ((c % cols) + cols) % cols;
    }
    return spin_at(u32(r * cols + c));
}

// DM bond vector for a unit neighbor offset. sym 0: along the bond,
// sym 1: bond rotated by z-cross.
fn dm_vec(dr: i32, dc: i32, d: f64, sym: u32) -> V3 {
    if (sym == 0u) {
        return V3(f64(dc) * d, f64(dr) * d, f64(0.0));
    }
    return V3(f64(-dr) * d, f64(dc) * d, f64(0.0));
}

// dE/dS at fixed neighbors. The DM coefficient is negated and paired
// with neighbor-first cross order, matching the host kernel.
fn dhds(i: u32, s: V3, nr: V3, nl: V3, nu: V3, nd: V3, h: V3) -> V3 {
    let base = i * 16u;
    let j = sites[base] * sites[base + 1u];
    var ret = v_scale(v_add(v_add(nr, nl), v_add(nu, nd)), -j);

    let d = -sites[base + 2u] * sites[base + 3u];
    let sym = u32(sites[base + 4u]);
    ret = v_add(ret, v_cross(nr, dm_vec(0, 1, d, sym)));
    ret = v_add(ret, v_cross(nl, dm_vec(0, -1, d, sym)));
    ret = v_add(ret, v_cross(nu, dm_vec(1, 0, d, sym)));
    ret = v_add(ret, v_cross(nd, dm_vec(-1, 0, d, sym)));

    let k = sites[base + 5u];
    let axis = V3(sites[base + 6u], sites[base + 7u], sites[base + 8u]);
    ret = v_add(ret, v_scale(axis, f64(-2.0) * k * v_dot(s, axis)));

    let c4 = f64(-4.0) * sites[base + 9u];
    ret = v_add(ret, V3(c4 * s.x * s.x * s.x, c4 * s.y * s.y * s.y, c4 * s.z * s.z * s.z));

    return v_sub(ret, v_scale(h, globals[5] * sites[base + 10u]));
}

// Torque dS/dtau with the stage delta applied to site i's own spin;
// neighbor reads stay on the committed spins. sb is the drive stage
// base slot.
fn dsdtau(i: u32, ds: V3, sb: u32) -> V3 {
    let row = i32(i / dims.cols);
    let col = i32(i % dims.cols);
    let nr = lookup(row, col + 1);
    let nl = lookup(row, col - 1);
    let nu = lookup(row + 1, col);
    let nd = lookup(row - 1, col);

    let s = v_add(spin_at(i), ds);
    let h = V3(drive[sb], drive[sb + 1u], drive[sb + 2u]);
    let base = i * 16u;
    let mus = globals[5];

    let heff = v_scale(dhds(i, s, nr, nl, nu, nd, h), f64(-1.0) / mus);
    let jabs = abs_f64(sites[base] * sites[base + 1u]);
    var v = v_scale(v_cross(s, heff), -globals[3] * globals[8] / jabs);

    let kind = u32(drive[sb + 10u]);
    if (kind == 1u || kind == 3u) {
        let jc = V3(drive[sb + 3u], drive[sb + 4u], drive[sb + 5u]);
        let factor = globals[3] * globals[8] * drive[sb + 6u] * globals[6] * globals[7]
            / (drive[sb + 8u] * mus);
        let local = v_scale(v_cross(jc, s), factor);
        v = v_add(v, v_add(v_cross(s, local), v_scale(local, drive[sb + 7u])));
    }
    if (kind == 2u || kind == 3u) {
        let jc = V3(drive[sb + 3u], drive[sb + 4u], drive[sb + 5u]);
        let a = globals[6];
        let gx = v_scale(v_sub(nr, nl), f64(0.5) / a);
        let gy = v_scale(v_sub(nu, nd), f64(0.5) / a);
        let local = v_add(v_scale(gx, jc.x), v_scale(gy, jc.y));
        let p = drive[sb + 6u];
        let adi = v_scale(local, p * a);
        let nad = v_scale(v_cross(s, local), p * drive[sb + 7u] * a / globals[7]);
        v = v_add(v, v_sub(adi, nad));
    }

    let alpha = globals[4];
    let damped = v_add(v, v_scale(v_cross(s, v), alpha));
    return v_scale(damped, f64(1.0) / (f64(1.0) + alpha * alpha));
}
"#;

const UPDATE_BODY: &str = r#"
@group(0) @binding(4) var<storage, read_write> scratch: array<f64>;

@compute @workgroup_size(64)
fn main(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) nwg: vec3<u32>,
) {
    let i = gid.x + gid.y * nwg.x * 64u;
    if (i >= dims.n) { return; }

    let base = i * 16u;
    var out: V3;
    if (sites[base + 11u] > f64(0.5)) {
        out = V3(sites[base + 12u], sites[base + 13u], sites[base + 14u]);
    } else {
        let dt = drive[1];
        let zero = V3(f64(0.0), f64(0.0), f64(0.0));
        let s0 = 2u;
        let s1 = 2u + 11u;
        let s2 = 2u + 22u;
        var delta = zero;
        switch (dims.integrator) {
            case 0u: {
                delta = v_scale(dsdtau(i, zero, s0), dt);
            }
            case 1u: {
                let k1 = dsdtau(i, zero, s0);
                let k2 = dsdtau(i, v_scale(k1, dt), s2);
                delta = v_scale(v_add(k1, k2), f64(0.5) * dt);
            }
            default: {
                let k1 = dsdtau(i, zero, s0);
                let k2 = dsdtau(i, v_scale(k1, f64(0.5) * dt), s1);
                let k3 = dsdtau(i, v_scale(k2, f64(0.5) * dt), s1);
                let k4 = dsdtau(i, v_scale(k3, dt), s2);
                let sum = v_add(
                    v_add(k1, v_scale(k2, f64(2.0))),
                    v_add(v_scale(k3, f64(2.0)), k4),
                );
                delta = v_scale(sum, dt / f64(6.0));
            }
        }
        out = v_normalize(v_add(spin_at(i), delta));
    }

    scratch[3u * i] = out.x;
    scratch[3u * i + 1u] = out.y;
    scratch[3u * i + 2u] = out.z;
}
"#;

const DIAGNOSTICS_BODY: &str = r#"
@group(0) @binding(4) var<storage, read_write> info: array<f64>;

// f32 atan2 upconverted; feeds the lattice charge diagnostic only.
fn atan2_f64(y: f64, x: f64) -> f64 {
    return f64(atan2(f32(y), f32(x)));
}

fn solid_angle(a: V3, b: V3, c: V3) -> f64 {
    let num = v_dot(a, v_cross(b, c));
    let den = f64(1.0) + v_dot(a, b) + v_dot(a, c) + v_dot(b, c);
    return f64(2.0) * atan2_f64(num, den);
}

@compute @workgroup_size(64)
fn main(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) nwg: vec3<u32>,
) {
    let i = gid.x + gid.y * nwg.x * 64u;
    if (i >= dims.n) { return; }

    let row = i32(i / dims.cols);
    let col = i32(i % dims.cols);
    let s = spin_at(i);
    let nr = lookup(row, col + 1);
    let nl = lookup(row, col - 1);
    let nu = lookup(row + 1, col);
    let nd = lookup(row - 1, col);
    let base = i * 16u;
    let pi = f64(3.141592653589793);

    let j = sites[base] * sites[base + 1u];
    let e_exch = f64(-0.5) * j
        * (v_dot(s, nr) + v_dot(s, nl) + v_dot(s, nu) + v_dot(s, nd));

    let d = sites[base + 2u] * sites[base + 3u];
    let sym = u32(sites[base + 4u]);
    let e_dm = f64(-0.5)
        * (v_dot(dm_vec(0, 1, d, sym), v_cross(s, nr))
            + v_dot(dm_vec(0, -1, d, sym), v_cross(s, nl))
            + v_dot(dm_vec(1, 0, d, sym), v_cross(s, nu))
            + v_dot(dm_vec(-1, 0, d, sym), v_cross(s, nd)));

    let h = V3(drive[2u], drive[3u], drive[4u]);
    let e_field = -globals[5] * sites[base + 10u] * v_dot(s, h);

    let axis = V3(sites[base + 6u], sites[base + 7u], sites[base + 8u]);
    let proj = v_dot(s, axis);
    let e_ani = -sites[base + 5u] * proj * proj;

    let e_cubic = -sites[base + 9u]
        * (s.x * s.x * s.x * s.x + s.y * s.y * s.y * s.y + s.z * s.z * s.z * s.z);

    let a = globals[6];
    let gx = v_scale(v_sub(nr, nl), f64(0.5) / a);
    let gy = v_scale(v_sub(nu, nd), f64(0.5) / a);
    let q_finite = a * a * v_dot(v_cross(gx, gy), s) / (f64(4.0) * pi);

    let q_lattice = (solid_angle(s, nr, nu) + solid_angle(s, nl, nd)) / (f64(4.0) * pi);

    let o = i * 13u;
    info[o] = e_exch + e_dm + e_field + e_ani + e_cubic;
    info[o + 1u] = e_exch;
    info[o + 2u] = e_dm;
    info[o + 3u] = e_field;
    info[o + 4u] = e_ani;
    info[o + 5u] = e_cubic;
    info[o + 6u] = q_finite;
    info[o + 7u] = q_lattice;
    info[o + 8u] = s.x;
    info[o + 9u] = s.y;
    info[o + 10u] = s.z;
    info[o + 11u] = q_finite * f64(col) * a;
    info[o + 12u] = q_finite * f64(row) * a;
}
"#;

pub struct DeviceExec {
    ctx: GpuContext,
    update: wgpu::ComputePipeline,
    diagnostics: wgpu::ComputePipeline,
    update_bind: wgpu::BindGroup,
    diagnostics_bind: wgpu::BindGroup,
    spins_buf: wgpu::Buffer,
    scratch_buf: wgpu::Buffer,
    drive_buf: wgpu::Buffer,
    info_buf: wgpu::Buffer,
    len: usize,
}

impl DeviceExec {
    pub fn new(grid: &Grid, integrator: Integrator) -> Result<Self> {
        let ctx = GpuContext::new()?;
        let len = grid.len();

        let dims: [u32; 8] = [
            grid.rows() as u32,
            grid.cols() as u32,
            grid.boundary.kind.to_u32(),
            integrator.to_u32(),
            len as u32,
            0,
            0,
            0,
        ];
        let dims_buf = ctx.create_uniform_buffer(bytemuck::cast_slice(&dims), "dims");

        let gp = &grid.global;
        let fb = grid.boundary.fallback;
        let globals = [
            fb[0], fb[1], fb[2], gp.gamma, gp.alpha, gp.mu_s, gp.lattice, gp.avg_spin, HBAR,
        ];
        let globals_buf = ctx.create_f64_buffer(&globals, "globals");

        let sites_buf = ctx.create_f64_buffer(&grid.packed_sites(), "sites");
        debug_assert_eq!(grid.packed_sites().len(), len * SITE_STRIDE);
        let spins_buf = ctx.create_f64_buffer(&grid.packed_spins(), "spins");
        let scratch_buf = ctx.create_f64_output_buffer(len * 3, "scratch");
        let drive_buf = ctx.create_f64_buffer(&[0.0; DRIVE_LEN], "drive");
        let info_buf = ctx.create_f64_output_buffer(len * INFO_STRIDE, "info");

        let update_src = format!("{PRELUDE}\n{UPDATE_BODY}");
        let diagnostics_src = format!("{PRELUDE}\n{DIAGNOSTICS_BODY}");
        let update = ctx.create_pipeline(&update_src, "update");
        let diagnostics = ctx.create_pipeline(&diagnostics_src, "diagnostics");

        let update_bind = ctx.create_bind_group(
            &update,
            &[
                &dims_buf,
                &globals_buf,
                &sites_buf,
                &spins_buf,
                &scratch_buf,
                &drive_buf,
            ],
        );
        let diagnostics_bind = ctx.create_bind_group(
            &diagnostics,
            &[
                &dims_buf,
                &globals_buf,
                &sites_buf,
                &spins_buf,
                &info_buf,
                &drive_buf,
            ],
        );

        Ok(Self {
            ctx,
            update,
            diagnostics,
            update_bind,
            diagnostics_bind,
            spins_buf,
            scratch_buf,
            drive_buf,
            info_buf,
            len,
        })
    }

    fn pack_drive(time: f64, dt: f64, stages: &[DriveSample; 3]) -> [f64; DRIVE_LEN] {
        let mut out = [0.0; DRIVE_LEN];
        out[0] = time;
        out[1] = dt;
        for (k, stage) in stages.iter().enumerate() {
            let b = 2 + k * STAGE_STRIDE;
            out[b..b + 3].copy_from_slice(&stage.field);
            out[b + 3..b + 6].copy_from_slice(&stage.current.j);
            out[b + 6] = stage.current.polarization;
            out[b + 7] = stage.current.beta;
            out[b + 8] = stage.current.thickness;
            out[b + 9] = stage.temperature;
            out[b + 10] = f64::from(stage.current.kind.to_u32());
        }
        out
    }

    fn workgroups(&self) -> u32 {
        (self.len as u32).div_ceil(WORKGROUP_SIZE)
    }

    /// One step as a single submission: update into scratch, then
    /// publish scratch as the committed spins.
    pub fn step(&mut self, time: f64, dt: f64, stages: &[DriveSample; 3]) -> Result<()> {
        self.ctx
            .upload_f64(&self.drive_buf, &Self::pack_drive(time, dt, stages));
        let mut encoder = self.ctx.begin_encoder("step");
        GpuContext::encode_pass(&mut encoder, &self.update, &self.update_bind, self.workgroups());
        encoder.copy_buffer_to_buffer(
            &self.scratch_buf,
            0,
            &self.spins_buf,
            0,
            (self.len * 3 * 8) as u64,
        );
        self.ctx.submit_encoder(encoder);
        Ok(())
    }

    /// Per-site diagnostics against the committed spins, reduced on the
    /// host. `field` is the drive field at the current time.
    pub fn diagnostics(&mut self, field: [f64; 3], n: usize) -> Result<Summary> {
        let mut drive_head = [0.0; 5];
        drive_head[2..5].copy_from_slice(&field);
        self.ctx.upload_f64(&self.drive_buf, &drive_head);

        let mut encoder = self.ctx.begin_encoder("diagnostics");
        GpuContext::encode_pass(
            &mut encoder,
            &self.diagnostics,
            &self.diagnostics_bind,
            self.workgroups(),
        );
        self.ctx.submit_encoder(encoder);

        let slots = self.ctx.read_back_f64(&self.info_buf, n * INFO_STRIDE)?;
        let records = slots.chunks_exact(INFO_STRIDE).map(SiteInfo::from_slots);
        Ok(Summary::reduce(records, n))
    }

    /// Pull the committed spins back into the host grid.
    pub fn read_back_spins(&mut self, grid: &mut Grid) -> Result<()> {
        let flat = self.ctx.read_back_f64(&self.spins_buf, self.len * 3)?;
        for (spin, chunk) in grid.spins.iter_mut().zip(flat.chunks_exact(3)) {
            *spin = [chunk[0], chunk[1], chunk[2]];
        }
        Ok(())
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }
}
