// src/main.rs
//
// CLI driver for spin-lattice dynamics runs.
//
// Loads a lattice from a grid file when one is given (or ./grid.bin
// exists), otherwise falls back to a built-in two-skyrmion test
// system. Outputs land under runs/<run_id>/:
//
//   runs/<run_id>/
//     ├── config.json
//     ├── info.csv
//     ├── trajectory.bin
//     └── grid.out.bin
//
// Examples:
//
//   cargo run --release -- integrator=rk4 steps=200000 info=200
//   cargo run --release -- grid=relaxed.bin backend=device duration=2e-9
//   cargo run --release -- field=0,0,0.5 frames=0 run=field_sweep_a

use std::env;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};

use spinsim::config::{
    DriveConfig, GeometryConfig, MaterialConfig, NumericsConfig, RunConfig, RunInfo,
};
use spinsim::drive::{CurrentDrive, FieldDrive, TemperatureDrive};
use spinsim::error::{Result, SimError};
use spinsim::execution::Execution;
use spinsim::grid::{Boundary, Grid};
use spinsim::grid_io;
use spinsim::initial_states::create_skyrmion;
use spinsim::integrate::{integrate, Drives, IntegrateParams};
use spinsim::integrator::Integrator;
use spinsim::params::{
    suggested_dt, Anisotropy, Current, CurrentKind, DmSymmetry, GAMMA_E, HBAR, QE,
};

fn print_usage() {
    eprintln!(
        r#"Usage:
  cargo run --release -- [grid=FILE] [integrator=euler|rk2|rk4] [backend=host|device]
             [dt=VAL] [steps=N | duration=SECONDS]
             [info=N] [frames=N] [field=HX,HY,HZ]
             [current=stt|bulk|both,JX,JY,JZ] [polarization=P] [beta=B] [thickness=T]
             [out=DIR] [run=RUN_ID]

Notes:
  - Without grid=, ./grid.bin is tried before the built-in two-skyrmion system;
    an unreadable ./grid.bin also falls back.
  - dt defaults to 0.01*hbar/J of the loaded lattice.
  - info/frames are recording intervals in steps; frames=0 disables
    trajectory frames.
  - current= takes a torque kind and the density vector in A/m^2;
    polarization/beta/thickness refine it (defaults -1, 0, 1e-9).
"#
    );
}

fn sanitize_run_id(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn default_run_id(integrator: Integrator, backend: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0));
    let ts = format!("{}{:03}", now.as_secs(), now.subsec_millis());
    format!("{}_{}_{}", ts, integrator.as_str(), backend)
}

fn unique_run_dir(out_root: &str, run_id: &str) -> PathBuf {
    let base = PathBuf::from(out_root);
    let mut dir = base.join(run_id);
    if !dir.exists() {
        return dir;
    }
    for k in 1..1000 {
        let cand = base.join(format!("{}_{}", run_id, k));
        if !cand.exists() {
            dir = cand;
            break;
        }
    }
    dir
}

/// `KIND,JX,JY,JZ` where KIND selects the torque form: `stt` (the
/// spatial-gradient in-plane torque, as the original driver runs),
/// `bulk` (field-like + damping-like), or `both`.
fn parse_current(s: &str) -> Option<(CurrentKind, [f64; 3])> {
    let (kind, j) = s.split_once(',')?;
    let kind = match kind {
        "stt" | "gradient" => CurrentKind::SpatialGradient,
        "bulk" => CurrentKind::BulkLike,
        "both" => CurrentKind::Both,
        _ => return None,
    };
    Some((kind, parse_vec3(j)?))
}

fn parse_vec3(s: &str) -> Option<[f64; 3]> {
    let mut parts = s.split(',').map(|p| p.trim().parse::<f64>());
    let x = parts.next()?.ok()?;
    let y = parts.next()?.ok()?;
    let z = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some([x, y, z])
}

/// The built-in test system: a 64x64 periodic lattice with two nested
/// skyrmions of opposite winding at the center.
fn default_grid() -> Grid {
    let (rows, cols) = (64, 64);
    let mut g = Grid::new(rows, cols);
    let j = 1.0e-3 * QE;
    g.set_exchange(j);
    g.set_dm(0.5 * j, DmSymmetry::BondVector);
    g.set_anisotropy(Anisotropy {
        k: 0.0,
        axis: [0.0, 0.0, 1.0],
    });
    g.global.alpha = 0.3;
    g.global.gamma = GAMMA_E;
    g.global.mu_s = HBAR * GAMMA_E;
    g.global.lattice = 0.5e-9;
    g.boundary = Boundary::periodic_both();

    let (cr, cc) = (rows as f64 / 2.0, cols as f64 / 2.0);
    create_skyrmion(&mut g, 15.0, cr, cc, -1.0, 1.0, 0.0);
    create_skyrmion(&mut g, 10.0, cr, cc, 1.0, 1.0, 0.0);
    g
}

/// Implicit-grid policy: a missing or unusable ./grid.bin is
/// recoverable and falls back to the built-in system. Only an explicit
/// grid= argument failing to load is fatal.
fn load_or_default(fallback: &Path) -> Grid {
    if !fallback.exists() {
        warn!("no {}, falling back to the built-in two-skyrmion system", fallback.display());
        return default_grid();
    }
    match grid_io::load(fallback) {
        Ok(g) => g,
        Err(e) => {
            warn!(
                "could not load {} ({e}), falling back to the built-in two-skyrmion system",
                fallback.display()
            );
            default_grid()
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let argv: Vec<String> = env::args().collect();

    let mut grid_file: Option<String> = None;
    let mut integrator = Integrator::Rk4;
    let mut backend = "host".to_string();
    let mut dt_override: Option<f64> = None;
    let mut steps_override: Option<u64> = None;
    let mut duration: Option<f64> = None;
    let mut info_interval: u64 = 100;
    let mut frame_interval: u64 = 1000;
    let mut field = FieldDrive::Zero;
    let mut current_arg: Option<(CurrentKind, [f64; 3])> = None;
    let mut polarization = -1.0;
    let mut beta = 0.0;
    let mut thickness = 1.0e-9;
    let mut out_root = "runs".to_string();
    let mut run_id_override: Option<String> = None;

    for arg in argv.iter().skip(1) {
        if arg == "-h" || arg == "--help" || arg == "help" {
            print_usage();
            return Ok(());
        }
        if let Some(v) = arg.strip_prefix("grid=") {
            grid_file = Some(v.to_string());
            continue;
        }
        if let Some(v) = arg.strip_prefix("integrator=") {
            integrator = Integrator::from_str(v)
                .ok_or_else(|| SimError::Config(format!("unknown integrator '{v}'")))?;
            continue;
        }
        if let Some(v) = arg.strip_prefix("backend=") {
            if v != "host" && v != "device" {
                return Err(SimError::Config(format!("unknown backend '{v}'")));
            }
            backend = v.to_string();
            continue;
        }
        if let Some(v) = arg.strip_prefix("dt=") {
            dt_override = v.parse().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("steps=") {
            steps_override = v.parse().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("duration=") {
            duration = v.parse().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("info=") {
            info_interval = v
                .parse()
                .map_err(|_| SimError::Config(format!("bad info interval '{v}'")))?;
            continue;
        }
        if let Some(v) = arg.strip_prefix("frames=") {
            frame_interval = v
                .parse()
                .map_err(|_| SimError::Config(format!("bad frame interval '{v}'")))?;
            continue;
        }
        if let Some(v) = arg.strip_prefix("field=") {
            let h = parse_vec3(v)
                .ok_or_else(|| SimError::Config(format!("bad field triple '{v}'")))?;
            field = FieldDrive::Constant(h);
            continue;
        }
        if let Some(v) = arg.strip_prefix("current=") {
            current_arg = Some(
                parse_current(v)
                    .ok_or_else(|| SimError::Config(format!("bad current argument '{v}'")))?,
            );
            continue;
        }
        if let Some(v) = arg.strip_prefix("polarization=") {
            polarization = v
                .parse()
                .map_err(|_| SimError::Config(format!("bad polarization '{v}'")))?;
            continue;
        }
        if let Some(v) = arg.strip_prefix("beta=") {
            beta = v
                .parse()
                .map_err(|_| SimError::Config(format!("bad beta '{v}'")))?;
            continue;
        }
        if let Some(v) = arg.strip_prefix("thickness=") {
            thickness = v
                .parse()
                .map_err(|_| SimError::Config(format!("bad thickness '{v}'")))?;
            continue;
        }
        if let Some(v) = arg.strip_prefix("out=") {
            out_root = v.to_string();
            continue;
        }
        if let Some(v) = arg.strip_prefix("run=") {
            run_id_override = Some(sanitize_run_id(v));
            continue;
        }
        warn!("ignoring unrecognized argument '{arg}'");
    }

    let grid = match &grid_file {
        Some(path) => grid_io::load(Path::new(path))?,
        None => load_or_default(Path::new("./grid.bin")),
    };

    let j0 = grid.sites[0].exchange * grid.sites[0].exchange_mult;
    let dt = dt_override.unwrap_or_else(|| suggested_dt(j0));
    let steps = match (steps_override, duration) {
        (Some(n), _) => n,
        (None, Some(t)) => (t / dt).ceil() as u64,
        (None, None) => 100_000,
    };
    if info_interval == 0 {
        return Err(SimError::Config("info interval must be nonzero".into()));
    }

    let run_id = run_id_override.unwrap_or_else(|| default_run_id(integrator, &backend));
    let out_dir = unique_run_dir(&out_root, &run_id);

    let exec = match backend.as_str() {
        "device" => Execution::device(&grid, integrator)?,
        _ => Execution::host(&grid, integrator),
    };

    let current = match current_arg {
        Some((kind, j)) => CurrentDrive::Constant(Current {
            kind,
            j,
            polarization,
            beta,
            thickness,
        }),
        None => CurrentDrive::None,
    };
    let drives = Drives {
        field,
        current,
        temperature: TemperatureDrive::Zero,
    };

    std::fs::create_dir_all(&out_dir)?;
    let cfg = RunConfig {
        geometry: GeometryConfig {
            rows: grid.rows(),
            cols: grid.cols(),
            lattice: grid.global.lattice,
            boundary: format!("{:?}", grid.boundary.kind),
        },
        material: MaterialConfig {
            exchange: grid.sites[0].exchange,
            dm: grid.sites[0].dm,
            anisotropy: grid.sites[0].anisotropy.k,
            easy_axis: grid.sites[0].anisotropy.axis,
            cubic: grid.sites[0].cubic,
            alpha: grid.global.alpha,
            mu_s: grid.global.mu_s,
        },
        drive: DriveConfig {
            field: drives.field,
            current: drives.current,
            temperature: drives.temperature,
        },
        numerics: NumericsConfig {
            integrator: integrator.as_str().to_string(),
            backend: backend.clone(),
            dt,
            steps,
            info_interval,
            frame_interval,
        },
        run: RunInfo {
            binary: "spinsim".to_string(),
            run_id: run_id.clone(),
            grid_file: grid_file.clone(),
        },
    };
    cfg.write_to_dir(&out_dir)?;

    info!(
        "run {} — {}x{} lattice, {} steps of {:.3e} s",
        run_id,
        grid.rows(),
        grid.cols(),
        steps,
        dt
    );

    let params = IntegrateParams {
        dt,
        steps,
        info_interval,
        frame_interval,
        output_dir: out_dir,
    };
    integrate(grid, exec, drives, params)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_implicit_grid_falls_back_to_default() {
        let dir = std::env::temp_dir().join("spinsim_main_badgrid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("grid.bin");
        std::fs::write(&path, b"not a grid file at all").unwrap();

        let g = load_or_default(&path);
        assert_eq!((g.rows(), g.cols()), (64, 64));
        assert_eq!(g.boundary.kind.to_u32(), Boundary::periodic_both().kind.to_u32());
    }

    #[test]
    fn missing_implicit_grid_falls_back_to_default() {
        let dir = std::env::temp_dir().join("spinsim_main_nogrid");
        let _ = std::fs::remove_dir_all(&dir);
        let g = load_or_default(&dir.join("grid.bin"));
        assert_eq!(g.len(), 64 * 64);
    }

    #[test]
    fn readable_implicit_grid_is_loaded() {
        let dir = std::env::temp_dir().join("spinsim_main_goodgrid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("grid.bin");
        let mut g = Grid::new(5, 7);
        g.set_exchange(1.0e-3 * QE);
        grid_io::save(&path, &g).unwrap();

        let loaded = load_or_default(&path);
        assert_eq!((loaded.rows(), loaded.cols()), (5, 7));
    }

    #[test]
    fn current_arg_parses_kind_and_density() {
        let (kind, j) = parse_current("stt,5e10,0,0").unwrap();
        assert_eq!(kind, CurrentKind::SpatialGradient);
        assert_eq!(j, [5.0e10, 0.0, 0.0]);

        let (kind, _) = parse_current("bulk,0,0,-1e10").unwrap();
        assert_eq!(kind, CurrentKind::BulkLike);
        assert!(parse_current("sideways,1,2,3").is_none());
        assert!(parse_current("stt,1,2").is_none());
        assert!(parse_current("stt").is_none());
    }
}
