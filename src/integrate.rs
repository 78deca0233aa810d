// src/integrate.rs
//
// The stepping loop: drive sampling, backend stepping, diagnostics
// recording and trajectory frames, with a progress line each percent.
//
// Each step runs a fixed sequence on the committed grid: sample the
// drive at the three stage times, update + exchange on the backend,
// then (only at the recording interval, after the exchange) reduce and
// write diagnostics.

use crate::diagnostics::InfoWriter;
use crate::drive::{sample_stages, CurrentDrive, FieldDrive, TemperatureDrive};
use crate::error::Result;
use crate::execution::Execution;
use crate::grid::Grid;
use crate::grid_io;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Time-dependent inputs for one run.
#[derive(Debug, Clone)]
pub struct Drives {
    pub field: FieldDrive,
    pub current: CurrentDrive,
    pub temperature: TemperatureDrive,
}

impl Default for Drives {
    fn default() -> Self {
        Self {
            field: FieldDrive::Zero,
            current: CurrentDrive::None,
            temperature: TemperatureDrive::Zero,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntegrateParams {
    pub dt: f64,
    pub steps: u64,
    /// Steps between diagnostics rows.
    pub info_interval: u64,
    /// Steps between trajectory frames; 0 disables frame recording.
    pub frame_interval: u64,
    pub output_dir: PathBuf,
}

impl Default for IntegrateParams {
    fn default() -> Self {
        Self {
            dt: 1.0e-15,
            steps: 100_000,
            info_interval: 100,
            frame_interval: 1000,
            output_dir: PathBuf::from("."),
        }
    }
}

pub struct IntegrateContext {
    grid: Grid,
    exec: Execution,
    drives: Drives,
    params: IntegrateParams,
    time: f64,
    step: u64,
    info: InfoWriter,
    trajectory: PathBuf,
    next_progress: u64,
}

impl IntegrateContext {
    /// Set up output files and record the initial state as row 0 and
    /// frame 0.
    pub fn new(
        grid: Grid,
        exec: Execution,
        drives: Drives,
        params: IntegrateParams,
    ) -> Result<Self> {
        std::fs::create_dir_all(&params.output_dir)?;
        let info = InfoWriter::create(&params.output_dir.join("info.csv"))?;
        let trajectory = params.output_dir.join("trajectory.bin");
        grid_io::save(&trajectory, &grid)?;

        if !drives.temperature.is_zero() {
            warn!("temperature drive is sampled but not coupled into the torque");
        }
        info!(
            "integrating {} sites, {} steps, dt {:.3e}, backend {}",
            grid.len(),
            params.steps,
            params.dt,
            exec.name()
        );

        let mut ctx = Self {
            grid,
            exec,
            drives,
            params,
            time: 0.0,
            step: 0,
            info,
            trajectory,
            next_progress: 1,
        };
        ctx.record()?;
        Ok(ctx)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Advance one step and handle any recording that falls due.
    pub fn step(&mut self) -> Result<()> {
        let stages = sample_stages(
            &self.drives.field,
            &self.drives.current,
            &self.drives.temperature,
            self.time,
            self.params.dt,
        );
        self.exec
            .step(&mut self.grid, self.time, self.params.dt, &stages)?;
        self.step += 1;
        self.time = self.step as f64 * self.params.dt;

        if self.step % self.params.info_interval == 0 {
            self.record()?;
        }
        if self.params.frame_interval > 0 && self.step % self.params.frame_interval == 0 {
            self.exec.sync_spins(&mut self.grid)?;
            grid_io::append_frame(&self.trajectory, &self.grid)?;
        }
        self.log_progress();
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        while self.step < self.params.steps {
            self.step()?;
        }
        self.finish()
    }

    /// Flush diagnostics and save the final committed grid.
    pub fn finish(&mut self) -> Result<()> {
        self.exec.sync_spins(&mut self.grid)?;
        grid_io::save(&self.params.output_dir.join("grid.out.bin"), &self.grid)?;
        self.info.flush()?;
        info!("finished at t = {:.6e} s ({} steps)", self.time, self.step);
        Ok(())
    }

    fn record(&mut self) -> Result<()> {
        let field = self.drives.field.evaluate(self.time);
        let deriv = self.drives.field.derivative(self.time, self.params.dt);
        let summary = self.exec.diagnostics(&self.grid, field)?;
        self.info.write_row(self.time, &summary, field, deriv)?;
        Ok(())
    }

    fn log_progress(&mut self) {
        let pct = self.step * 100 / self.params.steps.max(1);
        if pct >= self.next_progress {
            self.next_progress = pct + 1;
            info!(
                "{pct:3}% — step {}/{}, t = {:.6e} s",
                self.step, self.params.steps, self.time
            );
        }
    }
}

/// Run a whole simulation and return the final grid.
pub fn integrate(
    grid: Grid,
    exec: Execution,
    drives: Drives,
    params: IntegrateParams,
) -> Result<Grid> {
    let mut ctx = IntegrateContext::new(grid, exec, drives, params)?;
    ctx.run()?;
    Ok(ctx.grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Boundary;
    use crate::integrator::Integrator;
    use crate::params::{suggested_dt, QE};

    fn small_run_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("spinsim_integrate_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn small_grid() -> Grid {
        let mut g = Grid::new(6, 6);
        g.boundary = Boundary::periodic_both();
        g.set_exchange(1.0e-3 * QE);
        crate::initial_states::init_uniform_with_noise(&mut g, [0.0, 0.0, 1.0], 0.05, 11);
        g
    }

    #[test]
    fn run_writes_outputs_and_advances_time() {
        let dir = small_run_dir("outputs");
        let g = small_grid();
        let dt = suggested_dt(1.0e-3 * QE);
        let exec = Execution::host(&g, Integrator::Rk4);
        let params = IntegrateParams {
            dt,
            steps: 20,
            info_interval: 5,
            frame_interval: 10,
            output_dir: dir.clone(),
        };
        let final_grid = integrate(g, exec, Drives::default(), params).unwrap();

        assert_eq!(final_grid.len(), 36);
        let info = std::fs::read_to_string(dir.join("info.csv")).unwrap();
        // header + rows at steps 0, 5, 10, 15, 20
        assert_eq!(info.lines().count(), 6);
        // initial save + frames at steps 10 and 20
        assert_eq!(
            grid_io::count_frames(&dir.join("trajectory.bin"), 36).unwrap(),
            3
        );
        assert!(dir.join("grid.out.bin").exists());
    }

    #[test]
    fn recorded_times_follow_the_interval() {
        let dir = small_run_dir("times");
        let g = small_grid();
        let dt = 2.0e-15;
        let exec = Execution::host(&g, Integrator::Euler);
        let params = IntegrateParams {
            dt,
            steps: 4,
            info_interval: 2,
            frame_interval: 0,
            output_dir: dir.clone(),
        };
        integrate(g, exec, Drives::default(), params).unwrap();

        let info = std::fs::read_to_string(dir.join("info.csv")).unwrap();
        let times: Vec<f64> = info
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(times.len(), 3);
        assert!((times[1] - 2.0 * dt).abs() < 1e-30);
        assert!((times[2] - 4.0 * dt).abs() < 1e-30);
    }
}
