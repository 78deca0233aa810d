// src/lib.rs

pub mod config;
pub mod device;
pub mod diagnostics;
pub mod drive;
pub mod energy;
pub mod error;
pub mod execution;
pub mod gpu;
pub mod grid;
pub mod grid_io;
pub mod initial_states;
pub mod integrate;
pub mod integrator;
pub mod kernel;
pub mod params;
pub mod topology;
pub mod vec3;
