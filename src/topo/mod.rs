//! 拓扑构建

pub mod dumbbell;

pub use dumbbell::{Dumbbell, DumbbellOpts, build_dumbbell};
