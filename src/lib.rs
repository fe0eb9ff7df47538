pub mod app;
pub mod config;
pub mod error;
pub mod experiment;
pub mod flowmon;
pub mod monitor;
pub mod net;
pub mod proto;
pub mod queue;
pub mod sim;
pub mod topo;
pub mod trace;

#[cfg(test)]
mod test;
