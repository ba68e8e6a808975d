pub mod algorithm;
pub mod charts;
pub mod config;
pub mod dashboard;
pub mod events;
pub mod log_batcher;
pub mod notifier;
pub mod orders;
pub mod packet;
pub mod paper_algorithm;
pub mod pipeline;
pub mod publisher;
pub mod runner;
pub mod sampler;
pub mod statistics;
pub mod store;
pub mod utils;

#[cfg(test)]
mod testing;
