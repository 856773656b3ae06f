pub mod config;
pub mod host;
pub mod update;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use host::{Host, SystemHost};
pub use update::{check, run, Outcome, RunOptions};
