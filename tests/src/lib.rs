//! Workspace-level tests: obfuscated programs are executed with `boa_engine` and compared
//! against the original source.

pub mod harness;

#[cfg(test)]
mod pipeline;
#[cfg(test)]
mod transforms;
