//! Post-window leak analysis.

pub mod decay;
