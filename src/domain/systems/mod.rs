// Per-tick simulation systems.

pub mod movement;
pub mod placement;
