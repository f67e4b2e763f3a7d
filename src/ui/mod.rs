//! Interaction layer: windowing, cell editing and key mapping.

pub mod cell_interaction;
pub mod keyboard;
pub mod virtualization;
