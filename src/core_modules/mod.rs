// Internal building blocks of the probe, leaves first. The public surface is
// re-exported from the crate root and `pipeline`.

pub mod pixel;
pub mod frame;
pub mod geometry;
pub mod change_gate;
pub mod sampler;
pub mod color_space;
pub mod color_sample;
pub mod classifier;
pub mod training_table;
