pub mod duplex;
pub mod renderer;
pub mod ring_buffer;
pub mod sample_converter;
pub mod sampler;
pub mod snapshot_gate;
pub mod surface;
