pub mod place_pipeline;

pub use place_pipeline::PlacePipeline;
