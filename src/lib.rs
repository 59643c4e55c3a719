pub mod assets;
pub mod compositor;
pub mod config;
pub mod error;
pub mod generate;

pub use compositor::{
    Backend, ChannelRole, ChannelSpec, Compositor, GpuCompositor, ImageSource, MaskInputs,
    ParallelCompositor, SequentialCompositor, composite,
};
pub use error::{Error, InvalidInput};
