//! Rendering for satview: camera and orbit controls, geometry and texture
//! preparation, materials, and the `RenderBackend` seam with a wgpu and a
//! headless implementation.

pub mod backend;
pub mod camera;
pub mod headless;
pub mod material;
pub mod mesh;
pub mod pipeline;
pub mod renderer;
pub mod texture;
pub mod vertex;

pub use backend::*;
pub use camera::*;
pub use headless::*;
pub use material::*;
pub use mesh::*;
pub use pipeline::*;
pub use renderer::*;
pub use texture::*;
pub use vertex::*;
