pub mod screenshot;

pub use screenshot::{encode_png, ArtifactStore};
