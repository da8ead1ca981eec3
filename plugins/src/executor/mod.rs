pub mod renderers;

pub use renderers::{JsonlRenderer, TextRenderer};
