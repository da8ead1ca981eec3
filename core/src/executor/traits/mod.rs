pub mod renderer;
pub mod stage;
pub mod task;

pub use renderer::{RenderEvent, RunRenderer};
pub use stage::Stage;
pub use task::{FnTask, Task};
