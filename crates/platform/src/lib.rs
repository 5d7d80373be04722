//! Platform layer: the winit window and its Vulkan surface.
//!
//! Window creation and the message pump stay with winit; this crate only
//! exposes what the renderer consumes (client size, raw handles, surface).

mod window;

pub use window::{Surface, Window};

// Re-export winit types the application shell needs
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
pub use winit::keyboard::{KeyCode, PhysicalKey};
