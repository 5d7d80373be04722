//! vkpresent: opens a window and presents frames through the Vulkan swap
//! chain until it is closed.

use anyhow::Result;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event_loop::ControlFlow;
use winit::window::WindowId;

use vkpresent_core::{Config, FrameClock};
use vkpresent_platform::{ActiveEventLoop, EventLoop, KeyCode, PhysicalKey, Window, WindowEvent};
use vkpresent_renderer::Renderer;

struct App {
    config: Config,
    // Dropped before the window it presents to
    renderer: Option<Renderer>,
    window: Option<Window>,
    clock: FrameClock,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            clock: FrameClock::default(),
        }
    }

    fn render(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        if let Err(e) = renderer.render_frame() {
            error!("Fatal frame error: {}", e);
            event_loop.exit();
            return;
        }

        let (_, rate) = self.clock.tick();
        if let Some(rate) = rate {
            let stats = renderer.stats();
            debug!(
                "{:.1} fps ({} presented, {} skipped, {} rebuilds)",
                rate.fps(),
                stats.presented,
                stats.skipped,
                stats.rebuilds
            );
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, &self.config.renderer) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to create renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                    && event.state.is_pressed() =>
            {
                info!("Escape pressed, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.render(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let config = Config::load()?;
    vkpresent_core::init_logging(&config.logging.filter);
    info!("Starting vkpresent");
    debug!("{:?}", config);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
