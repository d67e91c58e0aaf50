// =============================================================================
// VULKAN ENGINE - initialization scaffold
// =============================================================================
//
// Brings up a window, a Vulkan 1.3 device and a swapchain, then idles in the
// event loop. Rendering is not implemented yet: Engine::draw is the
// extension point.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit ApplicationHandler, FrameLoop)                      │
// │    └── Engine (lifecycle, single instance)                      │
// │          └── GpuInstance -> Surface -> VulkanDevice             │
// │                └── Swapchain (FIFO, BGRA8)                      │
// └─────────────────────────────────────────────────────────────────┘
//
// ITERATION FLOW:
// 1. winit delivers every pending window event -> FrameLoop
// 2. about_to_wait: exit, throttle while minimized, or draw
//
// =============================================================================

mod backend;
mod config;
mod engine;

use anyhow::{Context, Result};
use config::Config;
use engine::{frame_loop, Engine, FrameLoop, Iteration};
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::WindowId,
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml; it carries the log filter, so
    // any load error is reported after the logger is up
    let (config, config_error) = Config::load();

    // Initialize logging
    init_logging(&config);
    log::info!("Starting Vulkan engine");
    match config_error {
        Some(e) => log::warn!("Failed to load {}: {:#}. Using defaults.", config::CONFIG_FILE, e),
        None => log::debug!("Config: {:?}", config),
    }
    log::info!(
        "Window: {}x{}, validation layers {}",
        config.window.width,
        config.window.height,
        if config.debug.validation_layers { "on" } else { "off" }
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated with error")?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging. RUST_LOG wins over the configured filter.
fn init_logging(config: &Config) {
    let env = env_logger::Env::default().default_filter_or(config.debug.log_filter.as_str());
    env_logger::Builder::from_env(env).init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Drives the engine from winit's event loop.
struct App {
    config: Config,
    engine: Option<Engine>,
    frame_loop: FrameLoop,
    /// Fatal error that ended the loop, reported by main
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            engine: None,
            frame_loop: FrameLoop::new(),
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.failure = Some(error);
        event_loop.exit();
    }

    fn start_engine(&mut self, event_loop: &ActiveEventLoop) -> Result<Engine> {
        let mut engine = Engine::new(self.config.clone());

        if let Err(e) = engine.init(event_loop) {
            engine.cleanup();
            return Err(e).context("Failed to initialize engine");
        }
        engine.start()?;
        debug_assert!(engine.is_initialized());

        if let (Some(device), Some(swapchain)) = (engine.device(), engine.swapchain()) {
            log::info!(
                "{} ready: {} swapchain images, {:?}, {}x{}",
                device.device_name,
                swapchain.image_count(),
                swapchain.format,
                swapchain.extent.width,
                swapchain.extent.height
            );
        }
        Ok(engine)
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() {
            return;
        }

        match self.start_engine(event_loop) {
            Ok(engine) => self.engine = Some(engine),
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(loop_event) = frame_loop::translate(&event) {
            self.frame_loop.handle(loop_event);
            log::trace!(
                "{:?} -> quit: {}, rendering stopped: {}",
                loop_event,
                self.frame_loop.quit_requested(),
                self.frame_loop.stop_rendering()
            );
        }
    }

    /// End of an iteration: every pending event has been handled.
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        match self.frame_loop.end_iteration() {
            Iteration::Exit => {
                log::info!("Quit requested, shutting down...");
                event_loop.exit();
            }
            Iteration::Throttle(wait) => {
                // Minimized: don't spin, don't draw
                event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + wait));
            }
            Iteration::Draw { resize } => {
                event_loop.set_control_flow(ControlFlow::Poll);

                if let Some((width, height)) = resize {
                    if let Err(e) = engine.resize(width, height) {
                        let error = anyhow::Error::new(e).context("Failed to resize swapchain");
                        self.fail(event_loop, error);
                        return;
                    }
                }

                engine.draw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut engine) = self.engine.take() {
            let extent = engine.window_extent();
            log::info!(
                "Exiting from {:?} after {} frames at {}x{}",
                engine.state(),
                engine.frame_number(),
                extent.width,
                extent.height
            );
            engine.cleanup();
        }
    }
}
