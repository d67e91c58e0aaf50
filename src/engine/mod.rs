// =============================================================================
// ENGINE - owns the window and every GPU object, in acquisition order
// =============================================================================
//
// INIT ORDER:    window -> instance -> surface -> device -> swapchain
//                -> commands -> sync
// TEARDOWN:      swapchain -> surface -> device -> debug messenger
//                -> instance -> window
//
// Each GPU object lives in a wrapper that releases it on drop, and
// dependents hold an Arc to what they depend on. A failure halfway through
// init therefore unwinds whatever was already created.

pub mod frame_loop;
pub mod lifecycle;

pub use frame_loop::{FrameLoop, Iteration};
pub use lifecycle::{EngineToken, LifecycleState};

use crate::backend::{GpuError, GpuInstance, Surface, Swapchain, VulkanDevice};
use crate::config::Config;
use ash::vk;
use raw_window_handle::HasDisplayHandle;
use std::sync::Arc;
use thiserror::Error;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Another engine is already running in this process")]
    AlreadyRunning,

    #[error("Window creation failed: {0}")]
    WindowCreation(#[from] winit::error::OsError),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("Invalid engine state transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// The engine. At most one may be initialized per process.
///
/// Field order matters: fields drop top to bottom, which is the teardown order.
pub struct Engine {
    swapchain: Option<Swapchain>,
    surface: Option<Arc<Surface>>,
    device: Option<Arc<VulkanDevice>>,
    instance: Option<Arc<GpuInstance>>,
    window: Option<Arc<Window>>,
    token: Option<EngineToken>,

    config: Config,
    window_extent: vk::Extent2D,
    frame_number: u64,
    initialized: bool,
    state: LifecycleState,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let window_extent = vk::Extent2D {
            width: config.window.width,
            height: config.window.height,
        };

        Self {
            swapchain: None,
            surface: None,
            device: None,
            instance: None,
            window: None,
            token: None,
            config,
            window_extent,
            frame_number: 0,
            initialized: false,
            state: LifecycleState::Uninitialized,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Bring the engine up: window, Vulkan, swapchain, commands, sync.
    ///
    /// Nothing is stored on `self` until every step succeeded; on error the
    /// already-created objects are released before returning. Call
    /// `cleanup` afterwards either way.
    pub fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), EngineError> {
        self.claim()?;

        log::info!("Initializing engine...");

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.window_extent.width,
                self.window_extent.height,
            ));
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        let (instance, surface, device) = self.init_vulkan(&window)?;
        let swapchain = self.init_swapchain(&device, &surface)?;
        self.init_commands()?;
        self.init_sync_structures()?;

        self.window = Some(window);
        self.instance = Some(instance);
        self.surface = Some(surface);
        self.device = Some(device);
        self.swapchain = Some(swapchain);

        self.state.advance(LifecycleState::Initialized)?;
        self.initialized = true;

        log::info!("Engine initialized");
        Ok(())
    }

    /// Take the process-wide single-engine token.
    ///
    /// Only a fresh engine may claim it; a cleaned-up engine stays dead.
    fn claim(&mut self) -> Result<(), EngineError> {
        if self.state != LifecycleState::Uninitialized {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to: LifecycleState::Initialized,
            });
        }

        if self.token.is_none() {
            self.token = Some(EngineToken::acquire()?);
        }
        Ok(())
    }

    fn init_vulkan(
        &self,
        window: &Window,
    ) -> Result<(Arc<GpuInstance>, Arc<Surface>, Arc<VulkanDevice>), EngineError> {
        let display_handle = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("no display handle: {e}")))?
            .as_raw();

        let instance = GpuInstance::new(
            &self.config.app.name,
            self.config.debug.validation_layers,
            display_handle,
        )?;
        log::debug!(
            "Debug messenger {}",
            if instance.has_debug_messenger() { "enabled" } else { "disabled" }
        );
        let surface = Surface::new(instance.clone(), window)?;
        let device = VulkanDevice::new(instance.clone(), &surface)?;

        Ok((instance, surface, device))
    }

    fn init_swapchain(
        &self,
        device: &Arc<VulkanDevice>,
        surface: &Arc<Surface>,
    ) -> Result<Swapchain, EngineError> {
        let swapchain = Swapchain::new(
            device.clone(),
            surface.clone(),
            self.window_extent.width,
            self.window_extent.height,
        )?;
        Ok(swapchain)
    }

    // Command pools and buffers will be created here
    fn init_commands(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    // Fences and semaphores will be created here
    fn init_sync_structures(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    // =========================================================================
    // RUNNING
    // =========================================================================

    /// Mark the engine as entering its frame loop
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.state.advance(LifecycleState::Running)
    }

    /// Render one frame.
    ///
    /// EXTENSION POINT: command recording, submission and presentation go
    /// here. For now only the frame counter moves.
    pub fn draw(&mut self) {
        self.frame_number += 1;
    }

    /// Rebuild the swapchain for a new window size
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        if width == self.window_extent.width
            && height == self.window_extent.height
            && self.swapchain.as_ref().is_some_and(Swapchain::is_alive)
        {
            return Ok(());
        }

        log::debug!("Window resized to {}x{}", width, height);
        self.window_extent = vk::Extent2D { width, height };

        if let Some(swapchain) = self.swapchain.as_mut() {
            swapchain.recreate(width, height)?;
        }
        Ok(())
    }

    // =========================================================================
    // CLEANUP
    // =========================================================================

    /// Release everything in reverse acquisition order. Safe to call more than once.
    ///
    /// GPU objects are only torn down if init completed (a failed init has
    /// already released its partial work). The single-engine token is always
    /// released.
    pub fn cleanup(&mut self) {
        self.token = None;
        if self.state == LifecycleState::Destroyed {
            return;
        }

        if let Err(e) = self.state.advance(LifecycleState::ShuttingDown) {
            log::warn!("{}", e);
        }

        if self.initialized {
            log::info!("Cleaning up engine resources...");

            if let Some(device) = &self.device {
                if let Err(e) = device.wait_idle() {
                    log::warn!("Device wait before cleanup failed: {}", e);
                }
            }

            // Explicit order; each drop releases its Vulkan object
            drop(self.swapchain.take());
            drop(self.surface.take());
            drop(self.device.take());
            drop(self.instance.take());
            drop(self.window.take());

            self.initialized = false;
            log::info!("Cleanup complete after {} frames", self.frame_number);
        }

        self.state = LifecycleState::Destroyed;
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    pub fn device(&self) -> Option<&Arc<VulkanDevice>> {
        self.device.as_ref()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only test that touches the process-wide token, so tests running
    // in parallel cannot interfere with each other.
    #[test]
    fn one_live_engine_per_process() {
        let first = EngineToken::acquire().unwrap();
        assert!(matches!(EngineToken::acquire(), Err(EngineError::AlreadyRunning)));
        drop(first);

        let mut engine = Engine::new(Config::default());
        engine.claim().unwrap();
        // Claiming again from the same engine is not a second engine
        engine.claim().unwrap();

        let mut other = Engine::new(Config::default());
        assert!(matches!(other.claim(), Err(EngineError::AlreadyRunning)));

        // Init never completed, cleanup must still free the slot
        engine.cleanup();
        assert_eq!(engine.state(), LifecycleState::Destroyed);
        assert!(!engine.is_initialized());

        // A destroyed engine cannot come back and take the slot again
        assert!(matches!(
            engine.claim(),
            Err(EngineError::InvalidTransition {
                from: LifecycleState::Destroyed,
                to: LifecycleState::Initialized,
            })
        ));

        other.claim().unwrap();
        drop(other);
        let replacement = EngineToken::acquire().unwrap();
        drop(replacement);

        // Refused claims leave the slot free for the next engine
        assert!(engine.claim().is_err());
        let mut next = Engine::new(Config::default());
        next.claim().unwrap();
        next.cleanup();
        assert!(next.claim().is_err());
        drop(EngineToken::acquire().unwrap());
    }

    #[test]
    fn new_engine_is_uninitialized() {
        let engine = Engine::new(Config::default());
        assert_eq!(engine.state(), LifecycleState::Uninitialized);
        assert!(!engine.is_initialized());
        assert!(engine.swapchain().is_none());
        assert_eq!(
            engine.window_extent(),
            vk::Extent2D { width: 1700, height: 900 }
        );
    }

    #[test]
    fn draw_advances_the_frame_counter() {
        let mut engine = Engine::new(Config::default());
        engine.draw();
        engine.draw();
        assert_eq!(engine.frame_number(), 2);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let mut engine = Engine::new(Config::default());
        engine.cleanup();
        engine.cleanup();
        assert_eq!(engine.state(), LifecycleState::Destroyed);
    }

    #[test]
    fn resize_without_swapchain_only_records_extent() {
        let mut engine = Engine::new(Config::default());
        engine.resize(800, 600).unwrap();
        assert_eq!(engine.window_extent(), vk::Extent2D { width: 800, height: 600 });
    }
}
