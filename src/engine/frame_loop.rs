// Frame loop control
//
// Window events are reduced to LoopEvents, folded into FrameLoop, and at
// the end of every event batch FrameLoop says what to do with the iteration.
// Kept free of Vulkan so it can be driven from tests.

use std::time::Duration;
use winit::event::WindowEvent;
use winit::keyboard::{KeyCode, PhysicalKey};

/// How long to wait between iterations while the window is minimized
pub const MINIMIZED_THROTTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Quit,
    Minimized,
    Restored,
    Resized { width: u32, height: u32 },
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// Leave the event loop
    Exit,
    /// Window hidden: wait, don't draw
    Throttle(Duration),
    /// Draw a frame, after rebuilding the swapchain at this size if set
    Draw { resize: Option<(u32, u32)> },
}

#[derive(Debug, Default)]
pub struct FrameLoop {
    quit: bool,
    stop_rendering: bool,
    pending_resize: Option<(u32, u32)>,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Quit => self.quit = true,
            LoopEvent::Minimized => {
                if !self.stop_rendering {
                    log::debug!("Window minimized, pausing rendering");
                }
                self.stop_rendering = true;
            }
            LoopEvent::Restored => {
                if self.stop_rendering {
                    log::debug!("Window restored, resuming rendering");
                }
                self.stop_rendering = false;
            }
            LoopEvent::Resized { width, height } => {
                // A visible size after being hidden is a restore
                self.handle(LoopEvent::Restored);
                self.pending_resize = Some((width, height));
            }
        }
    }

    /// Called once all pending events of this iteration are handled
    pub fn end_iteration(&mut self) -> Iteration {
        if self.quit {
            Iteration::Exit
        } else if self.stop_rendering {
            Iteration::Throttle(MINIMIZED_THROTTLE)
        } else {
            Iteration::Draw {
                resize: self.pending_resize.take(),
            }
        }
    }

    pub fn stop_rendering(&self) -> bool {
        self.stop_rendering
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }
}

/// Reduce a window event to what the loop cares about
pub fn translate(event: &WindowEvent) -> Option<LoopEvent> {
    match event {
        WindowEvent::CloseRequested | WindowEvent::Destroyed => Some(LoopEvent::Quit),
        WindowEvent::KeyboardInput { event, .. }
            if event.state.is_pressed()
                && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
        {
            Some(LoopEvent::Quit)
        }
        WindowEvent::Occluded(true) => Some(LoopEvent::Minimized),
        WindowEvent::Occluded(false) => Some(LoopEvent::Restored),
        WindowEvent::Resized(size) if size.width == 0 || size.height == 0 => {
            Some(LoopEvent::Minimized)
        }
        WindowEvent::Resized(size) => Some(LoopEvent::Resized {
            width: size.width,
            height: size.height,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    /// Run `iterations` loop turns, counting the draws
    fn count_draws(frame_loop: &mut FrameLoop, iterations: usize) -> usize {
        (0..iterations)
            .filter(|_| matches!(frame_loop.end_iteration(), Iteration::Draw { .. }))
            .count()
    }

    #[test]
    fn draws_every_iteration_by_default() {
        let mut frame_loop = FrameLoop::new();
        assert_eq!(count_draws(&mut frame_loop, 5), 5);
    }

    #[test]
    fn minimize_stops_drawing_until_restore() {
        let mut frame_loop = FrameLoop::new();

        frame_loop.handle(LoopEvent::Minimized);
        assert!(frame_loop.stop_rendering());
        assert_eq!(frame_loop.end_iteration(), Iteration::Throttle(MINIMIZED_THROTTLE));
        assert_eq!(count_draws(&mut frame_loop, 10), 0);

        frame_loop.handle(LoopEvent::Restored);
        assert!(!frame_loop.stop_rendering());
        assert_eq!(count_draws(&mut frame_loop, 3), 3);
    }

    #[test]
    fn quit_exits_on_the_same_iteration() {
        let mut frame_loop = FrameLoop::new();
        frame_loop.handle(LoopEvent::Quit);
        assert!(frame_loop.quit_requested());
        assert_eq!(frame_loop.end_iteration(), Iteration::Exit);
    }

    #[test]
    fn quit_wins_over_minimize() {
        let mut frame_loop = FrameLoop::new();
        frame_loop.handle(LoopEvent::Minimized);
        frame_loop.handle(LoopEvent::Quit);
        assert_eq!(frame_loop.end_iteration(), Iteration::Exit);
    }

    #[test]
    fn resize_is_delivered_once_and_only_when_visible() {
        let mut frame_loop = FrameLoop::new();
        frame_loop.handle(LoopEvent::Minimized);
        frame_loop.handle(LoopEvent::Resized { width: 800, height: 600 });
        frame_loop.handle(LoopEvent::Minimized);
        assert!(matches!(frame_loop.end_iteration(), Iteration::Throttle(_)));

        frame_loop.handle(LoopEvent::Restored);
        assert_eq!(
            frame_loop.end_iteration(),
            Iteration::Draw { resize: Some((800, 600)) }
        );
        assert_eq!(frame_loop.end_iteration(), Iteration::Draw { resize: None });
    }

    #[test]
    fn resize_after_minimize_restores() {
        let mut frame_loop = FrameLoop::new();
        frame_loop.handle(LoopEvent::Minimized);
        frame_loop.handle(LoopEvent::Resized { width: 1700, height: 900 });
        assert!(!frame_loop.stop_rendering());
    }

    #[test]
    fn translates_window_events() {
        assert_eq!(translate(&WindowEvent::CloseRequested), Some(LoopEvent::Quit));
        assert_eq!(translate(&WindowEvent::Occluded(true)), Some(LoopEvent::Minimized));
        assert_eq!(translate(&WindowEvent::Occluded(false)), Some(LoopEvent::Restored));
        assert_eq!(
            translate(&WindowEvent::Resized(PhysicalSize::new(0, 0))),
            Some(LoopEvent::Minimized)
        );
        assert_eq!(
            translate(&WindowEvent::Resized(PhysicalSize::new(1280, 720))),
            Some(LoopEvent::Resized { width: 1280, height: 720 })
        );
        assert_eq!(translate(&WindowEvent::Focused(true)), None);
    }
}
