//! Window hosting using winit

use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window as WinitWindow, WindowBuilder},
};

use crate::backend::{BackendError, BackendResult};

/// A winit window with the state the render loop polls each frame
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
    pressed: Vec<KeyCode>,
}

impl Window {
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> BackendResult<Self> {
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(event_loop)
            .map_err(|e| BackendError::InitializationFailed(format!("Failed to create window: {}", e)))?;

        Ok(Self {
            window: Arc::new(window),
            width,
            height,
            resized: false,
            close_requested: false,
            pressed: Vec::new(),
        })
    }

    /// Shared handle for surface creation
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the window was resized since the flag was last cleared
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    pub fn clear_resize_flag(&mut self) {
        self.resized = false;
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Keys pressed since the last frame, in press order
    pub fn take_pressed_keys(&mut self) -> Vec<KeyCode> {
        std::mem::take(&mut self.pressed)
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.pressed.push(*code);
            }
            _ => {}
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Create a window and call `frame` once per loop iteration until it closes
/// or `frame` returns `false`
pub fn run<F>(title: &str, width: u32, height: u32, mut frame: F) -> BackendResult<()>
where
    F: FnMut(&mut Window) -> bool + 'static,
{
    let event_loop = EventLoop::new()
        .map_err(|e| BackendError::InitializationFailed(format!("Failed to create event loop: {}", e)))?;
    let mut window = Window::new(&event_loop, title, width, height)?;

    event_loop
        .run(move |event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => {
                    window.handle_event(&event);
                    if window.should_close() {
                        elwt.exit();
                    }
                }
                Event::AboutToWait => {
                    if !frame(&mut window) {
                        elwt.exit();
                    }
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .map_err(|e| BackendError::InitializationFailed(format!("Event loop failed: {}", e)))
}
