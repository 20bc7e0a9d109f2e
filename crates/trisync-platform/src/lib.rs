// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Window and event pump. The frame loop owns control flow, so events are
//! pumped on demand instead of handing the thread to `EventLoop::run_app`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};
use trisync_render::{RenderSize, WindowSystem};

pub use winit;

use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

type ResizeCallback = Box<dyn FnMut(RenderSize)>;

/// Bounds the wait for the platform to deliver `resumed` at startup.
const CREATE_ATTEMPTS: u32 = 100;

pub struct Platform {
    event_loop: EventLoop<()>,
    state: PlatformState,
}

struct PlatformState {
    attributes: WindowAttributes,
    window: Option<Window>,
    create_error: Option<OsError>,
    close_requested: bool,
    on_resize: Option<ResizeCallback>,
}

#[inline]
fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

fn window_attributes(width: u32, height: u32, title: &str, resizable: bool) -> WindowAttributes {
    Window::default_attributes()
        .with_title(title)
        .with_inner_size(LogicalSize::new(width, height))
        .with_resizable(resizable)
}

impl Platform {
    /// Opens the event loop and pumps it until the window exists.
    pub fn create_window(width: u32, height: u32, title: &str, resizable: bool) -> Result<Self> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;
        let mut platform = Platform {
            event_loop,
            state: PlatformState {
                attributes: window_attributes(width, height, title, resizable),
                window: None,
                create_error: None,
                close_requested: false,
                on_resize: None,
            },
        };

        for _ in 0..CREATE_ATTEMPTS {
            platform.pump(Some(Duration::from_millis(10)));
            if let Some(e) = platform.state.create_error.take() {
                return Err(e).context("failed to create window");
            }
            if platform.state.window.is_some() {
                break;
            }
            if platform.state.close_requested {
                return Err(anyhow!("event loop exited before the window was created"));
            }
        }

        let window = platform
            .state
            .window
            .as_ref()
            .context("platform never resumed; no window was created")?;
        let size = window.inner_size();
        info!("window '{}' {}x{}", title, size.width, size.height);
        Ok(platform)
    }

    /// Replaces the resize notification; called with the new framebuffer size.
    pub fn on_resize(&mut self, callback: impl FnMut(RenderSize) + 'static) {
        self.state.on_resize = Some(Box::new(callback));
    }

    /// The window, for raw display and window handles.
    pub fn window(&self) -> Option<&Window> {
        self.state.window.as_ref()
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            debug!("event loop exited ({code})");
            self.state.close_requested = true;
        }
    }
}

impl WindowSystem for Platform {
    fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn framebuffer_size(&self) -> RenderSize {
        self.state
            .window
            .as_ref()
            .map(|w| render_size(w.inner_size()))
            .unwrap_or_default()
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }
}

impl ApplicationHandler for PlatformState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if self.window.is_none() {
            match event_loop.create_window(self.attributes.clone()) {
                Ok(w) => self.window = Some(w),
                Err(e) => self.create_error = Some(e),
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() != window_id) {
            return;
        }
        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Resized → {}x{}", size.width, size.height);
                if let Some(cb) = self.on_resize.as_mut() {
                    cb(render_size(size));
                }
            }
            _ => {}
        }
    }
}
