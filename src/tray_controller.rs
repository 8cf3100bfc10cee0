use crate::tray_anchor::{anchor_window, Position, Rect, Size, TrayGeometry};

pub trait WindowHost {
    fn tray_bounds(&self) -> Rect;
    fn display_bounds(&self) -> Rect;
    fn window_size(&self) -> Size;
    fn set_position(&mut self, position: Position);
    fn show(&mut self);
    fn hide(&mut self);
    fn focus(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayEvent {
    /// Tray icon clicked, or "Show/Hide" chosen from its menu.
    Activated,
    /// The window manager asked to close the window.
    CloseRequested,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Exit,
}

#[derive(Debug)]
pub struct TrayController {
    visibility: Visibility,
}

impl TrayController {
    pub fn new() -> Self {
        Self {
            visibility: Visibility::Hidden,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn handle<H: WindowHost>(&mut self, event: TrayEvent, host: &mut H) -> ControlFlow {
        match event {
            TrayEvent::Activated => {
                match self.visibility {
                    Visibility::Visible => self.hide(host),
                    Visibility::Hidden => self.show(host),
                }
                ControlFlow::Continue
            }
            TrayEvent::CloseRequested => {
                self.hide(host);
                ControlFlow::Continue
            }
            TrayEvent::Quit => {
                tracing::info!("Quit requested");
                ControlFlow::Exit
            }
        }
    }

    /// Positions the window over the tray icon, then shows and focuses it.
    pub fn show<H: WindowHost>(&mut self, host: &mut H) {
        let geometry = TrayGeometry {
            tray_bounds: host.tray_bounds(),
            display_bounds: host.display_bounds(),
            window_size: host.window_size(),
        };
        let position = anchor_window(&geometry);
        tracing::debug!(?geometry, ?position, "Showing window");

        host.set_position(position);
        host.show();
        host.focus();
        self.visibility = Visibility::Visible;
    }

    pub fn hide<H: WindowHost>(&mut self, host: &mut H) {
        host.hide();
        self.visibility = Visibility::Hidden;
    }
}

impl Default for TrayController {
    fn default() -> Self {
        Self::new()
    }
}
