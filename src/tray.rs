use thiserror::Error;
use tray_icon::{
    menu::{Menu, MenuEvent, MenuEventReceiver, MenuId, MenuItem, PredefinedMenuItem},
    Icon, MouseButton, MouseButtonState, TrayIcon, TrayIconBuilder, TrayIconEvent,
    TrayIconEventReceiver,
};

use crate::tray_anchor::Rect;

const ICON_SIZE: u32 = 32;

#[derive(Debug, Error)]
pub enum TrayError {
    #[error("Failed to initialize GTK: {0}")]
    Gtk(String),

    #[error("Menu error: {0}")]
    Menu(#[from] tray_icon::menu::Error),

    #[error("Icon error: {0}")]
    Icon(#[from] tray_icon::BadIcon),

    #[error("Tray error: {0}")]
    Build(#[from] tray_icon::Error),
}

pub struct TrayManager {
    tray_icon: TrayIcon,
    menu_event_receiver: MenuEventReceiver,
    icon_event_receiver: TrayIconEventReceiver,
    toggle_item_id: MenuId,
    quit_item_id: MenuId,
    last_bounds: Option<Rect>,
}

impl TrayManager {
    pub fn new() -> Result<Self, TrayError> {
        // Initialize GTK on Linux (required for tray-icon crate)
        #[cfg(target_os = "linux")]
        {
            if !gtk::is_initialized() {
                gtk::init().map_err(|e| TrayError::Gtk(e.to_string()))?;
            }
        }

        let tray_menu = Menu::new();
        let toggle_item = MenuItem::new("Show/Hide", true, None);
        let quit_item = MenuItem::new("Quit", true, None);

        let toggle_item_id = toggle_item.id().clone();
        let quit_item_id = quit_item.id().clone();

        tray_menu.append(&toggle_item)?;
        tray_menu.append(&PredefinedMenuItem::separator())?;
        tray_menu.append(&quit_item)?;

        let icon = Icon::from_rgba(icon_rgba(ICON_SIZE), ICON_SIZE, ICON_SIZE)?;
        let tray_icon = TrayIconBuilder::new()
            .with_menu(Box::new(tray_menu))
            .with_menu_on_left_click(false)
            .with_tooltip("Trayshot")
            .with_icon(icon)
            .build()?;
        tracing::info!("Tray icon ready");

        Ok(Self {
            tray_icon,
            menu_event_receiver: MenuEvent::receiver().clone(),
            icon_event_receiver: TrayIconEvent::receiver().clone(),
            toggle_item_id,
            quit_item_id,
            last_bounds: None,
        })
    }

    /// Pumps pending GTK events on Linux, where tray-icon relies on them.
    pub fn update(&self) {
        #[cfg(target_os = "linux")]
        {
            while gtk::events_pending() {
                gtk::main_iteration();
            }
        }
    }

    /// Mirrors upload progress in the tooltip; `None` restores the idle text.
    pub fn show_progress(&self, percent: Option<u8>) {
        let tooltip = match percent {
            Some(p) => format!("Trayshot - uploading {}%", p),
            None => "Trayshot".to_string(),
        };
        if let Err(e) = self.tray_icon.set_tooltip(Some(tooltip)) {
            tracing::debug!(error = %e, "Failed to update tray tooltip");
        }
    }

    /// Best known bounds of the tray icon on screen.
    fn bounds(&mut self) -> Option<Rect> {
        let current = self.tray_icon.rect().map(to_rect);
        if current.is_some() {
            self.last_bounds = current;
        }
        self.last_bounds
    }

    /// Check for tray icon and menu events and return the action
    pub fn poll_events(&mut self) -> Option<TrayAction> {
        while let Ok(event) = self.icon_event_receiver.try_recv() {
            if let TrayIconEvent::Click {
                rect,
                button: MouseButton::Left,
                button_state: MouseButtonState::Up,
                ..
            } = event
            {
                let bounds = to_rect(rect);
                self.last_bounds = Some(bounds);
                return Some(TrayAction::Activate(Some(bounds)));
            }
        }

        if let Ok(event) = self.menu_event_receiver.try_recv() {
            if event.id == self.toggle_item_id {
                return Some(TrayAction::Activate(self.bounds()));
            } else if event.id == self.quit_item_id {
                return Some(TrayAction::Quit);
            }
        }
        None
    }
}

/// Physical pixels, as tray-icon reports them.
fn to_rect(rect: tray_icon::Rect) -> Rect {
    Rect::new(
        rect.position.x.round() as i32,
        rect.position.y.round() as i32,
        rect.size.width as i32,
        rect.size.height as i32,
    )
}

/// A violet disc with a white upward arrow.
fn icon_rgba(size: u32) -> Vec<u8> {
    let mut rgba = Vec::with_capacity((size * size * 4) as usize);
    let center = (size as f32 - 1.0) / 2.0;
    let radius = size as f32 / 2.0;

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let inside = dx * dx + dy * dy <= radius * radius;

            let fy = y as f32 / size as f32;
            let head = fy >= 0.2 && fy < 0.5 && dx.abs() <= (fy - 0.2) * size as f32;
            let shaft = fy >= 0.5 && fy < 0.8 && dx.abs() <= size as f32 * 0.08;

            let pixel = if !inside {
                [0, 0, 0, 0]
            } else if head || shaft {
                [255, 255, 255, 255]
            } else {
                [139, 92, 246, 255]
            };
            rgba.extend_from_slice(&pixel);
        }
    }
    rgba
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    /// Toggle the window; carries the icon bounds when they are known.
    Activate(Option<Rect>),
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_buffer_shape() {
        let rgba = icon_rgba(ICON_SIZE);
        assert_eq!(rgba.len(), (ICON_SIZE * ICON_SIZE * 4) as usize);

        // Corners are transparent, the centre column carries the arrow.
        assert_eq!(&rgba[0..4], &[0, 0, 0, 0]);
        let centre = ((ICON_SIZE / 2 * ICON_SIZE + ICON_SIZE / 2) * 4) as usize;
        assert_eq!(&rgba[centre..centre + 4], &[255, 255, 255, 255]);
    }
}
