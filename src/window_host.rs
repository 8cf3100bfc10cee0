use crate::tray_anchor::{Position, Rect, Size, TrayGeometry};
use crate::tray_controller::WindowHost;

use iced::{window, Point, Task};

pub struct IcedWindowHost<Message> {
    id: window::Id,
    geometry: TrayGeometry,
    tasks: Vec<Task<Message>>,
}

impl<Message: Send + 'static> IcedWindowHost<Message> {
    pub fn new(id: window::Id, geometry: TrayGeometry) -> Self {
        Self {
            id,
            geometry,
            tasks: Vec::new(),
        }
    }

    pub fn into_task(self) -> Task<Message> {
        Task::batch(self.tasks)
    }
}

impl<Message: Send + 'static> WindowHost for IcedWindowHost<Message> {
    fn tray_bounds(&self) -> Rect {
        self.geometry.tray_bounds
    }

    fn display_bounds(&self) -> Rect {
        self.geometry.display_bounds
    }

    fn window_size(&self) -> Size {
        self.geometry.window_size
    }

    fn set_position(&mut self, position: Position) {
        let point = Point::new(position.x as f32, position.y as f32);
        self.tasks.push(window::move_to(self.id, point));
    }

    fn show(&mut self) {
        self.tasks.push(window::change_mode(self.id, window::Mode::Windowed));
    }

    fn hide(&mut self) {
        self.tasks.push(window::change_mode(self.id, window::Mode::Hidden));
    }

    fn focus(&mut self) {
        self.tasks.push(window::gain_focus(self.id));
    }
}

/// Builds the geometry snapshot from what iced and the tray reported.
///
/// `tray` is in physical pixels and is divided by `scale_factor`; everything
/// iced reports is already logical. Without tray bounds (Linux menu
/// activation) the window is anchored to the bottom-right corner of the
/// display.
pub fn sample_geometry(
    tray: Option<Rect>,
    window: iced::Size,
    monitor: Option<iced::Size>,
    scale_factor: f32,
) -> TrayGeometry {
    let window_size = Size {
        width: window.width.round() as i32,
        height: window.height.round() as i32,
    };
    let display_bounds = monitor
        .map(|m| Rect::new(0, 0, m.width.round() as i32, m.height.round() as i32))
        .unwrap_or(Rect::new(0, 0, window_size.width, window_size.height));
    let tray_bounds = tray.map(|t| to_logical(t, scale_factor)).unwrap_or(Rect::new(
        display_bounds.width,
        display_bounds.height,
        0,
        0,
    ));

    TrayGeometry {
        tray_bounds,
        display_bounds,
        window_size,
    }
}

fn to_logical(rect: Rect, scale_factor: f32) -> Rect {
    if !scale_factor.is_finite() || scale_factor <= 0.0 {
        return rect;
    }
    let scale = scale_factor as f64;
    let logical = |v: i32| (v as f64 / scale).round() as i32;
    Rect::new(
        logical(rect.x),
        logical(rect.y),
        logical(rect.width),
        logical(rect.height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tray_anchor::anchor_window;

    #[test]
    fn test_missing_tray_bounds_anchor_bottom_right() {
        let geometry = sample_geometry(
            None,
            iced::Size::new(300.0, 350.0),
            Some(iced::Size::new(1920.0, 1080.0)),
            2.0,
        );
        assert_eq!(anchor_window(&geometry), Position { x: 1620, y: 730 });
    }

    #[test]
    fn test_missing_monitor_pins_to_origin() {
        let geometry = sample_geometry(
            Some(Rect::new(800, 700, 20, 20)),
            iced::Size::new(300.0, 350.0),
            None,
            1.0,
        );
        assert_eq!(anchor_window(&geometry), Position { x: 0, y: 0 });
    }

    #[test]
    fn test_tray_bounds_scaled_to_logical_pixels() {
        let geometry = sample_geometry(
            Some(Rect::new(3000, 0, 44, 44)),
            iced::Size::new(300.0, 350.0),
            Some(iced::Size::new(1920.0, 1080.0)),
            2.0,
        );
        assert_eq!(geometry.tray_bounds, Rect::new(1500, 0, 22, 22));
        assert_eq!(anchor_window(&geometry).x, 1361);
    }

    #[test]
    fn test_unusable_scale_factor_leaves_bounds() {
        let tray = Rect::new(800, 1050, 24, 30);
        for scale in [0.0, -1.0, f32::NAN] {
            let geometry = sample_geometry(
                Some(tray),
                iced::Size::new(300.0, 350.0),
                Some(iced::Size::new(1920.0, 1080.0)),
                scale,
            );
            assert_eq!(geometry.tray_bounds, tray);
        }
    }
}
