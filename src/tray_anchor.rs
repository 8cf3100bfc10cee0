#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrayGeometry {
    pub tray_bounds: Rect,
    pub display_bounds: Rect,
    pub window_size: Size,
}

/// Top-left position that centres the window horizontally on the tray icon
/// and sits it directly above, clamped so the window stays on the display.
///
/// When the window is larger than the display on an axis, that axis is 0.
pub fn anchor_window(geometry: &TrayGeometry) -> Position {
    let tray = geometry.tray_bounds;
    let display = geometry.display_bounds;
    let window = geometry.window_size;

    let x = (tray.x as f64 + tray.width as f64 / 2.0 - window.width as f64 / 2.0).round() as i32;
    let y = tray.y - window.height;

    Position {
        x: clamp_axis(x, display.width - window.width),
        y: clamp_axis(y, display.height - window.height),
    }
}

fn clamp_axis(value: i32, max: i32) -> i32 {
    value.min(max).max(0)
}
