use iced::widget::{button, container};
use iced::{Background, Border, Color, Theme};

const ACCENT: Color = Color::from_rgb(0.545, 0.361, 0.965);

pub fn window_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style {
        background: Some(Background::Color(palette.background.base.color)),
        border: Border {
            width: 1.0,
            color: palette.background.strong.color,
            radius: 8.0.into(),
        },
        ..Default::default()
    }
}

pub fn drop_zone_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style {
        background: Some(Background::Color(Color::TRANSPARENT)),
        text_color: Some(palette.background.weak.text),
        border: Border {
            width: 1.0,
            color: palette.background.strong.color,
            radius: 8.0.into(),
        },
        ..Default::default()
    }
}

pub fn divider_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style {
        background: Some(Background::Color(palette.background.strong.color)),
        ..Default::default()
    }
}

pub fn menu_item_style(theme: &Theme, status: button::Status) -> button::Style {
    let palette = theme.extended_palette();
    let base = button::Style {
        background: None,
        text_color: palette.background.base.text,
        border: Border {
            radius: 4.0.into(),
            ..Default::default()
        },
        ..Default::default()
    };

    match status {
        button::Status::Hovered | button::Status::Pressed => button::Style {
            background: Some(Background::Color(ACCENT)),
            text_color: Color::WHITE,
            ..base
        },
        button::Status::Disabled => button::Style {
            text_color: palette.background.strong.color,
            ..base
        },
        button::Status::Active => base,
    }
}

pub fn cancel_button_style(_theme: &Theme, status: button::Status) -> button::Style {
    let red = match status {
        button::Status::Hovered | button::Status::Pressed => Color::from_rgb(1.0, 0.4, 0.4),
        _ => Color::from_rgb(0.94, 0.27, 0.27),
    };
    button::Style {
        background: None,
        text_color: red,
        ..Default::default()
    }
}

pub fn hotkey_color() -> Color {
    Color::from_rgba(1.0, 1.0, 1.0, 0.4)
}
