use crate::style;
use iced::widget::{button, column, horizontal_space, progress_bar as bar, row, text};
use iced::{Element, Length};

const NAME_LIMIT: usize = 14;

/// Upload progress bar with the percentage underneath.
pub fn progress_bar<'a, Message: 'a>(percent: u8) -> Element<'a, Message> {
    column![
        bar(0.0..=100.0, percent as f32).height(Length::Fixed(8.0)),
        row![
            text("Uploading").size(12),
            horizontal_space(),
            text(format!("{}%", percent)).size(12)
        ]
    ]
    .spacing(6)
    .width(Length::Fill)
    .into()
}

/// A menu row with its keyboard shortcut on the right.
pub fn menu_item<'a, Message: Clone + 'a>(
    label: &'a str,
    hotkey: &str,
    on_press: Message,
) -> Element<'a, Message> {
    let content = row![
        text(label).size(13),
        horizontal_space(),
        text(hotkey_label(hotkey))
            .size(12)
            .color(style::hotkey_color())
    ]
    .align_y(iced::Alignment::Center);

    button(content)
        .on_press(on_press)
        .padding([6, 10])
        .width(Length::Fill)
        .style(style::menu_item_style)
        .into()
}

/// Renders a shortcut like `mod+shift+o` with platform symbols.
pub fn hotkey_label(hotkey: &str) -> String {
    hotkey_label_for(hotkey, cfg!(target_os = "macos"))
}

fn hotkey_label_for(hotkey: &str, macos: bool) -> String {
    hotkey
        .split('+')
        .filter(|key| !key.is_empty())
        .map(|key| match key {
            "shift" => "⇧".to_string(),
            "ctrl" => "Ctrl".to_string(),
            "alt" => "⌥".to_string(),
            "meta" => "⌘".to_string(),
            "mod" if macos => "⌘".to_string(),
            "mod" => "Ctrl".to_string(),
            other => other.to_uppercase(),
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// Shortens long file names for the status line.
pub fn truncate_name(name: &str) -> String {
    if name.chars().count() > NAME_LIMIT {
        let head: String = name.chars().take(NAME_LIMIT).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}
