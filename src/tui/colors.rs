// Palette shared by every screen
use ratatui::style::Color;

/// Likes, errors
pub const ACCENT_PRIMARY: Color = Color::Rgb(255, 107, 129);
/// Loaded state, positive actions
pub const ACCENT_SECONDARY: Color = Color::Rgb(78, 205, 196);
/// Titles, focus
pub const ACCENT_HIGHLIGHT: Color = Color::Rgb(255, 209, 102);

pub const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
pub const TEXT_SECONDARY: Color = Color::Rgb(140, 140, 150);

pub const BG_DARK: Color = Color::Rgb(24, 24, 32);
pub const BORDER_COLOR: Color = Color::Rgb(70, 70, 90);
