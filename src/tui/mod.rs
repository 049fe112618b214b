// TUI module for rendering the terminal interface
pub mod colors;
pub mod input;

// Re-exports
pub use colors::*;
pub use input::{handle_key_event, handle_mouse_event, KeyAction, PointerAction};

use crate::content_cache::FetchState;
use crate::domain::{FeedItem, FeedView, ItemId, VisibleItem};
use crate::likes::{LikeBus, Subscription};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Gauge, List, ListItem, Paragraph, Wrap},
    Frame,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// UI view state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// Main feed view
    Browsing,
    /// Help overlay visible
    Help,
    /// Liked items panel visible
    Liked,
}

impl ViewState {
    /// Flips between `Browsing` and `overlay`
    pub fn toggle(self, overlay: ViewState) -> ViewState {
        if self == overlay {
            ViewState::Browsing
        } else {
            overlay
        }
    }
}

/// Second surface tracking the liked set, kept in sync purely through
/// like broadcasts
pub struct LikedPanel {
    /// Most recently liked first
    entries: Arc<Mutex<Vec<ItemId>>>,
    titles: HashMap<ItemId, String>,
    _subscription: Subscription,
}

impl LikedPanel {
    pub fn new(likes: &LikeBus) -> Self {
        let mut seed = likes.liked_ids();
        seed.reverse();
        let entries = Arc::new(Mutex::new(seed));

        let subscription = likes.subscribe({
            let entries = Arc::clone(&entries);
            move |event| {
                let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
                entries.retain(|id| *id != event.id);
                if event.liked {
                    entries.insert(0, event.id);
                }
            }
        });

        Self {
            entries,
            titles: HashMap::new(),
            _subscription: subscription,
        }
    }

    /// Records a title so the panel can show more than the id
    pub fn remember(&mut self, item: &FeedItem) {
        self.titles
            .entry(item.id)
            .or_insert_with(|| item.title.clone());
    }

    pub fn entries(&self) -> Vec<ItemId> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn label(&self, id: ItemId) -> String {
        match self.titles.get(&id) {
            Some(title) => title.clone(),
            None => format!("Article #{}", id),
        }
    }
}

/// Renders the feed. `preview` is asked for image lines sized to the
/// card's media area.
pub fn render_feed<F>(frame: &mut Frame, view: &FeedView, preview: F)
where
    F: FnOnce(&VisibleItem, u16, u16) -> Option<Vec<Line<'static>>>,
{
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Header with drag gauge
            Constraint::Min(0),    // Card
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    render_header(frame, chunks[0], view);
    match view.current() {
        Some(current) => render_card(frame, chunks[1], view, current, preview),
        None => frame.render_widget(render_empty_state_widget(view), chunks[1]),
    }
    render_footer(frame, chunks[2]);
}

/// Rows available for the card, used as the drag viewport extent
pub fn card_height(area: Rect) -> u16 {
    area.height.saturating_sub(7)
}

fn render_header(frame: &mut Frame, area: Rect, view: &FeedView) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Length(2)])
        .split(area);

    let title_text = if view.total > 0 {
        format!(
            " Card {}/{} ",
            view.position.current_index + 1,
            view.total
        )
    } else {
        " Feedswipe ".to_string()
    };

    let mut status = vec![Span::styled(
        format!("[{}]", view.locale),
        Style::default().fg(TEXT_SECONDARY),
    )];
    if view.loading {
        status.push(Span::raw("  "));
        status.push(Span::styled(
            "loading more…",
            Style::default()
                .fg(ACCENT_HIGHLIGHT)
                .add_modifier(Modifier::ITALIC),
        ));
    }
    if let Some(error) = &view.error {
        status.push(Span::raw("  "));
        status.push(Span::styled(
            format!("[!] {}", error),
            Style::default().fg(ACCENT_PRIMARY),
        ));
    }

    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            title_text,
            Style::default()
                .fg(ACCENT_HIGHLIGHT)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(status),
    ])
    .block(
        Block::default()
            .borders(Borders::TOP | Borders::LEFT | Borders::RIGHT)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(BORDER_COLOR)),
    )
    .alignment(Alignment::Left);
    frame.render_widget(header, chunks[0]);

    // Drag feedback
    let offset = view.position.drag_offset;
    let label = if offset > 0.0 {
        format!("↑ next {:.0}%", offset * 100.0)
    } else if offset < 0.0 {
        format!("↓ previous {:.0}%", -offset * 100.0)
    } else {
        String::new()
    };
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::BOTTOM | Borders::LEFT | Borders::RIGHT)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER_COLOR)),
        )
        .gauge_style(Style::default().fg(ACCENT_SECONDARY).bg(BG_DARK))
        .ratio(f64::from(offset.abs().min(1.0)))
        .label(label);
    frame.render_widget(gauge, chunks[1]);
}

fn render_card<F>(frame: &mut Frame, area: Rect, view: &FeedView, current: &VisibleItem, preview: F)
where
    F: FnOnce(&VisibleItem, u16, u16) -> Option<Vec<Line<'static>>>,
{
    let item = &current.item;
    let (heart, border) = if current.render.liked {
        (" ♥", ACCENT_PRIMARY)
    } else {
        ("", BORDER_COLOR)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border))
        .title(Line::from(vec![
            Span::styled(
                format!(" {}", item.title),
                Style::default()
                    .fg(TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("{} ", heart), Style::default().fg(ACCENT_PRIMARY)),
        ]));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(60), // Media
            Constraint::Min(0),         // Summary
            Constraint::Length(1),      // Up next
        ])
        .split(inner);

    let media_area = chunks[0];
    let media_lines = preview(current, media_area.width, media_area.height)
        .unwrap_or_else(|| vec![Line::from(""), media_status_line(current)]);
    frame.render_widget(
        Paragraph::new(media_lines).alignment(Alignment::Center),
        media_area,
    );

    let summary = Paragraph::new(item.summary_text.as_str())
        .style(Style::default().fg(TEXT_PRIMARY))
        .wrap(Wrap { trim: true });
    frame.render_widget(summary, chunks[1]);

    let next = view
        .items
        .iter()
        .find(|v| v.index == current.index + 1)
        .map(|v| v.item.title.as_str())
        .unwrap_or("…");
    let up_next = Paragraph::new(Line::from(vec![
        Span::styled("Up next: ", Style::default().fg(TEXT_SECONDARY)),
        Span::styled(next.to_string(), Style::default().fg(TEXT_SECONDARY)),
    ]));
    frame.render_widget(up_next, chunks[2]);
}

fn media_status_line(current: &VisibleItem) -> Line<'static> {
    let (text, color) = match current.render.media.as_ref().map(|entry| entry.state) {
        None | Some(FetchState::Pending) => ("Fetching media…", TEXT_SECONDARY),
        Some(FetchState::Ready) if current.render.media.iter().all(|e| e.media.is_empty()) => {
            ("No media", TEXT_SECONDARY)
        }
        Some(FetchState::Ready) => ("Loading image…", TEXT_SECONDARY),
        Some(FetchState::Failed) => ("Media unavailable", ACCENT_PRIMARY),
    };
    Line::from(Span::styled(text, Style::default().fg(color)))
}

/// Creates an empty state widget for when no cards are loaded yet
fn render_empty_state_widget(view: &FeedView) -> Paragraph<'static> {
    let (headline, detail) = match &view.error {
        Some(error) => (
            "Could not load the feed",
            format!("{} (retrying in the background)", error),
        ),
        None => ("Loading feed", "Fetching random articles…".to_string()),
    };

    let lines = vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled(
            headline,
            Style::default()
                .fg(ACCENT_HIGHLIGHT)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(detail, Style::default().fg(TEXT_SECONDARY))),
    ];

    Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER_COLOR))
                .title(" Feed "),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let controls = Line::from(vec![
        Span::styled("↑↓ ", Style::default().fg(TEXT_SECONDARY)),
        Span::styled("Swipe", Style::default().fg(TEXT_SECONDARY)),
        Span::raw("  │  "),
        Span::styled(
            "l ",
            Style::default()
                .fg(ACCENT_PRIMARY)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("Like", Style::default().fg(TEXT_SECONDARY)),
        Span::raw("  │  "),
        Span::styled("o ", Style::default().fg(ACCENT_SECONDARY)),
        Span::styled("Open", Style::default().fg(TEXT_SECONDARY)),
        Span::raw("  │  "),
        Span::styled("p ", Style::default().fg(ACCENT_HIGHLIGHT)),
        Span::styled("Liked", Style::default().fg(TEXT_SECONDARY)),
        Span::raw("  │  "),
        Span::styled("? ", Style::default().fg(TEXT_SECONDARY)),
        Span::styled("Help", Style::default().fg(TEXT_SECONDARY)),
        Span::raw("  │  "),
        Span::styled("q ", Style::default().fg(TEXT_SECONDARY)),
        Span::styled("Quit", Style::default().fg(TEXT_SECONDARY)),
    ]);

    let footer = Paragraph::new(controls)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER_COLOR)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(footer, area);
}

/// Renders the help overlay
pub fn render_help_overlay(frame: &mut Frame) {
    let help_area = centered_rect(50, 70, frame.area());
    frame.render_widget(Clear, help_area);

    let block = Block::default()
        .title(" Help ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(ACCENT_HIGHLIGHT))
        .style(Style::default().bg(BG_DARK));
    let inner = block.inner(help_area);
    frame.render_widget(block, help_area);

    let shortcut = |keys: &'static str, what: &'static str| {
        Line::from(vec![
            Span::styled(format!("{:>8}  ", keys), Style::default().fg(ACCENT_SECONDARY)),
            Span::raw(format!("{:<22}", what)),
        ])
    };

    let help_lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Controls",
            Style::default()
                .fg(ACCENT_HIGHLIGHT)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        shortcut("drag", "Swipe up or down"),
        shortcut("↓ j ␣", "Next card"),
        shortcut("↑ k", "Previous card"),
        shortcut("l", "Like / unlike"),
        shortcut("o ⏎", "Open article"),
        shortcut("p", "Liked items"),
        shortcut("g", "Next language"),
        shortcut("q Esc", "Quit"),
        Line::from(""),
        Line::from(Span::styled(
            "Press ? to close",
            Style::default().fg(TEXT_SECONDARY),
        )),
    ];

    let paragraph = Paragraph::new(help_lines)
        .alignment(Alignment::Center)
        .style(Style::default().fg(TEXT_PRIMARY));
    frame.render_widget(paragraph, inner);
}

/// Renders the liked items panel
pub fn render_liked_overlay(frame: &mut Frame, panel: &LikedPanel) {
    let area = centered_rect(60, 70, frame.area());
    frame.render_widget(Clear, area);

    let entries = panel.entries();
    let block = Block::default()
        .title(format!(" ♥ Liked ({}) ", entries.len()))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(ACCENT_PRIMARY))
        .style(Style::default().bg(BG_DARK));

    if entries.is_empty() {
        let empty = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "Nothing liked yet. Press l on a card.",
                Style::default().fg(TEXT_SECONDARY),
            )),
        ])
        .block(block)
        .alignment(Alignment::Center);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = entries
        .iter()
        .map(|id| {
            ListItem::new(Line::from(vec![
                Span::styled("♥ ", Style::default().fg(ACCENT_PRIMARY)),
                Span::styled(panel.label(*id), Style::default().fg(TEXT_PRIMARY)),
            ]))
        })
        .collect();
    frame.render_widget(List::new(items).block(block), area);
}

/// Helper to create a centered rect
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
