use feedswipe::cli::{next_language, Args};
use feedswipe::domain::Direction;
use feedswipe::likes::{JsonLikedStore, LikeBus};
use feedswipe::preview::{RenderedImageCache, PREVIEW_CACHE_SIZE};
use feedswipe::tui::{
    card_height, handle_key_event, handle_mouse_event, render_feed, render_help_overlay,
    render_liked_overlay, KeyAction, LikedPanel, PointerAction, ViewState,
};
use feedswipe::{open_article, FeedController, WikipediaApi};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::{io, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> io::Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = &args.log_file {
        if let Err(e) = init_logging(path) {
            eprintln!("Warning: Failed to set up logging: {}", e);
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let runtime_guard = runtime.enter();

    let api = match WikipediaApi::new(&config) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let likes = open_likes(args.liked_file.as_deref());
    info!(locale = %config.locale, "starting feed");

    let mut controller = FeedController::new(config, api.clone(), api, likes.clone());
    let mut panel = LikedPanel::new(&likes);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut controller, &mut panel);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    drop(controller);
    drop(runtime_guard);
    runtime.shutdown_timeout(Duration::from_millis(500));
    result
}

/// Logs go to a file; writing to the terminal would corrupt the TUI
fn init_logging(path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("feedswipe=info".parse()?))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()?;
    Ok(())
}

/// Falls back to an in-memory set when the liked file can't be used
fn open_likes(path: Option<&Path>) -> LikeBus {
    let path = match path.map(Path::to_path_buf).or_else(JsonLikedStore::default_path) {
        Some(path) => path,
        None => {
            warn!("no data directory, liked items will not persist");
            return LikeBus::in_memory();
        }
    };

    match JsonLikedStore::open(&path) {
        Ok(store) => LikeBus::new(store),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "liked file unusable, keeping likes in memory");
            LikeBus::in_memory()
        }
    }
}

/// Main application loop
fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    controller: &mut FeedController,
    panel: &mut LikedPanel,
) -> io::Result<()> {
    let mut view_state = ViewState::Browsing;
    let mut previews = RenderedImageCache::new(PREVIEW_CACHE_SIZE);

    loop {
        let size = terminal.size()?;
        let area = Rect::new(0, 0, size.width, size.height);
        controller.set_viewport_extent(f32::from(card_height(area)));
        controller.tick();

        let view = controller.view();
        if let Some(current) = view.current() {
            panel.remember(&current.item);
        }

        terminal.draw(|frame| {
            render_feed(frame, &view, |current, width, height| {
                let media = current.render.media.as_ref()?.media.first()?;
                let bytes = controller.preloaded_bytes(&media.url)?;
                previews.get_or_render(&media.url, &bytes, width, height)
            });

            match view_state {
                ViewState::Help => render_help_overlay(frame),
                ViewState::Liked => render_liked_overlay(frame, panel),
                ViewState::Browsing => {}
            }
        })?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }

        match event::read()? {
            Event::Key(key) => {
                let action = handle_key_event(key);

                // Overlays close on their own key or Quit
                if view_state != ViewState::Browsing {
                    match action {
                        KeyAction::Help => view_state = view_state.toggle(ViewState::Help),
                        KeyAction::ToggleLikedPanel => {
                            view_state = view_state.toggle(ViewState::Liked)
                        }
                        KeyAction::Quit => view_state = ViewState::Browsing,
                        _ => {}
                    }
                    continue;
                }

                match action {
                    KeyAction::Quit => break,
                    KeyAction::Next => {
                        controller.on_gesture_commit(Some(Direction::Forward));
                    }
                    KeyAction::Previous => {
                        controller.on_gesture_commit(Some(Direction::Backward));
                    }
                    KeyAction::ToggleLike => {
                        controller.toggle_current_like();
                    }
                    KeyAction::OpenArticle => {
                        if let Some(item) = controller.current_item() {
                            if let Err(e) = open_article(&item) {
                                warn!(id = %item.id, error = %e, "could not open article");
                            }
                        }
                    }
                    KeyAction::ToggleLikedPanel => view_state = view_state.toggle(ViewState::Liked),
                    KeyAction::CycleLanguage => {
                        let next = next_language(controller.locale());
                        controller.on_language_change(next);
                        previews.clear();
                    }
                    KeyAction::Help => view_state = view_state.toggle(ViewState::Help),
                    KeyAction::None => {}
                }
            }
            Event::Mouse(mouse) if view_state == ViewState::Browsing => {
                match handle_mouse_event(mouse) {
                    PointerAction::Press(row) => controller.on_drag_start(f32::from(row)),
                    PointerAction::Drag(row) => controller.on_drag_move(f32::from(row)),
                    PointerAction::Release => {
                        controller.on_drag_end();
                    }
                    PointerAction::Scroll(direction) => {
                        controller.on_gesture_commit(Some(direction));
                    }
                    PointerAction::None => {}
                }
            }
            _ => {}
        }
    }

    Ok(())
}
