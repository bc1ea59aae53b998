use image::DynamicImage;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Margin, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, ListState, Paragraph},
};
use ratatui_image::{Resize, StatefulImage, picker::Picker, protocol::StatefulProtocol};

use crate::backend::library::{Chapter, Manga};
use crate::backend::prefetch::{PrefetchHandle, Ticket};
use crate::ui::navigation::ViewStack;

/// Width of one manga tile in cells; the grid gets one extra column on top of
/// however many full tiles fit.
pub const TILE_WIDTH: u16 = 40;
/// Pages the reader decodes past the one on screen.
pub const READ_AHEAD: usize = 3;

const ACCENT: Color = Color::Magenta;

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum AppState {
    #[default]
    Loading,
    Ready,
}

pub struct MangaListView {
    pub mangas: Vec<Manga>,
    /// One entry per cover received so far, in `mangas` order. `None` when the
    /// terminal cannot show images.
    pub tiles: Vec<Option<StatefulProtocol>>,
    pub selected: usize,
    pub scroll_row: usize,
    pub columns: usize,
    /// Where each tile was drawn last frame, for mouse hit testing.
    pub tile_areas: Vec<(usize, Rect)>,
    pub prefetch: Option<PrefetchHandle>,
}

impl MangaListView {
    pub fn new(mangas: Vec<Manga>) -> Self {
        Self {
            mangas,
            tiles: Vec::new(),
            selected: 0,
            scroll_row: 0,
            columns: 1,
            tile_areas: Vec::new(),
            prefetch: None,
        }
    }

    pub fn with_prefetch(mut self, prefetch: PrefetchHandle) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn ready(&self) -> usize {
        self.tiles.len()
    }

    pub fn tile_at(&self, column: u16, row: u16) -> Option<usize> {
        self.tile_areas
            .iter()
            .find(|(_, area)| area.contains(Position::new(column, row)))
            .map(|(index, _)| *index)
    }
}

pub struct ChapterListView {
    pub manga: Manga,
    pub chapters: Vec<Chapter>,
    pub list_state: ListState,
    pub list_area: Rect,
}

impl ChapterListView {
    pub fn new(manga: Manga, chapters: Vec<Chapter>) -> Self {
        let mut list_state = ListState::default();
        if !chapters.is_empty() {
            list_state.select(Some(0));
        }
        Self {
            manga,
            chapters,
            list_state,
            list_area: Rect::default(),
        }
    }

    pub fn row_at(&self, column: u16, row: u16) -> Option<usize> {
        if !self.list_area.contains(Position::new(column, row)) {
            return None;
        }
        let index = self.list_state.offset() + (row - self.list_area.y) as usize;
        (index < self.chapters.len()).then_some(index)
    }
}

pub struct ReaderView {
    pub manga: Manga,
    pub chapter: Chapter,
    pub pages: Vec<Option<StatefulProtocol>>,
    pub position: usize,
    pub prefetch: Option<PrefetchHandle>,
}

impl ReaderView {
    pub fn new(manga: Manga, chapter: Chapter) -> Self {
        Self {
            manga,
            chapter,
            pages: Vec::new(),
            position: 0,
            prefetch: None,
        }
    }

    pub fn with_prefetch(mut self, prefetch: PrefetchHandle) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn page_count(&self) -> usize {
        self.chapter.page_count()
    }

    pub fn loaded(&self) -> usize {
        self.pages.len()
    }

    /// Moves to `position`, clamped to the pages loaded so far, and asks the
    /// prefetcher to stay `READ_AHEAD` pages in front.
    pub fn scroll_to(&mut self, position: usize) {
        self.position = position.min(self.loaded().saturating_sub(1));
        if let Some(prefetch) = &self.prefetch {
            prefetch.demand(self.position + READ_AHEAD + 1);
        }
    }
}

pub enum View {
    MangaList(MangaListView),
    ChapterList(ChapterListView),
    Reader(ReaderView),
}

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            View::MangaList(_) => "manga list",
            View::ChapterList(_) => "chapter list",
            View::Reader(_) => "reader",
        }
    }

    pub fn prefetch_ticket(&self) -> Option<Ticket> {
        match self {
            View::MangaList(v) => v.prefetch.as_ref().map(PrefetchHandle::ticket),
            View::ChapterList(_) => None,
            View::Reader(v) => v.prefetch.as_ref().map(PrefetchHandle::ticket),
        }
    }
}

pub struct App {
    pub state: AppState,
    pub loading_message: String,
    pub picker: Option<Picker>,
    pub stack: ViewStack,
}

impl App {
    pub fn new(picker: Option<Picker>) -> Self {
        Self {
            state: AppState::Loading,
            loading_message: "Initializing...".to_string(),
            picker,
            stack: ViewStack::new(View::MangaList(MangaListView::new(Vec::new()))),
        }
    }

    pub fn set_loading(&mut self, message: &str) {
        self.state = AppState::Loading;
        self.loading_message = message.to_string();
    }

    pub fn set_ready(&mut self) {
        self.state = AppState::Ready;
    }

    /// Hands a decoded image to the view whose prefetch produced it. Returns
    /// false when that view has already been left.
    pub fn accept_image(&mut self, ticket: Ticket, index: usize, image: DynamicImage) -> bool {
        let Some(view) = self.stack.find_by_ticket_mut(ticket) else {
            log::debug!("Dropping image {} for finished view {:?}", index, ticket);
            return false;
        };

        let slots = match view {
            View::MangaList(v) => &mut v.tiles,
            View::Reader(v) => &mut v.pages,
            View::ChapterList(_) => return false,
        };
        if index != slots.len() {
            log::warn!("Image {} arrived out of order, expected {}", index, slots.len());
            return false;
        }

        slots.push(self.picker.as_ref().map(|picker| picker.new_resize_protocol(image)));
        true
    }
}

pub fn ui(f: &mut Frame, app: &mut App) {
    match app.state {
        AppState::Loading => draw_loading_screen(f, app),
        AppState::Ready => draw_main_ui(f, app),
    }
}

fn draw_loading_screen(f: &mut Frame, app: &App) {
    let area = f.area();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("Komikku")
        .border_style(Style::default().fg(ACCENT));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let center_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(3),
            Constraint::Length(2),
            Constraint::Percentage(40),
        ])
        .split(inner);

    let spinner_frames = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let spinner = spinner_frames[(millis / 100) as usize % spinner_frames.len()];

    let loading_text = Line::from(vec![
        Span::styled(
            format!(" {} ", spinner),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            "Loading...",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
    ]);

    let loading_paragraph = Paragraph::new(loading_text).alignment(Alignment::Center);
    f.render_widget(loading_paragraph, center_layout[1]);

    let message = Paragraph::new(&*app.loading_message)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(message, center_layout[2]);
}

fn draw_main_ui(f: &mut Frame, app: &mut App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(6),    // view
            Constraint::Length(3), // footer
        ])
        .split(f.area());

    let hints: &[(&str, &str)] = match app.stack.top_mut() {
        View::MangaList(view) => {
            draw_manga_list(f, root[0], view);
            &[("←/→/↑/↓", "select"), ("Enter/click", "open"), ("q", "quit")]
        }
        View::ChapterList(view) => {
            draw_chapter_list(f, root[0], view);
            &[("↑/↓", "select"), ("Enter/click", "read"), ("Backspace", "back"), ("q", "quit")]
        }
        View::Reader(view) => {
            draw_reader(f, root[0], view);
            &[("↑/↓", "scroll"), ("Home/End", "jump"), ("Backspace", "back"), ("q", "quit")]
        }
    };

    draw_footer(f, root[1], hints);
}

fn draw_manga_list(f: &mut Frame, area: Rect, view: &mut MangaListView) {
    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("Library")
        .border_style(Style::default().fg(ACCENT));
    if view.ready() < view.mangas.len() {
        block = block.title_bottom(
            Line::from(format!(" covers {}/{} ", view.ready(), view.mangas.len())).right_aligned(),
        );
    }

    let inner = block.inner(area);
    f.render_widget(block, area);
    view.tile_areas.clear();

    if view.mangas.is_empty() {
        let empty = Paragraph::new("No manga in library")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(empty, inner);
        return;
    }
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    view.columns = (inner.width / TILE_WIDTH) as usize + 1;
    let tile_width = inner.width / view.columns as u16;
    // Covers are 4:5 and a cell is about twice as tall as it is wide.
    let tile_height = (tile_width * 5 / 8).max(4);
    let visible_rows = ((inner.height / tile_height) as usize).max(1);

    let ready = view.ready();
    let total_rows = ready.div_ceil(view.columns);
    view.selected = view.selected.min(ready.saturating_sub(1));
    let selected_row = view.selected / view.columns;
    if selected_row < view.scroll_row {
        view.scroll_row = selected_row;
    } else if selected_row >= view.scroll_row + visible_rows {
        view.scroll_row = selected_row + 1 - visible_rows;
    }
    view.scroll_row = view.scroll_row.min(total_rows.saturating_sub(visible_rows));

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(tile_height); visible_rows])
        .split(inner);

    for (r, row_area) in rows.iter().enumerate() {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, view.columns as u32); view.columns])
            .split(*row_area);

        for (c, tile_area) in columns.iter().enumerate() {
            let index = (view.scroll_row + r) * view.columns + c;
            if index >= ready {
                break;
            }
            let selected = index == view.selected;
            let manga = &view.mangas[index];
            draw_manga_tile(f, *tile_area, manga, selected, view.tiles[index].as_mut());
            view.tile_areas.push((index, *tile_area));
        }
    }
}

fn draw_manga_tile(
    f: &mut Frame,
    area: Rect,
    manga: &Manga,
    selected: bool,
    image_state: Option<&mut StatefulProtocol>,
) {
    let area = area.inner(Margin::new(1, 0));
    let border_style = if selected {
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let title = truncate_text(&manga.name, area.width.saturating_sub(2) as usize);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(border_style)
        .title_bottom(
            Line::from(Span::styled(
                title,
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            ))
            .left_aligned(),
        );

    let inner = block.inner(area);
    f.render_widget(block, area);

    if let Some(state) = image_state {
        let image_widget = StatefulImage::new().resize(Resize::Scale(None));
        f.render_stateful_widget(image_widget, inner, state);
    } else {
        let placeholder = Paragraph::new(Span::styled("📚", Style::default().fg(ACCENT)))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, inner);
    }
}

fn draw_chapter_list(f: &mut Frame, area: Rect, view: &mut ChapterListView) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(view.manga.name.as_str())
        .border_style(Style::default().fg(ACCENT));

    view.list_area = block.inner(area);

    if view.chapters.is_empty() {
        let empty = Paragraph::new("No chapters")
            .block(block)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = view
        .chapters
        .iter()
        .map(|chapter| {
            let style = if chapter.is_readable() {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            ListItem::new(chapter.label()).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    f.render_stateful_widget(list, area, &mut view.list_state);
}

fn draw_reader(f: &mut Frame, area: Rect, view: &mut ReaderView) {
    let status = format!(
        " page {}/{} · {} loaded ",
        (view.position + 1).min(view.page_count().max(1)),
        view.page_count(),
        view.loaded()
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(format!("{} · {}", view.manga.name, view.chapter.title))
        .title_bottom(Line::from(status).right_aligned())
        .border_style(Style::default().fg(ACCENT));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let message = if view.page_count() == 0 {
        "This chapter has no pages"
    } else {
        match view.pages.get_mut(view.position) {
            Some(Some(state)) => {
                let page = StatefulImage::new().resize(Resize::Fit(None));
                f.render_stateful_widget(page, inner, state);
                return;
            }
            Some(None) => "Images cannot be shown in this terminal",
            None => "Loading...",
        }
    };

    let paragraph = Paragraph::new(message)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
    f.render_widget(paragraph, inner);
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        format!(
            "{}...",
            text.chars()
                .take(max_len.saturating_sub(3))
                .collect::<String>()
        )
    }
}

fn draw_footer(f: &mut Frame, area: Rect, hints: &[(&str, &str)]) {
    let mut spans = Vec::with_capacity(hints.len() * 2);
    for (key, what) in hints {
        spans.push(Span::styled(*key, Style::default().fg(ACCENT)));
        spans.push(Span::raw(format!(": {what}  ")));
    }

    let p = Paragraph::new(Line::from(spans))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(ACCENT)),
        )
        .alignment(Alignment::Center);
    f.render_widget(p, area);
}
