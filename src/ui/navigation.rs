use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::backend::prefetch::Ticket;
use crate::ui::ui::{ChapterListView, MangaListView, ReaderView, View};

/// What the event loop should do after an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Push the chapter list for this index of the manga list.
    OpenManga(usize),
    /// Push the reader for this index of the chapter list.
    OpenChapter(usize),
    Back,
    Quit,
}

/// Views currently open, bottom to top. The manga list is always at the
/// bottom and cannot be popped.
pub struct ViewStack {
    root: View,
    children: Vec<View>,
}

impl ViewStack {
    pub fn new(root: View) -> Self {
        Self {
            root,
            children: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.children.len() + 1
    }

    pub fn top(&self) -> &View {
        self.children.last().unwrap_or(&self.root)
    }

    pub fn top_mut(&mut self) -> &mut View {
        self.children.last_mut().unwrap_or(&mut self.root)
    }

    pub fn push(&mut self, view: View) {
        log::debug!("Entering {} (depth {})", view.name(), self.depth() + 1);
        self.children.push(view);
    }

    /// Leaves the top view, dropping its state. Returns `None` at the root.
    pub fn pop(&mut self) -> Option<View> {
        let view = self.children.pop()?;
        log::debug!("Leaving {} for {}", view.name(), self.top().name());
        Some(view)
    }

    pub fn find_by_ticket_mut(&mut self, ticket: Ticket) -> Option<&mut View> {
        std::iter::once(&mut self.root)
            .chain(self.children.iter_mut())
            .find(|view| view.prefetch_ticket() == Some(ticket))
    }
}

pub fn handle_key(view: &mut View, key: KeyEvent) -> Action {
    if key.kind == KeyEventKind::Release {
        return Action::None;
    }
    if key.code == KeyCode::Char('q')
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
    {
        return Action::Quit;
    }

    match view {
        View::MangaList(v) => handle_manga_list_key(v, key.code),
        View::ChapterList(v) => handle_chapter_list_key(v, key.code),
        View::Reader(v) => handle_reader_key(v, key.code),
    }
}

pub fn handle_mouse(view: &mut View, mouse: MouseEvent) -> Action {
    match view {
        View::MangaList(v) => match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => match v.tile_at(mouse.column, mouse.row) {
                Some(index) => {
                    v.selected = index;
                    Action::OpenManga(index)
                }
                None => Action::None,
            },
            MouseEventKind::ScrollDown => {
                v.selected = (v.selected + v.columns).min(v.ready().saturating_sub(1));
                Action::None
            }
            MouseEventKind::ScrollUp => {
                v.selected = v.selected.saturating_sub(v.columns);
                Action::None
            }
            _ => Action::None,
        },
        View::ChapterList(v) => match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => match v.row_at(mouse.column, mouse.row) {
                Some(index) => {
                    v.list_state.select(Some(index));
                    activate_chapter(v, index)
                }
                None => Action::None,
            },
            MouseEventKind::ScrollDown => handle_chapter_list_key(v, KeyCode::Down),
            MouseEventKind::ScrollUp => handle_chapter_list_key(v, KeyCode::Up),
            _ => Action::None,
        },
        View::Reader(v) => match mouse.kind {
            MouseEventKind::ScrollDown => handle_reader_key(v, KeyCode::Down),
            MouseEventKind::ScrollUp => handle_reader_key(v, KeyCode::Up),
            _ => Action::None,
        },
    }
}

fn handle_manga_list_key(view: &mut MangaListView, key: KeyCode) -> Action {
    let last = view.ready().saturating_sub(1);
    match key {
        KeyCode::Left => view.selected = view.selected.saturating_sub(1),
        KeyCode::Right => view.selected = (view.selected + 1).min(last),
        KeyCode::Up => view.selected = view.selected.saturating_sub(view.columns),
        KeyCode::Down => view.selected = (view.selected + view.columns).min(last),
        KeyCode::Home => view.selected = 0,
        KeyCode::End => view.selected = last,
        KeyCode::Enter if view.selected < view.ready() => return Action::OpenManga(view.selected),
        _ => {}
    }
    Action::None
}

fn handle_chapter_list_key(view: &mut ChapterListView, key: KeyCode) -> Action {
    if view.chapters.is_empty() {
        return match key {
            KeyCode::Backspace | KeyCode::Esc => Action::Back,
            _ => Action::None,
        };
    }

    let last = view.chapters.len() - 1;
    let selected = view.list_state.selected().unwrap_or(0);
    match key {
        KeyCode::Backspace | KeyCode::Esc => return Action::Back,
        KeyCode::Up => view.list_state.select(Some(selected.saturating_sub(1))),
        KeyCode::Down => view.list_state.select(Some((selected + 1).min(last))),
        KeyCode::Home => view.list_state.select(Some(0)),
        KeyCode::End => view.list_state.select(Some(last)),
        KeyCode::Enter => return activate_chapter(view, selected),
        _ => {}
    }
    Action::None
}

/// Chapters that are not downloaded, or whose page list could not be read,
/// never open the reader.
fn activate_chapter(view: &ChapterListView, index: usize) -> Action {
    match view.chapters.get(index) {
        Some(chapter) if chapter.is_readable() => Action::OpenChapter(index),
        Some(chapter) => {
            log::debug!("Ignoring activation of unreadable chapter {}", chapter.slug);
            Action::None
        }
        None => Action::None,
    }
}

fn handle_reader_key(view: &mut ReaderView, key: KeyCode) -> Action {
    match key {
        KeyCode::Backspace | KeyCode::Esc => return Action::Back,
        KeyCode::Down | KeyCode::PageDown | KeyCode::Char(' ') | KeyCode::Char('j') => {
            view.scroll_to(view.position + 1)
        }
        KeyCode::Up | KeyCode::PageUp | KeyCode::Char('k') => {
            view.scroll_to(view.position.saturating_sub(1))
        }
        KeyCode::Home => view.scroll_to(0),
        KeyCode::End => view.scroll_to(usize::MAX),
        _ => {}
    }
    Action::None
}
