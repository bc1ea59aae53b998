mod backend;
mod config;
mod ui;

use backend::layout::DataLayout;
use backend::library::{Library, LibraryError};
use backend::prefetch::{PrefetchEvent, spawn_prefetch};
use clap::Parser;
use config::{Args, Config};
use ui::navigation::{Action, ViewStack, handle_key, handle_mouse};
use ui::ui::{App, ChapterListView, MangaListView, READ_AHEAD, ReaderView, View, ui};

use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use ratatui_image::picker::Picker;
use std::{error::Error, io};
use tokio::sync::mpsc;

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_args(Args::parse())?;
    if let Some(err) = config::init_logging(&config) {
        eprintln!("warning: {err}, continuing without a log");
    }
    log::info!("Starting with data path {}", config.data_path.display());

    let library = Library::open(&config.database_path).await?;
    let layout = DataLayout::new(config.data_path.clone());

    install_panic_hook();
    let mut terminal = setup_terminal()?;

    let picker = Picker::from_query_stdio().ok();
    if picker.is_none() {
        log::warn!("Terminal did not answer the graphics query, images are disabled");
    }
    let mut app = App::new(picker);

    let res = run_app(&mut terminal, &mut app, &library, &layout).await;

    // Restore terminal
    restore_terminal()?;
    terminal.show_cursor()?;

    if let Err(err) = &res {
        log::error!("{err}");
    }
    res
}

fn setup_terminal() -> io::Result<Tui> {
    enable_raw_mode()?;
    let entered = execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture)
        .and_then(|()| Terminal::new(CrosstermBackend::new(io::stdout())));
    restore_on_error(entered, || {
        let _ = restore_terminal();
    })
}

fn restore_on_error<T, E>(result: Result<T, E>, restore: impl FnOnce()) -> Result<T, E> {
    if result.is_err() {
        restore();
    }
    result
}

fn restore_terminal() -> io::Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture)
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = restore_terminal();
        default_hook(info);
    }));
}

async fn run_app(
    terminal: &mut Tui,
    app: &mut App,
    library: &Library,
    layout: &DataLayout,
) -> Result<(), Box<dyn Error>> {
    let (task_tx, mut task_rx) = mpsc::unbounded_channel::<PrefetchEvent>();

    app.set_loading("Reading library...");
    terminal.draw(|f| ui(f, app))?;

    let root = open_manga_list(library, layout, &task_tx).await?;
    app.stack = ViewStack::new(View::MangaList(root));
    app.set_ready();

    let mut event_stream = EventStream::new();

    loop {
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            // Handle terminal input
            Some(event) = event_stream.next() => {
                let action = match event? {
                    Event::Key(key) => handle_key(app.stack.top_mut(), key),
                    Event::Mouse(mouse) => handle_mouse(app.stack.top_mut(), mouse),
                    _ => Action::None,
                };
                if !apply_action(app, action, library, layout, &task_tx).await? {
                    return Ok(());
                }
            }

            // Handle decoded images
            Some(event) = task_rx.recv() => {
                handle_prefetch_event(app, event)?;
            }

            else => return Ok(()),
        }
    }
}

/// Lists the library and starts loading every cover, in query order.
async fn open_manga_list(
    library: &Library,
    layout: &DataLayout,
    task_tx: &mpsc::UnboundedSender<PrefetchEvent>,
) -> Result<MangaListView, LibraryError> {
    let mangas = library.list_mangas().await?;
    let covers = mangas.iter().map(|m| layout.cover_path(m)).collect();
    let prefetch = spawn_prefetch(covers, usize::MAX, task_tx.clone());
    Ok(MangaListView::new(mangas).with_prefetch(prefetch))
}

/// Any image that cannot be loaded ends the program.
fn handle_prefetch_event(app: &mut App, event: PrefetchEvent) -> Result<(), Box<dyn Error>> {
    match event {
        PrefetchEvent::Loaded { ticket, index, image } => {
            app.accept_image(ticket, index, image);
            Ok(())
        }
        PrefetchEvent::Failed { ticket, index, error } => {
            log::error!("Prefetch {:?} could not load image {}", ticket, index);
            Err(error.into())
        }
    }
}

/// Carries out a navigation action. Returns false once the user quits.
async fn apply_action(
    app: &mut App,
    action: Action,
    library: &Library,
    layout: &DataLayout,
    task_tx: &mpsc::UnboundedSender<PrefetchEvent>,
) -> Result<bool, Box<dyn Error>> {
    match action {
        Action::None => {}
        Action::Quit => return Ok(false),
        Action::Back => {
            app.stack.pop();
        }
        Action::OpenManga(index) => {
            let View::MangaList(list) = app.stack.top() else {
                return Ok(true);
            };
            let Some(manga) = list.mangas.get(index).cloned() else {
                return Ok(true);
            };

            let chapters = library.list_chapters(&manga).await?;
            app.stack.push(View::ChapterList(ChapterListView::new(manga, chapters)));
        }
        Action::OpenChapter(index) => {
            let View::ChapterList(list) = app.stack.top() else {
                return Ok(true);
            };
            let Some(chapter) = list.chapters.get(index).filter(|c| c.is_readable()).cloned() else {
                return Ok(true);
            };
            let manga = list.manga.clone();

            let pages = layout.page_paths(&manga, &chapter);
            let prefetch = spawn_prefetch(pages, READ_AHEAD + 1, task_tx.clone());
            app.stack.push(View::Reader(ReaderView::new(manga, chapter).with_prefetch(prefetch)));
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::images::tests::write_png;
    use crate::backend::library::tests::{insert_chapter, insert_manga, memory_library};
    use std::time::Duration;
    use tokio::time::timeout;

    struct Fixture {
        _dir: tempfile::TempDir,
        library: Library,
        layout: DataLayout,
        app: App,
        tx: mpsc::UnboundedSender<PrefetchEvent>,
        rx: mpsc::UnboundedReceiver<PrefetchEvent>,
    }

    impl Fixture {
        /// One manga per `(id, name, server)`, newest first, each with a
        /// cover `id` pixels wide.
        async fn new(mangas: &[(i64, &str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let library = memory_library().await;
            let layout = DataLayout::new(dir.path());
            for (id, name, server) in mangas {
                insert_manga(&library, *id, name, server, *id).await;
                let cover = dir.path().join(server).join(name).join("cover.jpg");
                write_png(&cover, *id as u32, 4);
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let root = open_manga_list(&library, &layout, &tx).await.unwrap();
            let mut app = App::new(None);
            app.stack = ViewStack::new(View::MangaList(root));
            app.set_ready();

            Self { _dir: dir, library, layout, app, tx, rx }
        }

        async fn apply(&mut self, action: Action) -> bool {
            apply_action(&mut self.app, action, &self.library, &self.layout, &self.tx)
                .await
                .unwrap()
        }

        async fn next_event(&mut self) -> PrefetchEvent {
            timeout(Duration::from_secs(5), self.rx.recv()).await.unwrap().unwrap()
        }

        fn root(&self) -> &MangaListView {
            match self.app.stack.top() {
                View::MangaList(list) => list,
                other => panic!("expected the manga list, found {}", other.name()),
            }
        }
    }

    #[tokio::test]
    async fn covers_fill_tiles_in_query_order() {
        let mut fx = Fixture::new(&[(3, "Berserk", "mangadex"), (7, "Tower", "webtoon"), (5, "Vagabond", "mangasee")]).await;
        let names: Vec<_> = fx.root().mangas.iter().map(|m| m.name.clone()).collect();
        assert_eq!(names, ["Tower", "Vagabond", "Berserk"]);

        for expected in 0..3 {
            let PrefetchEvent::Loaded { ticket, index, image } = fx.next_event().await else {
                panic!("cover {expected} failed to load");
            };
            assert_eq!(index, expected);
            assert_eq!(i64::from(image.width()), fx.root().mangas[index].id);
            assert_eq!(Some(ticket), fx.app.stack.top().prefetch_ticket());
            handle_prefetch_event(&mut fx.app, PrefetchEvent::Loaded { ticket, index, image }).unwrap();
        }
        assert_eq!(fx.root().ready(), 3);
    }

    #[tokio::test]
    async fn missing_cover_ends_the_run() {
        let mut fx = Fixture::new(&[]).await;
        insert_manga(&fx.library, 1, "Coverless", "mangadex", 1).await;
        let root = open_manga_list(&fx.library, &fx.layout, &fx.tx).await.unwrap();
        fx.app.stack = ViewStack::new(View::MangaList(root));

        let event = fx.next_event().await;
        assert!(matches!(&event, PrefetchEvent::Failed { index: 0, .. }));
        assert!(handle_prefetch_event(&mut fx.app, event).is_err());
        assert_eq!(fx.root().ready(), 0);
    }

    #[tokio::test]
    async fn manga_without_chapters_stays_on_chapter_list() {
        let mut fx = Fixture::new(&[(1, "Berserk", "mangadex")]).await;

        assert!(fx.apply(Action::OpenManga(0)).await);
        assert_eq!(fx.app.stack.depth(), 2);
        assert!(fx.apply(Action::OpenChapter(0)).await);
        assert_eq!(fx.app.stack.depth(), 2);
        assert!(matches!(fx.app.stack.top(), View::ChapterList(list) if list.chapters.is_empty()));
    }

    #[tokio::test]
    async fn undownloaded_chapter_never_opens_the_reader() {
        let mut fx = Fixture::new(&[(1, "Berserk", "mangadex")]).await;
        insert_chapter(&fx.library, 1, "Chapter 1", Some(r#"[{"image":"a.jpg"}]"#), false).await;
        insert_chapter(&fx.library, 1, "Broken", Some("{not json"), true).await;

        fx.apply(Action::OpenManga(0)).await;
        fx.apply(Action::OpenChapter(0)).await;
        fx.apply(Action::OpenChapter(1)).await;
        assert_eq!(fx.app.stack.depth(), 2);
        assert_eq!(fx.app.stack.top().name(), "chapter list");
    }

    #[tokio::test]
    async fn readable_chapter_opens_the_reader_and_loads_pages() {
        let mut fx = Fixture::new(&[(1, "Berserk", "mangadex")]).await;
        insert_chapter(&fx.library, 1, "Chapter 1", Some(r#"[{"image":"a.jpg"}]"#), true).await;
        write_png(&fx.layout.manga_dir(&fx.root().mangas[0]).join("chapter-1").join("a.jpg"), 2, 2);

        // Cover first, so the page is the only event left.
        let cover = fx.next_event().await;
        handle_prefetch_event(&mut fx.app, cover).unwrap();

        fx.apply(Action::OpenManga(0)).await;
        fx.apply(Action::OpenChapter(0)).await;
        assert_eq!(fx.app.stack.depth(), 3);

        let page = fx.next_event().await;
        handle_prefetch_event(&mut fx.app, page).unwrap();
        assert!(matches!(fx.app.stack.top(), View::Reader(reader) if reader.pages.len() == 1));
    }

    #[tokio::test]
    async fn back_keeps_loaded_covers_without_refetching() {
        let mut fx = Fixture::new(&[(1, "Berserk", "mangadex"), (2, "Vagabond", "mangadex")]).await;
        for _ in 0..2 {
            let event = fx.next_event().await;
            handle_prefetch_event(&mut fx.app, event).unwrap();
        }
        let ticket = fx.app.stack.top().prefetch_ticket();
        assert_eq!(fx.root().ready(), 2);

        fx.apply(Action::OpenManga(1)).await;
        assert_eq!(fx.app.stack.depth(), 2);
        fx.apply(Action::Back).await;

        assert_eq!(fx.app.stack.depth(), 1);
        assert_eq!(fx.app.stack.top().prefetch_ticket(), ticket);
        assert_eq!(fx.root().ready(), 2);
        assert!(fx.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn quit_stops_the_loop() {
        let mut fx = Fixture::new(&[]).await;
        assert!(!fx.apply(Action::Quit).await);
    }

    #[test]
    fn failed_setup_restores_the_terminal() {
        let mut restored = false;
        let res: Result<(), &str> = restore_on_error(Err("no tty"), || restored = true);
        assert!(res.is_err());
        assert!(restored);

        let mut restored = false;
        restore_on_error(Ok::<_, &str>(()), || restored = true).unwrap();
        assert!(!restored);
    }
}
