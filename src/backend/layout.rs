use std::path::PathBuf;

use super::library::{Chapter, Manga};

/// Server whose downloads are stored as sequentially numbered files instead of
/// the names recorded in the page list.
pub const WEBTOON_SERVER_ID: &str = "webtoon";
pub const COVER_FILE: &str = "cover.jpg";

/// Where the companion application keeps downloaded files, relative to the
/// data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn manga_dir(&self, manga: &Manga) -> PathBuf {
        self.root.join(&manga.server_id).join(&manga.name)
    }

    pub fn cover_path(&self, manga: &Manga) -> PathBuf {
        self.manga_dir(manga).join(COVER_FILE)
    }

    pub fn chapter_dir(&self, manga: &Manga, chapter: &Chapter) -> PathBuf {
        self.manga_dir(manga).join(&chapter.slug)
    }

    pub fn page_paths(&self, manga: &Manga, chapter: &Chapter) -> Vec<PathBuf> {
        let dir = self.chapter_dir(manga, chapter);
        let Ok(pages) = &chapter.pages else {
            return Vec::new();
        };

        if manga.server_id == WEBTOON_SERVER_ID {
            (1..=pages.len())
                .map(|n| dir.join(format!("{:03}.jpeg", n)))
                .collect()
        } else {
            pages.iter().map(|page| dir.join(&page.image)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::library::ChapterImage;

    fn chapter(images: &[&str]) -> Chapter {
        Chapter {
            title: "Episode 4".into(),
            slug: "ep-4".into(),
            pages: Ok(images
                .iter()
                .map(|name| ChapterImage {
                    image: name.to_string(),
                    read: 0,
                    slug: String::new(),
                })
                .collect()),
            downloaded: true,
        }
    }

    fn manga(server_id: &str) -> Manga {
        Manga {
            id: 7,
            name: "Tower of God".into(),
            server_id: server_id.into(),
        }
    }

    #[test]
    fn cover_lives_in_manga_dir() {
        let layout = DataLayout::new("/data");
        assert_eq!(
            layout.cover_path(&manga("mangadex")),
            PathBuf::from("/data/mangadex/Tower of God/cover.jpg")
        );
    }

    #[test]
    fn webtoon_pages_are_numbered() {
        let layout = DataLayout::new("/data");
        let stored: Vec<String> = (0..12).map(|i| format!("stored-{i}.png")).collect();
        let stored: Vec<&str> = stored.iter().map(String::as_str).collect();

        let paths = layout.page_paths(&manga(WEBTOON_SERVER_ID), &chapter(&stored));
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        let expected: Vec<_> = (1..=12).map(|n| format!("{:03}.jpeg", n)).collect();
        assert_eq!(names, expected);
        assert_eq!(names.first().map(String::as_str), Some("001.jpeg"));
        assert_eq!(names.last().map(String::as_str), Some("012.jpeg"));
        assert!(paths.iter().all(|p| p.starts_with("/data/webtoon/Tower of God/ep-4")));
    }

    #[test]
    fn other_servers_use_stored_names_in_order() {
        let layout = DataLayout::new("/data");
        let paths = layout.page_paths(&manga("mangadex"), &chapter(&["x9.jpg", "a1.png", "m.webp"]));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/data/mangadex/Tower of God/ep-4/x9.jpg"),
                PathBuf::from("/data/mangadex/Tower of God/ep-4/a1.png"),
                PathBuf::from("/data/mangadex/Tower of God/ep-4/m.webp"),
            ]
        );
    }

    #[test]
    fn unreadable_page_list_has_no_paths() {
        let layout = DataLayout::new("/data");
        let mut broken = chapter(&["a.jpg"]);
        broken.pages = Err(crate::backend::library::PageListError {
            slug: "ep-4".into(),
            reason: "eof".into(),
        });
        assert!(layout.page_paths(&manga("mangadex"), &broken).is_empty());
    }
}
