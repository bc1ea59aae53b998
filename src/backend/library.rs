use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DATABASE_FILE: &str = "komikku.db";

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("database not found at {0}")]
    Missing(PathBuf),
    #[error("could not open database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// The pages column of a chapter held something other than a JSON page list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed page list for chapter {slug}: {reason}")]
pub struct PageListError {
    pub slug: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manga {
    pub id: i64,
    pub name: String,
    pub server_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ChapterImage {
    pub image: String,
    #[allow(dead_code)]
    pub read: i64,
    #[allow(dead_code)]
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub slug: String,
    pub pages: Result<Vec<ChapterImage>, PageListError>,
    pub downloaded: bool,
}

impl Chapter {
    pub fn is_readable(&self) -> bool {
        self.downloaded && self.pages.is_ok()
    }

    pub fn page_count(&self) -> usize {
        self.pages.as_ref().map(Vec::len).unwrap_or(0)
    }

    pub fn label(&self) -> String {
        if !self.downloaded {
            format!("{} (not downloaded)", self.title)
        } else if self.pages.is_err() {
            format!("{} (unreadable page list)", self.title)
        } else {
            self.title.clone()
        }
    }
}

fn parse_pages(slug: &str, raw: Option<&str>) -> Result<Vec<ChapterImage>, PageListError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    serde_json::from_str(raw).map_err(|e| PageListError {
        slug: slug.to_string(),
        reason: e.to_string(),
    })
}

/// Read-only handle on the companion application's database.
#[derive(Debug, Clone)]
pub struct Library {
    pool: SqlitePool,
}

impl Library {
    pub async fn open(path: &Path) -> Result<Self, LibraryError> {
        if !path.is_file() {
            return Err(LibraryError::Missing(path.to_path_buf()));
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|source| LibraryError::Open { path: path.to_path_buf(), source })?;

        log::info!("Opened library at {}", path.display());
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_mangas(&self) -> Result<Vec<Manga>, LibraryError> {
        let rows = sqlx::query(r#"SELECT id, name, server_id FROM mangas ORDER BY last_update DESC"#)
            .fetch_all(&self.pool)
            .await?;

        let mut mangas = Vec::with_capacity(rows.len());
        for row in rows {
            mangas.push(Manga {
                id: row.try_get(0)?,
                name: row.try_get(1)?,
                server_id: row.try_get(2)?,
            });
        }

        log::debug!("Listed {} manga", mangas.len());
        Ok(mangas)
    }

    pub async fn list_chapters(&self, manga: &Manga) -> Result<Vec<Chapter>, LibraryError> {
        let rows = sqlx::query(r#"SELECT title, slug, pages, downloaded FROM chapters WHERE manga_id = ?"#)
            .bind(manga.id)
            .fetch_all(&self.pool)
            .await?;

        let mut chapters = Vec::with_capacity(rows.len());
        for row in rows {
            let title: String = row.try_get(0)?;
            let slug: String = row.try_get(1)?;
            let raw_pages: Option<String> = row.try_get(2)?;
            let downloaded: Option<bool> = row.try_get(3)?;

            let pages = parse_pages(&slug, raw_pages.as_deref());
            if let Err(e) = &pages {
                log::warn!("{} ({})", e, manga.name);
            }

            chapters.push(Chapter {
                title,
                slug,
                pages,
                downloaded: downloaded.unwrap_or(false),
            });
        }

        log::debug!("Listed {} chapters for {}", chapters.len(), manga.name);
        Ok(chapters)
    }
}
