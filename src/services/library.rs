use crate::error::{Result, UnkindleError};
use crate::services::assembler::DocumentAssembler;
use crate::types::BookEntry;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const DEFAULT_LIBRARY_DIR: &str = "books";

const ILLEGAL_FILENAME_CHARS: &[char] = &['/', '\\', '?', '<', '>', ':', '*', '|', '"'];

/// Folder of books, one sub-directory of page captures per title.
pub struct BookLibrary {
    root: PathBuf,
}

impl BookLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Turns a book title into a folder name: `My Book: Part 2` becomes `my_book_part_2`.
    pub fn sanitize_title(title: &str) -> Result<String> {
        let cleaned: String = title
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .filter(|c| !c.is_control() && !ILLEGAL_FILENAME_CHARS.contains(c))
            .collect();

        let name = cleaned
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .trim_matches('.')
            .to_lowercase();

        if name.is_empty() {
            return Err(UnkindleError::InvalidOptions {
                reason: format!("book title '{}' has no usable characters", title),
            });
        }

        Ok(name)
    }

    pub fn book_dir(&self, title: &str) -> Result<PathBuf> {
        Ok(self.root.join(Self::sanitize_title(title)?))
    }

    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| UnkindleError::DirectoryAccessFailed {
                path: self.root.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!("Library root ready at {}", self.root.display());
        Ok(())
    }

    /// Books in the library sorted by folder name, each with its last captured page.
    pub async fn list_books(&self) -> Result<Vec<BookEntry>> {
        self.ensure_root().await?;

        let mut books = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| UnkindleError::DirectoryAccessFailed {
                path: self.root.display().to_string(),
                reason: e.to_string(),
            })?;

            if !entry.file_type().is_dir() {
                continue;
            }

            books.push(BookEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                path: entry.path().to_path_buf(),
                last_page: Self::last_page_number(entry.path()),
            });
        }

        info!("Found {} books in {}", books.len(), self.root.display());
        Ok(books)
    }

    /// Highest page number captured in `book_dir`, or 0 when there is none.
    pub fn last_page_number(book_dir: &Path) -> u32 {
        DocumentAssembler::scan_pages(book_dir)
            .map(|pages| pages.iter().map(|p| p.page_number).max().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Page a resumed session should start from.
    pub fn resume_page(book_dir: &Path) -> Result<u32> {
        let last = Self::last_page_number(book_dir);
        last.checked_add(1).ok_or_else(|| UnkindleError::InvalidOptions {
            reason: format!(
                "{} already ends at page {}, no page number is left to resume at",
                book_dir.display(),
                last
            ),
        })
    }
}

impl Default for BookLibrary {
    fn default() -> Self {
        Self::new(DEFAULT_LIBRARY_DIR)
    }
}
