use crate::error::{Result, UnkindleError};
use image::codecs::jpeg::JpegEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const DOCUMENT_FILE_NAME: &str = "book.pdf";
pub const JPEG_QUALITY: u8 = 85;

const PAGE_FILE_PATTERN: &str = r"^page_(\d+)_(\d+)\.png$";

fn page_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(PAGE_FILE_PATTERN).expect("page file pattern is valid"))
}

/// A page image found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    pub path: PathBuf,
    pub page_number: u32,
    pub timestamp_millis: i64,
}

/// Parses `page_<page>_<timestamp>.png` into its page number and timestamp.
pub fn parse_page_file_name(name: &str) -> Option<(u32, i64)> {
    let captures = page_file_pattern().captures(name)?;
    let page_number = captures.get(1)?.as_str().parse().ok()?;
    let timestamp = captures.get(2)?.as_str().parse().ok()?;
    Some((page_number, timestamp))
}

/// Builds `book.pdf` from whatever page images a directory holds.
///
/// Works from the directory contents rather than a session's memory, so pages
/// left behind by an earlier or crashed run are picked up too.
pub struct DocumentAssembler;

impl DocumentAssembler {
    /// Lists page images directly inside `directory`, ordered by page number.
    ///
    /// Files sharing a page number keep the order the directory listing gave them.
    pub fn scan_pages(directory: &Path) -> Result<Vec<PageFile>> {
        let mut pages = Vec::new();

        for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| UnkindleError::DirectoryAccessFailed {
                path: directory.display().to_string(),
                reason: e.to_string(),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                continue;
            };

            if let Some((page_number, timestamp_millis)) = parse_page_file_name(name) {
                pages.push(PageFile {
                    path: entry.path().to_path_buf(),
                    page_number,
                    timestamp_millis,
                });
            }
        }

        pages.sort_by_key(|page| page.page_number);
        Ok(pages)
    }

    pub async fn assemble(directory: &Path) -> Result<PathBuf> {
        let directory = directory.to_path_buf();
        tokio::task::spawn_blocking(move || Self::assemble_blocking(&directory))
            .await
            .map_err(|e| UnkindleError::AssemblyFailed {
                reason: format!("assembly worker failed: {}", e),
            })?
    }

    fn assemble_blocking(directory: &Path) -> Result<PathBuf> {
        let pages = Self::scan_pages(directory)?;
        if pages.is_empty() {
            return Err(UnkindleError::NoPagesFound {
                directory: directory.display().to_string(),
            });
        }

        info!(
            "Assembling {} pages from {}",
            pages.len(),
            directory.display()
        );

        let document_path = directory.join(DOCUMENT_FILE_NAME);
        let temp_path = directory.join(format!("{}.tmp", DOCUMENT_FILE_NAME));
        let title = directory
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("book");

        let written = Self::write_document(&pages, title, &temp_path).and_then(|()| {
            fs::rename(&temp_path, &document_path).map_err(|e| UnkindleError::AssemblyFailed {
                reason: format!("failed to move document into place: {}", e),
            })
        });

        if let Err(e) = written {
            if temp_path.exists() {
                if let Err(remove_err) = fs::remove_file(&temp_path) {
                    warn!(
                        "Could not remove {}: {}",
                        temp_path.display(),
                        remove_err
                    );
                }
            }
            return Err(e);
        }

        info!("Document written to {}", document_path.display());
        Ok(document_path)
    }

    fn write_document(pages: &[PageFile], title: &str, output: &Path) -> Result<()> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

        for (idx, page) in pages.iter().enumerate() {
            let (jpeg, width, height) = Self::encode_jpeg(&page.path)?;
            let image_name = format!("Im{}", idx + 1);

            let image_id = doc.add_object(
                Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => width,
                        "Height" => height,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8_i64,
                        "Filter" => "DCTDecode",
                    },
                    jpeg,
                )
                .with_compression(false),
            );

            // Scale the unit square to the full page; one image pixel per point.
            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            width.into(),
                            0_i64.into(),
                            0_i64.into(),
                            height.into(),
                            0_i64.into(),
                            0_i64.into(),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(image_name.as_bytes().to_vec())]),
                    Operation::new("Q", vec![]),
                ],
            };
            let encoded = content.encode().map_err(|e| UnkindleError::AssemblyFailed {
                reason: format!("failed to encode page {}: {}", page.page_number, e),
            })?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(height),
                ],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! {
                        image_name.as_str() => image_id,
                    },
                },
            });
            kids.push(page_id.into());

            debug!(
                "Added page {} ({}x{}) from {}",
                page.page_number,
                width,
                height,
                page.path.display()
            );
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
            "Producer" => Object::string_literal("unkindle"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        doc.save(output).map_err(|e| UnkindleError::AssemblyFailed {
            reason: format!("failed to write {}: {}", output.display(), e),
        })?;

        Ok(())
    }

    /// Decodes a page image and re-encodes it as JPEG at [`JPEG_QUALITY`].
    fn encode_jpeg(path: &Path) -> Result<(Vec<u8>, i64, i64)> {
        let image = image::open(path).map_err(|e| UnkindleError::AssemblyFailed {
            reason: format!("failed to decode {}: {}", path.display(), e),
        })?;

        // JPEG carries no alpha channel.
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
            .encode_image(&rgb)
            .map_err(|e| UnkindleError::AssemblyFailed {
                reason: format!("failed to re-encode {}: {}", path.display(), e),
            })?;

        Ok((jpeg, i64::from(width), i64::from(height)))
    }
}
