//! Database handle: open, page reads, and the public entry points.
//!
//! [`EseDb`] owns the I/O source, the validated file header, and the page
//! cache. Everything else (tables, records, long values) is a view that
//! borrows from it. The handle is immutable after open apart from the cache
//! and the cooperative abort flag, so shared readers only contend on two
//! short mutexes.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::ese::cache::PageCache;
use crate::ese::catalog::Catalog;
use crate::ese::constants::*;
use crate::ese::header::{FileHeader, FileType};
use crate::ese::io::{DataSource, FileSource};
use crate::ese::page::Page;
use crate::ese::record::DateTimeRepr;
use crate::ese::table::Table;
use crate::ese::tree::{self, PageReader};
use crate::EseError;

/// Warning sink callback.
pub type WarningCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Tunables for [`EseDb::open_with_options`].
pub struct OpenOptions {
    /// Page cache capacity in pages.
    pub cache_capacity: usize,
    /// DATE_TIME interpretation for columns without a per-column hint.
    pub default_datetime: DateTimeRepr,
    /// Turn page checksum mismatches into hard errors instead of warnings.
    pub strict_checksums: bool,
    /// Receives every recorded warning as it happens.
    pub warning_callback: Option<WarningCallback>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            cache_capacity: 256,
            default_datetime: DateTimeRepr::OleDouble,
            strict_checksums: false,
            warning_callback: None,
        }
    }
}

/// An open ESE database.
pub struct EseDb {
    source: Mutex<Box<dyn DataSource>>,
    cache: Mutex<PageCache>,
    header: FileHeader,
    page_count: u32,
    abort: AtomicBool,
    strict_checksums: bool,
    default_datetime: DateTimeRepr,
    warnings: Mutex<Vec<String>>,
    warning_callback: Option<WarningCallback>,
    catalog: Mutex<Option<Arc<Catalog>>>,
}

impl EseDb {
    /// Open a database file read-only with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EseError> {
        Self::open_with_options(path, OpenOptions::default())
    }

    /// Open a database file read-only.
    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        options: OpenOptions,
    ) -> Result<Self, EseError> {
        let source = FileSource::open(path)?;
        Self::open_source(Box::new(source), options)
    }

    /// Open from a caller-supplied byte source.
    pub fn open_source(
        mut source: Box<dyn DataSource>,
        options: OpenOptions,
    ) -> Result<Self, EseError> {
        let mut header_data = vec![0u8; SIZE_FILE_HEADER];
        source.read_at(0, &mut header_data)?;
        let header = FileHeader::parse(&header_data)?;

        let mut db = EseDb {
            source: Mutex::new(source),
            cache: Mutex::new(PageCache::new(options.cache_capacity)),
            page_count: 0,
            header,
            abort: AtomicBool::new(false),
            strict_checksums: options.strict_checksums,
            default_datetime: options.default_datetime,
            warnings: Mutex::new(Vec::new()),
            warning_callback: options.warning_callback,
            catalog: Mutex::new(None),
        };

        if !db.header.checksum_valid {
            db.record_warning("File header checksum mismatch".to_string());
        }

        // The shadow header follows the primary at one page size. A
        // mismatch is tolerated; the primary wins.
        let shadow_offset = db.header.page_size as u64;
        let mut shadow_data = vec![0u8; SIZE_FILE_HEADER];
        let source_size = {
            let mut source = db.source.lock().unwrap();
            let size = source.size();
            if size >= shadow_offset + SIZE_FILE_HEADER as u64 {
                source.read_at(shadow_offset, &mut shadow_data)?;
            }
            size
        };
        match FileHeader::parse(&shadow_data) {
            Ok(shadow) if db.header.matches_shadow(&shadow) => {}
            Ok(_) => db.record_warning("Shadow header disagrees with the primary".to_string()),
            Err(error) => db.record_warning(format!("Shadow header unreadable: {}", error)),
        }

        let pages = source_size / db.header.page_size as u64;
        db.page_count = pages.saturating_sub(2).min(u32::MAX as u64) as u32;

        Ok(db)
    }

    fn record_warning(&self, message: String) {
        if let Some(callback) = &self.warning_callback {
            callback(&message);
        }
        self.warnings.lock().unwrap().push(message);
    }

    /// Warnings recorded so far (non-fatal corruption, checksum mismatches).
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    /// Database or streaming file.
    pub fn file_type(&self) -> FileType {
        self.header.file_type
    }

    /// `(format version, format revision)`.
    pub fn format_version(&self) -> (u32, u32) {
        (self.header.format_version, self.header.format_revision)
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> u32 {
        self.header.page_size
    }

    /// Number of data pages (excluding the two header pages).
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// The parsed file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// DATE_TIME default interpretation configured at open.
    pub fn default_datetime(&self) -> DateTimeRepr {
        self.default_datetime
    }

    /// True when records use the revision 0x11+ tagged layout.
    pub fn new_tagged_format(&self) -> bool {
        self.header.has_new_record_format() && self.header.page_size >= SIZE_PAGE_16K
    }

    /// Request cooperative cancellation: long iterations return
    /// [`EseError::Aborted`] at their next page boundary.
    pub fn signal_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Clear a previously signalled abort.
    pub fn reset_abort(&self) {
        self.abort.store(false, Ordering::Relaxed);
    }

    /// Read a page through the cache.
    pub fn page(&self, page_number: u32) -> Result<Arc<Page>, EseError> {
        if page_number == 0 || tree::is_sentinel_page(page_number) {
            return Err(EseError::Bounds(format!(
                "Page number {:#x} is reserved",
                page_number
            )));
        }
        if page_number > self.page_count {
            return Err(EseError::Bounds(format!(
                "Page {} of {}",
                page_number, self.page_count
            )));
        }

        if let Some(page) = self.cache.lock().unwrap().get(page_number) {
            return Ok(page);
        }

        let mut data = vec![0u8; self.header.page_size as usize];
        self.source
            .lock()
            .unwrap()
            .read_at(self.header.page_offset(page_number), &mut data)?;

        let page = Page::parse(page_number, data, &self.header)?;
        if !page.checksum_valid {
            if self.strict_checksums {
                let stored = match page.header.checksum {
                    crate::ese::page::PageChecksum::Legacy { xor, .. } => xor as u64,
                    crate::ese::page::PageChecksum::Blocks { checksums } => checksums[0],
                };
                return Err(EseError::Checksum {
                    page_number,
                    stored,
                    calculated: 0,
                });
            }
            self.record_warning(format!("Page {} checksum mismatch", page_number));
        }
        if let Some(stored) = page.header.extended_page_number {
            if stored != page_number as u64 {
                self.record_warning(format!(
                    "Page {} identifies itself as page {}",
                    page_number, stored
                ));
            }
        }

        let page = Arc::new(page);
        self.cache.lock().unwrap().insert(Arc::clone(&page));
        Ok(page)
    }

    /// The interpreted catalog, read once and cached.
    pub fn catalog(&self) -> Result<Arc<Catalog>, EseError> {
        let mut slot = self.catalog.lock().unwrap();
        if let Some(catalog) = slot.as_ref() {
            return Ok(Arc::clone(catalog));
        }
        let catalog = Arc::new(Catalog::read(self, self.new_tagged_format())?);
        *slot = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// All tables declared by the catalog.
    pub fn tables(&self) -> Result<Vec<Table<'_>>, EseError> {
        let catalog = self.catalog()?;
        Ok(catalog
            .tables
            .iter()
            .map(|def| Table::new(self, Arc::new(def.clone())))
            .collect())
    }

    /// A table by name.
    pub fn table(&self, name: &str) -> Result<Table<'_>, EseError> {
        let catalog = self.catalog()?;
        catalog
            .tables
            .iter()
            .find(|t| t.name == name)
            .map(|def| Table::new(self, Arc::new(def.clone())))
            .ok_or_else(|| EseError::Bounds(format!("No table named {}", name)))
    }

    /// A table by position in catalog order.
    pub fn table_at(&self, index: usize) -> Result<Table<'_>, EseError> {
        let catalog = self.catalog()?;
        catalog
            .tables
            .get(index)
            .map(|def| Table::new(self, Arc::new(def.clone())))
            .ok_or_else(|| {
                EseError::Bounds(format!("Table {} of {}", index, catalog.tables.len()))
            })
    }
}

impl PageReader for EseDb {
    fn tree_page(&self, page_number: u32) -> Result<Arc<Page>, EseError> {
        self.page(page_number)
    }

    fn total_pages(&self) -> u32 {
        self.page_count
    }

    fn check_abort(&self) -> Result<(), EseError> {
        if self.abort.load(Ordering::Relaxed) {
            Err(EseError::Aborted)
        } else {
            Ok(())
        }
    }

    fn warn(&self, message: String) {
        self.record_warning(message);
    }
}
