use crate::error::StorageError;
use crate::file_lock::FileLock;
use crate::pager::{PageStorage, PageType, Setting, Stream};
use crate::strings::StringStorage;
use crate::tables::{Record, Table, TableLayout, TableStorage};
use crate::types::TypeStorage;
use crate::view::{PageView, StorageHeaderView, CURRENT_STORAGE_VERSION};
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StorageMode {
    /// The storage has to exist already.
    Open,
    /// Starts a new storage. Files are truncated, streams have to be empty.
    Create,
    /// Opens the storage, or creates it when there is no data yet.
    OpenOrCreate,
}

/// What the first page of a storage records about it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StorageHeader {
    pub version: i32,
    pub creation_time: DateTime<Utc>,
}

/// A storage embedded in a single file or stream: a header page, a string ledger and a table
/// catalog on top of a [`PageStorage`].
pub struct EmbeddedStorage<S: Stream> {
    pages: PageStorage<S>,
    path: Option<PathBuf>,
    header: StorageHeader,
    strings: StringStorage,
    types: TypeStorage,
    tables: TableStorage,
}

impl EmbeddedStorage<File> {
    /// Opens the storage in the file at `path`. The file is locked, so only one storage can use
    /// it at a time.
    pub fn from_file(path: &Path, mode: StorageMode, setting: Setting) -> anyhow::Result<Self> {
        // truncate only once the lock is held
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(mode != StorageMode::Open)
            .truncate(false)
            .open(path)
            .map_err(StorageError::from)?
            .try_lock()?;

        let create = match mode {
            StorageMode::Open => false,
            StorageMode::Create => {
                file.set_len(0).map_err(StorageError::from)?;
                true
            }
            StorageMode::OpenOrCreate => file.metadata().map_err(StorageError::from)?.len() == 0,
        };
        log::debug!("opening storage file {path:?}, create={create}");
        Self::new(file, Some(path.to_path_buf()), create, setting)
    }
}

impl<S: Stream> EmbeddedStorage<S> {
    /// Opens the storage that starts at the current position of `stream`.
    pub fn from_stream(mut stream: S, mode: StorageMode, setting: Setting) -> anyhow::Result<Self> {
        let position = stream.stream_position().map_err(StorageError::from)?;
        let end = stream.seek(SeekFrom::End(0)).map_err(StorageError::from)?;
        stream
            .seek(SeekFrom::Start(position))
            .map_err(StorageError::from)?;
        let empty = end <= position;

        let create = match mode {
            StorageMode::Open => false,
            StorageMode::Create if !empty => {
                return Err(StorageError::invalid_argument(
                    "cannot create a storage in a stream that already holds data",
                )
                .into());
            }
            StorageMode::Create => true,
            StorageMode::OpenOrCreate => empty,
        };
        Self::new(stream, None, create, setting)
    }

    fn new(
        stream: S,
        path: Option<PathBuf>,
        create: bool,
        setting: Setting,
    ) -> anyhow::Result<Self> {
        let mut pages = PageStorage::open(stream, setting)?;
        let header = if create {
            Self::create_header(&mut pages)?
        } else {
            Self::load_header(&mut pages)?
        };

        let strings = StringStorage::open(&mut pages)?;
        let mut types = TypeStorage::new();
        let tables = TableStorage::open(&mut pages, &strings, &mut types)?;

        Ok(Self {
            pages,
            path,
            header,
            strings,
            types,
            tables,
        })
    }

    fn create_header(pages: &mut PageStorage<S>) -> anyhow::Result<StorageHeader> {
        let mut page = pages.allocate(PageType::StorageDescriptor)?;
        let mut view = StorageHeaderView::new(&mut page)?;
        view.set_version(CURRENT_STORAGE_VERSION);
        view.set_creation_time(Utc::now());
        view.commit()?;

        // the stored time has tick precision
        let view = StorageHeaderView::new(&mut page)?;
        Ok(StorageHeader {
            version: view.version(),
            creation_time: view.creation_time(),
        })
    }

    fn load_header(pages: &mut PageStorage<S>) -> anyhow::Result<StorageHeader> {
        let first = pages.pages()?.into_iter().next();
        let Some(descriptor) = first.filter(|descriptor| {
            descriptor.id().get() == 0 && descriptor.page_type() == PageType::StorageDescriptor
        }) else {
            return Err(StorageError::corrupted(
                "the stream does not start with a storage descriptor page",
            )
            .into());
        };

        let mut page = pages.load(descriptor)?;
        let view = StorageHeaderView::new(&mut page)?;
        if view.version() > CURRENT_STORAGE_VERSION || view.version() < 1 {
            return Err(StorageError::UnsupportedVersion(view.version()).into());
        }
        Ok(StorageHeader {
            version: view.version(),
            creation_time: view.creation_time(),
        })
    }

    /// The file this storage lives in, `None` when it was opened from a stream.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> &StorageHeader {
        &self.header
    }

    pub fn add_table(&mut self, name: &str, layout: TableLayout) -> anyhow::Result<&Table> {
        self.tables.add(
            &mut self.pages,
            &mut self.strings,
            &mut self.types,
            name,
            layout,
        )
    }

    pub fn add_record_table<T: Record>(&mut self, name: &str) -> anyhow::Result<&Table> {
        self.add_table(name, T::layout())
    }

    pub fn tables(&self) -> &TableStorage {
        &self.tables
    }

    pub fn add_string(&mut self, value: &str) -> anyhow::Result<i32> {
        self.strings.add(&mut self.pages, value)
    }

    pub fn load_string(&self, index: i32) -> anyhow::Result<String> {
        self.strings.load(&self.pages, index)
    }

    /// Blocks until everything written so far reached the stream.
    pub fn sync(&self) -> anyhow::Result<()> {
        self.pages.sync()
    }

    /// Stops the io thread and gives the stream back.
    pub fn shutdown(self) -> anyhow::Result<S> {
        self.pages.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::testing::SharedStream;
    use std::io::{Cursor, Seek};

    fn setting() -> Setting {
        Setting { page_size: 256 }
    }

    #[test]
    fn test_create_and_open() {
        let storage =
            EmbeddedStorage::from_stream(Cursor::new(vec![]), StorageMode::Create, setting())
                .unwrap();
        let header = *storage.header();
        assert_eq!(None, storage.path());
        assert_eq!(CURRENT_STORAGE_VERSION, header.version);
        assert!(header.creation_time <= Utc::now());

        let mut stream = storage.shutdown().unwrap();
        stream.set_position(0);
        let storage = EmbeddedStorage::from_stream(stream, StorageMode::Open, setting()).unwrap();
        assert_eq!(header, *storage.header());
    }

    #[test]
    fn test_open_or_create() {
        let stream = SharedStream::default();
        let storage =
            EmbeddedStorage::from_stream(stream.clone(), StorageMode::OpenOrCreate, setting())
                .unwrap();
        let creation_time = storage.header().creation_time;
        storage.shutdown().unwrap();
        // header page and the first string page
        assert_eq!(2 * 256, stream.snapshot().len());

        let mut reopened = stream.clone();
        reopened.rewind().unwrap();
        let storage =
            EmbeddedStorage::from_stream(reopened, StorageMode::OpenOrCreate, setting()).unwrap();
        assert_eq!(creation_time, storage.header().creation_time);
        storage.shutdown().unwrap();
        assert_eq!(2 * 256, stream.snapshot().len());
    }

    #[test]
    fn test_creation_time_has_tick_precision() {
        let storage =
            EmbeddedStorage::from_stream(Cursor::new(vec![]), StorageMode::Create, setting())
                .unwrap();
        let creation_time = storage.header().creation_time;
        assert_eq!(0, creation_time.timestamp_subsec_nanos() % 100);

        let mut stream = storage.shutdown().unwrap();
        stream.set_position(0);
        let storage = EmbeddedStorage::from_stream(stream, StorageMode::Open, setting()).unwrap();
        assert_eq!(creation_time, storage.header().creation_time);
    }

    #[test]
    fn test_create_requires_empty_stream() {
        let Err(err) =
            EmbeddedStorage::from_stream(Cursor::new(vec![1]), StorageMode::Create, setting())
        else {
            panic!("creating over existing data should fail");
        };
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_open_rejects_foreign_data() {
        let mut raw = vec![0u8; 256];
        raw[4] = PageType::StringList as u8;
        let Err(err) = EmbeddedStorage::from_stream(Cursor::new(raw), StorageMode::Open, setting())
        else {
            panic!("a stream starting with a string list is not a storage");
        };
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::Corrupted(_))
        ));

        let Err(err) =
            EmbeddedStorage::from_stream(Cursor::new(vec![]), StorageMode::Open, setting())
        else {
            panic!("an empty stream is not a storage");
        };
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn test_open_rejects_newer_version() {
        let storage =
            EmbeddedStorage::from_stream(Cursor::new(vec![]), StorageMode::Create, setting())
                .unwrap();
        let mut stream = storage.shutdown().unwrap();
        stream.get_mut()[5..9].copy_from_slice(&(CURRENT_STORAGE_VERSION + 1).to_le_bytes());

        stream.set_position(0);
        let Err(err) = EmbeddedStorage::from_stream(stream, StorageMode::Open, setting()) else {
            panic!("a newer storage version should be rejected");
        };
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_strings_and_tables() {
        let mut storage =
            EmbeddedStorage::from_stream(Cursor::new(vec![]), StorageMode::Create, setting())
                .unwrap();
        let index = storage.add_string("Clondyke Bar").unwrap();
        let layout = TableLayout::new("Bar").column("name", "String");
        storage.add_table("bars", layout.clone()).unwrap();
        assert_eq!("Clondyke Bar", storage.load_string(index).unwrap());

        let mut stream = storage.shutdown().unwrap();
        stream.set_position(0);
        let storage = EmbeddedStorage::from_stream(stream, StorageMode::Open, setting()).unwrap();
        assert_eq!("Clondyke Bar", storage.load_string(index).unwrap());
        assert_eq!(1, storage.tables().len());
        assert_eq!(&layout, storage.tables().get("bars").unwrap().layout());
    }
}
