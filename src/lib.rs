mod bins;
mod error;
mod file_lock;
mod id;
mod pager;
mod storage;
mod strings;
mod tables;
mod types;
pub mod view;

pub use error::StorageError;
pub use id::PageId;
pub use pager::{Page, PageDescriptor, PageStorage, PageType, Setting, Stream};
pub use storage::{EmbeddedStorage, StorageHeader, StorageMode};
pub use strings::StringStorage;
pub use tables::{ColumnLayout, Record, Table, TableLayout, TableStorage};
pub use types::TypeStorage;
