mod descriptor;
mod manager;
mod operation;
mod page;
mod stream_manager;

pub(crate) use crate::pager::descriptor::PAGE_HEADER_SIZE;
pub use crate::pager::descriptor::{PageDescriptor, PageType};
pub use crate::pager::manager::{PageStorage, Setting};
pub use crate::pager::page::Page;
pub use crate::pager::stream_manager::Stream;

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;
    use std::io::{Cursor, Read, Seek, SeekFrom, Write};
    use std::sync::Arc;

    /// An in-memory stream whose bytes stay observable after it was handed to a storage.
    #[derive(Clone, Default)]
    pub(crate) struct SharedStream {
        inner: Arc<Mutex<Cursor<Vec<u8>>>>,
    }

    impl SharedStream {
        pub(crate) fn snapshot(&self) -> Vec<u8> {
            self.inner.lock().get_ref().clone()
        }
    }

    impl Read for SharedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.lock().read(buf)
        }
    }

    impl Write for SharedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.inner.lock().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for SharedStream {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.lock().seek(pos)
        }
    }
}
