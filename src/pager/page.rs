use crate::error::StorageError;
use crate::id::PageId;
use crate::pager::operation::{Completion, IoQueue};
use crate::pager::{PageDescriptor, PageType};

/// In-memory copy of one page's data region.
///
/// Reads and writes only touch the buffer. Changes reach the stream when [`Page::commit`] is
/// called; dropping a page with uncommitted changes discards them.
pub struct Page {
    descriptor: PageDescriptor,
    queue: IoQueue,
    buffer: Vec<u8>,
    pending: Pending,
    position: usize,
    dirty: bool,
}

/// The operation that initializes the page buffer.
enum Pending {
    Ready,
    Zeroing(Completion<()>),
    Loading(Completion<Vec<u8>>),
}

impl Page {
    /// Creates a zeroed page and enqueues a zero-fill write, so the stream has well-defined
    /// content for it even if the page is never committed.
    pub(crate) fn create_for_write(
        queue: IoQueue,
        descriptor: PageDescriptor,
    ) -> anyhow::Result<Self> {
        let buffer = vec![0u8; descriptor.data_size()];
        let done = queue.write(descriptor, buffer.clone())?;
        Ok(Self {
            descriptor,
            queue,
            buffer,
            pending: Pending::Zeroing(done),
            position: 0,
            dirty: false,
        })
    }

    /// Creates a page whose buffer is filled by an enqueued read.
    pub(crate) fn create_for_read(
        queue: IoQueue,
        descriptor: PageDescriptor,
    ) -> anyhow::Result<Self> {
        let done = queue.read(descriptor)?;
        Ok(Self {
            descriptor,
            queue,
            buffer: Vec::new(),
            pending: Pending::Loading(done),
            position: 0,
            dirty: false,
        })
    }

    #[inline]
    pub fn descriptor(&self) -> PageDescriptor {
        self.descriptor
    }

    #[inline]
    pub fn id(&self) -> PageId {
        self.descriptor.id()
    }

    #[inline]
    pub fn page_type(&self) -> PageType {
        self.descriptor.page_type()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.descriptor.data_size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) -> anyhow::Result<()> {
        if position >= self.len() {
            return Err(StorageError::invalid_argument(format!(
                "cannot seek to {position}, page {} only has {} bytes",
                self.id(),
                self.len()
            ))
            .into());
        }
        self.position = position;
        Ok(())
    }

    /// Pages have a fixed size.
    pub fn set_len(&mut self, len: usize) -> anyhow::Result<()> {
        Err(StorageError::invalid_argument(format!(
            "cannot resize page {} to {len} bytes, pages have a fixed size",
            self.id()
        ))
        .into())
    }

    /// Blocks until the operation that initializes this page has run.
    pub fn wait(&mut self) -> anyhow::Result<()> {
        match &self.pending {
            Pending::Ready => (),
            Pending::Zeroing(done) => {
                done.wait()?;
                self.pending = Pending::Ready;
            }
            Pending::Loading(done) => {
                self.buffer = done.take()?;
                self.pending = Pending::Ready;
            }
        }
        Ok(())
    }

    /// Fills `buff` with the bytes at the current position. Either the whole request is served
    /// or nothing is read.
    pub fn read(&mut self, buff: &mut [u8]) -> anyhow::Result<()> {
        self.wait()?;
        let range = self.range(buff.len())?;
        buff.copy_from_slice(&self.buffer[range]);
        self.position += buff.len();
        Ok(())
    }

    pub fn write(&mut self, buff: &[u8]) -> anyhow::Result<()> {
        // a pending read would overwrite whatever we put into the buffer now
        if let Pending::Loading(_) = self.pending {
            self.wait()?;
        }
        let range = self.range(buff.len())?;
        self.buffer[range].copy_from_slice(buff);
        self.position += buff.len();
        self.dirty = true;
        Ok(())
    }

    pub fn read_at(&mut self, offset: usize, buff: &mut [u8]) -> anyhow::Result<()> {
        self.seek(offset)?;
        self.read(buff)
    }

    pub fn write_at(&mut self, offset: usize, buff: &[u8]) -> anyhow::Result<()> {
        self.seek(offset)?;
        self.write(buff)
    }

    /// Writes the buffer to the stream and blocks until the write went through.
    pub fn commit(&mut self) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let done = self.queue.write(self.descriptor, self.buffer.clone())?;
        done.wait()?;
        self.dirty = false;
        log::trace!("committed page {}", self.id());
        Ok(())
    }

    /// Hands out the buffer of a page that is being freed.
    pub(crate) fn into_data(mut self) -> anyhow::Result<Vec<u8>> {
        self.wait()?;
        self.dirty = false;
        Ok(std::mem::take(&mut self.buffer))
    }

    fn range(&self, count: usize) -> anyhow::Result<std::ops::Range<usize>> {
        let end = self.position + count;
        if end > self.len() {
            return Err(StorageError::invalid_argument(format!(
                "cannot access {count} bytes at position {} of page {}, it only has {} bytes",
                self.position,
                self.id(),
                self.len()
            ))
            .into());
        }
        Ok(self.position..end)
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if let Pending::Zeroing(done) = &self.pending {
            if done.is_finished() {
                if let Err(err) = done.wait() {
                    log::error!("cannot initialize page {}: {err}", self.id());
                }
            }
        }
        if self.dirty {
            log::warn!(
                "page {} is dropped with uncommitted changes, they are lost",
                self.id()
            );
        }
    }
}
