use crate::error::StorageError;
use crate::id::PageId;
use crate::pager::descriptor::PAGE_HEADER_SIZE;
use crate::pager::operation::{Completion, IoQueue, PageOperation};
use crate::pager::page::Page;
use crate::pager::stream_manager::{Stream, StreamManager};
use crate::pager::{PageDescriptor, PageType};
use anyhow::anyhow;
use indexmap::IndexMap;
use std::sync::mpsc::channel;
use std::thread::JoinHandle;

pub(crate) const DEFAULT_PAGE_SIZE: usize = 0x1000;

pub struct Setting {
    /// Size of a whole page record, header included.
    pub page_size: usize,
}

impl std::default::Default for Setting {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Setting {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.page_size <= PAGE_HEADER_SIZE {
            return Err(StorageError::invalid_argument(format!(
                "page size must be greater than {PAGE_HEADER_SIZE} bytes, got {}",
                self.page_size
            ))
            .into());
        }
        if self.page_size > i32::MAX as usize {
            return Err(StorageError::invalid_argument(format!(
                "page size {} is too large",
                self.page_size
            ))
            .into());
        }
        Ok(())
    }
}

/// Where each page lives: page `n` starts `n * page_size` bytes after the logical start.
#[derive(Copy, Clone, Debug)]
struct Layout {
    start: u64,
    page_size: usize,
}

impl Layout {
    fn descriptor(&self, id: PageId, page_type: PageType) -> PageDescriptor {
        let header_offset = self.start + id.get() as u64 * self.page_size as u64;
        PageDescriptor::new(
            id,
            header_offset + PAGE_HEADER_SIZE as u64,
            self.page_size - PAGE_HEADER_SIZE,
            page_type,
        )
    }
}

enum IndexState {
    Restoring(Completion<Vec<PageDescriptor>>),
    Restored(PageIndex),
}

struct PageIndex {
    used: IndexMap<PageId, PageDescriptor>,
    /// Reused from the back.
    free: Vec<PageDescriptor>,
    next_id: Option<PageId>,
}

impl PageIndex {
    fn build(pages: Vec<PageDescriptor>) -> anyhow::Result<Self> {
        let next_id = i32::try_from(pages.len())
            .ok()
            .and_then(PageId::new)
            .ok_or_else(|| StorageError::corrupted("the stream holds too many pages"))?;

        let mut used = IndexMap::with_capacity(pages.len());
        let mut free = vec![];
        for descriptor in pages {
            if descriptor.page_type() == PageType::Invalid {
                free.push(descriptor);
            } else {
                used.insert(descriptor.id(), descriptor);
            }
        }

        log::debug!(
            "page index restored, used={} free={} next_id={next_id}",
            used.len(),
            free.len()
        );
        Ok(Self {
            used,
            free,
            next_id: Some(next_id),
        })
    }
}

/// Splits a stream into fixed-size pages.
///
/// All stream access happens on a dedicated io thread, fed through a FIFO queue. Pages handed
/// out by the storage keep a handle to that queue and submit their own reads and writes.
pub struct PageStorage<S: Stream> {
    layout: Layout,
    queue: IoQueue,
    worker: Option<JoinHandle<(S, usize)>>,
    index: IndexState,
}

impl<S: Stream> PageStorage<S> {
    /// Takes over `stream`. Pages start at the current stream position, so a storage can be
    /// embedded after some prefix.
    pub fn open(mut stream: S, setting: Setting) -> anyhow::Result<Self> {
        setting.validate()?;

        let start = stream.stream_position().map_err(StorageError::from)?;
        let layout = Layout {
            start,
            page_size: setting.page_size,
        };

        let (sender, receiver) = channel();
        let manager = StreamManager::new(stream, start, setting.page_size);
        let worker = std::thread::Builder::new()
            .name("page-io".to_string())
            .spawn(move || manager.run(receiver))?;
        let queue = IoQueue::new(sender);

        let (op, done) = PageOperation::restore_index();
        queue.submit(op)?;

        log::debug!(
            "page storage opened, start={start} page_size={}",
            setting.page_size
        );
        Ok(Self {
            layout,
            queue,
            worker: Some(worker),
            index: IndexState::Restoring(done),
        })
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.layout.page_size
    }

    /// Blocks until the index of existing pages is restored.
    fn index(&mut self) -> anyhow::Result<&mut PageIndex> {
        if let IndexState::Restoring(done) = &self.index {
            let pages = done.take()?;
            self.index = IndexState::Restored(PageIndex::build(pages)?);
        }
        let IndexState::Restored(index) = &mut self.index else {
            unreachable!("the index is restored above");
        };
        Ok(index)
    }

    /// Hands out a zeroed page of the given type. The most recently freed page is reused first,
    /// otherwise the page is appended to the stream.
    pub fn allocate(&mut self, page_type: PageType) -> anyhow::Result<Page> {
        if page_type == PageType::Invalid {
            return Err(
                StorageError::invalid_argument("cannot allocate a page of type Invalid").into(),
            );
        }

        let layout = self.layout;
        let index = self.index()?;
        let descriptor = if let Some(free) = index.free.pop() {
            log::debug!("reusing free page {} as {page_type:?}", free.id());
            free.with_type(page_type)
        } else {
            let id = index
                .next_id
                .ok_or_else(|| anyhow!("page storage ran out of page ids"))?;
            index.next_id = id.next();
            log::debug!("appending page {id} as {page_type:?}");
            layout.descriptor(id, page_type)
        };
        index.used.insert_sorted(descriptor.id(), descriptor);

        Page::create_for_write(self.queue.clone(), descriptor)
    }

    /// Hands out a page whose content is read from the stream. The descriptor has to describe a
    /// page of this storage.
    pub fn load(&self, descriptor: PageDescriptor) -> anyhow::Result<Page> {
        let expected = self.layout.descriptor(descriptor.id(), descriptor.page_type());
        if expected != descriptor {
            return Err(StorageError::invalid_argument(format!(
                "descriptor {descriptor:?} does not match the page layout, expected {expected:?}"
            ))
            .into());
        }
        Page::create_for_read(self.queue.clone(), descriptor)
    }

    pub fn load_by_id(&self, id: PageId, page_type: PageType) -> anyhow::Result<Page> {
        self.load(self.layout.descriptor(id, page_type))
    }

    /// Returns the page to the free list. Its header is rewritten with [`PageType::Invalid`], so
    /// the page stays free after reopening.
    pub fn free(&mut self, page: Page) -> anyhow::Result<()> {
        let descriptor = page.descriptor();
        let index = self.index()?;
        if index.used.get(&descriptor.id()) != Some(&descriptor) {
            return Err(StorageError::invalid_argument(format!(
                "page {} is not in use by this storage",
                descriptor.id()
            ))
            .into());
        }

        let data = page.into_data()?;
        index.used.shift_remove(&descriptor.id());
        let freed = descriptor.with_type(PageType::Invalid);
        index.free.push(freed);

        let done = self.queue.write(freed, data)?;
        done.wait()?;
        log::debug!("freed page {}", descriptor.id());
        Ok(())
    }

    /// Descriptors of all pages in use, ordered by id.
    pub fn pages(&mut self) -> anyhow::Result<Vec<PageDescriptor>> {
        Ok(self.index()?.used.values().copied().collect())
    }

    pub fn page_count(&mut self) -> anyhow::Result<usize> {
        Ok(self.index()?.used.len())
    }

    pub fn free_page_count(&mut self) -> anyhow::Result<usize> {
        Ok(self.index()?.free.len())
    }

    /// Blocks until every operation submitted so far ran.
    pub fn sync(&self) -> anyhow::Result<()> {
        let (op, done) = PageOperation::nop();
        self.queue.submit(op)?;
        done.wait()
    }

    /// Stops the io thread once it drained its queue and gives the stream back.
    pub fn shutdown(mut self) -> anyhow::Result<S> {
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("io thread is already stopped"))?;
        Self::stop(&self.queue, worker)
    }

    fn stop(queue: &IoQueue, worker: JoinHandle<(S, usize)>) -> anyhow::Result<S> {
        if queue.stop().is_err() {
            log::error!("io thread is gone before it was asked to stop");
        }
        let Ok((stream, lost)) = worker.join() else {
            return Err(anyhow!("cannot join io thread"));
        };
        if lost > 0 {
            log::error!("{lost} page operations were lost, the storage was closed before they ran");
        }
        Ok(stream)
    }
}

impl<S: Stream> Drop for PageStorage<S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(err) = Self::stop(&self.queue, worker) {
                log::error!("cannot stop page storage: {err}");
            }
        }
    }
}
