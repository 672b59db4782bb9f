use crate::error::StorageError;
use crate::id::PageId;
use crate::pager::descriptor::{PageHeader, PAGE_HEADER_SIZE};
use crate::pager::operation::{Message, PageOperation};
use crate::pager::PageDescriptor;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::mpsc::Receiver;

/// Anything a page storage can live in: a file, an in-memory cursor, ...
pub trait Stream: Read + Write + Seek + Send + 'static {}

impl<T> Stream for T where T: Read + Write + Seek + Send + 'static {}

/// The io thread's side of the page storage. It is the only owner of the stream.
pub(crate) struct StreamManager<S> {
    stream: S,
    start: u64,
    page_size: usize,
}

impl<S: Stream> StreamManager<S> {
    pub(crate) fn new(stream: S, start: u64, page_size: usize) -> Self {
        Self {
            stream,
            start,
            page_size,
        }
    }

    /// Executes operations in the order they arrive until asked to stop. Whatever is still queued
    /// after the stop request is failed and counted as lost.
    pub(crate) fn run(mut self, receiver: Receiver<Message>) -> (S, usize) {
        while let Ok(message) = receiver.recv() {
            match message {
                Message::Execute(op) => self.execute(op),
                Message::Stop => break,
            }
        }

        let mut lost = 0;
        for message in receiver.try_iter() {
            if let Message::Execute(op) = message {
                log::error!("dropping {op}, the io thread is stopping");
                op.abandon(StorageError::Closed);
                lost += 1;
            }
        }

        (self.stream, lost)
    }

    fn execute(&mut self, op: PageOperation) {
        log::trace!("execute {op}");
        match op {
            PageOperation::Nop { done } => done.complete(Ok(())),
            PageOperation::Read { descriptor, done } => {
                let result = self.read(&descriptor);
                Self::log_failure(&result, "read", &descriptor);
                done.complete(result);
            }
            PageOperation::Write {
                descriptor,
                data,
                done,
            } => {
                let result = self.write(&descriptor, &data);
                Self::log_failure(&result, "write", &descriptor);
                done.complete(result);
            }
            PageOperation::RestoreIndex { done } => {
                let result = self.restore_index();
                if let Err(ref err) = result {
                    log::debug!("index restore failed: {err}");
                }
                done.complete(result);
            }
        }
    }

    fn log_failure<T>(
        result: &Result<T, StorageError>,
        kind: &str,
        descriptor: &PageDescriptor,
    ) {
        if let Err(err) = result {
            log::debug!("page {kind} of {} failed: {err}", descriptor.id());
        }
    }

    fn read(&mut self, descriptor: &PageDescriptor) -> Result<Vec<u8>, StorageError> {
        let mut data = vec![0u8; descriptor.data_size()];
        self.stream.seek(SeekFrom::Start(descriptor.data_offset()))?;
        self.stream.read_exact(&mut data)?;
        Ok(data)
    }

    fn write(&mut self, descriptor: &PageDescriptor, data: &[u8]) -> Result<(), StorageError> {
        self.stream.seek(SeekFrom::Start(descriptor.header_offset()))?;
        self.stream.write_all(&descriptor.encode_header())?;
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(())
    }

    fn restore_index(&mut self) -> Result<Vec<PageDescriptor>, StorageError> {
        let len = self.stream.seek(SeekFrom::End(0))?;
        let page_size = self.page_size as u64;
        let data_size = self.page_size - PAGE_HEADER_SIZE;

        let mut pages = Vec::new();
        let mut raw = [0u8; PAGE_HEADER_SIZE];
        let mut pos = self.start;
        while pos < len {
            if len - pos < page_size {
                return Err(StorageError::corrupted(format!(
                    "found a truncated page at offset {pos}, {} bytes left but a page takes {page_size}",
                    len - pos,
                )));
            }

            self.stream.seek(SeekFrom::Start(pos))?;
            self.stream.read_exact(&mut raw)?;
            let header = PageHeader::decode(&raw)?;

            let slot = (pos - self.start) / page_size;
            let Some(id) = PageId::new(header.id).filter(|id| id.get() as u64 == slot) else {
                return Err(StorageError::corrupted(format!(
                    "page at offset {pos} claims id {} but occupies slot {slot}",
                    header.id,
                )));
            };

            let descriptor = PageDescriptor::new(
                id,
                pos + PAGE_HEADER_SIZE as u64,
                data_size,
                header.page_type,
            );
            pages.push(descriptor);

            pos += page_size;
        }

        log::debug!("restored {} pages from the stream", pages.len());
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::{PageStorage, PageType, Setting};
    use std::io::Cursor;
    use std::sync::mpsc::channel;

    fn descriptor(id: i32, page_size: usize) -> PageDescriptor {
        let id = PageId::new(id).unwrap();
        let offset = id.get() as u64 * page_size as u64 + PAGE_HEADER_SIZE as u64;
        PageDescriptor::new(id, offset, page_size - PAGE_HEADER_SIZE, PageType::TypeList)
    }

    #[test]
    fn test_operations_after_stop_are_lost() {
        let (sender, receiver) = channel();
        let (op, done) = PageOperation::nop();
        sender.send(Message::Stop).unwrap();
        sender.send(Message::Execute(op)).unwrap();

        let (_, lost) = StreamManager::new(Cursor::new(vec![]), 0, 16).run(receiver);
        assert_eq!(1, lost);

        let err = done.wait().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::OperationFailed { source, .. })
                if matches!(**source, StorageError::Closed)
        ));
    }

    #[test]
    fn test_failed_read_does_not_stop_the_worker() {
        let (sender, receiver) = channel();
        let (missing, missing_done) = PageOperation::read(descriptor(3, 16));
        let (write, write_done) = PageOperation::write(descriptor(0, 16), vec![7; 11]);
        let (read, read_done) = PageOperation::read(descriptor(0, 16));
        for op in [missing, write, read] {
            sender.send(Message::Execute(op)).unwrap();
        }
        sender.send(Message::Stop).unwrap();

        let (stream, lost) = StreamManager::new(Cursor::new(vec![]), 0, 16).run(receiver);
        assert_eq!(0, lost);
        assert!(missing_done.take().is_err());
        write_done.wait().unwrap();
        assert_eq!(vec![7; 11], read_done.take().unwrap());
        assert_eq!(16, stream.get_ref().len());
    }

    #[test]
    fn test_storage_usable_after_failed_load() {
        let mut storage =
            PageStorage::open(Cursor::new(vec![]), Setting { page_size: 16 }).unwrap();
        let mut missing = storage
            .load_by_id(PageId::new(5).unwrap(), PageType::TypeList)
            .unwrap();
        assert!(missing.wait().is_err());
        drop(missing);

        let mut page = storage.allocate(PageType::TypeList).unwrap();
        page.write_at(0, &[1, 2, 3, 4]).unwrap();
        page.commit().unwrap();
        let descriptor = page.descriptor();
        drop(page);

        let mut page = storage.load(descriptor).unwrap();
        let mut buff = [0u8; 4];
        page.read_at(0, &mut buff).unwrap();
        assert_eq!([1, 2, 3, 4], buff);
    }
}
