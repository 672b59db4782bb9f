use crate::error::StorageError;
use crate::pager::PageDescriptor;
use anyhow::anyhow;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// A single-assignment result slot shared between the io thread and whoever waits for the
/// operation. It is set exactly once and can be observed any number of times.
pub(crate) struct Completion<T> {
    inner: Arc<CompletionInner<T>>,
}

struct CompletionInner<T> {
    operation: &'static str,
    state: Mutex<Outcome<T>>,
    finished: Condvar,
}

enum Outcome<T> {
    Pending,
    Done(Option<T>),
    Failed(Arc<StorageError>),
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Completion<T> {
    fn new(operation: &'static str) -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                operation,
                state: Mutex::new(Outcome::Pending),
                finished: Condvar::new(),
            }),
        }
    }

    pub(crate) fn complete(&self, result: Result<T, StorageError>) {
        let mut state = self.inner.state.lock();
        if !matches!(*state, Outcome::Pending) {
            log::error!("{} completed more than once", self.inner.operation);
            return;
        }
        *state = match result {
            Ok(value) => Outcome::Done(Some(value)),
            Err(err) => Outcome::Failed(Arc::new(err)),
        };
        self.inner.finished.notify_all();
    }

    pub(crate) fn is_finished(&self) -> bool {
        !matches!(*self.inner.state.lock(), Outcome::Pending)
    }

    /// Blocks until the operation ran and reports its failure, if any.
    pub(crate) fn wait(&self) -> anyhow::Result<()> {
        let mut state = self.inner.state.lock();
        while matches!(*state, Outcome::Pending) {
            self.inner.finished.wait(&mut state);
        }
        match &*state {
            Outcome::Failed(err) => Err(self.failure(err)),
            _ => Ok(()),
        }
    }

    /// Blocks until the operation ran and moves its result out. Only one caller gets the value.
    pub(crate) fn take(&self) -> anyhow::Result<T> {
        let mut state = self.inner.state.lock();
        while matches!(*state, Outcome::Pending) {
            self.inner.finished.wait(&mut state);
        }
        match &mut *state {
            Outcome::Failed(err) => Err(self.failure(err)),
            Outcome::Done(value) => value
                .take()
                .ok_or_else(|| anyhow!("result of {} was already taken", self.inner.operation)),
            Outcome::Pending => unreachable!(),
        }
    }

    fn failure(&self, err: &Arc<StorageError>) -> anyhow::Error {
        StorageError::OperationFailed {
            operation: self.inner.operation,
            source: err.clone(),
        }
        .into()
    }
}

/// One unit of work for the io thread.
pub(crate) enum PageOperation {
    Nop {
        done: Completion<()>,
    },
    Read {
        descriptor: PageDescriptor,
        done: Completion<Vec<u8>>,
    },
    Write {
        descriptor: PageDescriptor,
        data: Vec<u8>,
        done: Completion<()>,
    },
    RestoreIndex {
        done: Completion<Vec<PageDescriptor>>,
    },
}

impl PageOperation {
    pub(crate) fn nop() -> (Self, Completion<()>) {
        let done = Completion::new("no-op");
        (Self::Nop { done: done.clone() }, done)
    }

    pub(crate) fn read(descriptor: PageDescriptor) -> (Self, Completion<Vec<u8>>) {
        let done = Completion::new("page read");
        let op = Self::Read {
            descriptor,
            done: done.clone(),
        };
        (op, done)
    }

    pub(crate) fn write(descriptor: PageDescriptor, data: Vec<u8>) -> (Self, Completion<()>) {
        assert_eq!(descriptor.data_size(), data.len());
        let done = Completion::new("page write");
        let op = Self::Write {
            descriptor,
            data,
            done: done.clone(),
        };
        (op, done)
    }

    pub(crate) fn restore_index() -> (Self, Completion<Vec<PageDescriptor>>) {
        let done = Completion::new("index restore");
        (Self::RestoreIndex { done: done.clone() }, done)
    }

    /// Fails the operation without running it.
    pub(crate) fn abandon(self, err: StorageError) {
        match self {
            Self::Nop { done } => done.complete(Err(err)),
            Self::Read { done, .. } => done.complete(Err(err)),
            Self::Write { done, .. } => done.complete(Err(err)),
            Self::RestoreIndex { done } => done.complete(Err(err)),
        }
    }
}

impl fmt::Display for PageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nop { .. } => write!(f, "nop"),
            Self::Read { descriptor, .. } => write!(
                f,
                "read {} @{}, {} bytes",
                descriptor.id(),
                descriptor.data_offset(),
                descriptor.data_size()
            ),
            Self::Write { descriptor, .. } => write!(
                f,
                "write {} ({:?}) @{}, {} bytes",
                descriptor.id(),
                descriptor.page_type(),
                descriptor.data_offset(),
                descriptor.data_size()
            ),
            Self::RestoreIndex { .. } => write!(f, "restore index"),
        }
    }
}

pub(crate) enum Message {
    Execute(PageOperation),
    Stop,
}

/// Sending half of the io thread's queue. Pages hold a clone of it to submit their reads and
/// writes.
#[derive(Clone)]
pub(crate) struct IoQueue {
    sender: Sender<Message>,
}

impl IoQueue {
    pub(crate) fn new(sender: Sender<Message>) -> Self {
        Self { sender }
    }

    pub(crate) fn submit(&self, op: PageOperation) -> anyhow::Result<()> {
        log::trace!("submit {op}");
        if self.sender.send(Message::Execute(op)).is_err() {
            return Err(StorageError::Closed.into());
        }
        Ok(())
    }

    pub(crate) fn read(&self, descriptor: PageDescriptor) -> anyhow::Result<Completion<Vec<u8>>> {
        let (op, done) = PageOperation::read(descriptor);
        self.submit(op)?;
        Ok(done)
    }

    pub(crate) fn write(
        &self,
        descriptor: PageDescriptor,
        data: Vec<u8>,
    ) -> anyhow::Result<Completion<()>> {
        let (op, done) = PageOperation::write(descriptor, data);
        self.submit(op)?;
        Ok(done)
    }

    pub(crate) fn stop(&self) -> anyhow::Result<()> {
        if self.sender.send(Message::Stop).is_err() {
            return Err(StorageError::Closed.into());
        }
        Ok(())
    }
}
