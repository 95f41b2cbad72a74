//! A base stream aliased by several views on one thread.

use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

#[derive(Debug)]
struct Inner<S> {
    stream: S,
    closed: bool,
}

/// A cloneable handle to one underlying stream.
///
/// Every handle moves the same cursor. Handles are `!Send`, so aliasing
/// across threads is rejected at compile time; re-entrant use on one thread
/// fails with [`io::ErrorKind::WouldBlock`], which converts to a busy error.
#[derive(Debug)]
pub struct SharedStream<S> {
    inner: Rc<RefCell<Inner<S>>>,
}

impl<S> Clone for SharedStream<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

fn busy(e: std::cell::BorrowMutError) -> io::Error {
    io::Error::new(
        io::ErrorKind::WouldBlock,
        format!("stream is in use by another view: {e}"),
    )
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "stream is closed")
}

impl<S> SharedStream<S> {
    /// Wrap `stream` for sharing.
    pub fn new(stream: S) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                stream,
                closed: false,
            })),
        }
    }

    /// Close the stream for every handle.
    ///
    /// Later reads and seeks fail with [`io::ErrorKind::BrokenPipe`], which
    /// is distinct from the zero-length read at end of stream.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.closed = true;
        }
    }

    /// Check if [`SharedStream::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.try_borrow().is_ok_and(|inner| inner.closed)
    }

    /// Number of live handles.
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    fn with_stream<T>(&self, func: impl FnOnce(&mut S) -> io::Result<T>) -> io::Result<T> {
        let mut inner = self.inner.try_borrow_mut().map_err(busy)?;
        if inner.closed {
            return Err(closed());
        }
        func(&mut inner.stream)
    }
}

impl<S: Read> Read for SharedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_stream(|s| s.read(buf))
    }
}

impl<S: Seek> Seek for SharedStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.with_stream(|s| s.seek(pos))
    }
}
