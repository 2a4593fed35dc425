use std::cell::Cell;
use std::ptr;

/// A cell around a raw OCI pointer. OCI handles are thread-safe when the
/// environment is created in `OCI_THREADED` mode, so the wrapped pointer
/// can be sent to the watcher thread that delivers `OCIBreak`.
pub(crate) struct Ptr<T> {
    ptr: Cell<*mut T>,
}

unsafe impl<T> Send for Ptr<T> {}
unsafe impl<T> Sync for Ptr<T> {}

impl<T> Ptr<T> {
    pub(crate) fn null() -> Self {
        Self { ptr: Cell::new(ptr::null_mut()) }
    }

    pub(crate) fn new(ptr: *mut T) -> Self {
        Self { ptr: Cell::new(ptr) }
    }

    pub(crate) fn get(&self) -> *mut T {
        self.ptr.get()
    }

    pub(crate) fn is_null(&self) -> bool {
        self.ptr.get().is_null()
    }

    /// Replaces the stored pointer and returns the previous one.
    pub(crate) fn swap(&self, ptr: *mut T) -> *mut T {
        self.ptr.replace(ptr)
    }

    /// Pointer to the stored pointer, for OCI out-parameters.
    pub(crate) fn as_mut_ptr(&self) -> *mut *mut T {
        self.ptr.as_ptr()
    }
}

impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}
