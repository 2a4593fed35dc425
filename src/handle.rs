use crate::attr;
use crate::err::Error;
use crate::oci::*;
use crate::ptr::Ptr;
use crate::Result;
use libc::{c_void, size_t};
use std::ptr;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/handle-and-descriptor-functions.html#GUID-C5BF55F7-A110-4CB5-9663-5056590F12B5
    fn OCIHandleAlloc(
        parenth:    *mut OCIEnv,
        hndlpp:     *mut *mut c_void,
        hnd_type:   u32,
        xtramem_sz: size_t,
        usrmempp:   *const c_void,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/handle-and-descriptor-functions.html#GUID-E87E9F91-D3DC-4F35-BE7C-F1EFBFEEBA0A
    fn OCIHandleFree(
        hndlp:      *mut c_void,
        hnd_type:   u32,
    ) -> i32;
}

pub(crate) trait HandleType {
    fn get_type() -> u32;
}

macro_rules! impl_handle_type {
    ($($oci_handle:ty => $id:ident),+) => {
        $(
            impl HandleType for $oci_handle {
                fn get_type() -> u32 { $id }
            }
        )+
    };
}

impl_handle_type! {
    OCIEnv      => OCI_HTYPE_ENV,
    OCIError    => OCI_HTYPE_ERROR,
    OCISvcCtx   => OCI_HTYPE_SVCCTX,
    OCIServer   => OCI_HTYPE_SERVER,
    OCISession  => OCI_HTYPE_SESSION,
    OCITrans    => OCI_HTYPE_TRANS
}

/// An owned OCI handle, freed when dropped.
pub(crate) struct Handle<T: HandleType> {
    ptr: Ptr<T>,
}

impl<T: HandleType> Drop for Handle<T> {
    fn drop(&mut self) {
        let ptr = self.ptr.get();
        if !ptr.is_null() {
            unsafe {
                OCIHandleFree(ptr as *mut c_void, T::get_type());
            }
        }
    }
}

impl<T: HandleType> Handle<T> {
    pub(crate) fn new(env: *mut OCIEnv) -> Result<Self> {
        let mut hndl = ptr::null_mut::<T>();
        let res = unsafe {
            OCIHandleAlloc(env, &mut hndl as *mut *mut T as *mut *mut c_void, T::get_type(), 0, ptr::null())
        };
        if res != OCI_SUCCESS {
            Err(Error::interface(format!("cannot allocate OCI handle {}", T::get_type())))
        } else if hndl.is_null() {
            Err(Error::interface(format!("OCI returned NULL for handle {}", T::get_type())))
        } else {
            Ok(Self { ptr: Ptr::new(hndl) })
        }
    }

    /// Wraps a handle that OCI created on our behalf, e.g. the environment
    /// handle returned by `OCIEnvNlsCreate`.
    pub(crate) fn from_ptr(ptr: Ptr<T>) -> Self {
        Self { ptr }
    }

    pub(crate) fn get(&self) -> *mut T {
        self.ptr.get()
    }

    pub(crate) fn get_attr<V: attr::AttrGet>(&self, attr_type: u32, err: *mut OCIError) -> Result<V> {
        attr::get::<V>(attr_type, T::get_type(), self.get() as *const c_void, err)
    }

    pub(crate) fn set_attr<V: attr::AttrSet>(&self, attr_type: u32, attr_val: V, err: *mut OCIError) -> Result<()> {
        attr::set::<V>(attr_type, attr_val, T::get_type(), self.get() as *mut c_void, err)
    }
}

