use crate::err::Error;
use crate::oci::*;
use crate::ptr::Ptr;
use crate::Result;
use libc::{c_void, size_t};
use std::ptr;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/handle-and-descriptor-functions.html#GUID-E9EF2766-E078-49A7-B1D1-738E4BA4814F
    fn OCIDescriptorAlloc(
        parenth:    *mut OCIEnv,
        descpp:     *mut *mut c_void,
        desc_type:  u32,
        xtramem_sz: size_t,
        usrmempp:   *const c_void,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/handle-and-descriptor-functions.html#GUID-A32BF051-3DC1-491C-AAFD-A46034DD1629
    fn OCIDescriptorFree(
        descp:      *mut c_void,
        desc_type:  u32,
    ) -> i32;
}

pub(crate) trait DescriptorType {
    type OCIType;
    fn get_type() -> u32;
}

macro_rules! impl_descr_type {
    ($($marker:ident => $id:ident, $ret:ident),+) => {
        $(
            impl DescriptorType for $marker {
                type OCIType = $ret;
                fn get_type() -> u32 { $id }
            }
        )+
    };
}

impl_descr_type! {
    OCICLobLocator          => OCI_DTYPE_LOB,           OCILobLocator,
    OCIBLobLocator          => OCI_DTYPE_LOB,           OCILobLocator,
    OCIRowid                => OCI_DTYPE_ROWID,         OCIRowid,
    OCIParam                => OCI_DTYPE_PARAM,         OCIParam,
    OCITimestamp            => OCI_DTYPE_TIMESTAMP,     OCIDateTime,
    OCITimestampTZ          => OCI_DTYPE_TIMESTAMP_TZ,  OCIDateTime,
    OCITimestampLTZ         => OCI_DTYPE_TIMESTAMP_LTZ, OCIDateTime,
    OCIIntervalYearToMonth  => OCI_DTYPE_INTERVAL_YM,   OCIInterval,
    OCIIntervalDayToSecond  => OCI_DTYPE_INTERVAL_DS,   OCIInterval
}

/// An owned OCI descriptor, freed when dropped.
pub(crate) struct Descriptor<T: DescriptorType> {
    ptr: Ptr<T>,
}

impl<T: DescriptorType> Drop for Descriptor<T> {
    fn drop(&mut self) {
        let ptr = self.ptr.get();
        if !ptr.is_null() {
            unsafe {
                OCIDescriptorFree(ptr as *mut c_void, T::get_type());
            }
        }
    }
}

impl<T: DescriptorType> Descriptor<T> {
    pub(crate) fn new(env: *mut OCIEnv) -> Result<Self> {
        let mut desc = ptr::null_mut::<T>();
        let res = unsafe {
            OCIDescriptorAlloc(env, &mut desc as *mut *mut T as *mut *mut c_void, T::get_type(), 0, ptr::null())
        };
        if res != OCI_SUCCESS {
            Err(Error::interface(format!("cannot allocate OCI descriptor {}", T::get_type())))
        } else if desc.is_null() {
            Err(Error::interface(format!("OCI returned NULL for descriptor {}", T::get_type())))
        } else {
            Ok(Self { ptr: Ptr::new(desc) })
        }
    }

    /// Takes ownership of a descriptor OCI allocated for us, e.g. a
    /// parameter descriptor from `OCIParamGet`.
    pub(crate) fn from_ptr(ptr: *mut T) -> Self {
        Self { ptr: Ptr::new(ptr) }
    }

    pub(crate) fn get(&self) -> *mut T::OCIType {
        self.ptr.get() as *mut T::OCIType
    }

    /// Pointer to the descriptor pointer, to bind or define the
    /// descriptor itself as the output location.
    pub(crate) fn as_mut_ptr(&self) -> *mut *mut T::OCIType {
        self.ptr.as_mut_ptr() as *mut *mut T::OCIType
    }
}
