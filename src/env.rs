//! OCI environment and client-side charset negotiation.

use crate::config;
use crate::err::Error;
use crate::handle::Handle;
use crate::oci::*;
use crate::ptr::Ptr;
use crate::Result;
use libc::{c_void, size_t};
use std::ffi::CString;
use std::ptr;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/connect-authorize-and-initialize-functions.html#GUID-0B6911A9-4B46-476C-BC5E-B87581666CD9
    fn OCIEnvNlsCreate(
        envhpp:     *mut *mut OCIEnv,
        mode:       u32,
        ctxp:       *const c_void,
        malocfp:    *const c_void,
        ralocfp:    *const c_void,
        mfreefp:    *const c_void,
        xtramemsz:  size_t,
        usrmempp:   *const c_void,
        charset:    u16,
        ncharset:   u16,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/miscellaneous-functions.html#GUID-E13350A9-C455-4AB4-B1BA-D36F7E8CA5D8
    fn OCINlsCharSetNameToId(
        envhp:      *mut OCIEnv,
        name:       *const u8,
    ) -> u16;
}

/// Owns the environment handle. Every connection gets its own
/// environment so the charset is fixed at open time and nothing is
/// shared between connections.
pub(crate) struct Environment {
    env: Handle<OCIEnv>,
}

impl Environment {
    pub(crate) fn new(charset: u16) -> Result<Self> {
        let env = create_env(charset)?;
        Ok(Self { env })
    }

    pub(crate) fn env_ptr(&self) -> *mut OCIEnv {
        self.env.get()
    }
}

fn create_env(charset: u16) -> Result<Handle<OCIEnv>> {
    let env = Ptr::<OCIEnv>::null();
    let res = unsafe {
        OCIEnvNlsCreate(
            env.as_mut_ptr(), OCI_OBJECT | OCI_THREADED,
            ptr::null(), ptr::null(), ptr::null(), ptr::null(), 0, ptr::null(),
            charset, charset,
        )
    };
    if res != OCI_SUCCESS || env.is_null() {
        return Err(Error::interface("cannot create OCI environment"));
    }
    Ok(Handle::from_ptr(env))
}

/// Resolves the configured (or ambient) charset name to an OCI charset id.
/// The lookup needs an environment of its own because the id is required
/// to create the real one. An unknown name is reported and replaced with
/// the documented default rather than failing the open.
pub(crate) fn resolve_charset(explicit: Option<&str>) -> Result<u16> {
    let name = config::resolve_charset_name(explicit);
    let scratch = create_env(0)?;
    let cname = CString::new(name.as_str())
        .map_err(|_| Error::interface(format!("invalid charset name {:?}", name)))?;
    let id = unsafe { OCINlsCharSetNameToId(scratch.get(), cname.as_ptr() as *const u8) };
    if id == 0 {
        log::warn!("unknown charset {:?}, falling back to AL32UTF8", name);
        Ok(AL32UTF8)
    } else {
        Ok(id)
    }
}
