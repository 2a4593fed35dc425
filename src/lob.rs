//! Piecewise LOB reads.

use crate::conn::Connection;
use crate::err::Error;
use crate::oci::*;
use crate::Result;
use libc::c_void;
use std::ptr;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/lob-functions.html#GUID-2EF28B6B-158E-4DBB-81BA-AA7BDA85AFB6
    fn OCILobRead2(
        svchp:      *mut OCISvcCtx,
        errhp:      *mut OCIError,
        locp:       *mut OCILobLocator,
        byte_amtp:  *mut u64,
        char_amtp:  *mut u64,
        offset:     u64,
        bufp:       *mut c_void,
        bufl:       u64,
        piece:      u8,
        ctxp:       *mut c_void,
        cbfp:       *const c_void,
        csid:       u16,
        csfrm:      u8,
    ) -> i32;
}

const PIECE_SIZE: usize = 4096;

/// Streams the whole LOB into memory. `csfrm` is `SQLCS_IMPLICIT` for
/// character LOBs (the environment charset applies) and 0 for binary.
pub(crate) fn read_to_end(conn: &Connection, lob: *mut OCILobLocator, csfrm: u8) -> Result<Vec<u8>> {
    let svc = conn.svc_ptr()?;
    let err = conn.err_ptr();
    let mut data = Vec::new();
    let mut buf = [0u8; PIECE_SIZE];
    let mut piece = OCI_FIRST_PIECE;
    loop {
        // 0 tells OCI to read until the buffer is full or the LOB ends
        let mut byte_amt: u64 = 0;
        let mut char_amt: u64 = 0;
        let res = unsafe {
            OCILobRead2(
                svc, err, lob,
                &mut byte_amt, &mut char_amt, 1,
                buf.as_mut_ptr() as *mut c_void, buf.len() as u64,
                piece, ptr::null_mut(), ptr::null(),
                0, csfrm,
            )
        };
        match res {
            OCI_NEED_DATA => {
                data.extend_from_slice(&buf[..byte_amt as usize]);
                piece = OCI_NEXT_PIECE;
            }
            OCI_ERROR | OCI_INVALID_HANDLE => {
                return Err(Error::oci(err, res));
            }
            _ => {
                data.extend_from_slice(&buf[..byte_amt as usize]);
                break;
            }
        }
    }
    Ok(data)
}
