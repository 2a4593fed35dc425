use crate::oci::*;
use libc::c_void;
use std::ffi::CStr;
use std::fmt;
use std::ptr;

const OCI_ERROR_MAXMSG_SIZE: usize = 3072;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/miscellaneous-functions.html#GUID-4B99087C-74F6-498A-8310-D6645172390A
    fn OCIErrorGet(
        hndlp:      *const c_void,
        recordno:   u32,
        sqlstate:   *const c_void,
        errcodep:   *mut i32,
        bufp:       *mut u8,
        bufsiz:     u32,
        hnd_type:   u32,
    ) -> i32;
}

/// A diagnostic read from an OCI error (or environment) handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleError {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ORA-{:05}: {}", self.code, self.message)
    }
}

/// ORA codes after which the server session is gone and the connection
/// must not be reused.
const BAD_CONNECTION_CODES: [i32; 10] = [
    28,     // session killed
    1012,   // not logged on
    1033,   // initialization or shutdown in progress
    1034,   // not available
    1089,   // immediate shutdown in progress
    3113,   // end-of-file on communication channel
    3114,   // not connected to ORACLE
    3135,   // connection lost contact
    12528,  // listener: all instances are blocking new connections
    12537,  // connection closed
];

pub(crate) fn is_bad_connection(code: i32) -> bool {
    BAD_CONNECTION_CODES.contains(&code)
}

// user break
const ORA_CANCELLED: i32 = 1013;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The connection could not be established.
    #[error("cannot connect: {0}")]
    Connection(OracleError),
    /// The server session is gone; the connection must be discarded.
    #[error("lost connection: {0}")]
    BadConnection(OracleError),
    /// The statement failed; the connection remains usable.
    #[error("{0}")]
    Statement(OracleError),
    /// A value could not be represented on the other side of the codec.
    #[error("cannot convert: {0}")]
    Conversion(String),
    /// Array DML stopped at `offset`; `affected` rows went through.
    #[error("batch row {offset}: {error} ({affected} rows affected)")]
    Batch { offset: u32, error: OracleError, affected: u64 },
    /// The operation was interrupted through a [`CancelToken`](crate::CancelToken).
    #[error("operation was cancelled")]
    Cancelled,
    /// A driver-side failure with no server diagnostic.
    #[error("{0}")]
    Interface(String),
}

pub(crate) fn read_diagnostic(rc: i32, hndl: *mut c_void, htype: u32) -> OracleError {
    let mut code = rc;
    let mut buf: Vec<u8> = Vec::with_capacity(OCI_ERROR_MAXMSG_SIZE);
    let buf_ptr = buf.as_mut_ptr();
    let res = unsafe {
        *buf_ptr = 0;
        OCIErrorGet(hndl as *const c_void, 1, ptr::null(), &mut code, buf_ptr, OCI_ERROR_MAXMSG_SIZE as u32, htype)
    };
    let message = if res == OCI_SUCCESS {
        let msg = unsafe { CStr::from_ptr(buf_ptr as *const libc::c_char) };
        msg.to_string_lossy().trim_end().to_string()
    } else {
        match code {
            OCI_NO_DATA   => String::from("no data"),
            OCI_NEED_DATA => String::from("need data"),
            _ => format!("error {}", code),
        }
    };
    OracleError { code, message }
}

impl Error {
    pub(crate) fn interface(msg: impl Into<String>) -> Self {
        Error::Interface(msg.into())
    }

    /// Classifies a diagnostic read from an error handle.
    pub(crate) fn oci(err: *mut OCIError, rc: i32) -> Self {
        Self::classify(read_diagnostic(rc, err as *mut c_void, OCI_HTYPE_ERROR))
    }

    pub(crate) fn env(env: *mut OCIEnv, rc: i32) -> Self {
        Self::classify(read_diagnostic(rc, env as *mut c_void, OCI_HTYPE_ENV))
    }

    pub(crate) fn classify(diag: OracleError) -> Self {
        if diag.code == ORA_CANCELLED {
            Error::Cancelled
        } else if is_bad_connection(diag.code) {
            Error::BadConnection(diag)
        } else {
            Error::Statement(diag)
        }
    }

    /// Remaps statement-class failures raised while connecting.
    pub(crate) fn while_connecting(self) -> Self {
        match self {
            Error::Statement(diag) => Error::Connection(diag),
            other => other,
        }
    }
}

macro_rules! catch {
    ( $err:expr => $( $stmt:stmt );+ ) => {{
        let res = unsafe { $($stmt)+ };
        match res {
            $crate::oci::OCI_ERROR | $crate::oci::OCI_INVALID_HANDLE => {
                return Err( $crate::err::Error::oci($err, res) );
            },
            _ => {}
        }
    }};
}

pub(crate) use catch;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_connection_codes_are_closed_set() {
        for code in [28, 1012, 1033, 1034, 1089, 3113, 3114, 3135, 12528, 12537] {
            assert!(is_bad_connection(code), "ORA-{} should kill the connection", code);
        }
        for code in [1, 942, 1017, 1013, 1555, 12899] {
            assert!(!is_bad_connection(code), "ORA-{} should not kill the connection", code);
        }
    }

    #[test]
    fn classification() {
        let diag = |code| OracleError { code, message: format!("ORA test {}", code) };
        assert!(matches!(Error::classify(diag(3113)), Error::BadConnection(_)));
        assert!(matches!(Error::classify(diag(1013)), Error::Cancelled));
        assert!(matches!(Error::classify(diag(942)),  Error::Statement(_)));
    }

    #[test]
    fn connect_remap_keeps_bad_connection() {
        let diag = OracleError { code: 12537, message: "TNS:connection closed".into() };
        let err = Error::classify(diag).while_connecting();
        assert!(matches!(err, Error::BadConnection(_)));

        let diag = OracleError { code: 1017, message: "invalid username/password".into() };
        let err = Error::classify(diag).while_connecting();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn display_pads_oracle_code() {
        let err = Error::Statement(OracleError { code: 942, message: "table or view does not exist".into() });
        assert_eq!(err.to_string(), "ORA-00942: table or view does not exist");
    }
}
