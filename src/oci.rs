//! Opaque OCI handle and descriptor types and the constants shared
//! across the crate. OCI functions are declared next to the modules
//! that call them.

macro_rules! opaque {
    ($($name:ident),+) => {
        $(
            #[repr(C)]
            pub struct $name { _private: [u8; 0] }
        )+
    };
}

opaque! {
    OCIEnv, OCIError, OCIServer, OCISvcCtx, OCISession, OCITrans,
    OCIStmt, OCIBind, OCIDefine, OCIParam,
    OCIRowid, OCIDateTime, OCIInterval, OCILobLocator
}

// Typed descriptor markers. Each dereferences to one of the opaque OCI
// types above; the marker selects the descriptor type code.
opaque! {
    OCICLobLocator, OCIBLobLocator,
    OCITimestamp, OCITimestampTZ, OCITimestampLTZ,
    OCIIntervalYearToMonth, OCIIntervalDayToSecond
}

pub const OCI_DEFAULT              : u32 = 0;

pub const OCI_SUCCESS              : i32 = 0;
pub const OCI_SUCCESS_WITH_INFO    : i32 = 1;
pub const OCI_NEED_DATA            : i32 = 99;
pub const OCI_NO_DATA              : i32 = 100;
pub const OCI_ERROR                : i32 = -1;
pub const OCI_INVALID_HANDLE       : i32 = -2;

pub const OCI_HTYPE_ENV            : u32 = 1;
pub const OCI_HTYPE_ERROR          : u32 = 2;
pub const OCI_HTYPE_SVCCTX         : u32 = 3;
pub const OCI_HTYPE_STMT           : u32 = 4;
pub const OCI_HTYPE_SERVER         : u32 = 8;
pub const OCI_HTYPE_SESSION        : u32 = 9;
pub const OCI_HTYPE_TRANS          : u32 = 10;

pub const OCI_DTYPE_LOB            : u32 = 50;
pub const OCI_DTYPE_PARAM          : u32 = 53;
pub const OCI_DTYPE_ROWID          : u32 = 54;
pub const OCI_DTYPE_INTERVAL_YM    : u32 = 62;
pub const OCI_DTYPE_INTERVAL_DS    : u32 = 63;
pub const OCI_DTYPE_TIMESTAMP      : u32 = 68;
pub const OCI_DTYPE_TIMESTAMP_TZ   : u32 = 69;
pub const OCI_DTYPE_TIMESTAMP_LTZ  : u32 = 70;

// Environment creation modes
pub const OCI_THREADED             : u32 = 1;
pub const OCI_OBJECT               : u32 = 2;

// Fallback charset when nothing better can be negotiated
pub const AL32UTF8                 : u16 = 873;

// Credentials and session privileges
pub const OCI_CRED_RDBMS           : u32 = 1;
pub const OCI_CRED_EXT             : u32 = 2;
pub const OCI_SYSDBA               : u32 = 0x0002;
pub const OCI_SYSOPER              : u32 = 0x0004;
pub const OCI_SYSASM               : u32 = 0x8000;

// Statement preparation and execution
pub const OCI_NTV_SYNTAX           : u32 = 1;
pub const OCI_COMMIT_ON_SUCCESS    : u32 = 0x20;
pub const OCI_BATCH_ERRORS         : u32 = 0x80;

pub const OCI_FETCH_NEXT           : u16 = 2;

pub const OCI_STMT_SELECT          : u16 = 1;
pub const OCI_STMT_UPDATE          : u16 = 2;
pub const OCI_STMT_DELETE          : u16 = 3;
pub const OCI_STMT_INSERT          : u16 = 4;

// Transaction flags
pub const OCI_TRANS_NEW            : u32 = 0x0001;
pub const OCI_TRANS_READONLY       : u32 = 0x0100;
pub const OCI_TRANS_SERIALIZABLE   : u32 = 0x0400;

// Attributes
pub const OCI_ATTR_DATA_SIZE       : u32 = 1;
pub const OCI_ATTR_DATA_TYPE       : u32 = 2;
pub const OCI_ATTR_NAME            : u32 = 4;
pub const OCI_ATTR_PRECISION       : u32 = 5;
pub const OCI_ATTR_SCALE           : u32 = 6;
pub const OCI_ATTR_SERVER          : u32 = 6;
pub const OCI_ATTR_SESSION         : u32 = 7;
pub const OCI_ATTR_TRANS           : u32 = 8;
pub const OCI_ATTR_PREFETCH_ROWS   : u32 = 11;
pub const OCI_ATTR_PREFETCH_MEMORY : u32 = 13;
pub const OCI_ATTR_PARAM_COUNT     : u32 = 18;
pub const OCI_ATTR_ROWID           : u32 = 19;
pub const OCI_ATTR_USERNAME        : u32 = 22;
pub const OCI_ATTR_PASSWORD        : u32 = 23;
pub const OCI_ATTR_STMT_TYPE       : u32 = 24;
pub const OCI_ATTR_NUM_DML_ERRORS  : u32 = 73;
pub const OCI_ATTR_DML_ROW_OFFSET  : u32 = 74;
pub const OCI_ATTR_DRIVER_NAME     : u32 = 424;
pub const OCI_ATTR_UB8_ROW_COUNT   : u32 = 457;

// External data type codes
pub const SQLT_CHR                 : u16 = 1;
pub const SQLT_NUM                 : u16 = 2;
pub const SQLT_INT                 : u16 = 3;
pub const SQLT_FLT                 : u16 = 4;
pub const SQLT_LNG                 : u16 = 8;
pub const SQLT_VCS                 : u16 = 9;
pub const SQLT_DAT                 : u16 = 12;
pub const SQLT_BFLOAT              : u16 = 21;
pub const SQLT_BDOUBLE             : u16 = 22;
pub const SQLT_BIN                 : u16 = 23;
pub const SQLT_LBI                 : u16 = 24;
pub const SQLT_AFC                 : u16 = 96;
pub const SQLT_IBFLOAT             : u16 = 100;
pub const SQLT_IBDOUBLE            : u16 = 101;
pub const SQLT_RDD                 : u16 = 104;
pub const SQLT_CLOB                : u16 = 112;
pub const SQLT_BLOB                : u16 = 113;
pub const SQLT_TIMESTAMP           : u16 = 187;
pub const SQLT_TIMESTAMP_TZ        : u16 = 188;
pub const SQLT_INTERVAL_YM         : u16 = 189;
pub const SQLT_INTERVAL_DS         : u16 = 190;
pub const SQLT_TIMESTAMP_LTZ       : u16 = 232;

// Null indicators
pub const OCI_IND_NOTNULL          : i16 = 0;
pub const OCI_IND_NULL             : i16 = -1;

// LOB piece codes and charset form
pub const OCI_FIRST_PIECE          : u8 = 1;
pub const OCI_NEXT_PIECE           : u8 = 3;
pub const SQLCS_IMPLICIT           : u8 = 1;
