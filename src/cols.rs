//! Result-set columns: describe, output buffer selection, define and
//! decode.

use crate::attr;
use crate::conn::Connection;
use crate::desc::Descriptor;
use crate::err::{catch, Error};
use crate::lob;
use crate::oci::*;
use crate::ptr::Ptr;
use crate::stmt::Statement;
use crate::value::{self, Value, Zoned};
use crate::Result;
use chrono::{NaiveDate, NaiveDateTime};
use libc::c_void;
use std::ptr;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/bind-define-describe-functions.html#GUID-1ED19CB6-B2E1-4C9A-BBAE-8D2D236E6F0A
    fn OCIDefineByPos2(
        stmtp:      *mut OCIStmt,
        defnpp:     *mut *mut OCIDefine,
        errhp:      *mut OCIError,
        position:   u32,
        valuep:     *mut c_void,
        value_sz:   i64,
        dty:        u16,
        indp:       *mut c_void,
        rlenp:      *mut u32,
        rcodep:     *mut u16,
        mode:       u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/handle-and-descriptor-functions.html#GUID-35D2FF91-139B-4A5C-97C8-8BC29866CCA4
    fn OCIParamGet(
        hndlp:      *const c_void,
        htype:      u32,
        errhp:      *mut OCIError,
        parmdpp:    *mut *mut c_void,
        pos:        u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/miscellaneous-functions.html#GUID-064F2680-453A-40D1-9C36-518F1E2B31DF
    fn OCIRowidToChar(
        desc:       *mut OCIRowid,
        text:       *mut u8,
        size:       *mut u16,
        err:        *mut OCIError,
    ) -> i32;
}

/// Character output buffers are sized at four times the reported column
/// size: the describe reports bytes in the column's charset, while the
/// client charset (usually AL32UTF8) may need up to four per character.
const CHAR_EXPANSION: u32 = 4;

enum ColDesc {
    None,
    Clob(Descriptor<OCICLobLocator>),
    Blob(Descriptor<OCIBLobLocator>),
    Ts(Descriptor<OCITimestamp>),
    TsTz(Descriptor<OCITimestampTZ>),
    TsLtz(Descriptor<OCITimestampLTZ>),
    IntYm(Descriptor<OCIIntervalYearToMonth>),
    IntDs(Descriptor<OCIIntervalDayToSecond>),
    Rowid(Descriptor<OCIRowid>),
}

/// One defined output column. The buffer, indicator and returned-length
/// slots are written by OCI on every fetch, so a `Column` must not move
/// between define and the last fetch; the defines are built only after
/// the whole column vector is in place.
pub(crate) struct Column {
    name: String,
    sqlt: u16,
    buf: Vec<u8>,
    desc: ColDesc,
    ind: i16,
    rlen: u32,
    def: Ptr<OCIDefine>,
}

/// Reads the result-set shape and builds + defines the output columns.
pub(crate) fn describe_and_define(stmt: &Statement) -> Result<Vec<Column>> {
    let conn = stmt.connection();
    let err = conn.err_ptr();
    let stmt_ptr = stmt.stmt_ptr()?;
    let count: u32 = attr::get(OCI_ATTR_PARAM_COUNT, OCI_HTYPE_STMT, stmt_ptr as *const c_void, err)?;
    let mut cols = Vec::with_capacity(count as usize);
    for pos in 1..=count {
        let param = param_at(stmt_ptr, err, pos)?;
        let obj = param.get() as *const c_void;
        let col_type: u16 = attr::get(OCI_ATTR_DATA_TYPE, OCI_DTYPE_PARAM, obj, err)?;
        let size: u16 = attr::get(OCI_ATTR_DATA_SIZE, OCI_DTYPE_PARAM, obj, err)?;
        let name: &str = attr::get(OCI_ATTR_NAME, OCI_DTYPE_PARAM, obj, err)?;
        let precision: i16 = attr::get(OCI_ATTR_PRECISION, OCI_DTYPE_PARAM, obj, err)?;
        let scale: i8 = attr::get(OCI_ATTR_SCALE, OCI_DTYPE_PARAM, obj, err)?;
        let name = name.to_string();
        cols.push(Column::build(conn, name, col_type, size as u32, precision, scale)?);
    }
    // all columns exist now; their buffers will not move again
    for (i, col) in cols.iter_mut().enumerate() {
        col.define(stmt_ptr, err, i as u32 + 1)?;
    }
    Ok(cols)
}

fn param_at(stmt: *mut OCIStmt, err: *mut OCIError, pos: u32) -> Result<Descriptor<OCIParam>> {
    let mut parm = ptr::null_mut::<c_void>();
    catch! {err =>
        OCIParamGet(stmt as *const c_void, OCI_HTYPE_STMT, err, &mut parm, pos)
    }
    Ok(Descriptor::from_ptr(parm as *mut OCIParam))
}

impl Column {
    fn build(conn: &Connection, name: String, col_type: u16, size: u32, precision: i16, scale: i8) -> Result<Self> {
        let env = conn.env_ptr();
        let (sqlt, buf, desc) = match col_type {
            SQLT_CHR | SQLT_AFC | SQLT_VCS => {
                (SQLT_CHR, vec![0u8; (size.max(1) * CHAR_EXPANSION) as usize], ColDesc::None)
            }
            SQLT_NUM if number_is_float(precision, scale) => (SQLT_BDOUBLE, vec![0u8; 8], ColDesc::None),
            SQLT_NUM | SQLT_INT => (SQLT_INT, vec![0u8; 8], ColDesc::None),
            SQLT_FLT | SQLT_BFLOAT | SQLT_BDOUBLE | SQLT_IBFLOAT | SQLT_IBDOUBLE => {
                (SQLT_BDOUBLE, vec![0u8; 8], ColDesc::None)
            }
            SQLT_LNG => (SQLT_CHR, vec![0u8; conn.max_long() as usize], ColDesc::None),
            SQLT_BIN => (SQLT_BIN, vec![0u8; size.max(1) as usize], ColDesc::None),
            SQLT_LBI => (SQLT_BIN, vec![0u8; conn.max_long() as usize], ColDesc::None),
            SQLT_DAT => (SQLT_DAT, vec![0u8; 7], ColDesc::None),
            SQLT_CLOB => (SQLT_CLOB, Vec::new(), ColDesc::Clob(Descriptor::new(env)?)),
            SQLT_BLOB => (SQLT_BLOB, Vec::new(), ColDesc::Blob(Descriptor::new(env)?)),
            SQLT_RDD => (SQLT_RDD, Vec::new(), ColDesc::Rowid(Descriptor::new(env)?)),
            SQLT_TIMESTAMP => (SQLT_TIMESTAMP, Vec::new(), ColDesc::Ts(Descriptor::new(env)?)),
            SQLT_TIMESTAMP_TZ => (SQLT_TIMESTAMP_TZ, Vec::new(), ColDesc::TsTz(Descriptor::new(env)?)),
            SQLT_TIMESTAMP_LTZ => (SQLT_TIMESTAMP_LTZ, Vec::new(), ColDesc::TsLtz(Descriptor::new(env)?)),
            SQLT_INTERVAL_YM => (SQLT_INTERVAL_YM, Vec::new(), ColDesc::IntYm(Descriptor::new(env)?)),
            SQLT_INTERVAL_DS => (SQLT_INTERVAL_DS, Vec::new(), ColDesc::IntDs(Descriptor::new(env)?)),
            other => {
                return Err(Error::Conversion(format!(
                    "column {} has unsupported type {}",
                    name, other
                )))
            }
        };
        Ok(Self { name, sqlt, buf, desc, ind: OCI_IND_NULL, rlen: 0, def: Ptr::null() })
    }

    fn define(&mut self, stmt: *mut OCIStmt, err: *mut OCIError, pos: u32) -> Result<()> {
        let (valuep, value_sz) = match &self.desc {
            ColDesc::None => (self.buf.as_mut_ptr() as *mut c_void, self.buf.len() as i64),
            ColDesc::Clob(d) => (d.as_mut_ptr() as *mut c_void, locator_size()),
            ColDesc::Blob(d) => (d.as_mut_ptr() as *mut c_void, locator_size()),
            ColDesc::Ts(d) => (d.as_mut_ptr() as *mut c_void, locator_size()),
            ColDesc::TsTz(d) => (d.as_mut_ptr() as *mut c_void, locator_size()),
            ColDesc::TsLtz(d) => (d.as_mut_ptr() as *mut c_void, locator_size()),
            ColDesc::IntYm(d) => (d.as_mut_ptr() as *mut c_void, locator_size()),
            ColDesc::IntDs(d) => (d.as_mut_ptr() as *mut c_void, locator_size()),
            ColDesc::Rowid(d) => (d.as_mut_ptr() as *mut c_void, locator_size()),
        };
        catch! {err =>
            OCIDefineByPos2(
                stmt, self.def.as_mut_ptr(), err, pos,
                valuep, value_sz, self.sqlt,
                &mut self.ind as *mut i16 as *mut c_void, &mut self.rlen,
                ptr::null_mut(), OCI_DEFAULT
            )
        }
        Ok(())
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Decodes the value fetched into this column's slot. A truncation
    /// indicator (> 0) still yields the buffered value.
    pub(crate) fn decode(&self, conn: &Connection) -> Result<Value> {
        if self.ind == OCI_IND_NULL {
            return Ok(Value::Null);
        }
        let env = conn.env_ptr();
        let err = conn.err_ptr();
        let len = self.rlen as usize;
        let value = match &self.desc {
            ColDesc::None => match self.sqlt {
                SQLT_INT => {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(&self.buf[..8]);
                    Value::Int(i64::from_le_bytes(bytes))
                }
                SQLT_BDOUBLE => {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(&self.buf[..8]);
                    Value::Float(f64::from_le_bytes(bytes))
                }
                SQLT_CHR => Value::Text(String::from_utf8_lossy(&self.buf[..len]).into_owned()),
                SQLT_BIN => Value::Bytes(self.buf[..len].to_vec()),
                SQLT_DAT => {
                    let naive = decode_oracle_date(&self.buf[..7])?;
                    Value::Timestamp(Zoned::from_naive(naive, conn.zone()))
                }
                other => {
                    return Err(Error::Conversion(format!(
                        "column {} was defined with unexpected type {}",
                        self.name, other
                    )))
                }
            },
            ColDesc::Ts(d) => {
                let naive = value::naive_from_descriptor(d.get(), env, err)?;
                Value::Timestamp(Zoned::from_naive(naive, conn.zone()))
            }
            ColDesc::TsTz(d) => Value::Timestamp(Zoned::from_descriptor(d.get(), env, err)?),
            ColDesc::TsLtz(d) => Value::Timestamp(Zoned::from_descriptor(d.get(), env, err)?),
            ColDesc::IntYm(d) => Value::IntervalYM(value::interval_ym_months(d.get(), env, err)?),
            ColDesc::IntDs(d) => Value::IntervalDS(value::interval_ds_nanos(d.get(), env, err)?),
            ColDesc::Rowid(d) => Value::RowId(rowid_text(d, err)?),
            ColDesc::Clob(d) => {
                let bytes = lob::read_to_end(conn, d.get(), SQLCS_IMPLICIT)?;
                Value::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            ColDesc::Blob(d) => Value::Bytes(lob::read_to_end(conn, d.get(), 0)?),
        };
        Ok(value)
    }
}

fn locator_size() -> i64 {
    std::mem::size_of::<*mut c_void>() as i64
}

fn rowid_text(desc: &Descriptor<OCIRowid>, err: *mut OCIError) -> Result<String> {
    let mut text = [0u8; 40];
    let mut len = text.len() as u16;
    catch! {err =>
        OCIRowidToChar(desc.get(), text.as_mut_ptr(), &mut len, err)
    }
    Ok(String::from_utf8_lossy(&text[..len as usize]).into_owned())
}

/// Whether a NUMBER column must be read as a double. FLOAT columns
/// report binary precision with a scale of -127; NUMBER columns with a
/// nonzero scale carry fraction digits. Everything else fits the
/// integer path.
pub(crate) fn number_is_float(precision: i16, scale: i8) -> bool {
    (precision != 0 && scale == -127) || scale != 0
}

/// The 7-byte internal DATE format: excess-100 century and year,
/// calendar month and day, excess-1 hour, minute and second. A zero
/// time byte cannot come from a well-formed DATE, so it is rejected
/// along with out-of-range calendar fields.
fn decode_oracle_date(b: &[u8]) -> Result<NaiveDateTime> {
    let year = (b[0] as i32 - 100) * 100 + (b[1] as i32 - 100);
    let date = NaiveDate::from_ymd_opt(year, b[2] as u32, b[3] as u32);
    let hour = (b[4] as u32).checked_sub(1);
    let minute = (b[5] as u32).checked_sub(1);
    let second = (b[6] as u32).checked_sub(1);
    match (date, hour, minute, second) {
        (Some(date), Some(hour), Some(minute), Some(second)) => {
            date.and_hms_opt(hour, minute, second)
        }
        _ => None,
    }
    .ok_or_else(|| {
        Error::Conversion(format!(
            "{:02X?} is not a valid internal DATE",
            &b[..7]
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_column_kinds() {
        // NUMBER(10)
        assert!(!number_is_float(10, 0));
        // NUMBER(10,2)
        assert!(number_is_float(10, 2));
        // FLOAT(126)
        assert!(number_is_float(126, -127));
        // plain NUMBER
        assert!(number_is_float(0, -127));
        // NUMBER(5,-2) rounds to hundreds but still carries a scale
        assert!(number_is_float(5, -2));
    }

    #[test]
    fn internal_date_layout() {
        // 2024-03-15 13:45:30
        let b = [120u8, 124, 3, 15, 14, 46, 31];
        let naive = decode_oracle_date(&b).unwrap();
        assert_eq!(
            naive,
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(13, 45, 30).unwrap()
        );
    }

    #[test]
    fn invalid_internal_date_is_conversion_error() {
        // month 13
        let b = [120u8, 124, 13, 15, 14, 46, 31];
        assert!(matches!(decode_oracle_date(&b), Err(Error::Conversion(_))));
        // zero time bytes cannot be excess-1 encoded
        for i in 4..7 {
            let mut b = [120u8, 124, 3, 15, 14, 46, 31];
            b[i] = 0;
            assert!(matches!(decode_oracle_date(&b), Err(Error::Conversion(_))));
        }
    }
}
