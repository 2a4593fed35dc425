//! Array DML: many parameter rows, one statement execution.

use crate::attr;
use crate::conn::Connection;
use crate::desc::Descriptor;
use crate::err::{self, catch, Error};
use crate::handle::Handle;
use crate::oci::*;
use crate::ptr::Ptr;
use crate::stmt::Statement;
use crate::value::{ExecResult, Value};
use crate::Result;
use libc::c_void;
use std::ptr;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/bind-define-describe-functions.html#GUID-D28DF5A7-3C75-4E52-82F7-A5D6D5714E69
    fn OCIBindByPos2(
        stmtp:      *mut OCIStmt,
        bindpp:     *mut *mut OCIBind,
        errhp:      *mut OCIError,
        position:   u32,
        valuep:     *mut c_void,
        value_sz:   i64,
        dty:        u16,
        indp:       *mut c_void,
        alenp:      *mut u32,
        rcodep:     *mut u16,
        maxarr_len: u32,
        curelep:    *mut u32,
        mode:       u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/bind-define-describe-functions.html#GUID-77A20A50-E0A7-4161-8DB9-4A1AB49FF1FB
    fn OCIBindArrayOfStruct(
        bindp:      *mut OCIBind,
        errhp:      *mut OCIError,
        pvskip:     u32,
        indskip:    u32,
        alskip:     u32,
        rcskip:     u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/statement-functions.html#GUID-98B26708-3E02-45C0-8258-5D5544F32BE9
    fn OCIStmtExecute(
        svchp:      *mut OCISvcCtx,
        stmtp:      *mut OCIStmt,
        errhp:      *mut OCIError,
        iters:      u32,
        rowoff:     u32,
        snap_in:    *const c_void,
        snap_out:   *mut c_void,
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
}

/// Collects parameter rows for one DML statement and executes them in a
/// single round trip.
///
/// Execution stops at the first failing row: the returned
/// [`Error::Batch`] carries that row's offset and diagnostic together
/// with the number of rows that went through before it.
pub struct Batch<'s, 'c> {
    stmt: &'s Statement<'c>,
    rows: Vec<Vec<Value>>,
    width: Option<usize>,
}

#[derive(Clone, Copy, PartialEq)]
enum Kind {
    Int,
    Float,
    Bool,
    Text,
    Bytes,
    Timestamp,
}

impl Kind {
    fn of(value: &Value) -> Option<Kind> {
        match value {
            Value::Null => None,
            Value::Int(_) => Some(Kind::Int),
            Value::Float(_) => Some(Kind::Float),
            Value::Bool(_) => Some(Kind::Bool),
            Value::Text(_) | Value::IntervalYM(_) | Value::IntervalDS(_) | Value::RowId(_) => {
                Some(Kind::Text)
            }
            Value::Bytes(_) => Some(Kind::Bytes),
            Value::Timestamp(_) => Some(Kind::Timestamp),
        }
    }
}

/// The packed buffers of one placeholder across all rows. OCI reads the
/// value, indicator and length arrays element by element, so the vectors
/// must not move between bind and execute.
struct ColumnArray {
    sqlt: u16,
    elem: usize,
    data: Vec<u8>,
    inds: Vec<i16>,
    lens: Vec<u32>,
    descs: Vec<Descriptor<OCITimestampTZ>>,
    bind: Ptr<OCIBind>,
}

impl<'s, 'c> Batch<'s, 'c> {
    pub(crate) fn new(stmt: &'s Statement<'c>) -> Self {
        Self { stmt, rows: Vec::new(), width: None }
    }

    /// Adds one parameter row. Every row must have the same number of
    /// values as the first.
    pub fn add(&mut self, row: Vec<Value>) -> Result<()> {
        match self.width {
            None => self.width = Some(row.len()),
            Some(width) if width != row.len() => {
                return Err(Error::interface(format!(
                    "batch row {} has {} values, expected {}",
                    self.rows.len(),
                    row.len(),
                    width
                )))
            }
            Some(_) => {}
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Executes the statement once for every collected row and drains the
    /// batch. Outside an explicit transaction a fully successful batch is
    /// committed.
    pub fn execute(&mut self) -> Result<ExecResult> {
        let rows = std::mem::take(&mut self.rows);
        self.width = None;
        if rows.is_empty() {
            return Ok(ExecResult { rows_affected: 0, row_id: None });
        }
        let conn = self.stmt.connection();
        let stmt = self.stmt.stmt_ptr()?;
        let err = conn.err_ptr();
        let width = rows[0].len();
        let mut columns = Vec::with_capacity(width);
        for pos in 0..width {
            columns.push(ColumnArray::pack(&rows, pos, conn)?);
        }
        for (i, col) in columns.iter_mut().enumerate() {
            col.bind(stmt, err, i as u32 + 1)?;
        }
        let commit = if conn.in_transaction() { 0 } else { OCI_COMMIT_ON_SUCCESS };
        let res = unsafe {
            OCIStmtExecute(
                conn.svc_ptr()?, stmt, err,
                rows.len() as u32, 0,
                ptr::null(), ptr::null_mut(),
                OCI_BATCH_ERRORS | commit,
            )
        };
        let affected = self.stmt.rows_affected()?;
        match res {
            OCI_SUCCESS => {
                Ok(ExecResult { rows_affected: affected, row_id: self.stmt.last_row_id() })
            }
            OCI_SUCCESS_WITH_INFO | OCI_ERROR | OCI_INVALID_HANDLE => {
                let failed: u32 =
                    attr::get(OCI_ATTR_NUM_DML_ERRORS, OCI_HTYPE_STMT, stmt as *const c_void, err)?;
                if failed == 0 {
                    if res == OCI_SUCCESS_WITH_INFO {
                        return Ok(ExecResult {
                            rows_affected: affected,
                            row_id: self.stmt.last_row_id(),
                        });
                    }
                    return Err(Error::oci(err, res));
                }
                Err(self.first_row_error(affected)?)
            }
            other => Err(Error::oci(err, other)),
        }
    }

    /// Reads the diagnostic of the first failed row from the error
    /// handle's per-row records.
    fn first_row_error(&self, affected: u64) -> Result<Error> {
        let conn = self.stmt.connection();
        let err = conn.err_ptr();
        let aux = Handle::<OCIError>::new(conn.env_ptr())?;
        let row_err = Handle::<OCIError>::new(conn.env_ptr())?;
        let mut row_err_ptr = row_err.get() as *mut c_void;
        catch! {aux.get() =>
            OCIParamGet(err as *const c_void, OCI_HTYPE_ERROR, aux.get(), &mut row_err_ptr, 0)
        }
        let offset: u32 =
            attr::get(OCI_ATTR_DML_ROW_OFFSET, OCI_HTYPE_ERROR, row_err_ptr as *const c_void, aux.get())?;
        let diag = err::read_diagnostic(OCI_ERROR, row_err_ptr, OCI_HTYPE_ERROR);
        Ok(Error::Batch { offset, error: diag, affected })
    }
}

impl ColumnArray {
    /// Packs column `pos` of every row into one striped buffer. The
    /// external type comes from the first non-NULL value; later rows must
    /// match it or be NULL.
    fn pack(rows: &[Vec<Value>], pos: usize, conn: &Connection) -> Result<Self> {
        let kind = rows.iter().find_map(|row| Kind::of(&row[pos]));
        let kind = match kind {
            Some(kind) => kind,
            // a column of nothing but NULLs
            None => {
                return Ok(Self {
                    sqlt: SQLT_AFC,
                    elem: 1,
                    data: vec![0u8; rows.len()],
                    inds: vec![OCI_IND_NULL; rows.len()],
                    lens: vec![0; rows.len()],
                    descs: Vec::new(),
                    bind: Ptr::null(),
                })
            }
        };
        for (i, row) in rows.iter().enumerate() {
            if let Some(found) = Kind::of(&row[pos]) {
                if found != kind {
                    return Err(Error::Conversion(format!(
                        "batch row {} column {} does not match the column's first value",
                        i,
                        pos + 1
                    )));
                }
            }
        }
        match kind {
            Kind::Int => Self::pack_fixed(rows, pos, SQLT_INT, |v| match v {
                Value::Int(n) => n.to_le_bytes(),
                _ => [0; 8],
            }),
            Kind::Float => Self::pack_fixed(rows, pos, SQLT_BDOUBLE, |v| match v {
                Value::Float(x) => x.to_le_bytes(),
                _ => [0; 8],
            }),
            Kind::Bool => Self::pack_bools(rows, pos),
            Kind::Text => Self::pack_variable(rows, pos, SQLT_AFC, |v| match v {
                Value::Text(s) => s.clone().into_bytes(),
                other => other.to_string().into_bytes(),
            }),
            Kind::Bytes => Self::pack_variable(rows, pos, SQLT_BIN, |v| match v {
                Value::Bytes(b) => b.clone(),
                _ => Vec::new(),
            }),
            Kind::Timestamp => Self::pack_timestamps(rows, pos, conn),
        }
    }

    fn pack_fixed(
        rows: &[Vec<Value>],
        pos: usize,
        sqlt: u16,
        encode: impl Fn(&Value) -> [u8; 8],
    ) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * 8);
        let mut inds = Vec::with_capacity(rows.len());
        let mut lens = Vec::with_capacity(rows.len());
        for row in rows {
            let value = &row[pos];
            data.extend_from_slice(&encode(value));
            inds.push(if value.is_null() { OCI_IND_NULL } else { OCI_IND_NOTNULL });
            lens.push(8);
        }
        Ok(Self { sqlt, elem: 8, data, inds, lens, descs: Vec::new(), bind: Ptr::null() })
    }

    fn pack_bools(rows: &[Vec<Value>], pos: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len());
        let mut inds = Vec::with_capacity(rows.len());
        let mut lens = Vec::with_capacity(rows.len());
        for row in rows {
            match &row[pos] {
                Value::Bool(b) => {
                    data.push(*b as u8);
                    inds.push(OCI_IND_NOTNULL);
                    lens.push(1);
                }
                _ => {
                    data.push(0);
                    inds.push(OCI_IND_NULL);
                    lens.push(0);
                }
            }
        }
        Ok(Self { sqlt: SQLT_INT, elem: 1, data, inds, lens, descs: Vec::new(), bind: Ptr::null() })
    }

    fn pack_variable(
        rows: &[Vec<Value>],
        pos: usize,
        sqlt: u16,
        encode: impl Fn(&Value) -> Vec<u8>,
    ) -> Result<Self> {
        let encoded: Vec<Vec<u8>> = rows
            .iter()
            .map(|row| if row[pos].is_null() { Vec::new() } else { encode(&row[pos]) })
            .collect();
        let elem = encoded.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let mut data = vec![0u8; rows.len() * elem];
        let mut inds = Vec::with_capacity(rows.len());
        let mut lens = Vec::with_capacity(rows.len());
        for (i, bytes) in encoded.iter().enumerate() {
            // an empty string or raw is a SQL NULL, same as a scalar bind
            if bytes.is_empty() {
                inds.push(OCI_IND_NULL);
                lens.push(0);
            } else {
                data[i * elem..i * elem + bytes.len()].copy_from_slice(bytes);
                inds.push(OCI_IND_NOTNULL);
                lens.push(bytes.len() as u32);
            }
        }
        Ok(Self { sqlt, elem, data, inds, lens, descs: Vec::new(), bind: Ptr::null() })
    }

    fn pack_timestamps(rows: &[Vec<Value>], pos: usize, conn: &Connection) -> Result<Self> {
        let elem = std::mem::size_of::<*mut OCIDateTime>();
        let mut data = Vec::with_capacity(rows.len() * elem);
        let mut inds = Vec::with_capacity(rows.len());
        let mut lens = Vec::with_capacity(rows.len());
        let mut descs = Vec::with_capacity(rows.len());
        for row in rows {
            // every slot carries a live descriptor; NULL rows keep an
            // unset one so OCI still sees a valid address
            let (desc, ind) = match &row[pos] {
                Value::Timestamp(zoned) => {
                    (zoned.to_descriptor(conn.env_ptr(), conn.err_ptr())?, OCI_IND_NOTNULL)
                }
                _ => (Descriptor::<OCITimestampTZ>::new(conn.env_ptr())?, OCI_IND_NULL),
            };
            data.extend_from_slice(&(desc.get() as usize).to_ne_bytes());
            inds.push(ind);
            lens.push(elem as u32);
            descs.push(desc);
        }
        Ok(Self { sqlt: SQLT_TIMESTAMP_TZ, elem, data, inds, lens, descs, bind: Ptr::null() })
    }

    fn bind(&mut self, stmt: *mut OCIStmt, err: *mut OCIError, pos: u32) -> Result<()> {
        catch! {err =>
            OCIBindByPos2(
                stmt, self.bind.as_mut_ptr(), err, pos,
                self.data.as_ptr() as *mut c_void, self.elem as i64, self.sqlt,
                self.inds.as_mut_ptr() as *mut c_void, self.lens.as_mut_ptr(),
                ptr::null_mut(), 0, ptr::null_mut(), OCI_DEFAULT
            )
        }
        catch! {err =>
            OCIBindArrayOfStruct(
                self.bind.get(), err,
                self.elem as u32,
                std::mem::size_of::<i16>() as u32,
                std::mem::size_of::<u32>() as u32,
                0
            )
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[&[Value]]) -> Vec<Vec<Value>> {
        values.iter().map(|row| row.to_vec()).collect()
    }

    #[test]
    fn text_columns_stride_by_longest_value() {
        let rows = rows(&[
            &[Value::Text("a".into())],
            &[Value::Null],
            &[Value::Text("abcde".into())],
        ]);
        let kind = rows.iter().find_map(|row| Kind::of(&row[0])).unwrap();
        assert!(kind == Kind::Text);
        let col = ColumnArray::pack_variable(&rows, 0, SQLT_AFC, |v| match v {
            Value::Text(s) => s.clone().into_bytes(),
            _ => Vec::new(),
        })
        .unwrap();
        assert_eq!(col.elem, 5);
        assert_eq!(col.data.len(), 15);
        assert_eq!(col.inds, vec![OCI_IND_NOTNULL, OCI_IND_NULL, OCI_IND_NOTNULL]);
        assert_eq!(col.lens, vec![1, 0, 5]);
        assert_eq!(&col.data[..5], b"a\0\0\0\0");
        assert_eq!(&col.data[10..], b"abcde");
    }

    #[test]
    fn integer_columns_are_fixed_stride() {
        let rows = rows(&[&[Value::Int(1)], &[Value::Int(-1)], &[Value::Null]]);
        let col = ColumnArray::pack_fixed(&rows, 0, SQLT_INT, |v| match v {
            Value::Int(n) => n.to_le_bytes(),
            _ => [0; 8],
        })
        .unwrap();
        assert_eq!(col.elem, 8);
        assert_eq!(col.data.len(), 24);
        assert_eq!(col.inds[2], OCI_IND_NULL);
    }

    #[test]
    fn all_null_column_still_binds() {
        let rows = rows(&[&[Value::Null], &[Value::Null]]);
        assert!(rows.iter().all(|row| Kind::of(&row[0]).is_none()));
    }

    #[test]
    fn interval_values_ride_the_text_column() {
        assert!(Kind::of(&Value::IntervalYM(30)) == Some(Kind::Text));
        assert!(Kind::of(&Value::RowId("AAA".into())) == Some(Kind::Text));
    }
}
