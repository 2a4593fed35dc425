//! Prepared statements: placeholder rewrite, execution, OUT copy-back and
//! the per-statement column defines.

use crate::attr;
use crate::bind::{self, Param};
use crate::cols::{self, Column};
use crate::conn::Connection;
use crate::desc::Descriptor;
use crate::err::{self, catch, Error};
use crate::oci::*;
use crate::ptr::Ptr;
use crate::rows::Rows;
use crate::value::{ExecResult, SqlArg, Value};
use crate::Result;
use libc::c_void;
use once_cell::unsync::OnceCell;
use std::ptr;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/statement-functions.html#GUID-E6C1DC67-D464-4D2A-9F19-737423D31779
    fn OCIStmtPrepare2(
        svchp:      *mut OCISvcCtx,
        stmtp:      *mut *mut OCIStmt,
        errhp:      *mut OCIError,
        stmttext:   *const u8,
        stmt_len:   u32,
        key:        *const u8,
        key_len:    u32,
        language:   u32,
        mode:       u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/statement-functions.html#GUID-256034CE-2ADB-4BE5-BC8D-748307F2EA8E
    fn OCIStmtRelease(
        stmtp:      *mut OCIStmt,
        errhp:      *mut OCIError,
        key:        *const u8,
        key_len:    u32,
        mode:       u32,
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

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/miscellaneous-functions.html#GUID-064F2680-453A-40D1-9C36-518F1E2B31DF
    fn OCIRowidToChar(
        desc:       *mut OCIRowid,
        text:       *mut u8,
        size:       *mut u16,
        err:        *mut OCIError,
    ) -> i32;
}

/// A prepared SQL statement, bound to the connection that prepared it.
///
/// A statement can be executed repeatedly; the column defines built for
/// the first query are reused by later ones. Dropping the statement (or
/// calling [`close`](Statement::close)) releases it back to OCI.
pub struct Statement<'c> {
    conn: &'c Connection,
    stmt: Ptr<OCIStmt>,
    stmt_type: u16,
    cols: OnceCell<Vec<Column>>,
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl<'c> Statement<'c> {
    pub(crate) fn new(conn: &'c Connection, sql: &str) -> Result<Self> {
        let svc = conn.svc_ptr()?;
        let err = conn.err_ptr();
        let sql = if conn.rewrites_placeholders() {
            number_placeholders(sql)
        } else {
            sql.to_string()
        };
        let stmt = Ptr::<OCIStmt>::null();
        catch! {err =>
            OCIStmtPrepare2(
                svc, stmt.as_mut_ptr(), err,
                sql.as_ptr(), sql.len() as u32,
                ptr::null(), 0, OCI_NTV_SYNTAX, OCI_DEFAULT
            )
        }
        // `this` owns the handle from here on; an early return releases it
        let mut this = Self { conn, stmt, stmt_type: 0, cols: OnceCell::new() };
        this.stmt_type = attr::get(OCI_ATTR_STMT_TYPE, OCI_HTYPE_STMT, this.stmt.get() as *const c_void, err)?;
        if this.stmt_type == OCI_STMT_SELECT {
            attr::set(OCI_ATTR_PREFETCH_ROWS, conn.prefetch_rows(), OCI_HTYPE_STMT, this.stmt.get() as *mut c_void, err)?;
            if conn.prefetch_memory() > 0 {
                attr::set(OCI_ATTR_PREFETCH_MEMORY, conn.prefetch_memory(), OCI_HTYPE_STMT, this.stmt.get() as *mut c_void, err)?;
            }
        }
        Ok(this)
    }

    /// Releases the statement handle. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        let stmt = self.stmt.swap(ptr::null_mut());
        if stmt.is_null() {
            return Ok(());
        }
        catch! {self.conn.err_ptr() =>
            OCIStmtRelease(stmt, self.conn.err_ptr(), ptr::null(), 0, OCI_DEFAULT)
        }
        Ok(())
    }

    /// Executes DML, DDL or PL/SQL with positional arguments. Outside an
    /// explicit transaction the change is committed on success.
    pub fn execute(&self, args: &mut [SqlArg]) -> Result<ExecResult> {
        let params = bind::bind_args(self.stmt_ptr()?, self.conn, args)?;
        let result = self.run_dml()?;
        bind::write_back(self.conn, args, &params)?;
        Ok(result)
    }

    /// Executes DML, DDL or PL/SQL with `:name` arguments.
    pub fn execute_named(&self, args: &mut [(&str, SqlArg<'_>)]) -> Result<ExecResult> {
        let params = bind::bind_named_args(self.stmt_ptr()?, self.conn, args)?;
        let result = self.run_dml()?;
        bind::write_back_named(self.conn, args, &params)?;
        Ok(result)
    }

    /// Runs a SELECT and returns a forward-only cursor borrowing this
    /// statement.
    pub fn query(&self, params: &[Value]) -> Result<Rows<'_>> {
        self.run_query(params)?;
        Ok(Rows::borrowing(self))
    }

    /// [`query`](Statement::query) with `:name` parameters.
    pub fn query_named(&self, params: &[(&str, Value)]) -> Result<Rows<'_>> {
        self.run_named_query(params)?;
        Ok(Rows::borrowing(self))
    }

    /// Starts collecting rows for an array-DML execution.
    pub fn batch(&self) -> crate::batch::Batch<'_, 'c> {
        crate::batch::Batch::new(self)
    }

    pub(crate) fn run_query(&self, params: &[Value]) -> Result<()> {
        let bound = bind::bind_values(self.stmt_ptr()?, self.conn, params)?;
        self.execute_internal(0, OCI_DEFAULT)?;
        drop(bound);
        self.define_columns()
    }

    pub(crate) fn run_named_query(&self, params: &[(&str, Value)]) -> Result<()> {
        let args: Vec<(&str, SqlArg)> = params
            .iter()
            .map(|(name, value)| (*name, SqlArg::In(value.clone())))
            .collect();
        let bound = bind::bind_named_args(self.stmt_ptr()?, self.conn, &args)?;
        self.execute_internal(0, OCI_DEFAULT)?;
        drop(bound);
        self.define_columns()
    }

    fn run_dml(&self) -> Result<ExecResult> {
        let iters = if self.stmt_type == OCI_STMT_SELECT { 0 } else { 1 };
        let mode = if self.conn.in_transaction() { OCI_DEFAULT } else { OCI_COMMIT_ON_SUCCESS };
        self.execute_internal(iters, mode)?;
        let rows_affected = self.rows_affected()?;
        let row_id = if rows_affected > 0 && self.is_row_addressable() {
            self.last_row_id()
        } else {
            None
        };
        Ok(ExecResult { rows_affected, row_id })
    }

    pub(crate) fn execute_internal(&self, iters: u32, mode: u32) -> Result<i32> {
        let svc = self.conn.svc_ptr()?;
        let err = self.conn.err_ptr();
        let res = unsafe {
            OCIStmtExecute(svc, self.stmt_ptr()?, err, iters, 0, ptr::null(), ptr::null_mut(), mode)
        };
        match res {
            OCI_SUCCESS => Ok(res),
            OCI_SUCCESS_WITH_INFO => {
                let diag = err::read_diagnostic(res, err as *mut c_void, OCI_HTYPE_ERROR);
                log::warn!("statement executed with info: {}", diag);
                Ok(res)
            }
            _ => Err(Error::oci(err, res)),
        }
    }

    pub(crate) fn rows_affected(&self) -> Result<u64> {
        attr::get(OCI_ATTR_UB8_ROW_COUNT, OCI_HTYPE_STMT, self.stmt.get() as *const c_void, self.conn.err_ptr())
    }

    fn is_row_addressable(&self) -> bool {
        matches!(self.stmt_type, OCI_STMT_INSERT | OCI_STMT_UPDATE | OCI_STMT_DELETE)
    }

    /// The address of the last row touched, as owned text. Statements
    /// that touch several rows, or servers that do not report a ROWID
    /// here, simply yield nothing.
    pub(crate) fn last_row_id(&self) -> Option<String> {
        let mut desc = Descriptor::<OCIRowid>::new(self.conn.env_ptr()).ok()?;
        attr::get_into(
            OCI_ATTR_ROWID,
            &mut desc,
            OCI_HTYPE_STMT,
            self.stmt.get() as *const c_void,
            self.conn.err_ptr(),
        )
        .ok()?;
        let mut text = [0u8; 40];
        let mut len = text.len() as u16;
        let res = unsafe {
            OCIRowidToChar(desc.get(), text.as_mut_ptr(), &mut len, self.conn.err_ptr())
        };
        if res == OCI_SUCCESS && len > 0 {
            Some(String::from_utf8_lossy(&text[..len as usize]).into_owned())
        } else {
            None
        }
    }

    fn define_columns(&self) -> Result<()> {
        if self.cols.get().is_some() {
            return Ok(());
        }
        let cols = cols::describe_and_define(self)?;
        // a concurrent set is impossible: Statement is not Sync
        let _ = self.cols.set(cols);
        Ok(())
    }

    pub(crate) fn columns(&self) -> &[Column] {
        self.cols.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn connection(&self) -> &'c Connection {
        self.conn
    }

    pub(crate) fn stmt_ptr(&self) -> Result<*mut OCIStmt> {
        let stmt = self.stmt.get();
        if stmt.is_null() {
            Err(Error::interface("statement is closed"))
        } else {
            Ok(stmt)
        }
    }
}

/// Rewrites `?` placeholders to `:p1`..`:pN`, leaving string literals,
/// quoted identifiers and comments alone.
pub(crate) fn number_placeholders(sql: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Normal,
        SingleQuote,
        DoubleQuote,
        LineComment,
        BlockComment,
    }
    let mut out = String::with_capacity(sql.len() + 16);
    let mut state = State::Normal;
    let mut n = 0;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                '?' => {
                    n += 1;
                    out.push_str(":p");
                    out.push_str(&n.to_string());
                    continue;
                }
                '\'' => state = State::SingleQuote,
                '"' => state = State::DoubleQuote,
                '-' if chars.peek() == Some(&'-') => state = State::LineComment,
                '/' if chars.peek() == Some(&'*') => state = State::BlockComment,
                _ => {}
            },
            State::SingleQuote => {
                if c == '\'' {
                    state = State::Normal;
                }
            }
            State::DoubleQuote => {
                if c == '"' {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    out.push(c);
                    out.push(chars.next().unwrap());
                    state = State::Normal;
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::number_placeholders;

    #[test]
    fn numbers_question_marks() {
        assert_eq!(
            number_placeholders("SELECT * FROM t WHERE a = ? AND b = ?"),
            "SELECT * FROM t WHERE a = :p1 AND b = :p2"
        );
    }

    #[test]
    fn leaves_literals_alone() {
        assert_eq!(
            number_placeholders("SELECT '?' FROM t WHERE a = ?"),
            "SELECT '?' FROM t WHERE a = :p1"
        );
        assert_eq!(
            number_placeholders(r#"SELECT "odd?name" FROM t WHERE a = ?"#),
            r#"SELECT "odd?name" FROM t WHERE a = :p1"#
        );
    }

    #[test]
    fn leaves_comments_alone() {
        assert_eq!(
            number_placeholders("SELECT 1 -- what?\nFROM t WHERE a = ?"),
            "SELECT 1 -- what?\nFROM t WHERE a = :p1"
        );
        assert_eq!(
            number_placeholders("SELECT /* eh? */ a FROM t WHERE a = ?"),
            "SELECT /* eh? */ a FROM t WHERE a = :p1"
        );
    }

    #[test]
    fn no_placeholders_is_identity() {
        let sql = "SELECT sysdate FROM dual";
        assert_eq!(number_placeholders(sql), sql);
    }
}
