//! Forward-only result cursor.

use crate::err::{self, Error};
use crate::oci::*;
use crate::stmt::Statement;
use crate::value::Value;
use crate::Result;
use libc::c_void;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/statement-functions.html#GUID-DF585B90-58BA-45FC-B7CE-6F7F987C03B9
    fn OCIStmtFetch2(
        stmtp:      *mut OCIStmt,
        errhp:      *mut OCIError,
        nrows:      u32,
        orientation: u16,
        fetch_offset: i32,
        mode:       u32,
    ) -> i32;
}

enum Holder<'a> {
    Borrowed(&'a Statement<'a>),
    Owned(Statement<'a>),
}

impl<'a> Holder<'a> {
    fn stmt(&self) -> &Statement<'a> {
        match self {
            Holder::Borrowed(stmt) => stmt,
            Holder::Owned(stmt) => stmt,
        }
    }
}

/// The rows of an executed query, fetched one at a time.
///
/// A cursor from [`Statement::query`] borrows its statement, which stays
/// prepared for later queries; a cursor from [`Connection::query`]
/// (crate::Connection::query) owns the statement and releases it when the
/// cursor is closed or dropped.
pub struct Rows<'a> {
    holder: Holder<'a>,
    done: bool,
}

impl<'a> Rows<'a> {
    pub(crate) fn borrowing(stmt: &'a Statement<'a>) -> Self {
        Self { holder: Holder::Borrowed(stmt), done: false }
    }

    pub(crate) fn owning(stmt: Statement<'a>, params: &[Value]) -> Result<Self> {
        stmt.run_query(params)?;
        Ok(Self { holder: Holder::Owned(stmt), done: false })
    }

    /// Fetches the next row, or `None` past the last one. A server-side
    /// truncation still yields the row with the truncated value.
    pub fn next(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        let stmt = self.holder.stmt();
        let conn = stmt.connection();
        let err = conn.err_ptr();
        let res = unsafe {
            OCIStmtFetch2(stmt.stmt_ptr()?, err, 1, OCI_FETCH_NEXT, 0, OCI_DEFAULT)
        };
        match res {
            OCI_NO_DATA => {
                self.done = true;
                Ok(None)
            }
            OCI_SUCCESS | OCI_SUCCESS_WITH_INFO => {
                if res == OCI_SUCCESS_WITH_INFO {
                    let diag = err::read_diagnostic(res, err as *mut c_void, OCI_HTYPE_ERROR);
                    log::warn!("fetch returned with info: {}", diag);
                }
                let cols = stmt.columns();
                let mut values = Vec::with_capacity(cols.len());
                for col in cols {
                    values.push(col.decode(conn)?);
                }
                Ok(Some(Row { values }))
            }
            _ => {
                self.done = true;
                Err(Error::oci(err, res))
            }
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.holder.stmt().columns().iter().map(|col| col.name()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.holder.stmt().columns().len()
    }

    /// Stops fetching. An owned statement is released here rather than
    /// at drop, so the caller sees a release failure.
    pub fn close(mut self) -> Result<()> {
        self.done = true;
        match &self.holder {
            Holder::Borrowed(_) => Ok(()),
            Holder::Owned(stmt) => stmt.close(),
        }
    }
}

/// One fetched row with its values in column order.
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Moves the value out, leaving `Null` in its place.
    pub fn take(&mut self, index: usize) -> Value {
        match self.values.get_mut(index) {
            Some(value) => std::mem::replace(value, Value::Null),
            None => Value::Null,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_leaves_null_behind() {
        let mut row = Row { values: vec![Value::Int(42), Value::Text("x".into())] };
        assert_eq!(row.take(0), Value::Int(42));
        assert_eq!(row.take(0), Value::Null);
        assert_eq!(row.take(9), Value::Null);
        assert_eq!(row.len(), 2);
    }
}
