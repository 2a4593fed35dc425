//! Bind-parameter marshaling: Rust values in, OCI buffers out, and back
//! again for OUT and IN-OUT placeholders.

use crate::conn::Connection;
use crate::desc::Descriptor;
use crate::err::{catch, Error};
use crate::oci::*;
use crate::ptr::Ptr;
use crate::value::{SqlArg, Value, Zoned};
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

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/bind-define-describe-functions.html#GUID-E5C95F30-AB90-45BF-8AF1-71F9C46CBFE5
    fn OCIBindByName2(
        stmtp:      *mut OCIStmt,
        bindpp:     *mut *mut OCIBind,
        errhp:      *mut OCIError,
        placeholder: *const u8,
        placeh_len: i32,
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
}

/// Smallest buffer given to an OUT text or raw placeholder; a larger
/// template value raises it.
const MIN_OUT_BUFFER: usize = 2048;

/// One marshaled placeholder. The buffers and the descriptor live here,
/// addressed directly by OCI, so a `Param` must stay put from bind to the
/// end of the execute call. Dropping it releases everything.
pub(crate) struct Param {
    sqlt: u16,
    data: Vec<u8>,
    desc: Option<Descriptor<OCITimestampTZ>>,
    ind: i16,
    len: u32,
    cap: i64,
    bind: Ptr<OCIBind>,
}

impl Param {
    fn null() -> Self {
        Self {
            sqlt: SQLT_AFC,
            data: vec![0u8],
            desc: None,
            ind: OCI_IND_NULL,
            len: 0,
            cap: 1,
            bind: Ptr::null(),
        }
    }

    fn scalar(sqlt: u16, data: Vec<u8>) -> Self {
        let len = data.len() as u32;
        let cap = data.len() as i64;
        Self { sqlt, data, desc: None, ind: OCI_IND_NOTNULL, len, cap, bind: Ptr::null() }
    }

    fn descriptor(desc: Descriptor<OCITimestampTZ>, ind: i16) -> Self {
        Self {
            sqlt: SQLT_TIMESTAMP_TZ,
            data: Vec::new(),
            desc: Some(desc),
            ind,
            len: std::mem::size_of::<*mut OCIDateTime>() as u32,
            cap: std::mem::size_of::<*mut OCIDateTime>() as i64,
            bind: Ptr::null(),
        }
    }

    fn out_buffer(sqlt: u16, cap: usize) -> Self {
        Self {
            sqlt,
            data: vec![0u8; cap],
            desc: None,
            ind: OCI_IND_NULL,
            len: cap as u32,
            cap: cap as i64,
            bind: Ptr::null(),
        }
    }

    fn value_ptr(&self) -> *mut c_void {
        match &self.desc {
            Some(desc) => desc.as_mut_ptr() as *mut c_void,
            None => self.data.as_ptr() as *mut c_void,
        }
    }
}

/// Marshals a plain input value per the codec table: empty text and empty
/// raw are SQL NULL, integers are 8-byte little-endian `SQLT_INT`, floats
/// go as native doubles, text as `SQLT_AFC` (padded-char semantics, no
/// trimming), timestamps as TIMESTAMP WITH TIME ZONE descriptors, and
/// intervals and rowids fall back to their text form.
fn marshal_in(value: &Value, conn: &Connection) -> Result<Param> {
    let param = match value {
        Value::Null => Param::null(),
        Value::Int(n) => Param::scalar(SQLT_INT, n.to_le_bytes().to_vec()),
        Value::Float(x) => Param::scalar(SQLT_BDOUBLE, x.to_le_bytes().to_vec()),
        Value::Bool(b) => Param::scalar(SQLT_INT, vec![*b as u8]),
        Value::Text(s) if s.is_empty() => Param::null(),
        Value::Text(s) => Param::scalar(SQLT_AFC, s.as_bytes().to_vec()),
        Value::Bytes(b) if b.is_empty() => Param::null(),
        Value::Bytes(b) => Param::scalar(SQLT_BIN, b.clone()),
        Value::Timestamp(zoned) => {
            let desc = zoned.to_descriptor(conn.env_ptr(), conn.err_ptr())?;
            Param::descriptor(desc, OCI_IND_NOTNULL)
        }
        Value::IntervalYM(_) | Value::IntervalDS(_) | Value::RowId(_) => {
            Param::scalar(SQLT_CHR, value.to_string().into_bytes())
        }
    };
    Ok(param)
}

/// Marshals an OUT or IN-OUT placeholder. The template value selects the
/// external type; an IN-OUT additionally ships its current contents.
fn marshal_out(template: &Value, in_out: bool, conn: &Connection) -> Result<Param> {
    let mut param = match template {
        Value::Null => {
            return Err(Error::Conversion(
                "an OUT placeholder needs a typed template, not NULL".into(),
            ))
        }
        Value::Int(_) | Value::Bool(_) => Param::out_buffer(SQLT_INT, 8),
        Value::Float(_) => Param::out_buffer(SQLT_BDOUBLE, 8),
        Value::Text(s) => Param::out_buffer(SQLT_CHR, MIN_OUT_BUFFER.max(s.len() * 4)),
        Value::Bytes(b) => Param::out_buffer(SQLT_BIN, MIN_OUT_BUFFER.max(b.len())),
        Value::RowId(_) => Param::out_buffer(SQLT_CHR, MIN_OUT_BUFFER),
        Value::Timestamp(zoned) => {
            let desc = if in_out {
                zoned.to_descriptor(conn.env_ptr(), conn.err_ptr())?
            } else {
                Descriptor::<OCITimestampTZ>::new(conn.env_ptr())?
            };
            Param::descriptor(desc, if in_out { OCI_IND_NOTNULL } else { OCI_IND_NULL })
        }
        Value::IntervalYM(_) | Value::IntervalDS(_) => {
            return Err(Error::Conversion(
                "intervals cannot be OUT placeholders; use a text placeholder".into(),
            ))
        }
    };
    if in_out {
        if let Some(filled) = marshal_in_out_contents(template)? {
            let len = filled.len();
            param.data[..len].copy_from_slice(&filled);
            param.len = len as u32;
            param.ind = OCI_IND_NOTNULL;
        }
    }
    Ok(param)
}

fn marshal_in_out_contents(template: &Value) -> Result<Option<Vec<u8>>> {
    let bytes = match template {
        Value::Int(n) => Some(n.to_le_bytes().to_vec()),
        Value::Bool(b) => Some((*b as i64).to_le_bytes().to_vec()),
        Value::Float(x) => Some(x.to_le_bytes().to_vec()),
        Value::Text(s) if !s.is_empty() => Some(s.as_bytes().to_vec()),
        Value::Bytes(b) if !b.is_empty() => Some(b.clone()),
        Value::RowId(s) => Some(s.as_bytes().to_vec()),
        _ => None,
    };
    Ok(bytes)
}

fn marshal_arg(arg: &SqlArg, conn: &Connection) -> Result<Param> {
    match arg {
        SqlArg::In(value) => marshal_in(value, conn),
        SqlArg::Out(template) => marshal_out(template, false, conn),
        SqlArg::InOut(template) => marshal_out(template, true, conn),
    }
}

fn bind_by_pos(stmt: *mut OCIStmt, err: *mut OCIError, pos: u32, param: &mut Param) -> Result<()> {
    catch! {err =>
        OCIBindByPos2(
            stmt, param.bind.as_mut_ptr(), err, pos,
            param.value_ptr(), param.cap, param.sqlt,
            &mut param.ind as *mut i16 as *mut c_void, &mut param.len,
            ptr::null_mut(), 0, ptr::null_mut(), OCI_DEFAULT
        )
    }
    Ok(())
}

fn bind_by_name(stmt: *mut OCIStmt, err: *mut OCIError, name: &str, param: &mut Param) -> Result<()> {
    catch! {err =>
        OCIBindByName2(
            stmt, param.bind.as_mut_ptr(), err, name.as_ptr(), name.len() as i32,
            param.value_ptr(), param.cap, param.sqlt,
            &mut param.ind as *mut i16 as *mut c_void, &mut param.len,
            ptr::null_mut(), 0, ptr::null_mut(), OCI_DEFAULT
        )
    }
    Ok(())
}

/// Marshals and binds positional arguments. Every `Param` is built before
/// the first bind call so the buffers never move afterwards; on a failed
/// bind the returned error drops the whole set, descriptors included.
pub(crate) fn bind_args(stmt: *mut OCIStmt, conn: &Connection, args: &[SqlArg]) -> Result<Vec<Param>> {
    let mut params = Vec::with_capacity(args.len());
    for arg in args {
        params.push(marshal_arg(arg, conn)?);
    }
    for (i, param) in params.iter_mut().enumerate() {
        bind_by_pos(stmt, conn.err_ptr(), i as u32 + 1, param)?;
    }
    Ok(params)
}

/// Same as [`bind_args`] for `:name` placeholders.
pub(crate) fn bind_named_args(
    stmt: *mut OCIStmt,
    conn: &Connection,
    args: &[(&str, SqlArg<'_>)],
) -> Result<Vec<Param>> {
    let mut params = Vec::with_capacity(args.len());
    for (_, arg) in args {
        params.push(marshal_arg(arg, conn)?);
    }
    for ((name, _), param) in args.iter().zip(params.iter_mut()) {
        let name = if let Some(stripped) = name.strip_prefix(':') { stripped } else { name };
        bind_by_name(stmt, conn.err_ptr(), name, param)?;
    }
    Ok(params)
}

/// Marshals and binds plain query parameters (inputs only).
pub(crate) fn bind_values(stmt: *mut OCIStmt, conn: &Connection, values: &[Value]) -> Result<Vec<Param>> {
    let mut params = Vec::with_capacity(values.len());
    for value in values {
        params.push(marshal_in(value, conn)?);
    }
    for (i, param) in params.iter_mut().enumerate() {
        bind_by_pos(stmt, conn.err_ptr(), i as u32 + 1, param)?;
    }
    Ok(params)
}

/// Copies OUT and IN-OUT results back into the caller's values, honoring
/// the null indicator.
pub(crate) fn write_back(conn: &Connection, args: &mut [SqlArg], params: &[Param]) -> Result<()> {
    for (arg, param) in args.iter_mut().zip(params.iter()) {
        let dest = match arg {
            SqlArg::In(_) => continue,
            SqlArg::Out(dest) | SqlArg::InOut(dest) => dest,
        };
        **dest = decode_param(param, &**dest, conn)?;
    }
    Ok(())
}

/// [`write_back`] for named arguments.
pub(crate) fn write_back_named(
    conn: &Connection,
    args: &mut [(&str, SqlArg<'_>)],
    params: &[Param],
) -> Result<()> {
    for ((_, arg), param) in args.iter_mut().zip(params.iter()) {
        let dest = match arg {
            SqlArg::In(_) => continue,
            SqlArg::Out(dest) | SqlArg::InOut(dest) => dest,
        };
        **dest = decode_param(param, &**dest, conn)?;
    }
    Ok(())
}

fn decode_param(param: &Param, template: &Value, conn: &Connection) -> Result<Value> {
    if param.ind == OCI_IND_NULL {
        return Ok(Value::Null);
    }
    let len = param.len as usize;
    let value = match param.sqlt {
        SQLT_INT => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&param.data[..8]);
            let n = i64::from_le_bytes(bytes);
            if matches!(template, Value::Bool(_)) {
                Value::Bool(n != 0)
            } else {
                Value::Int(n)
            }
        }
        SQLT_BDOUBLE => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&param.data[..8]);
            Value::Float(f64::from_le_bytes(bytes))
        }
        SQLT_CHR | SQLT_AFC => {
            let text = String::from_utf8_lossy(&param.data[..len]).into_owned();
            if matches!(template, Value::RowId(_)) {
                Value::RowId(text)
            } else {
                Value::Text(text)
            }
        }
        SQLT_BIN => Value::Bytes(param.data[..len].to_vec()),
        SQLT_TIMESTAMP_TZ => {
            let desc = param.desc.as_ref().ok_or_else(|| {
                Error::interface("timestamp placeholder lost its descriptor")
            })?;
            Value::Timestamp(Zoned::from_descriptor(desc.get(), conn.env_ptr(), conn.err_ptr())?)
        }
        other => {
            return Err(Error::Conversion(format!(
                "cannot copy back an OUT placeholder of external type {}",
                other
            )))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_empty_values_bind_as_null() {
        for value in [Value::Null, Value::Text(String::new()), Value::Bytes(Vec::new())] {
            let param = match value {
                Value::Null => Param::null(),
                Value::Text(_) | Value::Bytes(_) => Param::null(),
                _ => unreachable!(),
            };
            assert_eq!(param.ind, OCI_IND_NULL);
            assert_eq!(param.len, 0);
        }
    }

    #[test]
    fn integers_are_eight_little_endian_bytes() {
        let param = Param::scalar(SQLT_INT, 0x01020304i64.to_le_bytes().to_vec());
        assert_eq!(param.sqlt, SQLT_INT);
        assert_eq!(param.cap, 8);
        assert_eq!(param.data, vec![0x04, 0x03, 0x02, 0x01, 0, 0, 0, 0]);
    }

    #[test]
    fn text_binds_as_padded_char_without_trimming() {
        let param = Param::scalar(SQLT_AFC, "ab  ".as_bytes().to_vec());
        assert_eq!(param.sqlt, SQLT_AFC);
        assert_eq!(param.len, 4);
        assert_eq!(param.data, b"ab  ".to_vec());
    }

    #[test]
    fn out_buffers_have_a_floor() {
        let small = Param::out_buffer(SQLT_CHR, MIN_OUT_BUFFER.max("abc".len() * 4));
        assert_eq!(small.cap as usize, MIN_OUT_BUFFER);
        let large = Param::out_buffer(SQLT_CHR, MIN_OUT_BUFFER.max(1000 * 4));
        assert_eq!(large.cap as usize, 4000);
    }

    #[test]
    fn interval_inputs_fall_back_to_text() {
        assert_eq!(Value::IntervalYM(30).to_string(), "+02-06");
        assert_eq!(
            Value::IntervalDS(108_000_000_000_000).to_string(),
            "+01 06:00:00.000000000"
        );
    }
}
