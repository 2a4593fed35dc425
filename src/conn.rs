//! Database connection: handle tree, transactions and the statement facade.

use crate::attr;
use crate::cancel::{CancelGuard, CancelToken};
use crate::config::{AuthMode, Config, Isolation};
use crate::env::{self, Environment};
use crate::err::{self, catch, Error, OracleError};
use crate::handle::Handle;
use crate::oci::*;
use crate::ptr::Ptr;
use crate::rows::Rows;
use crate::stmt::Statement;
use crate::value::{ExecResult, SqlArg, Value};
use crate::Result;
use chrono_tz::Tz;
use libc::c_void;
use std::cell::{Cell, RefCell};

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/connect-authorize-and-initialize-functions.html#GUID-B6291228-DA2C-4CE9-870A-F94243141757
    fn OCIServerAttach(
        srvhp:      *mut OCIServer,
        errhp:      *mut OCIError,
        dblink:     *const u8,
        dblink_len: i32,
        mode:       u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/connect-authorize-and-initialize-functions.html#GUID-402B540A-05FF-464B-B9C8-B2E2B7C8BFFA
    fn OCIServerDetach(
        srvhp:      *mut OCIServer,
        errhp:      *mut OCIError,
        mode:       u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/connect-authorize-and-initialize-functions.html#GUID-31B1FDB3-056E-4AF9-9B89-8DA6AA156947
    fn OCISessionBegin(
        svchp:      *mut OCISvcCtx,
        errhp:      *mut OCIError,
        usrhp:      *mut OCISession,
        credt:      u32,
        mode:       u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/connect-authorize-and-initialize-functions.html#GUID-2AE88BDC-2C44-4958-B26A-434B0407F06F
    fn OCISessionEnd(
        svchp:      *mut OCISvcCtx,
        errhp:      *mut OCIError,
        usrhp:      *mut OCISession,
        mode:       u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/connect-authorize-and-initialize-functions.html#GUID-A9B21010-44F3-4E34-AE78-F50B6CF118C3
    fn OCILogon2(
        envhp:      *mut OCIEnv,
        errhp:      *mut OCIError,
        svchp:      *mut *mut OCISvcCtx,
        username:   *const u8,
        uname_len:  u32,
        password:   *const u8,
        passwd_len: u32,
        dbname:     *const u8,
        dbname_len: u32,
        mode:       u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/connect-authorize-and-initialize-functions.html#GUID-0A0B0B93-5B8F-4E79-B7C9-DF2D0E4EDCA5
    fn OCILogoff(
        svchp:      *mut OCISvcCtx,
        errhp:      *mut OCIError,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/transaction-functions.html#GUID-E0E16A6A-4B0B-4A31-B15D-64423E627F94
    fn OCITransStart(
        svchp:      *mut OCISvcCtx,
        errhp:      *mut OCIError,
        timeout:    u16,
        flags:      u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/transaction-functions.html#GUID-F4F3B5D0-4120-4BA0-86B7-D4813EFA8996
    fn OCITransCommit(
        svchp:      *mut OCISvcCtx,
        errhp:      *mut OCIError,
        flags:      u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/transaction-functions.html#GUID-E69CB6FB-9D41-4A46-ADD1-E1DB3F3F33A3
    fn OCITransRollback(
        svchp:      *mut OCISvcCtx,
        errhp:      *mut OCIError,
        flags:      u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/miscellaneous-functions.html#GUID-033BF96D-D88D-4F18-909A-3AB7C2F6C70F
    fn OCIPing(
        svchp:      *mut OCISvcCtx,
        errhp:      *mut OCIError,
        mode:       u32,
    ) -> i32;
}

// ping reaches a pre-10.2 server that does not know the round-trip call
const ORA_INVALID_OCI_OPERATION: i32 = 1010;

enum Link {
    Session {
        svc: Handle<OCISvcCtx>,
        usr: Handle<OCISession>,
        srv: Handle<OCIServer>,
    },
    Direct {
        svc: Ptr<OCISvcCtx>,
    },
}

/// A single database session.
///
/// The connection owns its whole handle tree, environment included, so
/// dropping it (or calling [`close`](Connection::close)) releases every
/// server resource it acquired. Statements borrow the connection and
/// therefore cannot outlive it.
// Field order matters: handles must drop before the environment that
// allocated them.
pub struct Connection {
    link: RefCell<Option<Link>>,
    txn: RefCell<Option<Handle<OCITrans>>>,
    err: Handle<OCIError>,
    // dedicated error handle for OCIBreak, which runs on a watcher
    // thread while `err` is busy with the interrupted call
    brk_err: Handle<OCIError>,
    env: Environment,
    in_txn: Cell<bool>,
    // settings copied from the config
    isolation: Isolation,
    zone: Option<Tz>,
    prefetch_rows: u32,
    prefetch_memory: u32,
    max_long: u32,
    question_placeholders: bool,
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Connection {
    /// Opens a new session described by `cfg`.
    ///
    /// On any mid-sequence failure everything allocated so far is torn
    /// down in reverse order before the error is returned.
    pub fn open(cfg: &Config) -> Result<Connection> {
        let charset = env::resolve_charset(cfg.charset.as_deref()).map_err(Error::while_connecting)?;
        let env = Environment::new(charset)?;
        let err = Handle::<OCIError>::new(env.env_ptr())?;
        let brk_err = Handle::<OCIError>::new(env.env_ptr())?;
        let link = if cfg.direct_logon {
            Self::logon(&env, err.get(), cfg)
        } else {
            Self::attach(&env, err.get(), cfg)
        }
        .map_err(Error::while_connecting)?;
        Ok(Self {
            env,
            err,
            brk_err,
            link: RefCell::new(Some(link)),
            txn: RefCell::new(None),
            in_txn: Cell::new(false),
            isolation: cfg.isolation,
            zone: cfg.zone,
            prefetch_rows: cfg.prefetch_rows,
            prefetch_memory: cfg.prefetch_memory,
            max_long: cfg.max_long,
            question_placeholders: cfg.question_placeholders,
        })
    }

    fn logon(env: &Environment, err: *mut OCIError, cfg: &Config) -> Result<Link> {
        if cfg.auth != AuthMode::Default {
            return Err(Error::interface("direct logon supports only default authentication"));
        }
        let svc = Ptr::<OCISvcCtx>::null();
        catch! {err =>
            OCILogon2(
                env.env_ptr(), err, svc.as_mut_ptr(),
                cfg.username.as_ptr(), cfg.username.len() as u32,
                cfg.password.as_ptr(), cfg.password.len() as u32,
                cfg.dblink.as_ptr(), cfg.dblink.len() as u32,
                OCI_DEFAULT
            )
        }
        Ok(Link::Direct { svc })
    }

    fn attach(env: &Environment, err: *mut OCIError, cfg: &Config) -> Result<Link> {
        let srv = Handle::<OCIServer>::new(env.env_ptr())?;
        catch! {err =>
            OCIServerAttach(srv.get(), err, cfg.dblink.as_ptr(), cfg.dblink.len() as i32, OCI_DEFAULT)
        }
        // the server is attached now; handle frees alone will not undo that
        match Self::begin_session(env, err, &srv, cfg) {
            Ok((svc, usr)) => Ok(Link::Session { svc, usr, srv }),
            Err(failure) => {
                unsafe {
                    OCIServerDetach(srv.get(), err, OCI_DEFAULT);
                }
                Err(failure)
            }
        }
    }

    fn begin_session(
        env: &Environment,
        err: *mut OCIError,
        srv: &Handle<OCIServer>,
        cfg: &Config,
    ) -> Result<(Handle<OCISvcCtx>, Handle<OCISession>)> {
        let svc = Handle::<OCISvcCtx>::new(env.env_ptr())?;
        svc.set_attr(OCI_ATTR_SERVER, srv.get(), err)?;
        let usr = Handle::<OCISession>::new(env.env_ptr())?;
        let cred = match cfg.auth {
            AuthMode::External => OCI_CRED_EXT,
            _ => OCI_CRED_RDBMS,
        };
        if cred == OCI_CRED_RDBMS {
            usr.set_attr(OCI_ATTR_USERNAME, cfg.username.as_str(), err)?;
            usr.set_attr(OCI_ATTR_PASSWORD, cfg.password.as_str(), err)?;
        }
        // identifies the client in V$SESSION_CONNECT_INFO; servers that
        // predate the attribute reject it, which is fine
        let _ = usr.set_attr(OCI_ATTR_DRIVER_NAME, "oradb", err);
        let mode = match cfg.auth {
            AuthMode::SysDba => OCI_SYSDBA,
            AuthMode::SysOper => OCI_SYSOPER,
            AuthMode::SysAsm => OCI_SYSASM,
            _ => OCI_DEFAULT,
        };
        catch! {err =>
            OCISessionBegin(svc.get(), err, usr.get(), cred, mode)
        }
        if let Err(failure) = svc.set_attr(OCI_ATTR_SESSION, usr.get(), err) {
            unsafe {
                OCISessionEnd(svc.get(), err, usr.get(), OCI_DEFAULT);
            }
            return Err(failure);
        }
        Ok((svc, usr))
    }

    /// Ends the session and releases the handle tree. Safe to call more
    /// than once; later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        self.in_txn.set(false);
        self.txn.borrow_mut().take();
        let link = self.link.borrow_mut().take();
        match link {
            None => Ok(()),
            Some(Link::Direct { svc }) => {
                catch! {self.err.get() =>
                    OCILogoff(svc.get(), self.err.get())
                }
                Ok(())
            }
            Some(Link::Session { svc, usr, srv }) => {
                let err = self.err.get();
                let end = unsafe { OCISessionEnd(svc.get(), err, usr.get(), OCI_DEFAULT) };
                let detach = unsafe { OCIServerDetach(srv.get(), err, OCI_DEFAULT) };
                // svc, usr and srv are freed here, in that order
                for res in [end, detach] {
                    if res == OCI_ERROR || res == OCI_INVALID_HANDLE {
                        return Err(Error::oci(err, res));
                    }
                }
                Ok(())
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.borrow().is_some()
    }

    /// Round-trips to the server to verify the session is alive.
    /// Any failure, whatever its ORA code, means the connection should
    /// be discarded.
    pub fn ping(&self) -> Result<()> {
        let svc = self.svc_ptr()?;
        let res = unsafe { OCIPing(svc, self.err.get(), OCI_DEFAULT) };
        match res {
            OCI_SUCCESS | OCI_SUCCESS_WITH_INFO => Ok(()),
            _ => {
                let diag = err::read_diagnostic(res, self.err.get() as *mut c_void, OCI_HTYPE_ERROR);
                if diag.code == ORA_INVALID_OCI_OPERATION {
                    // the round trip happened, the server is just old
                    return Ok(());
                }
                match Error::classify(diag) {
                    Error::Cancelled => Err(Error::Cancelled),
                    Error::Statement(diag)
                    | Error::Connection(diag)
                    | Error::BadConnection(diag) => Err(Error::BadConnection(diag)),
                    other => Err(other),
                }
            }
        }
    }

    /// Starts an explicit transaction at the isolation level the
    /// connection was opened with. Until [`commit`](Connection::commit)
    /// or [`rollback`](Connection::rollback), statements no longer
    /// auto-commit.
    pub fn begin(&self) -> Result<()> {
        if self.in_txn.get() {
            return Err(Error::interface("a transaction is already in progress"));
        }
        let svc = self.svc_ptr()?;
        if self.isolation != Isolation::Default {
            let txn = Handle::<OCITrans>::new(self.env.env_ptr())?;
            attr::set(OCI_ATTR_TRANS, txn.get(), OCI_HTYPE_SVCCTX, svc as *mut c_void, self.err.get())?;
            let flags = OCI_TRANS_NEW
                | match self.isolation {
                    Isolation::ReadOnly => OCI_TRANS_READONLY,
                    Isolation::Serializable => OCI_TRANS_SERIALIZABLE,
                    Isolation::Default => 0,
                };
            catch! {self.err.get() =>
                OCITransStart(svc, self.err.get(), 0, flags)
            }
            self.txn.borrow_mut().replace(txn);
        }
        self.in_txn.set(true);
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        let svc = self.svc_ptr()?;
        catch! {self.err.get() =>
            OCITransCommit(svc, self.err.get(), OCI_DEFAULT)
        }
        self.end_txn();
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        let svc = self.svc_ptr()?;
        catch! {self.err.get() =>
            OCITransRollback(svc, self.err.get(), OCI_DEFAULT)
        }
        self.end_txn();
        Ok(())
    }

    fn end_txn(&self) {
        self.in_txn.set(false);
        self.txn.borrow_mut().take();
    }

    /// Prepares `sql` for (repeated) execution.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        Statement::new(self, sql)
    }

    /// One-shot DML or DDL: prepare, execute, release.
    pub fn execute(&self, sql: &str, args: &mut [SqlArg]) -> Result<ExecResult> {
        let stmt = self.prepare(sql)?;
        stmt.execute(args)
    }

    /// One-shot query; the returned cursor owns its statement and
    /// releases it when closed.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Rows<'_>> {
        let stmt = self.prepare(sql)?;
        Rows::owning(stmt, params)
    }

    /// Arms cancellation for every call made on this connection while the
    /// guard lives. See [`CancelToken`].
    pub fn watch(&self, token: &CancelToken) -> CancelGuard<'_> {
        CancelGuard::new(self, token)
    }

    pub(crate) fn svc_ptr(&self) -> Result<*mut OCISvcCtx> {
        match self.link.borrow().as_ref() {
            Some(Link::Session { svc, .. }) => Ok(svc.get()),
            Some(Link::Direct { svc }) => Ok(svc.get()),
            None => Err(Error::BadConnection(OracleError {
                code: 3114,
                message: "not connected to ORACLE".into(),
            })),
        }
    }

    pub(crate) fn env_ptr(&self) -> *mut OCIEnv {
        self.env.env_ptr()
    }

    pub(crate) fn err_ptr(&self) -> *mut OCIError {
        self.err.get()
    }

    pub(crate) fn brk_err_ptr(&self) -> *mut OCIError {
        self.brk_err.get()
    }

    pub(crate) fn zone(&self) -> Option<Tz> {
        self.zone
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.in_txn.get()
    }

    pub(crate) fn prefetch_rows(&self) -> u32 {
        self.prefetch_rows
    }

    pub(crate) fn prefetch_memory(&self) -> u32 {
        self.prefetch_memory
    }

    pub(crate) fn max_long(&self) -> u32 {
        self.max_long
    }

    pub(crate) fn rewrites_placeholders(&self) -> bool {
        self.question_placeholders
    }
}
