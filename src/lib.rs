//! An OCI-based interface between Rust applications and Oracle databases.
//!
//! `oradb` links against the Oracle client library and drives it through
//! a small typed surface: a [`Connection`] opened from a [`Config`],
//! prepared [`Statement`]s with positional (`:1` or `?`) and named
//! (`:name`) placeholders, forward-only [`Rows`] cursors, array DML via
//! [`Batch`], and cooperative cancellation through [`CancelToken`].
//!
//! ```no_run
//! use oradb::{Config, Connection, Value};
//!
//! fn main() -> oradb::Result<()> {
//!     let cfg = Config {
//!         dblink: "localhost/XEPDB1".into(),
//!         username: "scott".into(),
//!         password: "tiger".into(),
//!         ..Config::default()
//!     };
//!     let conn = Connection::open(&cfg)?;
//!     let mut rows = conn.query(
//!         "SELECT ename, sal FROM emp WHERE deptno = :1",
//!         &[Value::Int(30)],
//!     )?;
//!     while let Some(row) = rows.next()? {
//!         println!("{} earns {}", row.get(0).unwrap(), row.get(1).unwrap());
//!     }
//!     Ok(())
//! }
//! ```

mod attr;
mod batch;
mod bind;
mod cancel;
mod cols;
mod config;
mod conn;
mod desc;
mod env;
mod err;
mod handle;
mod lob;
mod oci;
mod ptr;
mod rows;
mod stmt;
mod value;

pub use batch::Batch;
pub use cancel::{CancelGuard, CancelToken};
pub use config::{AuthMode, Config, Isolation};
pub use conn::Connection;
pub use err::{Error, OracleError};
pub use rows::{Row, Rows};
pub use stmt::Statement;
pub use value::{ExecResult, SqlArg, Value, Zoned};

pub type Result<T> = std::result::Result<T, Error>;

/// Entry point mirroring the driver registries of other database APIs:
/// a `Driver` carries no state, it only opens connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct Driver;

impl Driver {
    pub fn new() -> Self {
        Driver
    }

    /// Opens a connection described by `cfg`. Equivalent to
    /// [`Connection::open`].
    pub fn open(&self, cfg: &Config) -> Result<Connection> {
        Connection::open(cfg)
    }
}
