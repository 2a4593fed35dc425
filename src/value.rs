//! The closed set of values the driver moves across the OCI boundary.

use crate::desc::Descriptor;
use crate::err::catch;
use crate::oci::*;
use crate::Result;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike, Datelike, Utc};
use chrono_tz::Tz;
use libc::c_void;
use std::fmt;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/oci-date-datetime-and-interval-functions.html#GUID-33CC1F15-E468-4EAF-B7BB-0007A79E4AB2
    fn OCIDateTimeConstruct(
        hndl:       *mut c_void,
        err:        *mut OCIError,
        datetime:   *mut OCIDateTime,
        year:       i16,
        month:      u8,
        day:        u8,
        hour:       u8,
        min:        u8,
        sec:        u8,
        fsec:       u32,
        timezone:   *const u8,
        timezone_len: libc::size_t,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/oci-date-datetime-and-interval-functions.html#GUID-2A81B5D0-2B82-473B-8FAD-F9C61B0D1A4B
    fn OCIDateTimeGetDate(
        hndl:       *mut c_void,
        err:        *mut OCIError,
        datetime:   *const OCIDateTime,
        year:       *mut i16,
        month:      *mut u8,
        day:        *mut u8,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/oci-date-datetime-and-interval-functions.html#GUID-A7E2BB0F-03C1-44A3-A8E5-9090A41A9653
    fn OCIDateTimeGetTime(
        hndl:       *mut c_void,
        err:        *mut OCIError,
        datetime:   *mut OCIDateTime,
        hour:       *mut u8,
        min:        *mut u8,
        sec:        *mut u8,
        fsec:       *mut u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/oci-date-datetime-and-interval-functions.html#GUID-CCE21EEE-3D78-4A92-A795-29C67F8C4CD2
    fn OCIDateTimeGetTimeZoneName(
        hndl:       *mut c_void,
        err:        *mut OCIError,
        datetime:   *const OCIDateTime,
        buf:        *mut u8,
        buflen:     *mut u32,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/oci-date-datetime-and-interval-functions.html#GUID-CE61DFF8-B3A4-44E1-A176-797DE7A8A57F
    fn OCIDateTimeGetTimeZoneOffset(
        hndl:       *mut c_void,
        err:        *mut OCIError,
        datetime:   *const OCIDateTime,
        hour:       *mut i8,
        min:        *mut i8,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/oci-date-datetime-and-interval-functions.html#GUID-CEC278B6-9EFB-4046-8BE1-0C5771E1798F
    fn OCIIntervalGetYearMonth(
        hndl:       *mut c_void,
        err:        *mut OCIError,
        year:       *mut i32,
        month:      *mut i32,
        interval:   *const OCIInterval,
    ) -> i32;

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/oci-date-datetime-and-interval-functions.html#GUID-BE12795F-E68A-45A8-8C53-E28A8DDA67BF
    fn OCIIntervalGetDaySecond(
        hndl:       *mut c_void,
        err:        *mut OCIError,
        day:        *mut i32,
        hour:       *mut i32,
        min:        *mut i32,
        sec:        *mut i32,
        fsec:       *mut i32,
        interval:   *const OCIInterval,
    ) -> i32;
}

pub(crate) const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A single SQL value.
///
/// This is the complete set of shapes the codec produces and consumes.
/// Anything a column reports that cannot be decoded into one of these is a
/// [`Conversion`](crate::Error::Conversion) error, never a silent fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(Zoned),
    /// INTERVAL YEAR TO MONTH as a total number of months.
    IntervalYM(i64),
    /// INTERVAL DAY TO SECOND as a total number of nanoseconds.
    IntervalDS(i64),
    /// The 18-character base-64 representation of a physical row address.
    RowId(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::RowId(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&Zoned> {
        match self {
            Value::Timestamp(z) => Some(z),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            Value::Timestamp(z) => write!(f, "{}", z),
            Value::IntervalYM(months) => f.write_str(&format_interval_ym(*months)),
            Value::IntervalDS(nanos) => f.write_str(&format_interval_ds(*nanos)),
            Value::RowId(s) => f.write_str(s),
        }
    }
}

/// A statement argument: plain input, output, or both.
///
/// For `Out` and `InOut` the current variant of the referenced value
/// selects the external type; an `Out` destination holding `Null` cannot
/// be bound because its type cannot be inferred.
pub enum SqlArg<'a> {
    In(Value),
    Out(&'a mut Value),
    InOut(&'a mut Value),
}

/// What a non-query execution reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Address of the last row touched by a single-row INSERT, UPDATE or
    /// DELETE. Owned text; valid as long as the row exists.
    pub row_id: Option<String>,
}

/// A point in time with its zone: either a named tz-database zone or a
/// plain UTC offset when the zone has no usable name.
#[derive(Debug, Clone)]
pub enum Zoned {
    Named(DateTime<Tz>),
    Fixed(DateTime<FixedOffset>),
}

impl Zoned {
    pub fn fixed(&self) -> DateTime<FixedOffset> {
        match self {
            Zoned::Named(dt) => dt.with_timezone(&dt.offset().fix()),
            Zoned::Fixed(dt) => *dt,
        }
    }

    pub fn utc(&self) -> DateTime<Utc> {
        match self {
            Zoned::Named(dt) => dt.with_timezone(&Utc),
            Zoned::Fixed(dt) => dt.with_timezone(&Utc),
        }
    }

    pub fn zone_name(&self) -> Option<&'static str> {
        match self {
            Zoned::Named(dt) => Some(dt.timezone().name()),
            Zoned::Fixed(_) => None,
        }
    }

    pub fn offset_seconds(&self) -> i32 {
        match self {
            Zoned::Named(dt) => dt.offset().fix().local_minus_utc(),
            Zoned::Fixed(dt) => dt.offset().local_minus_utc(),
        }
    }

    /// Builds a TIMESTAMP WITH TIME ZONE descriptor holding this instant.
    ///
    /// The zone is attached by name first so the session keeps the region;
    /// when the client and server disagree about what that name means at
    /// this instant (tzdata skew), the construction is retried with the
    /// plain `±HH:MM` offset, which is unambiguous.
    pub(crate) fn to_descriptor(&self, env: *mut OCIEnv, err: *mut OCIError) -> Result<Descriptor<OCITimestampTZ>> {
        let desc = Descriptor::<OCITimestampTZ>::new(env)?;
        let local = self.fixed();
        let offset = offset_hhmm(self.offset_seconds());
        let zone = match self.zone_name() {
            Some(name) => name.to_string(),
            None => offset.clone(),
        };
        construct_datetime(env, err, &desc, &local, &zone)?;
        let resolved = get_zone_offset(env, err, desc.get())?;
        if resolved != self.offset_seconds() {
            construct_datetime(env, err, &desc, &local, &offset)?;
        }
        Ok(desc)
    }

    /// Decodes a TIMESTAMP WITH (LOCAL) TIME ZONE descriptor.
    pub(crate) fn from_descriptor(dt: *mut OCIDateTime, env: *mut OCIEnv, err: *mut OCIError) -> Result<Zoned> {
        let naive = naive_from_descriptor(dt, env, err)?;
        let offset_secs = get_zone_offset(env, err, dt)?;
        let offset = FixedOffset::east_opt(offset_secs)
            .ok_or_else(|| crate::Error::Conversion(format!("time zone offset {} is out of range", offset_secs)))?;
        let fixed = offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| crate::Error::Conversion(format!("{} is not a valid local time", naive)))?;
        let name = get_zone_name(env, err, dt).unwrap_or_default();
        if let Ok(tz) = name.parse::<Tz>() {
            Ok(Zoned::Named(fixed.with_timezone(&tz)))
        } else {
            Ok(Zoned::Fixed(fixed))
        }
    }

    /// Places a zoneless local time into the connection's decode zone.
    pub(crate) fn from_naive(naive: NaiveDateTime, zone: Option<Tz>) -> Zoned {
        match zone {
            Some(tz) => {
                let dt = tz
                    .from_local_datetime(&naive)
                    .earliest()
                    .unwrap_or_else(|| tz.from_utc_datetime(&naive));
                Zoned::Named(dt)
            }
            None => {
                let dt = chrono::Local
                    .from_local_datetime(&naive)
                    .earliest()
                    .unwrap_or_else(|| chrono::Local.from_utc_datetime(&naive));
                Zoned::Fixed(dt.with_timezone(dt.offset()))
            }
        }
    }
}

// Two Zoned values are the same instant regardless of how the zone
// happens to be spelled.
impl PartialEq for Zoned {
    fn eq(&self, other: &Zoned) -> bool {
        self.utc() == other.utc()
    }
}

impl fmt::Display for Zoned {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Zoned::Named(dt) => write!(f, "{} {}", dt.format("%Y-%m-%d %H:%M:%S%.9f"), dt.timezone().name()),
            Zoned::Fixed(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.9f %:z")),
        }
    }
}

fn construct_datetime(
    env: *mut OCIEnv,
    err: *mut OCIError,
    desc: &Descriptor<OCITimestampTZ>,
    local: &DateTime<FixedOffset>,
    zone: &str,
) -> Result<()> {
    catch! {err =>
        OCIDateTimeConstruct(
            env as *mut c_void, err, desc.get(),
            local.year() as i16, local.month() as u8, local.day() as u8,
            local.hour() as u8, local.minute() as u8, local.second() as u8,
            local.nanosecond(),
            zone.as_ptr(), zone.len()
        )
    }
    Ok(())
}

pub(crate) fn naive_from_descriptor(dt: *mut OCIDateTime, env: *mut OCIEnv, err: *mut OCIError) -> Result<NaiveDateTime> {
    let mut year = 0i16;
    let mut month = 0u8;
    let mut day = 0u8;
    catch! {err =>
        OCIDateTimeGetDate(env as *mut c_void, err, dt, &mut year, &mut month, &mut day)
    }
    let mut hour = 0u8;
    let mut min = 0u8;
    let mut sec = 0u8;
    let mut fsec = 0u32;
    catch! {err =>
        OCIDateTimeGetTime(env as *mut c_void, err, dt, &mut hour, &mut min, &mut sec, &mut fsec)
    }
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|d| d.and_hms_nano_opt(hour as u32, min as u32, sec as u32, fsec))
        .ok_or_else(|| crate::Error::Conversion(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:09} is not a representable timestamp",
            year, month, day, hour, min, sec, fsec
        )))
}

fn get_zone_offset(env: *mut OCIEnv, err: *mut OCIError, dt: *mut OCIDateTime) -> Result<i32> {
    let mut hours = 0i8;
    let mut minutes = 0i8;
    catch! {err =>
        OCIDateTimeGetTimeZoneOffset(env as *mut c_void, err, dt, &mut hours, &mut minutes)
    }
    Ok(hours as i32 * 3600 + minutes as i32 * 60)
}

fn get_zone_name(env: *mut OCIEnv, err: *mut OCIError, dt: *mut OCIDateTime) -> Option<String> {
    let mut buf = [0u8; 64];
    let mut len = buf.len() as u32;
    let res = unsafe {
        OCIDateTimeGetTimeZoneName(env as *mut c_void, err, dt, buf.as_mut_ptr(), &mut len)
    };
    if res == OCI_SUCCESS && len > 0 {
        Some(String::from_utf8_lossy(&buf[..len as usize]).into_owned())
    } else {
        None
    }
}

pub(crate) fn interval_ym_months(interval: *const OCIInterval, env: *mut OCIEnv, err: *mut OCIError) -> Result<i64> {
    let mut years = 0i32;
    let mut months = 0i32;
    catch! {err =>
        OCIIntervalGetYearMonth(env as *mut c_void, err, &mut years, &mut months, interval)
    }
    Ok(ym_to_months(years, months))
}

pub(crate) fn interval_ds_nanos(interval: *const OCIInterval, env: *mut OCIEnv, err: *mut OCIError) -> Result<i64> {
    let mut days = 0i32;
    let mut hours = 0i32;
    let mut minutes = 0i32;
    let mut seconds = 0i32;
    let mut fsec = 0i32;
    catch! {err =>
        OCIIntervalGetDaySecond(env as *mut c_void, err, &mut days, &mut hours, &mut minutes, &mut seconds, &mut fsec, interval)
    }
    Ok(ds_to_nanos(days, hours, minutes, seconds, fsec))
}

pub(crate) fn ym_to_months(years: i32, months: i32) -> i64 {
    years as i64 * 12 + months as i64
}

pub(crate) fn ds_to_nanos(days: i32, hours: i32, minutes: i32, seconds: i32, nanos: i32) -> i64 {
    let secs = days as i64 * 86_400 + hours as i64 * 3_600 + minutes as i64 * 60 + seconds as i64;
    secs * NANOS_PER_SEC + nanos as i64
}

/// `±HH:MM` for an offset in seconds, the spelling OCI accepts as a
/// time zone specifier.
pub(crate) fn offset_hhmm(offset_seconds: i32) -> String {
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let abs = offset_seconds.unsigned_abs();
    format!("{}{:02}:{:02}", sign, abs / 3600, abs % 3600 / 60)
}

pub(crate) fn format_interval_ym(months: i64) -> String {
    let sign = if months < 0 { '-' } else { '+' };
    let abs = months.unsigned_abs();
    format!("{}{:02}-{:02}", sign, abs / 12, abs % 12)
}

pub(crate) fn format_interval_ds(nanos: i64) -> String {
    let sign = if nanos < 0 { '-' } else { '+' };
    let abs = nanos.unsigned_abs();
    let secs = abs / NANOS_PER_SEC as u64;
    let frac = abs % NANOS_PER_SEC as u64;
    format!(
        "{}{:02} {:02}:{:02}:{:02}.{:09}",
        sign,
        secs / 86_400,
        secs % 86_400 / 3_600,
        secs % 3_600 / 60,
        secs % 60,
        frac
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_day_to_second_totals() {
        // a day and a quarter
        assert_eq!(ds_to_nanos(1, 6, 0, 0, 0), 108_000_000_000_000);
        assert_eq!(ds_to_nanos(0, 0, 0, 1, 500_000_000), 1_500_000_000);
        assert_eq!(ds_to_nanos(-1, -6, 0, 0, 0), -108_000_000_000_000);
    }

    #[test]
    fn interval_year_to_month_totals() {
        assert_eq!(ym_to_months(2, 6), 30);
        assert_eq!(ym_to_months(-1, -1), -13);
        assert_eq!(ym_to_months(0, 0), 0);
    }

    #[test]
    fn offset_formatting() {
        assert_eq!(offset_hhmm(0), "+00:00");
        assert_eq!(offset_hhmm(3600), "+01:00");
        assert_eq!(offset_hhmm(-19_800), "-05:30");
        assert_eq!(offset_hhmm(45_900), "+12:45");
    }

    #[test]
    fn interval_literals() {
        assert_eq!(format_interval_ym(30), "+02-06");
        assert_eq!(format_interval_ym(-13), "-01-01");
        assert_eq!(format_interval_ds(108_000_000_000_000), "+01 06:00:00.000000000");
        assert_eq!(format_interval_ds(-1_500_000_000), "-00 00:00:01.500000000");
    }

    #[test]
    fn zoned_equality_is_instant_equality() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let named = Zoned::Named(tz.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let fixed = Zoned::Fixed(
            FixedOffset::east_opt(-4 * 3600).unwrap().with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        );
        assert_eq!(named, fixed);

        let later = Zoned::Fixed(
            FixedOffset::east_opt(-4 * 3600).unwrap().with_ymd_and_hms(2024, 6, 1, 12, 0, 1).unwrap(),
        );
        assert_ne!(named, later);
    }

    #[test]
    fn naive_decodes_into_configured_zone() {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(9, 30, 0).unwrap();
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        let zoned = Zoned::from_naive(naive, Some(tz));
        assert_eq!(zoned.zone_name(), Some("Europe/Berlin"));
        assert_eq!(zoned.offset_seconds(), 3600);
        assert_eq!(zoned.fixed().naive_local(), naive);
    }

    #[test]
    fn value_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::Float(2.5).as_float(), Some(2.5));
        assert_eq!(Value::Text("ab".into()).as_str(), Some("ab"));
        assert_eq!(Value::Int(42).as_str(), None);
    }
}
