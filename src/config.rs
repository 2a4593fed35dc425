use chrono_tz::Tz;

/// Privilege under which the session is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Default,
    SysDba,
    SysOper,
    SysAsm,
    /// OS-authenticated; username and password are ignored.
    External,
}

/// Isolation of the explicit transactions a connection starts. Fixed at
/// open time; [`Connection::begin`](crate::Connection::begin) applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    #[default]
    Default,
    ReadOnly,
    Serializable,
}

/// Everything [`Connection::open`](crate::Connection::open) needs.
///
/// `dblink` is an Easy Connect string (`host:port/service`) or a TNS alias.
/// There is no URL parsing here; build the struct directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub dblink: String,
    pub username: String,
    pub password: String,
    pub auth: AuthMode,
    /// Isolation level for every transaction this connection begins.
    pub isolation: Isolation,
    /// Log on with `OCILogon2` instead of the explicit
    /// attach/session-begin sequence. Cheaper, but no privileged modes
    /// and no external authentication.
    pub direct_logon: bool,
    /// Client charset name. When unset it is taken from `NLS_LANG`,
    /// then `LANG`, then falls back to `AL32UTF8`.
    pub charset: Option<String>,
    /// Zone in which DATE and zoneless TIMESTAMP columns are decoded.
    /// Unset means the process-local offset.
    pub zone: Option<Tz>,
    pub prefetch_rows: u32,
    pub prefetch_memory: u32,
    /// Buffer size for LONG and LONG RAW columns.
    pub max_long: u32,
    /// Rewrite `?` placeholders to `:p1`..`:pN` before preparing.
    pub question_placeholders: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dblink: String::new(),
            username: String::new(),
            password: String::new(),
            auth: AuthMode::Default,
            isolation: Isolation::Default,
            direct_logon: false,
            charset: None,
            zone: None,
            prefetch_rows: 10,
            prefetch_memory: 0,
            max_long: 32768,
            question_placeholders: false,
        }
    }
}

/// Charset name from `NLS_LANG`, e.g. `AMERICAN_AMERICA.AL32UTF8`.
/// The part after the dot is the charset; the rest does not matter here.
pub(crate) fn charset_from_nls_lang(nls_lang: &str) -> Option<String> {
    let (_, charset) = nls_lang.split_once('.')?;
    if charset.is_empty() {
        None
    } else {
        Some(charset.trim().to_uppercase())
    }
}

/// Charset name from a POSIX locale, e.g. `en_US.UTF-8`. Only UTF-8
/// locales map to an Oracle charset we can vouch for.
pub(crate) fn charset_from_locale(lang: &str) -> Option<String> {
    let (_, encoding) = lang.split_once('.')?;
    let encoding = encoding.split('@').next().unwrap_or(encoding);
    let normalized: String = encoding.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_uppercase();
    if normalized == "UTF8" {
        Some("AL32UTF8".to_string())
    } else {
        None
    }
}

/// Resolves the charset *name* to use for the environment, in the order
/// explicit config, `NLS_LANG`, `LANG`, default.
pub(crate) fn resolve_charset_name(explicit: Option<&str>) -> String {
    if let Some(name) = explicit {
        return name.to_uppercase();
    }
    if let Ok(nls_lang) = std::env::var("NLS_LANG") {
        if let Some(name) = charset_from_nls_lang(&nls_lang) {
            return name;
        }
    }
    if let Ok(lang) = std::env::var("LANG") {
        if let Some(name) = charset_from_locale(&lang) {
            return name;
        }
    }
    "AL32UTF8".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nls_lang_charset() {
        assert_eq!(charset_from_nls_lang("AMERICAN_AMERICA.AL32UTF8"), Some("AL32UTF8".into()));
        assert_eq!(charset_from_nls_lang("JAPANESE_JAPAN.JA16EUC"), Some("JA16EUC".into()));
        assert_eq!(charset_from_nls_lang(".WE8ISO8859P1"), Some("WE8ISO8859P1".into()));
        assert_eq!(charset_from_nls_lang("AMERICAN_AMERICA"), None);
        assert_eq!(charset_from_nls_lang("AMERICAN_AMERICA."), None);
    }

    #[test]
    fn locale_charset() {
        assert_eq!(charset_from_locale("en_US.UTF-8"), Some("AL32UTF8".into()));
        assert_eq!(charset_from_locale("de_DE.utf8"), Some("AL32UTF8".into()));
        assert_eq!(charset_from_locale("en_US.UTF-8@euro"), Some("AL32UTF8".into()));
        assert_eq!(charset_from_locale("C"), None);
        assert_eq!(charset_from_locale("en_US.ISO-8859-1"), None);
    }

    #[test]
    fn explicit_charset_wins() {
        assert_eq!(resolve_charset_name(Some("we8mswin1252")), "WE8MSWIN1252");
    }
}
