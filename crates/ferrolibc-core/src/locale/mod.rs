//! Locale support.
//!
//! The stdio engines only consult a narrow slice of the locale: the
//! character encoding used by the multibyte conversion engine and the
//! numeric punctuation used by `printf`/`scanf`/`strtod`. That slice is the
//! [`LocaleContext`]; the process-wide current context is read through
//! [`current`] and replaced through [`setlocale`].

use std::borrow::Cow;

use parking_lot::RwLock;

/// POSIX locale category: character classification and conversion.
pub const LC_CTYPE: i32 = 0;
/// POSIX locale category: numeric formatting.
pub const LC_NUMERIC: i32 = 1;
/// POSIX locale category: date and time formatting.
pub const LC_TIME: i32 = 2;
/// POSIX locale category: string collation.
pub const LC_COLLATE: i32 = 3;
/// POSIX locale category: monetary formatting.
pub const LC_MONETARY: i32 = 4;
/// POSIX locale category: informational and diagnostic messages.
pub const LC_MESSAGES: i32 = 5;
/// POSIX locale category: all categories.
pub const LC_ALL: i32 = 6;

/// Value used for unspecified numeric fields in `LocaleConv` (POSIX `CHAR_MAX`).
const CHAR_MAX: i8 = 127;

/// Returns `true` if `cat` is a valid POSIX locale category.
#[inline]
pub fn valid_category(cat: i32) -> bool {
    (LC_CTYPE..=LC_ALL).contains(&cat)
}

/// Multibyte character encoding selected by `LC_CTYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// One byte per character. Bytes 0x80..=0xFF map to U+DF80 + byte so
    /// every byte value survives a round trip.
    SingleByte,
    /// UTF-8, up to four bytes per character.
    Utf8,
}

impl Encoding {
    /// `MB_CUR_MAX` for this encoding.
    #[must_use]
    pub const fn mb_cur_max(self) -> usize {
        match self {
            Self::SingleByte => 1,
            Self::Utf8 => 4,
        }
    }
}

/// The locale facts the stdio engines depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleContext {
    pub name: Cow<'static, str>,
    pub encoding: Encoding,
    /// `LC_NUMERIC` decimal point.
    pub decimal_point: u8,
    /// `LC_NUMERIC` thousands separator used by the `'` flag; may be empty.
    pub thousands_sep: Cow<'static, [u8]>,
}

impl LocaleContext {
    /// The POSIX "C" locale with byte-transparent single-byte encoding.
    pub const C: Self = Self {
        name: Cow::Borrowed("C"),
        encoding: Encoding::SingleByte,
        decimal_point: b'.',
        thousands_sep: Cow::Borrowed(b""),
    };

    /// "C.UTF-8": C punctuation, UTF-8 encoding. The process starts here.
    pub const C_UTF8: Self = Self {
        name: Cow::Borrowed("C.UTF-8"),
        encoding: Encoding::Utf8,
        decimal_point: b'.',
        thousands_sep: Cow::Borrowed(b""),
    };

    /// Resolve a locale name to a built-in context.
    ///
    /// Only a handful of locales are built in; anything else is `None`,
    /// which `setlocale` reports as failure.
    pub fn from_name(name: &str) -> Option<Self> {
        if matches!(name, "C" | "POSIX") {
            return Some(Self::C);
        }
        let (lang, codeset) = match name.split_once('.') {
            Some((lang, rest)) => (lang, rest.split('@').next().unwrap_or(rest)),
            None => (name, ""),
        };
        let utf8 = codeset.eq_ignore_ascii_case("utf-8") || codeset.eq_ignore_ascii_case("utf8");
        if !utf8 {
            return None;
        }
        let (decimal_point, thousands_sep): (u8, &'static [u8]) = match lang {
            "C" | "POSIX" => (b'.', b""),
            "en_US" | "en_GB" => (b'.', b","),
            "de_DE" | "es_ES" | "it_IT" => (b',', b"."),
            _ => return None,
        };
        Some(Self {
            name: Cow::Owned(name.to_string()),
            encoding: Encoding::Utf8,
            decimal_point,
            thousands_sep: Cow::Borrowed(thousands_sep),
        })
    }

    /// `struct lconv` view of this context.
    pub fn lconv(&self) -> LocaleConv {
        let mut conv = c_locale_conv();
        conv.decimal_point = vec![self.decimal_point];
        conv.thousands_sep = self.thousands_sep.to_vec();
        if !self.thousands_sep.is_empty() {
            conv.grouping = vec![3];
        }
        conv
    }
}

impl Default for LocaleContext {
    fn default() -> Self {
        Self::C_UTF8
    }
}

static CURRENT: RwLock<LocaleContext> = parking_lot::const_rwlock(LocaleContext::C_UTF8);

/// Snapshot of the process-wide locale context.
pub fn current() -> LocaleContext {
    CURRENT.read().clone()
}

/// Current `LC_CTYPE` encoding.
pub fn current_encoding() -> Encoding {
    CURRENT.read().encoding
}

/// Select a locale for `category` by name. Returns the resulting name, or
/// `None` (leaving the locale untouched) when the name is unknown.
///
/// `LC_CTYPE` replaces the encoding, `LC_NUMERIC` the punctuation, `LC_ALL`
/// both. Other valid categories are accepted and ignored.
pub fn setlocale(category: i32, name: &str) -> Option<String> {
    if !valid_category(category) {
        return None;
    }
    let wanted = LocaleContext::from_name(name)?;
    let mut cur = CURRENT.write();
    match category {
        LC_ALL => *cur = wanted,
        LC_CTYPE => {
            cur.encoding = wanted.encoding;
            cur.name = wanted.name;
        }
        LC_NUMERIC => {
            cur.decimal_point = wanted.decimal_point;
            cur.thousands_sep = wanted.thousands_sep;
        }
        _ => {}
    }
    log::debug!("setlocale({category}, {name:?}) -> {}", cur.name);
    Some(cur.name.to_string())
}

/// Numeric and monetary formatting conventions (mirrors POSIX `struct lconv`).
#[derive(Debug, Clone, Default)]
pub struct LocaleConv {
    pub decimal_point: Vec<u8>,
    pub thousands_sep: Vec<u8>,
    pub grouping: Vec<u8>,
    pub int_curr_symbol: Vec<u8>,
    pub currency_symbol: Vec<u8>,
    pub mon_decimal_point: Vec<u8>,
    pub mon_thousands_sep: Vec<u8>,
    pub mon_grouping: Vec<u8>,
    pub positive_sign: Vec<u8>,
    pub negative_sign: Vec<u8>,
    pub int_frac_digits: i8,
    pub frac_digits: i8,
    pub p_cs_precedes: i8,
    pub p_sep_by_space: i8,
    pub n_cs_precedes: i8,
    pub n_sep_by_space: i8,
    pub p_sign_posn: i8,
    pub n_sign_posn: i8,
}

/// Returns the `LocaleConv` for the POSIX "C" locale.
///
/// All numeric flag fields are `CHAR_MAX` (127) per POSIX.
pub fn c_locale_conv() -> LocaleConv {
    LocaleConv {
        decimal_point: b".".to_vec(),
        int_frac_digits: CHAR_MAX,
        frac_digits: CHAR_MAX,
        p_cs_precedes: CHAR_MAX,
        p_sep_by_space: CHAR_MAX,
        n_cs_precedes: CHAR_MAX,
        n_sep_by_space: CHAR_MAX,
        p_sign_posn: CHAR_MAX,
        n_sign_posn: CHAR_MAX,
        ..LocaleConv::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_category_bounds() {
        assert!(valid_category(LC_CTYPE));
        assert!(valid_category(LC_ALL));
        assert!(!valid_category(-1));
        assert!(!valid_category(7));
    }

    #[test]
    fn builtin_names_resolve() {
        assert_eq!(LocaleContext::from_name("C"), Some(LocaleContext::C));
        assert_eq!(LocaleContext::from_name("POSIX"), Some(LocaleContext::C));
        let utf8 = LocaleContext::from_name("C.utf8").unwrap();
        assert_eq!(utf8.encoding, Encoding::Utf8);
        let de = LocaleContext::from_name("de_DE.UTF-8").unwrap();
        assert_eq!(de.decimal_point, b',');
        assert_eq!(&*de.thousands_sep, b".");
        assert!(LocaleContext::from_name("xx_YY.ISO-8859-1").is_none());
        assert!(LocaleContext::from_name("en_US").is_none());
    }

    #[test]
    fn mb_cur_max_per_encoding() {
        assert_eq!(Encoding::SingleByte.mb_cur_max(), 1);
        assert_eq!(Encoding::Utf8.mb_cur_max(), 4);
    }

    #[test]
    fn lconv_reflects_context() {
        let conv = LocaleContext::from_name("en_US.UTF-8").unwrap().lconv();
        assert_eq!(conv.decimal_point, b".");
        assert_eq!(conv.thousands_sep, b",");
        assert_eq!(conv.grouping, vec![3]);
        let c = c_locale_conv();
        assert!(c.thousands_sep.is_empty());
        assert_eq!(c.frac_digits, 127);
    }

    #[test]
    fn setlocale_rejects_unknown_names() {
        assert_eq!(setlocale(LC_ALL, "klingon"), None);
        assert_eq!(setlocale(42, "C"), None);
    }
}
