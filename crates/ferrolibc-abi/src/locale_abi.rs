//! ABI layer for `setlocale` and `localeconv`.

use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;

use ferrolibc_core::locale::{self, LC_ALL, LC_CTYPE, LC_NUMERIC, LocaleConv};

thread_local! {
    static NAME_BUF: RefCell<CString> = RefCell::new(CString::default());
    static LCONV_BUF: RefCell<Option<LconvStorage>> = const { RefCell::new(None) };
}

/// Owns the strings a returned `struct lconv` points into.
struct LconvStorage {
    _strings: Vec<CString>,
    conv: libc::lconv,
}

fn owned(bytes: &[u8]) -> CString {
    CString::new(bytes.iter().copied().filter(|&b| b != 0).collect::<Vec<u8>>()).unwrap_or_default()
}

/// Resolve `setlocale(cat, "")` from the environment.
fn name_from_env(category: c_int) -> String {
    let specific = match category {
        LC_CTYPE => Some("LC_CTYPE"),
        LC_NUMERIC => Some("LC_NUMERIC"),
        _ => None,
    };
    ["LC_ALL"]
        .into_iter()
        .chain(specific)
        .chain(["LANG"])
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| "C".to_string())
}

fn publish_name(name: &str) -> *mut c_char {
    NAME_BUF.with(|buf| {
        *buf.borrow_mut() = owned(name.as_bytes());
        buf.borrow().as_ptr().cast_mut()
    })
}

fn build_lconv(src: &LocaleConv) -> LconvStorage {
    let mut strings: Vec<CString> = [
        &src.decimal_point,
        &src.thousands_sep,
        &src.grouping,
        &src.int_curr_symbol,
        &src.currency_symbol,
        &src.mon_decimal_point,
        &src.mon_thousands_sep,
        &src.mon_grouping,
        &src.positive_sign,
        &src.negative_sign,
    ]
    .into_iter()
    .map(|s| owned(s))
    .collect();
    let mut p = strings.iter_mut().map(|s| s.as_ptr().cast_mut());
    let mut next = || p.next().unwrap_or(ptr::null_mut());
    let conv = libc::lconv {
        decimal_point: next(),
        thousands_sep: next(),
        grouping: next(),
        int_curr_symbol: next(),
        currency_symbol: next(),
        mon_decimal_point: next(),
        mon_thousands_sep: next(),
        mon_grouping: next(),
        positive_sign: next(),
        negative_sign: next(),
        int_frac_digits: src.int_frac_digits as c_char,
        frac_digits: src.frac_digits as c_char,
        p_cs_precedes: src.p_cs_precedes as c_char,
        p_sep_by_space: src.p_sep_by_space as c_char,
        n_cs_precedes: src.n_cs_precedes as c_char,
        n_sep_by_space: src.n_sep_by_space as c_char,
        p_sign_posn: src.p_sign_posn as c_char,
        n_sign_posn: src.n_sign_posn as c_char,
        int_p_cs_precedes: src.p_cs_precedes as c_char,
        int_p_sep_by_space: src.p_sep_by_space as c_char,
        int_n_cs_precedes: src.n_cs_precedes as c_char,
        int_n_sep_by_space: src.n_sep_by_space as c_char,
        int_p_sign_posn: src.p_sign_posn as c_char,
        int_n_sign_posn: src.n_sign_posn as c_char,
    };
    LconvStorage {
        _strings: strings,
        conv,
    }
}

abi_fn! {
    /// ISO C `setlocale`. A null `name` queries; `""` consults `LC_ALL`,
    /// the category variable and `LANG` in that order.
    fn setlocale(category: c_int, name: *const c_char) -> *mut c_char {
        if !locale::valid_category(category) {
            return ptr::null_mut();
        }
        if name.is_null() {
            return publish_name(&locale::current().name);
        }
        let Ok(requested) = CStr::from_ptr(name).to_str() else {
            return ptr::null_mut();
        };
        let requested = if requested.is_empty() { name_from_env(category) } else { requested.to_string() };
        match locale::setlocale(category, &requested) {
            Some(applied) => publish_name(&applied),
            None => {
                log::debug!("setlocale: unsupported locale {requested:?}");
                ptr::null_mut()
            }
        }
    }
}

abi_fn! {
    /// ISO C `localeconv`. The result stays valid until the next call on
    /// the same thread.
    fn localeconv() -> *mut libc::lconv {
        let storage = build_lconv(&locale::current().lconv());
        LCONV_BUF.with(|buf| {
            let mut slot = buf.borrow_mut();
            let stored = slot.insert(storage);
            &mut stored.conv as *mut libc::lconv
        })
    }
}
