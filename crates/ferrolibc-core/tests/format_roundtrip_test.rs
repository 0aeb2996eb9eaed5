#![allow(clippy::approx_constant)]

use std::cell::Cell;

use ferrolibc_core::errno;
use ferrolibc_core::stdio::printf::{FormatArg, PrintfError, snprintf, sprintf};
use ferrolibc_core::stdio::scanf::{ScanArg, sscanf};
use ferrolibc_core::stdlib::wcstol_impl;

fn render(fmt: &str, args: Vec<FormatArg<'_>>) -> String {
    String::from_utf8(sprintf(fmt.as_bytes(), args).unwrap()).unwrap()
}

#[test]
fn mixed_directives_render_exactly() {
    let out = render(
        "%.4d|%5.2f|%-8s|",
        vec![
            FormatArg::SignedInt(3),
            FormatArg::Float(3.14159),
            FormatArg::Str(Some(b"hi")),
        ],
    );
    assert_eq!(out, "0003| 3.14|hi      |");
}

#[test]
fn scan_decimal_then_auto_base() {
    let (mut a, mut b) = (0i64, 0i64);
    let n = sscanf(b"123 0x321", b"%d %i", [ScanArg::Int(&mut a), ScanArg::Int(&mut b)]).unwrap();
    assert_eq!(n, 2);
    assert_eq!(a, 123);
    assert_eq!(b, 0x321);
}

#[test]
fn wcstol_stops_at_space() {
    let text: Vec<u32> = "2001 60c0c0".chars().map(u32::from).collect();
    let (v, end, _) = wcstol_impl(&text, 10);
    assert_eq!(v, 2001);
    let rest: String = text[end..].iter().filter_map(|&c| char::from_u32(c)).collect();
    assert_eq!(rest, " 60c0c0");
}

#[test]
fn signed_integers_survive_render_and_scan() {
    let values = [0i64, 1, -1, 42, -4096, i64::from(i32::MAX), i64::from(i32::MIN), 99_999];
    let formats: [(&str, &str); 6] = [
        ("%d", "%d"),
        ("%+d", "%d"),
        ("% 12d", "%d"),
        ("%-12d|", "%d|"),
        ("%012d", "%d"),
        ("%.8d", "%d"),
    ];
    for v in values {
        for (out_fmt, in_fmt) in formats {
            let text = sprintf(out_fmt.as_bytes(), [FormatArg::SignedInt(v)]).unwrap();
            let mut back = 0i64;
            let n = sscanf(&text, in_fmt.as_bytes(), [ScanArg::Int(&mut back)]).unwrap();
            assert_eq!((n, back), (1, v), "{out_fmt} with {v}");
        }
    }
}

#[test]
fn unsigned_integers_survive_render_and_scan() {
    let values = [0u64, 7, 255, 0xdead_beef, u64::from(u32::MAX)];
    let formats: [(&str, &str); 5] = [
        ("%u", "%u"),
        ("%x", "%x"),
        ("%#X", "%X"),
        ("%#o", "%o"),
        ("%#x", "%i"),
    ];
    for v in values {
        for (out_fmt, in_fmt) in formats {
            let text = sprintf(out_fmt.as_bytes(), [FormatArg::UnsignedInt(v)]).unwrap();
            let mut back = 0u64;
            let n = sscanf(&text, in_fmt.as_bytes(), [ScanArg::UInt(&mut back)]).unwrap();
            assert_eq!((n, back), (1, v), "{out_fmt} with {v}");
        }
    }
}

#[test]
fn general_format_never_keeps_trailing_fraction_zeros() {
    let values = [0.5, 1.0, 2.50, 100.0, 0.000123, 1234.5, 99999.0, 0.1, 3.0e-4];
    for v in values {
        for prec in 1..=8 {
            let text = render(&format!("%.{prec}g"), vec![FormatArg::Float(v)]);
            if !text.contains('e') && text.contains('.') {
                assert!(!text.ends_with('0'), "{v} at {prec}: {text}");
                assert!(!text.ends_with('.'), "{v} at {prec}: {text}");
            }
        }
    }
}

#[test]
fn missing_argument_reports_einval() {
    let err = sprintf(b"%d", Vec::<FormatArg>::new()).unwrap_err();
    assert_eq!(err, PrintfError::MissingArg(0));
    assert_eq!(err.errno(), errno::EINVAL);
    assert_eq!(errno::get_errno(), errno::EINVAL);
}

#[test]
fn negative_star_width_left_justifies() {
    let out = render("[%*d]", vec![FormatArg::SignedInt(-5), FormatArg::SignedInt(12)]);
    assert_eq!(out, "[12   ]");
}

#[test]
fn snprintf_null_measures_without_writing() {
    let n = snprintf(None, b"%s-%05d", [FormatArg::Str(Some(b"abc")), FormatArg::SignedInt(7)]).unwrap();
    assert_eq!(n, 9);
}

#[test]
fn count_directive_sees_prior_output() {
    let pos = Cell::new(0);
    let out = render(
        "%5s%n!",
        vec![FormatArg::Str(Some(b"ab")), FormatArg::Count(&pos)],
    );
    assert_eq!(out, "   ab!");
    assert_eq!(pos.get(), 5);
}
