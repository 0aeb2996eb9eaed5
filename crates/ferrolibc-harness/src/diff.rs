//! Diff rendering for fixture comparison.

/// Render a line diff between expected and actual output.
#[must_use]
pub fn render_diff(expected: &str, actual: &str) -> String {
    if expected == actual {
        return String::from("[identical]");
    }

    let expected: Vec<&str> = expected.lines().collect();
    let actual: Vec<&str> = actual.lines().collect();
    let mut out = String::new();
    out.push_str("--- expected\n");
    out.push_str("+++ actual\n");
    for i in 0..expected.len().max(actual.len()) {
        let (e, a) = (expected.get(i), actual.get(i));
        if e == a {
            continue;
        }
        out.push_str(&format!("@@ line {} @@\n", i + 1));
        if let Some(e) = e {
            out.push_str(&format!("-{e}\n"));
        }
        if let Some(a) = a {
            out.push_str(&format!("+{a}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs() {
        assert_eq!(render_diff("a\nb", "a\nb"), "[identical]");
    }

    #[test]
    fn reports_changed_and_extra_lines() {
        let diff = render_diff("a\nb", "a\nc\nd");
        assert_eq!(diff, "--- expected\n+++ actual\n@@ line 2 @@\n-b\n+c\n@@ line 3 @@\n+d\n");
    }
}
