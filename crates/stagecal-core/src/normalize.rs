//! Free-text title canonicalization.
//!
//! Venue calendars tag the same performance with session qualifiers the
//! performer feed omits ("19:00の部", "第二部", "5月公演"), and mix fullwidth
//! and halfwidth characters freely. Folding both away gives the two sources
//! a common title to key on.
//!
//! The "19:00の部" and "第N部" tokens are unambiguous and strip wherever
//! they appear. Bare-digit ordinals ("2部") and month qualifiers ("5月公演")
//! also occur as ordinary title content, so they only strip as suffixes.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

fn session_time_re() -> &'static Regex {
    static SESSION_TIME_RE: OnceLock<Regex> = OnceLock::new();
    SESSION_TIME_RE
        .get_or_init(|| Regex::new(r"\s*\d{1,2}:\d{2}の部").expect("valid session time regex"))
}

fn session_ordinal_re() -> &'static Regex {
    static SESSION_ORDINAL_RE: OnceLock<Regex> = OnceLock::new();
    SESSION_ORDINAL_RE.get_or_init(|| {
        Regex::new(r"\s*(?:第[一二三四五六七八九十\d]+部|\d{1,2}部$)")
            .expect("valid session ordinal regex")
    })
}

fn month_qualifier_re() -> &'static Regex {
    static MONTH_QUALIFIER_RE: OnceLock<Regex> = OnceLock::new();
    MONTH_QUALIFIER_RE
        .get_or_init(|| Regex::new(r"\s*\d{1,2}月公演$").expect("valid month qualifier regex"))
}

/// Canonicalize an event title: NFKC-fold width/compatibility variants,
/// strip session and month qualifiers, trim surrounding whitespace.
///
/// Idempotent: `normalize_title(normalize_title(t)) == normalize_title(t)`.
/// Stripping runs to a fixpoint so qualifier removal can never uncover a
/// qualifier the first pass missed.
pub fn normalize_title(title: &str) -> String {
    let folded: String = title.nfkc().collect();
    let mut stripped = folded;
    loop {
        let next = strip_qualifiers(&stripped);
        if next == stripped {
            break;
        }
        stripped = next;
    }
    stripped.trim().to_string()
}

fn strip_qualifiers(title: &str) -> String {
    let title = session_time_re().replace_all(title, "");
    let title = session_ordinal_re().replace_all(&title, "");
    month_qualifier_re().replace_all(&title, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_session_time_marker() {
        assert_eq!(normalize_title("Live Show 19:00の部"), "Live Show");
    }

    #[test]
    fn folds_fullwidth_before_stripping() {
        // Fullwidth space, digits, and colon all fold under NFKC.
        assert_eq!(normalize_title("Live Show　１９：００の部"), "Live Show");
    }

    #[test]
    fn strips_ordinal_session_markers() {
        assert_eq!(normalize_title("真夏の公演会 第二部"), "真夏の公演会");
        assert_eq!(normalize_title("真夏の公演会　2部"), "真夏の公演会");
        assert_eq!(normalize_title("Live Show 第12部"), "Live Show");
    }

    #[test]
    fn keeps_ordinal_like_title_content() {
        // Kanji numerals without 第 and mid-title digit+部 runs are real
        // title text, not session markers.
        assert_eq!(normalize_title("新春三部作ライブ"), "新春三部作ライブ");
        assert_eq!(normalize_title("2部構成スペシャル"), "2部構成スペシャル");
    }

    #[test]
    fn strips_month_qualifier_suffix() {
        assert_eq!(normalize_title("漫才まつり 5月公演"), "漫才まつり");
    }

    #[test]
    fn keeps_mid_title_month_mentions() {
        assert_eq!(
            normalize_title("5月公演スペシャル対談"),
            "5月公演スペシャル対談"
        );
    }

    #[test]
    fn leaves_plain_titles_untouched() {
        for title in ["Live Show", "新ネタライブ", "Hall A Presents 2025"] {
            assert_eq!(normalize_title(title), title);
        }
    }

    #[test]
    fn is_idempotent() {
        let titles = [
            "Live Show　19:00の部",
            "真夏の公演会 第三部",
            "Live Show 第12部",
            "漫才まつり 12月公演",
            "新春三部作ライブ",
            "  padded  ",
            "ＦＵＬＬＷＩＤＴＨ",
            "素の題名",
        ];
        for title in titles {
            let once = normalize_title(title);
            assert_eq!(normalize_title(&once), once, "not idempotent for {title:?}");
        }
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(normalize_title("  Live Show  "), "Live Show");
    }
}
