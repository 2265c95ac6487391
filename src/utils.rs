use crate::schema::Language;
use num_format::{Locale, ToFormattedString};

fn locale_for(language: Language) -> &'static Locale {
    match language {
        Language::En => &Locale::en,
        Language::Es | Language::Both => &Locale::es,
    }
}

/// Whole-unit amount with the language's thousands separator, e.g. `1.250.000`.
pub fn format_amount(value: f64, language: Language) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_formatted_string(locale_for(language));
    if rounded < 0 {
        format!("-{}", digits)
    } else {
        digits
    }
}

pub fn format_signed_amount(value: f64, language: Language) -> String {
    let formatted = format_amount(value, language);
    if value.is_finite() && value.round() > 0.0 {
        format!("+{}", formatted)
    } else {
        formatted
    }
}

pub fn format_pct(pct: f64) -> String {
    format!("{:+.1}%", pct)
}

pub fn format_count(n: usize, language: Language) -> String {
    n.to_formatted_string(locale_for(language))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount_english() {
        assert_eq!(format_amount(1_234_567.4, Language::En), "1,234,567");
        assert_eq!(format_amount(-20_000.0, Language::En), "-20,000");
        assert_eq!(format_amount(0.0, Language::En), "0");
        assert_eq!(format_amount(f64::NAN, Language::En), "n/a");
    }

    #[test]
    fn test_format_amount_spanish_groups_digits() {
        assert_eq!(format_amount(1_250_000.0, Language::Es), "1.250.000");
        assert_eq!(format_amount(-20_000.0, Language::Es), "-20.000");
        assert_eq!(format_amount(999.0, Language::Es), "999");
        assert_eq!(format_count(12_000, Language::Both), "12.000");
    }

    #[test]
    fn test_signed_and_pct() {
        assert_eq!(format_signed_amount(50_000.0, Language::En), "+50,000");
        assert_eq!(format_signed_amount(-5.0, Language::En), "-5");
        assert_eq!(format_pct(50.0), "+50.0%");
        assert_eq!(format_pct(-12.345), "-12.3%");
        assert_eq!(format_count(12_000, Language::En), "12,000");
    }
}
