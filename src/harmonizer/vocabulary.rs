//! Canonical vocabulary for free-text categorical fields.
//!
//! Customers spell the same industry a dozen ways; these tables map the
//! known spellings onto one canonical label.

/// Known industry spellings and their canonical forms, matched
/// case-insensitively.
const INDUSTRY_CANON: &[(&str, &str)] = &[
    ("tech", "Technology"),
    ("technology", "Technology"),
    ("it", "Technology"),
    ("information technology", "Technology"),
    ("healthcare", "Healthcare"),
    ("health", "Healthcare"),
    ("medical", "Healthcare"),
    ("finance", "Financial Services"),
    ("financial", "Financial Services"),
    ("financial services", "Financial Services"),
    ("banking", "Financial Services"),
    ("retail", "Retail"),
    ("manufacturing", "Manufacturing"),
    ("mfg", "Manufacturing"),
    ("education", "Education"),
    ("edu", "Education"),
    ("government", "Government"),
    ("gov", "Government"),
    ("public sector", "Government"),
];

/// Map an industry label onto its canonical form. Unknown labels are
/// title-cased rather than rejected.
pub fn normalize_industry(raw: &str) -> String {
    let needle = raw.trim().to_lowercase();
    for (spelling, canonical) in INDUSTRY_CANON {
        if *spelling == needle {
            return (*canonical).to_string();
        }
    }
    title_case(raw.trim())
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
