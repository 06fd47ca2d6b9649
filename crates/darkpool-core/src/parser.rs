//! `ads.txt` line parsing.
//!
//! Each data line is `ad-system domain, publisher account id, relationship[, ...]`.
//! Only DIRECT and RESELLER relationships are kept; everything else, including
//! lines with fewer than three fields, is dropped without error.

use crate::types::{Relationship, SellerKey, SellerSets};

/// Normalize an ad-system domain: lower-case with a leading `www.` removed.
pub fn normalize_domain(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

/// Parse a single line into its relationship and seller key.
pub fn parse_line(line: &str) -> Option<(Relationship, SellerKey)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 3 {
        return None;
    }

    let relationship = Relationship::from_token(&fields[2].to_uppercase())?;
    let domain = normalize_domain(fields[0]);
    Some((relationship, SellerKey::new(&domain, fields[1])))
}

/// Parse the lines of one site's `ads.txt` into DIRECT and RESELLER key sets.
pub fn parse_ads_txt<S: AsRef<str>>(lines: &[S]) -> SellerSets {
    let mut sets = SellerSets::default();
    for line in lines {
        match parse_line(line.as_ref()) {
            Some((Relationship::Direct, key)) => {
                sets.direct_raw += 1;
                sets.direct.insert(key);
            }
            Some((Relationship::Reseller, key)) => {
                sets.reseller_raw += 1;
                sets.reseller.insert(key);
            }
            None => {}
        }
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct_and_reseller() {
        let lines = [
            "google.com, pub-1, DIRECT, f08c47fec0942fa0",
            "appnexus.com, 42, RESELLER",
        ];
        let sets = parse_ads_txt(&lines);
        assert!(sets.direct.contains(&SellerKey("google.com#pub-1".to_string())));
        assert!(sets.reseller.contains(&SellerKey("appnexus.com#42".to_string())));
    }

    #[test]
    fn test_domain_is_normalized() {
        let (_, key) = parse_line("WWW.Google.COM , pub-9 , direct").unwrap();
        assert_eq!(key.0, "google.com#pub-9");
    }

    #[test]
    fn test_publisher_id_case_is_kept() {
        let (_, key) = parse_line("rubicon.com, AbC-12, DIRECT").unwrap();
        assert_eq!(key.0, "rubicon.com#AbC-12");
    }

    #[test]
    fn test_comments_blank_and_variables_skipped() {
        let lines = [
            "# ads.txt for example.com",
            "",
            "   ",
            "contact=ads@example.com",
            "subdomain=news.example.com",
        ];
        let sets = parse_ads_txt(&lines);
        assert!(sets.direct.is_empty());
        assert!(sets.reseller.is_empty());
    }

    #[test]
    fn test_unknown_relationship_dropped() {
        assert!(parse_line("google.com, pub-1, PARTNER").is_none());
        assert!(parse_line("google.com, pub-1, DIRECT # inline").is_none());
    }

    #[test]
    fn test_well_formed_and_malformed_mix() {
        // N distinct well-formed lines interleaved with M malformed ones.
        let mut lines = Vec::new();
        for i in 0..7 {
            lines.push(format!("ssp{i}.com, id-{i}, DIRECT"));
            lines.push(format!("broken{i}.com, only-two"));
        }
        for i in 0..5 {
            lines.push(format!("reseller{i}.com, r-{i}, RESELLER"));
            lines.push("just-one-field".to_string());
        }
        lines.reverse();

        let sets = parse_ads_txt(&lines);
        assert_eq!(sets.direct.len(), 7);
        assert_eq!(sets.reseller.len(), 5);
        assert_eq!(sets.direct_raw, 7);
        assert_eq!(sets.reseller_raw, 5);
    }

    #[test]
    fn test_duplicates_collapse_in_sets_but_count_raw() {
        let lines = ["a.com, 1, DIRECT", "a.com, 1, DIRECT", "www.a.com, 1, DIRECT"];
        let sets = parse_ads_txt(&lines);
        assert_eq!(sets.direct.len(), 1);
        assert_eq!(sets.direct_raw, 3);
    }
}
