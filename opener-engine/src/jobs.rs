//! Numeric job code table
//!
//! Hosts report a combatant's job as a number; the catalog is keyed by the
//! three-letter abbreviation.

/// (code, abbreviation) for every class and job the host can report
const JOBS: &[(u32, &str)] = &[
    (0, "ADV"),
    (1, "GLA"),
    (2, "PGL"),
    (3, "MRD"),
    (4, "LNC"),
    (5, "ARC"),
    (6, "CNJ"),
    (7, "THM"),
    (8, "CRP"),
    (9, "BSM"),
    (10, "ARM"),
    (11, "GSM"),
    (12, "LTW"),
    (13, "WVR"),
    (14, "ALC"),
    (15, "CUL"),
    (16, "MIN"),
    (17, "BTN"),
    (18, "FSH"),
    (19, "PLD"),
    (20, "MNK"),
    (21, "WAR"),
    (22, "DRG"),
    (23, "BRD"),
    (24, "WHM"),
    (25, "BLM"),
    (26, "ACN"),
    (27, "SMN"),
    (28, "SCH"),
    (29, "ROG"),
    (30, "NIN"),
    (31, "MCH"),
    (32, "DRK"),
    (33, "AST"),
    (34, "SAM"),
    (35, "RDM"),
    (36, "BLU"),
    (37, "GNB"),
    (38, "DNC"),
    (39, "RPR"),
    (40, "SGE"),
    (41, "VPR"),
    (42, "PCT"),
];

/// Resolve a numeric job code to its abbreviation
pub fn job_name(code: u32) -> Option<&'static str> {
    JOBS.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

/// Reverse lookup, case-insensitive
pub fn job_code(name: &str) -> Option<u32> {
    JOBS.iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(code, _)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lookup() {
        assert_eq!(job_name(21), Some("WAR"));
        assert_eq!(job_name(32), Some("DRK"));
        assert_eq!(job_name(3), Some("MRD"));
        assert_eq!(job_name(999), None);
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(job_code("war"), Some(21));
        assert_eq!(job_code("DRK"), Some(32));
        assert_eq!(job_code("XYZ"), None);
    }
}
