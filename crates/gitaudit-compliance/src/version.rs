//! Minimal semver-shaped comparison for the `outdated` classification:
//! dotted numeric components compared left to right, a shorter version
//! padded with zeros. Malformed components sort as 0.

fn components(version: &str) -> Vec<u64> {
    version.split('.').map(|part| part.parse().unwrap_or(0)).collect()
}

pub fn is_older(actual: &str, required: &str) -> bool {
    let actual = components(actual);
    let required = components(required);
    let len = actual.len().max(required.len());
    for i in 0..len {
        let a = actual.get(i).copied().unwrap_or(0);
        let r = required.get(i).copied().unwrap_or(0);
        if a != r {
            return a < r;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_version_behind_is_older() {
        assert!(is_older("1.2.0", "1.2.3"));
    }

    #[test]
    fn equal_versions_are_not_older() {
        assert!(!is_older("2.0.0", "2.0.0"));
    }

    #[test]
    fn newer_major_is_not_older() {
        assert!(!is_older("3.0.0", "2.9.9"));
    }
}
