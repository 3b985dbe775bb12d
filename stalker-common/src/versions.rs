//! Game version bookkeeping. Patches are compared by their
//! `major.minor` prefix; match results report a longer build string.

/// The `major.minor` prefix of a version string.
pub fn major_minor(semver: &str) -> String {
    semver.split('.').take(2).collect::<Vec<_>>().join(".")
}

/// The first known version whose `major.minor` matches the one reported in
/// a match result.
pub fn find_matching<'a>(known: &'a [String], game_version: &str) -> Option<&'a str> {
    let wanted = major_minor(game_version);
    known
        .iter()
        .find(|candidate| major_minor(candidate) == wanted)
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_of_long_build_strings() {
        assert_eq!(major_minor("8.24.254.2245"), "8.24");
        assert_eq!(major_minor("8.24.1"), "8.24");
        assert_eq!(major_minor("8"), "8");
    }

    #[test]
    fn matches_on_major_minor() {
        let known = vec!["8.23.1".to_string(), "8.24.1".to_string()];
        assert_eq!(find_matching(&known, "8.24.254.2245"), Some("8.24.1"));
        assert_eq!(find_matching(&known, "9.1.1"), None);
    }
}
