//! Built-in population table (millions) used for per-million scaling.

use crate::domain::Location;

/// Population in millions for the countries the tool charts out of the box.
pub const POPULATIONS: [(&str, f64); 15] = [
    ("Serbia", 6.93),
    ("Croatia", 4.05),
    ("Slovenia", 2.08),
    ("Bosnia and Herzegovina", 3.28),
    ("Montenegro", 0.63),
    ("North Macedonia", 2.08),
    ("Hungary", 9.66),
    ("Romania", 19.24),
    ("Bulgaria", 6.95),
    ("Greece", 10.42),
    ("Italy", 60.46),
    ("Germany", 83.78),
    ("Sweden", 10.10),
    ("United Kingdom", 67.89),
    ("United States", 331.00),
];

/// Countries charted when none are requested.
pub const DEFAULT_COUNTRIES: [&str; 4] = ["Serbia", "Croatia", "Slovenia", "Hungary"];

/// Case-insensitive lookup in [`POPULATIONS`].
pub fn population_for(name: &str) -> Option<f64> {
    POPULATIONS
        .iter()
        .find(|(country, _)| country.eq_ignore_ascii_case(name.trim()))
        .map(|(_, pop)| *pop)
}

/// Resolve country names to [`Location`]s.
///
/// `overrides` take precedence over the built-in table. Unknown countries get a
/// population of `0.0`, which makes per-million metrics render as gaps.
pub fn resolve_locations(names: &[String], overrides: &[(String, f64)]) -> Vec<Location> {
    names
        .iter()
        .map(|name| {
            let name = name.trim();
            let pop = overrides
                .iter()
                .find(|(country, _)| country.eq_ignore_ascii_case(name))
                .map(|(_, pop)| *pop)
                .or_else(|| population_for(name))
                .unwrap_or(0.0);
            let canonical = POPULATIONS
                .iter()
                .find(|(country, _)| country.eq_ignore_ascii_case(name))
                .map(|(country, _)| country.to_string())
                .unwrap_or_else(|| name.to_string());
            Location::new(canonical, pop)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(population_for("serbia"), Some(6.93));
        assert_eq!(population_for("Atlantis"), None);
    }

    #[test]
    fn overrides_win_and_names_are_canonical() {
        let names = vec!["croatia".to_string(), "Atlantis".to_string()];
        let overrides = vec![("Atlantis".to_string(), 1.5)];
        let locations = resolve_locations(&names, &overrides);

        assert_eq!(locations[0], Location::new("Croatia", 4.05));
        assert_eq!(locations[1], Location::new("Atlantis", 1.5));
    }
}
