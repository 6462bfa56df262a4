//! Location codes for job boards that address places by identifier
//!
//! Lookup is case-insensitive on the trimmed name. A name that is not a
//! known city is tried as a country; anything else passes through with no
//! code so the scraper can still use the literal text.

use crate::models::CityTarget;

/// City name (lowercase) to board city id. Aliases map to the same id.
static CITY_CODES: &[(&str, &str)] = &[
    ("mumbai", "134"),
    ("bombay", "134"),
    ("navi mumbai", "137"),
    ("thane", "140"),
    ("delhi", "9"),
    ("new delhi", "9"),
    ("delhi ncr", "9"),
    ("noida", "226"),
    ("greater noida", "225"),
    ("gurgaon", "73"),
    ("gurugram", "73"),
    ("faridabad", "72"),
    ("ghaziabad", "74"),
    ("bangalore", "97"),
    ("bengaluru", "97"),
    ("hyderabad", "17"),
    ("secunderabad", "17"),
    ("chennai", "183"),
    ("madras", "183"),
    ("pune", "139"),
    ("kolkata", "232"),
    ("calcutta", "232"),
    ("ahmedabad", "9508"),
    ("gandhinagar", "9509"),
    ("vadodara", "9513"),
    ("surat", "9512"),
    ("jaipur", "9592"),
    ("chandigarh", "6"),
    ("mohali", "9621"),
    ("lucknow", "229"),
    ("kochi", "9527"),
    ("cochin", "9527"),
    ("thiruvananthapuram", "9532"),
    ("trivandrum", "9532"),
    ("coimbatore", "184"),
    ("indore", "9548"),
    ("bhopal", "9546"),
    ("nagpur", "135"),
    ("nashik", "136"),
    ("visakhapatnam", "23"),
    ("vizag", "23"),
    ("bhubaneswar", "9583"),
    ("mangalore", "102"),
    ("mysore", "103"),
    ("mysuru", "103"),
    ("goa", "9504"),
    ("dubai", "10023"),
    ("abu dhabi", "10022"),
    ("doha", "10029"),
    ("riyadh", "10028"),
    ("singapore", "10036"),
];

/// Country name (lowercase) to board location id
static COUNTRY_CODES: &[(&str, &str)] = &[
    ("india", "100"),
    ("united arab emirates", "10019"),
    ("uae", "10019"),
    ("qatar", "10026"),
    ("saudi arabia", "10027"),
    ("oman", "10025"),
    ("kuwait", "10024"),
    ("bahrain", "10021"),
    ("singapore", "10036"),
    ("malaysia", "10034"),
    ("united kingdom", "10045"),
    ("uk", "10045"),
    ("united states", "10046"),
    ("usa", "10046"),
    ("canada", "10040"),
    ("australia", "10038"),
    ("germany", "10042"),
];

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, code)| *code)
}

/// Resolve a single city name
pub fn resolve_city(name: &str) -> CityTarget {
    let trimmed = name.trim();
    let key = trimmed.to_lowercase();

    let code = lookup(CITY_CODES, &key).or_else(|| lookup(COUNTRY_CODES, &key));
    if code.is_none() {
        tracing::debug!(city = %trimmed, "No location code for city, passing name through");
    }

    CityTarget {
        name: trimmed.to_string(),
        code: code.map(str::to_string),
    }
}

/// Resolve a requested city list, dropping blanks and repeated names
pub fn resolve_cities(names: &[String]) -> Vec<CityTarget> {
    let mut resolved: Vec<CityTarget> = Vec::with_capacity(names.len());
    for name in names.iter().filter(|name| !name.trim().is_empty()) {
        let target = resolve_city(name);
        if !resolved
            .iter()
            .any(|existing| existing.name.eq_ignore_ascii_case(&target.name))
        {
            resolved.push(target);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_lookup_ignores_case_and_whitespace() {
        assert_eq!(resolve_city("Mumbai").code.as_deref(), Some("134"));
        assert_eq!(resolve_city("  mUMBAI ").code.as_deref(), Some("134"));
        assert_eq!(resolve_city("  mUMBAI ").name, "mUMBAI");
    }

    #[test]
    fn test_aliases_share_code() {
        assert_eq!(resolve_city("Bengaluru").code, resolve_city("Bangalore").code);
        assert_eq!(resolve_city("Gurugram").code, resolve_city("gurgaon").code);
    }

    #[test]
    fn test_country_fallback() {
        assert_eq!(resolve_city("Qatar").code.as_deref(), Some("10026"));
        assert_eq!(resolve_city("UAE").code.as_deref(), Some("10019"));
    }

    #[test]
    fn test_unknown_city_passes_through() {
        let target = resolve_city("Atlantis");
        assert_eq!(target.name, "Atlantis");
        assert_eq!(target.code, None);
    }

    #[test]
    fn test_list_drops_blanks_and_repeats() {
        let cities = vec![
            "Pune".to_string(),
            " ".to_string(),
            "pune".to_string(),
            "Atlantis".to_string(),
        ];
        let resolved = resolve_cities(&cities);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].code.as_deref(), Some("139"));
        assert_eq!(resolved[1].code, None);
    }
}
