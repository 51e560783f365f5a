//! Geographic state inference from external zone names
//!
//! External zones carry free-text names such as "Lagos Island Zone 3" or
//! "ZN-Akwa Ibom/Uyo". The inference here is a best-effort word match
//! against the fixed set of known states and is never authoritative.

/// States a bin may be assigned to
pub const KNOWN_STATES: [&str; 37] = [
    "Abia",
    "Adamawa",
    "Akwa Ibom",
    "Anambra",
    "Bauchi",
    "Bayelsa",
    "Benue",
    "Borno",
    "Cross River",
    "Delta",
    "Ebonyi",
    "Edo",
    "Ekiti",
    "Enugu",
    "FCT",
    "Gombe",
    "Imo",
    "Jigawa",
    "Kaduna",
    "Kano",
    "Katsina",
    "Kebbi",
    "Kogi",
    "Kwara",
    "Lagos",
    "Nasarawa",
    "Niger",
    "Ogun",
    "Ondo",
    "Osun",
    "Oyo",
    "Plateau",
    "Rivers",
    "Sokoto",
    "Taraba",
    "Yobe",
    "Zamfara",
];

/// Alternate spellings that map onto a known state
const ALIASES: [(&str, &str); 3] = [("abuja", "FCT"), ("nassarawa", "Nasarawa"), ("calabar", "Cross River")];

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && haystack
            .windows(needle.len())
            .any(|window| window == needle)
}

/// Match a zone name against known states
///
/// Multi-word states are tried first and whole words are required, so
/// "Nigeria" never matches "Niger".
pub fn infer_state(zone_name: &str) -> Option<&'static str> {
    let zone_words = words(zone_name);
    if zone_words.is_empty() {
        return None;
    }

    let mut candidates: Vec<&'static str> = KNOWN_STATES.to_vec();
    candidates.sort_by_key(|s| std::cmp::Reverse(s.split(' ').count()));

    candidates
        .into_iter()
        .find(|state| contains_sequence(&zone_words, &words(state)))
        .or_else(|| {
            ALIASES
                .iter()
                .find(|(alias, _)| zone_words.iter().any(|w| w == alias))
                .map(|(_, state)| *state)
        })
}

/// Canonical spelling of a state name, if it is one of the known states
pub fn normalize_state(name: &str) -> Option<&'static str> {
    let wanted = name.trim().to_lowercase();
    KNOWN_STATES
        .iter()
        .find(|s| s.to_lowercase() == wanted)
        .copied()
}
