//! Breed canonicalization.
//!
//! Maps free-form breed text from source sites onto a canonical breed name,
//! a breed group, and a confidence score. Mix detection pulls the primary
//! breed out of phrases like "Lab Mix" so mixed dogs remain searchable by
//! their dominant breed.

/// Broad classification used for grouping and faceting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreedGroup {
    Sporting,
    Hound,
    Working,
    Terrier,
    Toy,
    NonSporting,
    Herding,
    Guardian,
    Mixed,
    Unknown,
}

impl BreedGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreedGroup::Sporting => "Sporting",
            BreedGroup::Hound => "Hound",
            BreedGroup::Working => "Working",
            BreedGroup::Terrier => "Terrier",
            BreedGroup::Toy => "Toy",
            BreedGroup::NonSporting => "Non-Sporting",
            BreedGroup::Herding => "Herding",
            BreedGroup::Guardian => "Guardian",
            BreedGroup::Mixed => "Mixed",
            BreedGroup::Unknown => "Unknown",
        }
    }
}

/// Result of canonicalizing one breed string.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizedBreed {
    pub name: String,
    pub group: BreedGroup,
    /// Dominant breed for mixes ("Lab Mix" -> "Labrador Retriever").
    pub primary: Option<String>,
    pub confidence: f64,
}

const EXACT_CONFIDENCE: f64 = 1.0;
const PARTIAL_CONFIDENCE: f64 = 0.9;
const MIX_CONFIDENCE: f64 = 0.8;
const UNKNOWN_MIX_CONFIDENCE: f64 = 0.5;
const UNKNOWN_CONFIDENCE: f64 = 0.4;

/// Known breeds: lowercase match key, canonical name, group.
///
/// Aliases share a canonical name; the key only needs to be what sources
/// actually write. Extend freely; order matters only for substring matches
/// (first hit wins), so put longer keys before their prefixes.
const BREEDS: &[(&str, &str, BreedGroup)] = &[
    ("labrador retriever", "Labrador Retriever", BreedGroup::Sporting),
    ("labrador", "Labrador Retriever", BreedGroup::Sporting),
    ("lab", "Labrador Retriever", BreedGroup::Sporting),
    ("golden retriever", "Golden Retriever", BreedGroup::Sporting),
    ("cocker spaniel", "Cocker Spaniel", BreedGroup::Sporting),
    ("english setter", "English Setter", BreedGroup::Sporting),
    ("pointer", "Pointer", BreedGroup::Sporting),
    ("german shepherd", "German Shepherd", BreedGroup::Herding),
    ("gsd", "German Shepherd", BreedGroup::Herding),
    ("border collie", "Border Collie", BreedGroup::Herding),
    ("collie", "Collie", BreedGroup::Herding),
    ("belgian malinois", "Belgian Malinois", BreedGroup::Herding),
    ("australian shepherd", "Australian Shepherd", BreedGroup::Herding),
    ("corgi", "Pembroke Welsh Corgi", BreedGroup::Herding),
    ("jack russell terrier", "Jack Russell Terrier", BreedGroup::Terrier),
    ("jack russell", "Jack Russell Terrier", BreedGroup::Terrier),
    ("staffordshire bull terrier", "Staffordshire Bull Terrier", BreedGroup::Terrier),
    ("staffy", "Staffordshire Bull Terrier", BreedGroup::Terrier),
    ("bull terrier", "Bull Terrier", BreedGroup::Terrier),
    ("fox terrier", "Fox Terrier", BreedGroup::Terrier),
    ("patterdale terrier", "Patterdale Terrier", BreedGroup::Terrier),
    ("terrier", "Terrier", BreedGroup::Terrier),
    ("kangal", "Kangal", BreedGroup::Guardian),
    ("anatolian shepherd dog", "Anatolian Shepherd", BreedGroup::Guardian),
    ("anatolian shepherd", "Anatolian Shepherd", BreedGroup::Guardian),
    ("great pyrenees", "Great Pyrenees", BreedGroup::Guardian),
    ("caucasian shepherd", "Caucasian Shepherd", BreedGroup::Guardian),
    ("maremma", "Maremma Sheepdog", BreedGroup::Guardian),
    ("akbash", "Akbash", BreedGroup::Guardian),
    ("beagle", "Beagle", BreedGroup::Hound),
    ("greyhound", "Greyhound", BreedGroup::Hound),
    ("galgo", "Galgo Espanol", BreedGroup::Hound),
    ("podenco", "Podenco", BreedGroup::Hound),
    ("lurcher", "Lurcher", BreedGroup::Hound),
    ("dachshund", "Dachshund", BreedGroup::Hound),
    ("basset hound", "Basset Hound", BreedGroup::Hound),
    ("hound", "Hound", BreedGroup::Hound),
    ("rottweiler", "Rottweiler", BreedGroup::Working),
    ("doberman", "Doberman Pinscher", BreedGroup::Working),
    ("boxer", "Boxer", BreedGroup::Working),
    ("husky", "Siberian Husky", BreedGroup::Working),
    ("siberian husky", "Siberian Husky", BreedGroup::Working),
    ("malamute", "Alaskan Malamute", BreedGroup::Working),
    ("great dane", "Great Dane", BreedGroup::Working),
    ("mastiff", "Mastiff", BreedGroup::Working),
    ("cane corso", "Cane Corso", BreedGroup::Working),
    ("st bernard", "Saint Bernard", BreedGroup::Working),
    ("saint bernard", "Saint Bernard", BreedGroup::Working),
    ("chihuahua", "Chihuahua", BreedGroup::Toy),
    ("pomeranian", "Pomeranian", BreedGroup::Toy),
    ("yorkshire terrier", "Yorkshire Terrier", BreedGroup::Toy),
    ("yorkie", "Yorkshire Terrier", BreedGroup::Toy),
    ("maltese", "Maltese", BreedGroup::Toy),
    ("shih tzu", "Shih Tzu", BreedGroup::Toy),
    ("pug", "Pug", BreedGroup::Toy),
    ("cavalier king charles", "Cavalier King Charles Spaniel", BreedGroup::Toy),
    ("poodle", "Poodle", BreedGroup::NonSporting),
    ("bulldog", "Bulldog", BreedGroup::NonSporting),
    ("french bulldog", "French Bulldog", BreedGroup::NonSporting),
    ("dalmatian", "Dalmatian", BreedGroup::NonSporting),
    ("chow chow", "Chow Chow", BreedGroup::NonSporting),
    ("shar pei", "Shar Pei", BreedGroup::NonSporting),
    ("akita", "Akita", BreedGroup::Working),
];

/// Canonicalize a raw breed string.
///
/// Deterministic and idempotent: feeding a canonical name back in returns
/// the same value at exact-match confidence or better.
pub fn standardize_breed(raw: &str) -> StandardizedBreed {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return StandardizedBreed {
            name: "Unknown".to_string(),
            group: BreedGroup::Unknown,
            primary: None,
            confidence: UNKNOWN_CONFIDENCE,
        };
    }

    let key = trimmed.to_lowercase();

    if is_mix(&key) {
        return standardize_mix(&key);
    }

    // Exact table hit
    if let Some((_, canonical, group)) = BREEDS.iter().find(|(k, _, _)| *k == key) {
        let exact = canonical.to_lowercase() == key;
        return StandardizedBreed {
            name: (*canonical).to_string(),
            group: *group,
            primary: None,
            confidence: if exact { EXACT_CONFIDENCE } else { PARTIAL_CONFIDENCE },
        };
    }

    // Substring hit in either direction ("labrador cross breed" / "retriever")
    if let Some((_, canonical, group)) = BREEDS
        .iter()
        .find(|(k, _, _)| key.contains(k) || k.contains(key.as_str()))
    {
        return StandardizedBreed {
            name: (*canonical).to_string(),
            group: *group,
            primary: None,
            confidence: PARTIAL_CONFIDENCE,
        };
    }

    StandardizedBreed {
        name: title_case(trimmed),
        group: BreedGroup::Unknown,
        primary: None,
        confidence: UNKNOWN_CONFIDENCE,
    }
}

fn is_mix(key: &str) -> bool {
    key.contains("mix") || key.contains("cross") || key.contains("mongrel")
}

fn standardize_mix(key: &str) -> StandardizedBreed {
    // Strip mix markers, then see whether what remains names a breed
    let stripped = key
        .replace("mixed breed", "")
        .replace("mixed", "")
        .replace("mix", "")
        .replace("crossbreed", "")
        .replace("cross", "")
        .replace("mongrel", "")
        .trim()
        .to_string();

    if !stripped.is_empty()
        && let Some((_, canonical, _)) = BREEDS
            .iter()
            .find(|(k, _, _)| *k == stripped || stripped.contains(k))
    {
        return StandardizedBreed {
            name: format!("{canonical} Mix"),
            group: BreedGroup::Mixed,
            primary: Some((*canonical).to_string()),
            confidence: MIX_CONFIDENCE,
        };
    }

    StandardizedBreed {
        name: "Mixed Breed".to_string(),
        group: BreedGroup::Mixed,
        primary: None,
        confidence: UNKNOWN_MIX_CONFIDENCE,
    }
}

/// Title-case each word of an unrecognized breed so source casing noise
/// ("GERMAN SHEPHERD DOG") does not leak into the store.
pub fn title_case(raw: &str) -> String {
    raw.split_whitespace()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_full_confidence() {
        let result = standardize_breed("Labrador Retriever");
        assert_eq!(result.name, "Labrador Retriever");
        assert_eq!(result.group, BreedGroup::Sporting);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_alias_match() {
        let result = standardize_breed("labrador");
        assert_eq!(result.name, "Labrador Retriever");
        assert!(result.confidence >= 0.9);
    }

    #[test]
    fn test_jack_russell_variations() {
        let result = standardize_breed("Jack Russell");
        assert_eq!(result.name, "Jack Russell Terrier");
        assert_eq!(result.group, BreedGroup::Terrier);
        assert!(result.confidence > 0.8);
    }

    #[test]
    fn test_guardian_breeds() {
        let kangal = standardize_breed("kangal");
        assert_eq!(kangal.name, "Kangal");
        assert_eq!(kangal.group, BreedGroup::Guardian);
        assert!(kangal.confidence > 0.9);

        let anatolian = standardize_breed("Anatolian Shepherd Dog");
        assert_eq!(anatolian.name, "Anatolian Shepherd");
        assert_eq!(anatolian.group, BreedGroup::Guardian);
    }

    #[test]
    fn test_case_normalization() {
        let result = standardize_breed("GERMAN SHEPHERD");
        assert_eq!(result.name, "German Shepherd");
        assert_eq!(result.group, BreedGroup::Herding);
    }

    #[test]
    fn test_known_mix_extracts_primary() {
        let result = standardize_breed("Lab Mix");
        assert_eq!(result.name, "Labrador Retriever Mix");
        assert_eq!(result.group, BreedGroup::Mixed);
        assert_eq!(result.primary.as_deref(), Some("Labrador Retriever"));
        assert!(result.confidence >= 0.8);
    }

    #[test]
    fn test_terrier_mix() {
        let result = standardize_breed("terrier MIX");
        assert_eq!(result.name, "Terrier Mix");
        assert_eq!(result.group, BreedGroup::Mixed);
        assert_eq!(result.primary.as_deref(), Some("Terrier"));
    }

    #[test]
    fn test_unknown_mix_low_confidence() {
        let result = standardize_breed("Unknown Mix");
        assert_eq!(result.name, "Mixed Breed");
        assert_eq!(result.group, BreedGroup::Mixed);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_unrecognized_breed_title_cased() {
        let result = standardize_breed("turkish street dog");
        assert_eq!(result.name, "Turkish Street Dog");
        assert_eq!(result.group, BreedGroup::Unknown);
        assert!(result.confidence < 0.5);
    }

    #[test]
    fn test_empty_breed_defaults() {
        let result = standardize_breed("   ");
        assert_eq!(result.name, "Unknown");
        assert_eq!(result.group, BreedGroup::Unknown);
    }

    #[test]
    fn test_idempotent() {
        for raw in ["labrador", "Lab Mix", "Unknown Mix", "street special", "KANGAL"] {
            let once = standardize_breed(raw);
            let twice = standardize_breed(&once.name);
            assert_eq!(once.name, twice.name, "breed name not stable for {raw}");
            assert_eq!(once.group, twice.group, "breed group not stable for {raw}");
        }
    }
}
