// ==============================================================================
// petname.rs - Human Friendly Identifiers
// ==============================================================================
// Description: Random word identifiers for new samples and cases
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use rand::seq::SliceRandom;
use rand::Rng;

const ADVERBS: &[&str] = &[
    "able", "amply", "boldly", "briefly", "calmly", "closely", "deeply", "duly", "early",
    "easily", "fairly", "finally", "firmly", "freely", "fully", "gladly", "greatly",
    "happily", "highly", "jointly", "justly", "kindly", "largely", "lively", "loudly",
    "mainly", "merely", "mostly", "neatly", "newly", "nicely", "openly", "partly",
    "quickly", "quietly", "rapidly", "rarely", "really", "sadly", "safely", "sharply",
    "simply", "slowly", "smoothly", "solely", "surely", "swiftly", "truly", "vastly",
    "wholly", "widely", "wildly", "wisely",
];

const ADJECTIVES: &[&str] = &[
    "able", "active", "amused", "apt", "awake", "bold", "brave", "bright", "busy", "calm",
    "casual", "causal", "charmed", "civil", "clean", "clear", "clever", "cool", "crack",
    "cute", "daring", "dear", "decent", "driven", "eager", "easy", "equal", "exotic",
    "fair", "famous", "fast", "fine", "firm", "fit", "fleet", "fond", "frank", "free",
    "fresh", "game", "gentle", "giving", "glad", "golden", "grand", "great", "grumpy",
    "happy", "hardy", "helped", "heroic", "holy", "honest", "huge", "humble", "ideal",
    "intent", "just", "keen", "kind", "large", "lasting", "legal", "live", "lucky",
    "magnetic", "major", "mature", "merry", "mighty", "modest", "moral", "native", "neat",
    "noble", "normal", "novel", "open", "optimal", "patient", "pleased", "polite",
    "prompt", "proper", "proud", "pure", "quick", "quiet", "rapid", "rare", "ready",
    "regal", "relaxed", "rich", "robust", "safe", "sacred", "secure", "sharp", "simple",
    "smart", "smooth", "social", "solid", "sound", "special", "stable", "steady",
    "strong", "summary", "super", "sure", "sweet", "swift", "tender", "tidy", "topical",
    "tough", "trusty", "unified", "upward", "usable", "valid", "vital", "warm", "wanted",
    "whole", "wise", "witty",
];

const NAMES: &[&str] = &[
    "aardvark", "alpaca", "anemone", "ant", "ape", "badger", "bass", "bat", "bear",
    "beagle", "bee", "beetle", "bird", "bison", "boar", "bobcat", "buck", "bull",
    "calf", "camel", "cat", "cattle", "chicken", "chimp", "clam", "cobra", "cod",
    "colt", "condor", "crab", "crane", "cricket", "crow", "deer", "dingo", "dodo",
    "dog", "dolphin", "donkey", "dove", "drake", "duck", "eagle", "eel", "egret",
    "elk", "emu", "falcon", "ferret", "finch", "fish", "flea", "fly", "fowl", "fox",
    "frog", "gar", "gazelle", "gecko", "gelding", "gibbon", "giraffe", "gnat", "gnu",
    "goat", "goose", "gopher", "grouse", "gull", "hare", "hawk", "hen", "heron",
    "hog", "horse", "hound", "husky", "hyena", "ibex", "impala", "jackal", "jaguar",
    "jay", "kid", "kit", "kite", "koala", "krill", "lab", "lamb", "lark", "lemur",
    "lion", "llama", "lobster", "locust", "lynx", "macaw", "mako", "mammal", "mantis",
    "marlin", "marmot", "mink", "mite", "mole", "monkey", "moose", "moth", "mouse",
    "mule", "mustang", "newt", "ocelot", "orca", "oriole", "osprey", "owl", "ox",
    "oyster", "panda", "panther", "parrot", "pegasus", "pelican", "penguin", "pig",
    "pika", "pipefish", "polliwog", "pony", "poodle", "porpoise", "puma", "pup",
    "python", "quail", "rabbit", "raccoon", "ram", "raptor", "raven", "redbird",
    "reindeer", "rhino", "robin", "rodent", "rooster", "sailfish", "salmon", "seal",
    "shark", "sheep", "shiner", "shrew", "shrimp", "skink", "skunk", "sloth", "slug",
    "snail", "snake", "snipe", "sparrow", "squid", "stag", "starfish", "stallion",
    "stork", "sunbeam", "swan", "swift", "tahr", "tapir", "teal", "termite", "tiger",
    "toad", "treefrog", "trout", "tuna", "turkey", "turtle", "urchin", "viper",
    "vulture", "wahoo", "walleye", "walrus", "wasp", "weasel", "whale", "whippet",
    "wolf", "wombat", "worm", "wren", "yak", "zebra",
];

/// Generate a lower-case identifier of `words` concatenated words.
///
/// One word gives a name, two an adjective and a name, three or more prepend
/// adverbs.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, words: usize) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(words);

    for _ in 0..words.saturating_sub(2) {
        parts.push(pick(rng, ADVERBS));
    }
    if words >= 2 {
        parts.push(pick(rng, ADJECTIVES));
    }
    if words >= 1 {
        parts.push(pick(rng, NAMES));
    }

    parts.concat()
}

fn pick<R: Rng + ?Sized>(rng: &mut R, list: &'static [&'static str]) -> &'static str {
    list.choose(rng).copied().unwrap_or("unnamed")
}

/// Two-word identifier for a new case
pub fn case_name() -> String {
    generate(&mut rand::thread_rng(), 2)
}

/// Three-word identifier for a new sample
pub fn sample_name() -> String {
    generate(&mut rand::thread_rng(), 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_is_lowercase_alpha() {
        let mut rng = StdRng::seed_from_u64(7);
        for words in 1..=3 {
            let name = generate(&mut rng, words);
            assert!(!name.is_empty());
            assert!(name.chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_generate_ends_with_name() {
        let mut rng = StdRng::seed_from_u64(42);
        let name = generate(&mut rng, 2);
        assert!(NAMES.iter().any(|n| name.ends_with(n)));
    }

    #[test]
    fn test_zero_words_is_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(generate(&mut rng, 0), "");
    }

    #[test]
    fn test_seeded_output_is_reproducible() {
        let a = generate(&mut StdRng::seed_from_u64(99), 3);
        let b = generate(&mut StdRng::seed_from_u64(99), 3);
        assert_eq!(a, b);
    }
}
