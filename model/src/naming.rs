use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ADJECTIVES: &[&str] = &[
    "amazing", "beautiful", "bright", "calm", "clever", "curious", "exciting", "fabulous",
    "ferocious", "gentle", "hilarious", "joyful", "kind", "lively", "nervous", "quiet",
    "scrumptious", "unique", "wonderful", "zealous",
];

const NOUNS: &[&str] = &[
    "badger", "creature", "dinosaur", "gopher", "hideout", "mountain", "monster", "outfit",
    "painting", "party", "rainbow", "river", "sculpture", "sheepdog", "sparrow", "sunset",
    "tornado", "unicorn", "wardrobe", "wolf",
];

/// The outcome of combining the `--name` flag with the optional positional name argument.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NameResolution {
    /// Neither was given, a name must be generated.
    Generated,
    /// Exactly one was given.
    Provided(String),
    /// Both were given.
    Conflict,
}

/// Combines the `--name` flag value and the positional argument. Both empty generates a name,
/// exactly one non-empty uses it, and both non-empty is a conflict even when they are equal.
pub fn resolve_name(flag: &str, arg: &str) -> NameResolution {
    match (flag.trim(), arg.trim()) {
        ("", "") => NameResolution::Generated,
        (name, "") | ("", name) => NameResolution::Provided(name.to_string()),
        _ => NameResolution::Conflict,
    }
}

/// Generates cluster and node group names. The words are drawn from a generator seeded with
/// `seed`, so a fixed seed and timestamp give reproducible names.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NameGenerator {
    seed: u64,
    timestamp: i64,
}

impl NameGenerator {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn from_entropy() -> Self {
        Self::from_seed(rand::random())
    }

    /// Uses `timestamp` as the suffix of cluster names instead of the current time.
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// A name such as `calm-sculpture-1533287046`.
    pub fn cluster_name(&self) -> String {
        let mut rng = StdRng::seed_from_u64(self.seed);
        format!(
            "{}-{}-{}",
            ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())],
            NOUNS[rng.gen_range(0..NOUNS.len())],
            self.timestamp
        )
    }

    /// A name such as `ng-1a2b3c4d`.
    pub fn node_group_name(&self) -> String {
        let mut rng = StdRng::seed_from_u64(!self.seed);
        format!("ng-{:08x}", rng.gen::<u32>())
    }
}
