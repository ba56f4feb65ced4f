//! Deterministic synthetic replacement values.
//!
//! The synthetic strategy swaps a detected value for a realistic fake of
//! the same type so the model keeps semantic context. Generation is
//! deterministic per (entity type, index): the same slot in the same
//! mapping always produces the same fake, which keeps repeated
//! occurrences consistent without storing generator state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

const FIRST_NAMES: &[&str] = &[
    "Alex", "Jordan", "Morgan", "Casey", "Riley", "Taylor", "Avery", "Quinn", "Rowan", "Emerson",
    "Hayden", "Parker", "Reese", "Sawyer", "Finley", "Dakota",
];

const LAST_NAMES: &[&str] = &[
    "Reed", "Hayes", "Brooks", "Lane", "Carter", "Monroe", "Ellis", "Harper", "Sloane", "Mercer",
    "Whitaker", "Langley", "Foster", "Hollis", "Marsh", "Kellan",
];

const EMAIL_DOMAINS: &[&str] = &[
    "example.com", "example.org", "mail.example.net", "inbox.example.io",
];

/// Generate a fake value of the given entity type for placeholder slot
/// `index`.
pub fn generate(entity_type: &str, index: u32) -> String {
    let mut rng = seeded_rng(entity_type, index);
    match entity_type {
        "PERSON" => {
            let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
            let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
            format!("{} {}", first, last)
        }
        "EMAIL" => {
            let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())].to_lowercase();
            let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())].to_lowercase();
            let domain = EMAIL_DOMAINS[rng.gen_range(0..EMAIL_DOMAINS.len())];
            format!("{}.{}@{}", first, last, domain)
        }
        "PHONE" => {
            // 555 exchange keeps fakes out of the real numbering plan.
            format!("+1-555-{:03}-{:04}", rng.gen_range(100..1000), rng.gen_range(0..10000))
        }
        "IP" => format!(
            "192.0.2.{}",
            // TEST-NET-1 block, reserved for documentation.
            rng.gen_range(1..255)
        ),
        _ => {
            let suffix: u32 = rng.gen_range(1000..10000);
            format!("{}-{}", entity_type.to_lowercase(), suffix)
        }
    }
}

fn seeded_rng(entity_type: &str, index: u32) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(entity_type.as_bytes());
    hasher.update(index.to_le_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    StdRng::seed_from_u64(u64::from_le_bytes(seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic_per_slot() {
        assert_eq!(generate("PERSON", 1), generate("PERSON", 1));
        assert_eq!(generate("EMAIL", 3), generate("EMAIL", 3));
    }

    #[test]
    fn different_slots_differ() {
        assert_ne!(generate("PERSON", 1), generate("PERSON", 2));
    }

    #[test]
    fn email_fake_looks_like_an_email() {
        let fake = generate("EMAIL", 1);
        assert!(fake.contains('@'));
        assert!(fake.contains('.'));
    }

    #[test]
    fn phone_fake_uses_reserved_exchange() {
        assert!(generate("PHONE", 1).starts_with("+1-555-"));
    }

    #[test]
    fn unknown_type_gets_generic_token() {
        let fake = generate("PROJECT", 2);
        assert!(fake.starts_with("project-"));
    }
}
