//! Sampler seed selection.

use crate::variants::SeedPolicy;

/// Seeds are kept below this bound (2^31 - 1).
pub const SEED_MODULUS: i64 = 2_147_483_647;

/// Derive a seed from the current wall-clock time in milliseconds.
pub fn derive_seed() -> i64 {
    derive_seed_from_millis(chrono::Utc::now().timestamp_millis())
}

/// `millis mod (2^31 - 1)`, always non-negative.
pub fn derive_seed_from_millis(millis: i64) -> i64 {
    millis.rem_euclid(SEED_MODULUS)
}

/// Pick the seed for a request.
///
/// A caller seed is used verbatim when it parses as an integer and the
/// policy allows it. `None`, the literal string `"None"`, and any
/// non-numeric input fall back to a derived seed.
pub fn resolve_seed(raw: Option<&str>, policy: SeedPolicy) -> i64 {
    if policy == SeedPolicy::AlwaysDerived {
        return derive_seed();
    }
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() && s != "None" => match s.parse::<i64>() {
            Ok(seed) => seed,
            Err(_) => {
                let seed = derive_seed();
                tracing::info!(raw = %s, seed, "Invalid seed value, using derived seed");
                seed
            }
        },
        _ => derive_seed(),
    }
}
