use crate::base62::{self, ALPHABET};
use crate::clock::{Clock, SystemClock};
use crate::code::{Code, MAX_LENGTH, MIN_LENGTH};
use modular_bitfield::prelude::*;
use rand::Rng;
use std::sync::Mutex;

/// Default length of generated codes.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// A packed 96-bit time-ordered identifier.
///
/// The millisecond timestamp occupies the high bits so raw identifiers
/// sort by creation time; the sequence disambiguates identifiers minted
/// within the same millisecond and the entropy field carries 32 random
/// bits per identifier.
#[bitfield]
#[derive(Clone, Copy)]
pub struct TimeId {
    /// 32 random bits, fresh per identifier.
    pub entropy: B32,
    /// 16-bit sequence number, reset every millisecond.
    pub sequence: B16,
    /// 48 bits of milliseconds since the unix epoch.
    pub millis: B48,
}

impl TimeId {
    /// Returns the identifier as a single 96-bit integer, timestamp in
    /// the most significant position.
    pub fn value(&self) -> u128 {
        (u128::from(self.millis()) << 48)
            | (u128::from(self.sequence()) << 32)
            | u128::from(self.entropy())
    }
}

#[derive(Debug, Default)]
struct GeneratorState {
    last_millis: u64,
    sequence: u16,
}

/// Generator for opaque base-62 short codes.
///
/// `generate` mints codes from time-ordered identifiers; `derive`
/// normalizes caller-supplied aliases into the same shape. Both always
/// return codes of exactly the configured length.
pub struct CodeGenerator<C: Clock = SystemClock> {
    code_length: usize,
    clock: C,
    state: Mutex<GeneratorState>,
}

impl CodeGenerator<SystemClock> {
    /// Creates a generator backed by the real system clock.
    ///
    /// `code_length` is clamped to the valid code range (4..=16).
    pub fn new(code_length: usize) -> Self {
        Self::with_clock(code_length, SystemClock)
    }
}

impl<C: Clock> CodeGenerator<C> {
    /// Creates a generator with a custom clock.
    pub fn with_clock(code_length: usize, clock: C) -> Self {
        let code_length = code_length.clamp(MIN_LENGTH, MAX_LENGTH);
        Self {
            code_length,
            clock,
            state: Mutex::new(GeneratorState::default()),
        }
    }

    /// Returns the configured code length.
    pub fn code_length(&self) -> usize {
        self.code_length
    }

    /// Generates a fresh short code of exactly `code_length` characters.
    ///
    /// The code is the base-62 rendering of the next [`TimeId`]. When the
    /// rendering is longer than `code_length` the low-order characters are
    /// kept: the high-order characters encode only the millisecond
    /// timestamp and would be shared by every identifier of the same
    /// moment, while the low-order characters mix the timestamp with the
    /// sequence and entropy fields. A shorter rendering is padded with
    /// random base-62 characters.
    pub fn generate(&self) -> Code {
        let id = self.next_id();
        let mut encoded = base62::encode(id.value());

        if encoded.len() > self.code_length {
            encoded = encoded.split_off(encoded.len() - self.code_length);
        } else if encoded.len() < self.code_length {
            encoded.push_str(&random_suffix(self.code_length - encoded.len()));
        }

        Code::new_unchecked(encoded)
    }

    /// Normalizes a caller-supplied alias into a valid code.
    ///
    /// Characters outside `[0-9A-Za-z]` are removed. An alias that is
    /// empty after normalization falls back to [`generate`](Self::generate).
    /// Short aliases are padded with random base-62 characters; long ones
    /// keep their leading `code_length` characters.
    pub fn derive(&self, alias: &str) -> Code {
        let mut clean: String = alias.chars().filter(char::is_ascii_alphanumeric).collect();

        if clean.is_empty() {
            return self.generate();
        }

        if clean.len() < self.code_length {
            clean.push_str(&random_suffix(self.code_length - clean.len()));
        } else if clean.len() > self.code_length {
            clean.truncate(self.code_length);
        }

        Code::new_unchecked(clean)
    }

    /// Mints the next identifier.
    ///
    /// Monotonic within the generator: a backward-stepping clock reuses
    /// the last observed millisecond, and an exhausted sequence borrows
    /// the next one.
    fn next_id(&self) -> TimeId {
        let mut state = self.state.lock().expect("generator state poisoned");

        let mut now = self.clock.now().as_millisecond().max(0) as u64;
        if now < state.last_millis {
            now = state.last_millis;
        }

        if now == state.last_millis {
            state.sequence = state.sequence.wrapping_add(1);
            if state.sequence == 0 {
                now += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;

        TimeId::new()
            .with_millis(now & ((1 << 48) - 1))
            .with_sequence(state.sequence)
            .with_entropy(rand::thread_rng().gen())
    }
}

/// Whether `code` is a well-formed short code.
pub fn is_valid_code(code: &str) -> bool {
    (MIN_LENGTH..=MAX_LENGTH).contains(&code.len()) && base62::is_base62(code)
}

/// Produces `length` random characters from the base-62 alphabet.
fn random_suffix(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::TestClock;
    use jiff::Timestamp;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn generate_has_configured_length() {
        let generator = CodeGenerator::new(8);
        assert_eq!(generator.generate().as_str().len(), 8);

        let generator = CodeGenerator::new(4);
        assert_eq!(generator.generate().as_str().len(), 4);

        let generator = CodeGenerator::new(16);
        assert_eq!(generator.generate().as_str().len(), 16);
    }

    #[test]
    fn code_length_is_clamped() {
        assert_eq!(CodeGenerator::new(0).code_length(), 4);
        assert_eq!(CodeGenerator::new(99).code_length(), 16);
    }

    #[test]
    fn generate_is_base62() {
        let generator = CodeGenerator::new(8);
        for _ in 0..100 {
            let code = generator.generate();
            assert!(is_valid_code(code.as_str()));
        }
    }

    #[test]
    fn generate_no_duplicates_under_load() {
        let generator = CodeGenerator::new(8);
        let mut seen = HashSet::new();
        for _ in 0..100_000 {
            assert!(seen.insert(generator.generate()), "duplicate code");
        }
    }

    #[test]
    fn generate_no_duplicates_across_threads() {
        let generator = Arc::new(CodeGenerator::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let generator = Arc::clone(&generator);
            handles.push(std::thread::spawn(move || {
                (0..10_000)
                    .map(|_| generator.generate())
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for code in handle.join().unwrap() {
                assert!(seen.insert(code), "duplicate code across threads");
            }
        }
    }

    #[test]
    fn same_millisecond_increments_sequence() {
        let clock = TestClock::new(Timestamp::from_second(1_000).unwrap());
        let generator = CodeGenerator::with_clock(8, clock);

        let a = generator.next_id();
        let b = generator.next_id();
        assert_eq!(a.millis(), b.millis());
        assert_eq!(a.sequence() + 1, b.sequence());
    }

    #[test]
    fn backward_clock_does_not_repeat_a_millisecond() {
        let clock = TestClock::new(Timestamp::from_second(1_000).unwrap());
        let generator = CodeGenerator::with_clock(8, clock.clone());

        let before = generator.next_id();
        clock.set(Timestamp::from_second(900).unwrap());
        let after = generator.next_id();

        assert_eq!(after.millis(), before.millis());
        assert_eq!(after.sequence(), before.sequence() + 1);
    }

    #[test]
    fn derive_strips_and_pads() {
        let generator = CodeGenerator::new(8);
        let code = generator.derive(" my url ");
        assert_eq!(code.as_str().len(), 8);
        assert!(code.as_str().starts_with("myurl"));
        assert!(base62::is_base62(code.as_str()));
    }

    #[test]
    fn derive_truncates_long_aliases() {
        let generator = CodeGenerator::new(8);
        let code = generator.derive("promo2024-special-edition");
        assert_eq!(code.as_str(), "promo202");
    }

    #[test]
    fn derive_is_deterministic_when_no_padding_needed() {
        let generator = CodeGenerator::new(8);
        assert_eq!(generator.derive("promo2024"), generator.derive("promo2024"));
    }

    #[test]
    fn derive_empty_falls_back_to_generate() {
        let generator = CodeGenerator::new(8);
        let code = generator.derive("!!! ???");
        assert_eq!(code.as_str().len(), 8);
        assert!(base62::is_base62(code.as_str()));
    }

    #[test]
    fn validate_bounds() {
        assert!(is_valid_code("abcd"));
        assert!(is_valid_code("a1B2c3D4e5F6g7H8"));
        assert!(!is_valid_code("abc"));
        assert!(!is_valid_code(&"a".repeat(17)));
        assert!(!is_valid_code("ab cd"));
    }

    #[test]
    fn time_id_value_orders_by_timestamp() {
        let early = TimeId::new()
            .with_millis(1_000)
            .with_sequence(u16::MAX)
            .with_entropy(u32::MAX);
        let late = TimeId::new().with_millis(1_001);
        assert!(early.value() < late.value());
    }
}
