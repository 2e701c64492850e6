use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// 64-bit time-ordered id generator.
///
/// Layout: 48 bits milliseconds since epoch, 16 bits random/counter. Ids
/// from one generator are strictly increasing.
pub struct AttemptIdGen {
    last_val: u64,
    rng: StdRng,
}

impl Default for AttemptIdGen {
    fn default() -> Self {
        Self::new()
    }
}

impl AttemptIdGen {
    pub fn new() -> Self {
        Self { last_val: 0, rng: StdRng::from_os_rng() }
    }

    pub fn generate(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(std::time::Duration::ZERO)
            .as_millis() as u64;

        let ts_part = now << 16;
        if ts_part > self.last_val {
            self.last_val = ts_part | self.rng.random::<u16>() as u64;
        } else {
            // Exhausting 16 bits rolls into the next millisecond, still unique
            self.last_val = self.last_val.wrapping_add(1);
        }
        self.last_val
    }

    pub fn from_parts(timestamp_ms: u64, random_part: u16) -> u64 {
        (timestamp_ms << 16) | random_part as u64
    }

    /// Crockford Base32, 13 chars, sorts the same as the number.
    pub fn to_base32(val: u64) -> String {
        let mut chars = ['0'; 13];
        let mut v = val;
        for slot in chars.iter_mut().rev() {
            *slot = ALPHABET[(v % 32) as usize] as char;
            v /= 32;
        }
        chars.iter().collect()
    }

    pub fn from_base32(s: &str) -> Result<u64, String> {
        if s.len() != 13 {
            return Err(format!("expected 13 chars, got {}", s.len()));
        }
        let mut val: u64 = 0;
        for c in s.bytes() {
            let digit = ALPHABET
                .iter()
                .position(|&a| a == c.to_ascii_uppercase())
                .ok_or_else(|| format!("invalid base32 char {:?}", c as char))?;
            val = val
                .checked_mul(32)
                .and_then(|v| v.checked_add(digit as u64))
                .ok_or("base32 value overflows u64")?;
        }
        Ok(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let mut id_gen = AttemptIdGen::new();
        let mut last = 0;
        for _ in 0..10_000 {
            let id = id_gen.generate();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_parts() {
        let id = AttemptIdGen::from_parts(1_700_000_000_000, 42);
        assert_eq!(id >> 16, 1_700_000_000_000);
        assert_eq!(id & 0xFFFF, 42);
    }

    #[test]
    fn test_base32() {
        let id = AttemptIdGen::from_parts(1_700_000_000_000, 7);
        let s = AttemptIdGen::to_base32(id);
        assert_eq!(s.len(), 13);
        assert_eq!(AttemptIdGen::from_base32(&s).unwrap(), id);
        assert_eq!(AttemptIdGen::from_base32(&s.to_lowercase()).unwrap(), id);
        assert!(AttemptIdGen::from_base32("short").is_err());
        assert!(AttemptIdGen::from_base32("UUUUUUUUUUUUU").is_err());
    }
}
