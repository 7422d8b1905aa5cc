//! A lightweight proof-of-work token attached to `notify` calls.
//!
//! This is a spam deterrent, not an access-control mechanism: it raises
//! the cost of flooding a node with bogus predecessor-candidate claims,
//! nothing more. `pow_difficulty = 0` (the default) disables the check
//! entirely by accepting every token.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

/// How long a token remains acceptable after it was minted.
const TOKEN_TTL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct PowToken {
    pub nonce: Vec<u8>,
    pub timestamp: u64,
}

impl PowToken {
    /// Mints a token whose hash has at least `difficulty` leading zero
    /// bytes, brute-forcing the nonce.
    pub fn generate(difficulty: usize) -> PowToken {
        let timestamp = now_secs();
        let mut rng = rand::thread_rng();
        loop {
            let mut nonce = vec![0u8; 16];
            rng.fill_bytes(&mut nonce);
            let token = PowToken { nonce, timestamp };
            if token.leading_zero_bytes() >= difficulty {
                return token;
            }
        }
    }

    fn digest(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.nonce);
        hasher.update(&self.timestamp.to_be_bytes());
        hasher.finalize()
    }

    fn leading_zero_bytes(&self) -> usize {
        self.digest().as_bytes().iter().take_while(|b| **b == 0).count()
    }

    /// Returns `(has_expired, meets_difficulty)`.
    pub fn validate(&self, difficulty: usize) -> (bool, bool) {
        let expired = now_secs().saturating_sub(self.timestamp) > TOKEN_TTL_SECS;
        (expired, self.leading_zero_bytes() >= difficulty)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_zero_always_validates() {
        let token = PowToken::generate(0);
        let (expired, valid) = token.validate(0);
        assert!(!expired);
        assert!(valid);
    }

    #[test]
    fn generated_token_meets_its_own_difficulty() {
        let token = PowToken::generate(1);
        let (_, valid) = token.validate(1);
        assert!(valid);
    }

    #[test]
    fn stale_timestamp_is_reported_expired() {
        let token = PowToken { nonce: vec![0; 16], timestamp: 0 };
        let (expired, _) = token.validate(0);
        assert!(expired);
    }
}
