use std::borrow::Borrow;
use std::fmt;

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated block ids. 62^16 leaves roughly 95 bits of entropy.
pub const BLOCK_ID_LEN: usize = 16;

/// Opaque identifier of a leased block, exposed externally as the pool id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    /// Random mixed-case alphanumeric token.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let token = rng
            .sample_iter(&Alphanumeric)
            .take(BLOCK_ID_LEN)
            .map(char::from)
            .collect();
        BlockId(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        BlockId(id.to_string())
    }
}

impl Borrow<str> for BlockId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_ids_are_alphanumeric() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = BlockId::generate(&mut rng);
        assert_eq!(id.as_str().len(), BLOCK_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_ids_differ() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_ne!(BlockId::generate(&mut rng), BlockId::generate(&mut rng));
    }
}
