// Password hashing backed by bcrypt.

use anyhow::{Context, Result};

/// Cost used when none is configured.
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    /// `cost` must be within bcrypt's 4..=31.
    pub fn new(cost: u32) -> Result<Self> {
        if !(4..=31).contains(&cost) {
            anyhow::bail!("bcrypt cost must be between 4 and 31, got {cost}");
        }
        Ok(Self { cost })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        bcrypt::hash(password, self.cost).context("Failed to hash password")
    }

    /// A malformed hash verifies as false.
    pub fn verify(&self, password: &str, hashed: &str) -> bool {
        bcrypt::verify(password, hashed).unwrap_or(false)
    }

    /// True when `hashed` was produced with another cost or is not a bcrypt hash.
    pub fn needs_rehash(&self, hashed: &str) -> bool {
        match hashed.parse::<bcrypt::HashParts>() {
            Ok(parts) => parts.get_cost() != self.cost,
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_and_verifies() {
        let hasher: PasswordHasher = PasswordHasher::new(4).unwrap();
        let hashed: String = hasher.hash("s3cret").unwrap();

        assert!(hasher.verify("s3cret", &hashed));
        assert!(!hasher.verify("wrong", &hashed));
        assert!(!hasher.verify("s3cret", "not-a-hash"));
    }

    #[test]
    fn detects_cost_changes() {
        let hashed: String = PasswordHasher::new(4).unwrap().hash("pw").unwrap();
        assert!(!PasswordHasher::new(4).unwrap().needs_rehash(&hashed));
        assert!(PasswordHasher::new(5).unwrap().needs_rehash(&hashed));
        assert!(PasswordHasher::default().needs_rehash("plain"));
        assert!(PasswordHasher::new(3).is_err());
    }
}
