//! Lease identifiers and lock ownership keys

use std::fmt;

/// Server-assigned lease identifier.
///
/// Rendered in lowercase hex, which is also how etcd spells the lease inside
/// a lock ownership key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(i64);

impl LeaseId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl From<i64> for LeaseId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Ownership key created for `lease` when it locks `name`.
///
/// etcd's lock service stores each contender under `<name>/<lease hex>`; the
/// holder is the contender with the lowest creation revision.
pub fn lock_key(name: &[u8], lease: LeaseId) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 17);
    key.extend_from_slice(name);
    key.push(b'/');
    key.extend_from_slice(lease.to_string().as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_id_display_is_hex() {
        assert_eq!(LeaseId::new(0x694d77aa9e38260f).to_string(), "694d77aa9e38260f");
        assert_eq!(LeaseId::new(10).to_string(), "a");
    }

    #[test]
    fn test_lock_key() {
        assert_eq!(lock_key(b"job-42", LeaseId::new(0x1f)), b"job-42/1f".to_vec());
    }
}
