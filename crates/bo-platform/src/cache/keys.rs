//! Cache key composition
//!
//! Keys look like `<Prefix>_<Operation>[_<ParamHash>]`. Prefix invalidation
//! only works when every key for an entity is built through these helpers.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// `<prefix>_`, the invalidation prefix for an entity or domain
pub fn prefix_of(prefix: &str) -> String {
    format!("{}_", prefix)
}

pub fn cache_key(prefix: &str, operation: &str) -> String {
    format!("{}_{}", prefix, operation)
}

/// Key for a parameterized read; parameters are hashed from their JSON form
pub fn cache_key_with_params<P: Serialize + ?Sized>(
    prefix: &str,
    operation: &str,
    params: &P,
) -> Result<String, serde_json::Error> {
    let encoded = serde_json::to_vec(params)?;
    let digest = Sha256::digest(&encoded);
    Ok(format!("{}_{}_{}", prefix, operation, hex::encode(&digest[..8])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(cache_key("Department", "GetAll"), "Department_GetAll");
        assert_eq!(prefix_of("Department"), "Department_");

        let a = cache_key_with_params("Department", "Find", &("D1", 2)).unwrap();
        let b = cache_key_with_params("Department", "Find", &("D1", 2)).unwrap();
        let c = cache_key_with_params("Department", "Find", &("D2", 2)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("Department_Find_"));
        assert_eq!(a.len(), "Department_Find_".len() + 16);
    }
}
