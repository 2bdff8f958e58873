//! Bucket-name to region cache
//!
//! Signing an S3 request requires the bucket's region. Entries are populated
//! lazily from the `?location` lookup and never expire on their own; the only
//! eviction is an explicit clear, for the rare case of a bucket moving region.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct BucketRegionCache {
    regions: RwLock<HashMap<String, String>>,
}

impl BucketRegionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, bucket: &str) -> Option<String> {
        self.regions
            .read()
            .expect("bucket region lock poisoned")
            .get(bucket)
            .cloned()
    }

    /// Inserts the mapping unless another thread already did; the existing
    /// entry wins. Returns whether this call inserted.
    pub fn insert_if_absent(&self, bucket: &str, region: &str) -> bool {
        let mut regions = self.regions.write().expect("bucket region lock poisoned");
        if regions.contains_key(bucket) {
            return false;
        }
        regions.insert(bucket.to_string(), region.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.regions
            .read()
            .expect("bucket region lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.regions
            .write()
            .expect("bucket region lock poisoned")
            .clear();
    }
}
