//! The configured worker pool.
//!
//! Requests capture [`WorkerPool::size`] as their part count when they are
//! created. Part `i` belongs to the worker at index `i` in direct mode.

#[derive(Debug, Clone)]
pub struct WorkerPool {
    urls: Vec<String>,
}

impl WorkerPool {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }

    /// Number of workers, i.e. the part count of new requests.
    pub fn size(&self) -> u32 {
        self.urls.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Worker owning `part_number` in direct mode.
    pub fn url_for_part(&self, part_number: u32) -> Option<&str> {
        self.urls.get(part_number as usize).map(String::as_str)
    }

    /// Every worker except `excluded`, starting after it and wrapping around.
    pub fn others(&self, excluded: &str) -> Vec<&str> {
        let start = self
            .urls
            .iter()
            .position(|url| url == excluded)
            .map_or(0, |i| i + 1);
        self.urls
            .iter()
            .cycle()
            .skip(start)
            .take(self.urls.len())
            .map(String::as_str)
            .filter(|url| *url != excluded)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> WorkerPool {
        WorkerPool::new(vec!["http://w0".into(), "http://w1".into(), "http://w2".into()])
    }

    #[test]
    fn parts_map_to_workers_by_index() {
        let pool = pool();
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.url_for_part(2), Some("http://w2"));
        assert_eq!(pool.url_for_part(3), None);
    }

    #[test]
    fn others_start_after_the_excluded_worker() {
        assert_eq!(pool().others("http://w1"), vec!["http://w2", "http://w0"]);
        assert_eq!(pool().others("http://w2"), vec!["http://w0", "http://w1"]);
        assert_eq!(pool().others("http://unknown").len(), 3);
    }
}
