//! Transaction id generation.
//!
//! Ids look like `/42_bcdaeabc_data`: a persisted job counter, so ids are
//! visibly ordered across restarts, followed by random characters so they
//! cannot be guessed.

use crate::dir::write_atomic;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Counter values above this are treated as corrupt and reset to zero.
pub const MAX_JOB_COUNT: u32 = 10240;

const RANDOM_LEN: usize = 8;

/// Issues unique, time-ordered transaction ids.
#[derive(Debug)]
pub struct TidGenerator {
    job_count: u32,
    path: Option<PathBuf>,
}

impl TidGenerator {
    /// Creates a generator that keeps its counter in memory only.
    pub fn in_memory() -> Self {
        Self {
            job_count: 0,
            path: None,
        }
    }

    /// Creates a generator backed by a counter file.
    ///
    /// A missing or unreadable file starts the counter at zero.
    pub fn open(path: PathBuf) -> Self {
        let job_count = load_job_count(&path);
        Self {
            job_count,
            path: Some(path),
        }
    }

    /// Returns the last issued counter value.
    pub fn job_count(&self) -> u32 {
        self.job_count
    }

    /// Issues the next id and persists the counter.
    pub fn generate(&mut self) -> String {
        self.job_count += 1;
        if self.job_count > MAX_JOB_COUNT {
            self.job_count = 1;
        }
        if let Some(path) = &self.path {
            debug!(job_count = self.job_count, "saving job count");
            if let Err(e) = write_atomic(path, self.job_count.to_string().as_bytes()) {
                warn!("failed to save job count: {}", e);
            }
        }
        format!("/{}_{}_data", self.job_count, random_string(RANDOM_LEN))
    }
}

fn load_job_count(path: &Path) -> u32 {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => {
            debug!("no saved job count at {:?}", path);
            return 0;
        }
    };
    match contents.trim().parse::<u32>() {
        Ok(count) if count <= MAX_JOB_COUNT => count,
        Ok(count) => {
            warn!(count, "invalid job count, resetting");
            0
        }
        Err(_) => {
            warn!("failed to parse job count {:?}", contents);
            0
        }
    }
}

fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b'a'..b'f') as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn counter_of(tid: &str) -> u32 {
        tid.trim_start_matches('/')
            .split('_')
            .next()
            .unwrap()
            .parse()
            .unwrap()
    }

    #[test]
    fn ids_have_expected_shape() {
        let mut gen = TidGenerator::in_memory();
        let tid = gen.generate();
        assert!(tid.starts_with("/1_"));
        assert!(tid.ends_with("_data"));
        let random = tid.split('_').nth(1).unwrap();
        assert_eq!(random.len(), RANDOM_LEN);
        assert!(random.chars().all(|c| ('a'..'f').contains(&c)));
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let mut gen = TidGenerator::in_memory();
        let a = gen.generate();
        let b = gen.generate();
        assert_ne!(a, b);
        assert!(counter_of(&b) > counter_of(&a));
    }

    #[test]
    fn counter_persists_across_instances() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("job_count.dat");
        {
            let mut gen = TidGenerator::open(path.clone());
            gen.generate();
            gen.generate();
        }
        let mut gen = TidGenerator::open(path);
        assert_eq!(gen.job_count(), 2);
        assert_eq!(counter_of(&gen.generate()), 3);
    }

    #[test]
    fn insane_counter_resets() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("job_count.dat");
        fs::write(&path, "99999").unwrap();
        let gen = TidGenerator::open(path.clone());
        assert_eq!(gen.job_count(), 0);

        fs::write(&path, "garbage").unwrap();
        assert_eq!(TidGenerator::open(path).job_count(), 0);
    }
}
