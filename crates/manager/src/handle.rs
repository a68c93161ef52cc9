//! Handle generation.
//!
//! Generated handles are unique for the lifetime of a manager: every
//! candidate is checked against the live registry and against every handle
//! the generator has issued before, and re-rolled on collision. Random
//! handles grow by one character once collisions keep repeating, so a
//! crowded handle space slows generation down instead of stalling it.

use hashbrown::HashSet;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// How the manager names tables and views hosted without an explicit handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum HandleStrategy {
    /// `prefix` followed by a per-manager counter: `t0`, `t1`, ...
    Counter { prefix: String },
    /// `len` random alphanumeric characters, more once handles of that
    /// length run short.
    Random { len: usize },
}

impl Default for HandleStrategy {
    fn default() -> Self {
        HandleStrategy::Counter {
            prefix: "t".to_string(),
        }
    }
}

/// Consecutive collisions after which random handles get longer.
const MAX_COLLISIONS: usize = 32;

pub(crate) struct HandleGenerator {
    strategy: HandleStrategy,
    counter: u64,
    /// Characters added to random handles.
    widened: usize,
    rng: StdRng,
    issued: HashSet<String>,
}

impl HandleGenerator {
    pub fn new(strategy: HandleStrategy) -> Self {
        Self {
            strategy,
            counter: 0,
            widened: 0,
            rng: StdRng::from_entropy(),
            issued: HashSet::new(),
        }
    }

    /// Returns a handle never issued before for which `taken` is false.
    pub fn next(&mut self, taken: impl Fn(&str) -> bool) -> String {
        let mut collisions = 0;
        loop {
            let candidate = self.candidate();
            if taken(&candidate) || self.issued.contains(&candidate) {
                log::debug!("handle {candidate} already in use, retrying");
                collisions += 1;
                if collisions == MAX_COLLISIONS {
                    collisions = 0;
                    if let HandleStrategy::Random { len } = self.strategy {
                        self.widened += 1;
                        log::info!(
                            "random handles widened to {} characters",
                            len.max(1) + self.widened
                        );
                    }
                }
                continue;
            }
            self.issued.insert(candidate.clone());
            return candidate;
        }
    }

    /// Records a caller-chosen handle so it is never generated later.
    pub fn reserve(&mut self, handle: &str) {
        self.issued.insert(handle.to_string());
    }

    fn candidate(&mut self) -> String {
        match &self.strategy {
            HandleStrategy::Counter { prefix } => {
                let handle = format!("{prefix}{}", self.counter);
                self.counter += 1;
                handle
            }
            HandleStrategy::Random { len } => (&mut self.rng)
                .sample_iter(&Alphanumeric)
                .take((*len).max(1) + self.widened)
                .map(char::from)
                .collect(),
        }
    }
}
