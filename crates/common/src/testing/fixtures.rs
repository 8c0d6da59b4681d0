//! Test fixture generators
//!
//! Synthetic CI logs and identifiers. Generators taking a `seed` are
//! deterministic.

use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};

const STEPS: [&str; 6] = ["checkout", "setup-toolchain", "restore-cache", "build", "test", "lint"];

/// A string of exactly `bytes` bytes made of newline-terminated log lines
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// use healer_common::testing::fixtures::log_of_size;
///
/// let log = log_of_size(1024);
/// assert_eq!(log.len(), 1024);
/// assert!(log.contains('\n'));
/// # }
/// ```
pub fn log_of_size(bytes: usize) -> String {
    let line = "[build] compiling crate ... ok\n";
    let mut log = line.repeat(bytes / line.len() + 1);
    log.truncate(bytes);
    log
}

/// Deterministic build log with `lines` lines; the last line reports a
/// failing step
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// use healer_common::testing::fixtures::build_log_seeded;
///
/// assert_eq!(build_log_seeded(20, 7), build_log_seeded(20, 7));
/// assert_eq!(build_log_seeded(20, 7).lines().count(), 20);
/// # }
/// ```
pub fn build_log_seeded(lines: usize, seed: u64) -> String {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut log = String::new();
    for n in 1..=lines {
        let step = STEPS[rng.gen_range(0..STEPS.len())];
        if n == lines {
            log.push_str(&format!("##[error] step '{step}' failed with exit code 1\n"));
        } else {
            let elapsed: u32 = rng.gen_range(1..5_000);
            log.push_str(&format!("[{step}] line {n} ok ({elapsed}ms)\n"));
        }
    }
    log
}

/// Random valid repository name (`[A-Za-z0-9._-]`)
pub fn random_repository_name_seeded(len: usize, seed: u64) -> String {
    let rng = rand::rngs::StdRng::seed_from_u64(seed);
    rng.sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_repository_owner_and_name;

    #[test]
    fn test_log_of_size_exact() {
        assert_eq!(log_of_size(0), "");
        assert_eq!(log_of_size(5).len(), 5);
        assert_eq!(log_of_size(100_000).len(), 100_000);
    }

    #[test]
    fn test_build_log_ends_with_failure() {
        let log = build_log_seeded(5, 1);
        assert!(log.lines().last().unwrap().starts_with("##[error]"));
        assert_eq!(build_log_seeded(0, 1), "");
    }

    #[test]
    fn test_repository_names_are_valid() {
        for seed in 0..10 {
            let name = random_repository_name_seeded(12, seed);
            assert!(validate_repository_owner_and_name("octo", &name).is_ok());
        }
    }
}
