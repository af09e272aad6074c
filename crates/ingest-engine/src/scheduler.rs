//! Priority tiers and dispatch order

use ingest_types::TransferJob;

/// Whether `file_name` starts with any of `prefixes` (case-sensitive)
///
/// Empty prefixes never match.
pub fn is_priority(file_name: &str, prefixes: &[String]) -> bool {
    prefixes
        .iter()
        .any(|prefix| !prefix.is_empty() && file_name.starts_with(prefix.as_str()))
}

/// Order jobs for dispatch: every priority job, then every normal job
///
/// Discovery order is kept within each tier.
pub fn dispatch_order(jobs: Vec<TransferJob>) -> Vec<TransferJob> {
    let (mut ordered, normal): (Vec<_>, Vec<_>) = jobs.into_iter().partition(|job| job.priority);
    ordered.extend(normal);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_types::ClassifiedFile;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::path::PathBuf;

    fn job(name: &str, prefixes: &[String]) -> TransferJob {
        TransferJob {
            source: PathBuf::from("/card").join(name),
            destination: PathBuf::from("/dest").join(name),
            size: 1,
            priority: is_priority(name, prefixes),
            classification: ClassifiedFile {
                original_path: PathBuf::from("/card").join(name),
                file_name: name.to_string(),
                extension: String::new(),
                identity: None,
            },
        }
    }

    #[rstest]
    #[case("A001_clip.mp4", true)]
    #[case("URGENT_take.mov", true)]
    #[case("a001_clip.mp4", false)]
    #[case("clip_A001.mp4", false)]
    #[case("A00", false)]
    fn test_is_priority(#[case] name: &str, #[case] expected: bool) {
        let prefixes = vec!["A001".to_string(), "URGENT_".to_string(), String::new()];
        assert_eq!(is_priority(name, &prefixes), expected);
    }

    #[test]
    fn test_no_prefixes_means_no_priority() {
        assert!(!is_priority("A001_clip.mp4", &[]));
    }

    proptest! {
        #[test]
        fn test_priority_jobs_dispatch_first(flags in prop::collection::vec(any::<bool>(), 0..40)) {
            let prefixes = vec!["P_".to_string()];
            let jobs: Vec<TransferJob> = flags
                .iter()
                .enumerate()
                .map(|(i, priority)| {
                    let name = if *priority { format!("P_{:03}", i) } else { format!("N_{:03}", i) };
                    job(&name, &prefixes)
                })
                .collect();

            let ordered = dispatch_order(jobs);
            let names: Vec<&str> = ordered.iter().map(TransferJob::file_name).collect();

            let first_normal = ordered.iter().position(|j| !j.priority).unwrap_or(ordered.len());
            prop_assert!(ordered[first_normal..].iter().all(|j| !j.priority));
            prop_assert_eq!(first_normal, flags.iter().filter(|p| **p).count());

            // Discovery order is stable inside each tier
            let mut priority_names: Vec<&str> = names[..first_normal].to_vec();
            priority_names.sort_unstable();
            prop_assert_eq!(&priority_names[..], &names[..first_normal]);
            let mut normal_names: Vec<&str> = names[first_normal..].to_vec();
            normal_names.sort_unstable();
            prop_assert_eq!(&normal_names[..], &names[first_normal..]);
        }
    }
}
