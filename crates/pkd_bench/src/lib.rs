//! Benchmark utilities.

use pkd_core::PackageId;
use rand::seq::SliceRandom;
use rand::Rng;

const NAMES: &[&str] = &["powertop", "kernel", "gtkhtml2", "vips-doc", "glib2", "yum"];
const ARCHES: &[&str] = &["i386", "x86_64", "noarch"];
const REPOS: &[&str] = &["fedora", "updates", "livna"];
const FILTERS: &[&str] = &["installed", "~installed", "devel", "~devel", "gui", "newest", "arch"];

/// Generate `count` random, valid package id strings.
pub fn random_package_ids(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let version = format!(
                "{}.{}-{}",
                rng.gen_range(0..10),
                rng.gen_range(0..30),
                rng.gen_range(1..5)
            );
            PackageId::new(
                NAMES.choose(&mut rng).copied().unwrap_or("powertop"),
                version,
                ARCHES.choose(&mut rng).copied().unwrap_or("noarch"),
                REPOS.choose(&mut rng).copied().unwrap_or("fedora"),
            )
            .to_text()
        })
        .collect()
}

/// Generate filter text with `terms` random terms.
pub fn random_filter_text(terms: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..terms)
        .map(|_| FILTERS.choose(&mut rng).copied().unwrap_or("installed"))
        .collect::<Vec<_>>()
        .join(";")
}
