//! Removal of fragments that only carry streaming structure.

use tessera_rs_protocol::Fragment;

/// Drop step boundaries and file references from a fragment sequence.
///
/// Neither reaches storage: step markers are transport signals and file
/// content is excluded by policy. Relative order of the rest is kept.
pub fn filter_fragments(parts: Vec<Fragment>) -> Vec<Fragment> {
    parts
        .into_iter()
        .filter(|part| !matches!(part, Fragment::StepStart | Fragment::File { .. }))
        .collect()
}
