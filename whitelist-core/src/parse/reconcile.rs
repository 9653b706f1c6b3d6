//! Restoring persisted ids onto parsed groups

use crate::model::WhitelistGroup;

/// Copy ids and descriptions from `known` onto `parsed`, matching groups by
/// name and entries by value
///
/// Groups are matched by exact name first, then case-insensitively. Each
/// known group is used at most once. Unmatched parsed groups keep their
/// synthetic ids.
pub fn reconcile_ids(parsed: &mut [WhitelistGroup], known: &[WhitelistGroup]) {
    let mut used = vec![false; known.len()];

    for group in parsed.iter_mut() {
        let position = known
            .iter()
            .enumerate()
            .position(|(i, k)| !used[i] && k.name == group.name)
            .or_else(|| {
                known
                    .iter()
                    .enumerate()
                    .position(|(i, k)| !used[i] && k.name.eq_ignore_ascii_case(&group.name))
            });

        let Some(index) = position else {
            continue;
        };
        used[index] = true;
        let source = &known[index];

        group.id = source.id.clone();
        group.description = source.description.clone();

        for client in group.clients.iter_mut() {
            if let Some(k) = source.clients.iter().find(|k| k.value.trim() == client.value) {
                client.id = k.id.clone();
                client.description = k.description.clone();
            }
        }

        for destination in group.destinations.iter_mut() {
            if let Some(k) = source
                .destinations
                .iter()
                .find(|k| k.value.trim().eq_ignore_ascii_case(&destination.value))
            {
                destination.id = k.id.clone();
                destination.description = k.description.clone();
            }
        }
    }
}
