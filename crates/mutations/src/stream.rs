use crate::{BundleInput, Error};
use models::{BundleName, PackageName};
use std::collections::{BTreeMap, BTreeSet};

/// Group |inputs| by package and order each package's batch so that every
/// individual add is legal: ascending semver, each bundle emitted only
/// once its predecessors exist in the catalog or earlier in the batch.
///
/// The ordering is deterministic: given the same catalog and the same
/// input set, the emission sequence is identical on every run.
pub fn order_batch(
    catalog: &tables::Catalog,
    inputs: Vec<BundleInput>,
) -> Result<BTreeMap<PackageName, Vec<BundleInput>>, Error> {
    let mut grouped: BTreeMap<PackageName, Vec<BundleInput>> = BTreeMap::new();
    for input in inputs {
        grouped.entry(input.package.clone()).or_default().push(input);
    }

    grouped
        .into_iter()
        .map(|(package, batch)| {
            order_package_batch(catalog, &package, batch).map(|batch| (package, batch))
        })
        .collect()
}

fn order_package_batch(
    catalog: &tables::Catalog,
    package: &PackageName,
    mut batch: Vec<BundleInput>,
) -> Result<Vec<BundleInput>, Error> {
    batch.sort_by(|lhs, rhs| {
        lhs.version
            .cmp(&rhs.version)
            .then_with(|| lhs.name.cmp(&rhs.name))
    });

    for pair in batch.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(Error::DuplicateBatchVersion {
                package: package.clone(),
                version: pair[0].version.clone(),
                first: pair[0].name.clone(),
                second: pair[1].name.clone(),
            });
        }
    }

    // A disconnected batch would make the add order-dependent.
    if batch.len() > 1 && !is_connected(&batch) {
        return Err(Error::DisconnectedBatch {
            package: package.clone(),
        });
    }

    // Bundles already present in the catalog satisfy predecessors.
    let mut present: BTreeSet<BundleName> = catalog
        .bundles
        .in_package(package)
        .iter()
        .map(|b| b.bundle.clone())
        .collect();

    let mut pending = batch;
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let position = pending.iter().position(|input| {
            input
                .replaces
                .iter()
                .chain(input.substitutes_for.iter())
                .all(|predecessor| present.contains(predecessor))
        });

        match position {
            Some(position) => {
                let input = pending.remove(position);
                present.insert(input.name.clone());
                ordered.push(input);
            }
            None => {
                let blocked = &pending[0];
                let missing = blocked
                    .replaces
                    .iter()
                    .chain(blocked.substitutes_for.iter())
                    .find(|predecessor| !present.contains(*predecessor))
                    .cloned()
                    .unwrap_or_else(|| blocked.name.clone());
                return Err(Error::UnresolvableOrder {
                    package: package.clone(),
                    bundle: blocked.name.clone(),
                    replaces: missing,
                });
            }
        }
    }
    Ok(ordered)
}

// Whether some bundle of the batch reaches every other through the
// replaces / skips / skipRange edges declared among the batch.
fn is_connected(batch: &[BundleInput]) -> bool {
    let names: BTreeMap<&BundleName, usize> = batch
        .iter()
        .enumerate()
        .map(|(index, input)| (&input.name, index))
        .collect();

    let edges = |index: usize| -> Vec<usize> {
        let input = &batch[index];
        let mut out = Vec::new();

        if let Some(replaces) = &input.replaces {
            out.extend(names.get(replaces));
        }
        for skip in &input.skips {
            out.extend(names.get(skip));
        }
        if let Some(substitutes_for) = &input.substitutes_for {
            out.extend(names.get(substitutes_for));
        }
        if let Some(range) = &input.skip_range {
            for (other, candidate) in batch.iter().enumerate() {
                if other != index && range.matches(&candidate.version) {
                    out.push(other);
                }
            }
        }
        out
    };

    (0..batch.len()).any(|root| {
        let mut visited = vec![false; batch.len()];
        let mut stack = vec![root];
        let mut count = 0;

        while let Some(node) = stack.pop() {
            if std::mem::replace(&mut visited[node], true) {
                continue;
            }
            count += 1;
            stack.extend(edges(node));
        }
        count == batch.len()
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::BundleInput;

    fn input(name: &str, version: &str, replaces: Option<&str>) -> BundleInput {
        BundleInput {
            package: PackageName::new("op"),
            name: BundleName::new(name),
            version: version.parse().unwrap(),
            image: format!("quay.io/op/{}", name),
            channels: vec![models::ChannelName::new("alpha")],
            default_channel: None,
            replaces: replaces.map(BundleName::new),
            skips: Vec::new(),
            skip_range: None,
            substitutes_for: None,
            properties: Vec::new(),
            related_images: Vec::new(),
        }
    }

    #[test]
    fn test_batch_is_ordered_by_ascending_version() {
        let batch = vec![
            input("op.v0.9.4", "0.9.4", Some("op.v0.9.2")),
            input("op.v0.9.0", "0.9.0", None),
            input("op.v0.9.2", "0.9.2", Some("op.v0.9.0")),
        ];
        let ordered = order_batch(&tables::Catalog::default(), batch).unwrap();

        assert_eq!(
            ordered[&PackageName::new("op")]
                .iter()
                .map(|i| i.name.as_str())
                .collect::<Vec<_>>(),
            vec!["op.v0.9.0", "op.v0.9.2", "op.v0.9.4"],
        );
    }

    #[test]
    fn test_duplicate_versions_are_fatal() {
        let batch = vec![
            input("op.first.v1.0.0", "1.0.0", None),
            input("op.second.v1.0.0", "1.0.0", None),
        ];
        assert!(matches!(
            order_batch(&tables::Catalog::default(), batch).unwrap_err(),
            Error::DuplicateBatchVersion { .. }
        ));
    }

    #[test]
    fn test_disconnected_batch_is_rejected() {
        let batch = vec![
            input("op.v1.0.0", "1.0.0", Some("op.v0.9.4")),
            input("op.v2.0.0", "2.0.0", None),
        ];
        assert!(matches!(
            order_batch(&tables::Catalog::default(), batch).unwrap_err(),
            Error::DisconnectedBatch { .. }
        ));
    }

    #[test]
    fn test_external_predecessor_must_exist() {
        // A connected pair whose root replaces a bundle that is neither
        // in the batch nor in the catalog.
        let batch = vec![
            input("op.v1.0.0", "1.0.0", Some("op.v0.9.4")),
            input("op.v1.1.0", "1.1.0", Some("op.v1.0.0")),
        ];
        match order_batch(&tables::Catalog::default(), batch).unwrap_err() {
            Error::UnresolvableOrder {
                bundle, replaces, ..
            } => {
                assert_eq!(bundle.as_str(), "op.v1.0.0");
                assert_eq!(replaces.as_str(), "op.v0.9.4");
            }
            err => panic!("unexpected error {err}"),
        }
    }
}
