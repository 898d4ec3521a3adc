use models::{BundleName, ChannelName, PackageName, Property, PropertyRegistry};
use mutations::{AddRequest, BundleInput, Draft, Mode};
use queries::{Engine, Error};
use tokio_util::sync::CancellationToken;

fn input(package: &str, name: &str, version: &str, channel: &str, replaces: Option<&str>) -> BundleInput {
    BundleInput {
        package: PackageName::new(package),
        name: BundleName::new(name),
        version: version.parse().unwrap(),
        image: format!("quay.io/{}/{}@sha256:{}", package, name, version),
        channels: vec![ChannelName::new(channel)],
        default_channel: Some(ChannelName::new(channel)),
        replaces: replaces.map(BundleName::new),
        skips: Vec::new(),
        skip_range: None,
        substitutes_for: None,
        properties: Vec::new(),
        related_images: Vec::new(),
    }
}

fn gvk_property(group: &str, version: &str, kind: &str) -> Property {
    Property::new(
        models::TYPE_GVK,
        serde_json::json!({"group": group, "version": version, "kind": kind}),
    )
}

// A catalog of two packages: an op replaces chain, and an etcd package
// providing the EtcdBackup API.
fn engine() -> Engine {
    let mut inputs = vec![
        input("op", "op.v0.9.0", "0.9.0", "alpha", None),
        input("op", "op.v0.9.2", "0.9.2", "alpha", Some("op.v0.9.0")),
        input("op", "op.v0.9.4", "0.9.4", "alpha", Some("op.v0.9.2")),
    ];

    let mut etcd_old = input(
        "etcd",
        "etcd.v0.9.0",
        "0.9.0",
        "singlenamespace-alpha",
        None,
    );
    etcd_old
        .properties
        .push(gvk_property("etcd.database.coreos.com", "v1beta2", "EtcdBackup"));
    inputs.push(etcd_old);

    let mut etcd = input(
        "etcd",
        "etcd.v0.9.4",
        "0.9.4",
        "singlenamespace-alpha",
        Some("etcd.v0.9.0"),
    );
    etcd.properties
        .push(gvk_property("etcd.database.coreos.com", "v1beta2", "EtcdBackup"));
    inputs.push(etcd);

    let draft = mutations::add(
        &Draft::default(),
        AddRequest {
            inputs,
            mode: Mode::Replaces,
            overwrite: false,
        },
        &PropertyRegistry::new(),
        &CancellationToken::new(),
    )
    .unwrap();

    Engine::new(draft.catalog, draft.built, PropertyRegistry::new())
}

#[test]
fn test_get_package_and_list_packages() {
    let engine = engine();
    let cancel = CancellationToken::new();

    assert_eq!(
        engine
            .list_packages(&cancel)
            .unwrap()
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>(),
        vec!["etcd", "op"],
    );

    let package = engine
        .get_package(&PackageName::new("op"), &cancel)
        .unwrap();
    assert_eq!(package.default_channel.as_str(), "alpha");
    assert_eq!(package.channels.len(), 1);
    assert_eq!(package.channels[0].head.as_str(), "op.v0.9.4");

    assert_eq!(
        engine
            .get_package(&PackageName::new("absent"), &cancel)
            .unwrap_err(),
        Error::PackageNotFound {
            package: PackageName::new("absent")
        },
    );
}

#[test]
fn test_get_bundle_for_channel() {
    let engine = engine();
    let cancel = CancellationToken::new();

    let head = engine
        .get_bundle_for_channel(&PackageName::new("op"), &ChannelName::new("alpha"), &cancel)
        .unwrap();
    assert_eq!(head.name.as_str(), "op.v0.9.4");
    assert_eq!(head.replaces.as_ref().unwrap().as_str(), "op.v0.9.2");

    assert!(matches!(
        engine
            .get_bundle_for_channel(&PackageName::new("op"), &ChannelName::new("beta"), &cancel)
            .unwrap_err(),
        Error::ChannelNotFound { .. }
    ));
}

#[test]
fn test_get_bundle_that_replaces() {
    let engine = engine();
    let cancel = CancellationToken::new();

    let replacement = engine
        .get_bundle_that_replaces(
            &BundleName::new("op.v0.9.0"),
            &PackageName::new("op"),
            &ChannelName::new("alpha"),
            &cancel,
        )
        .unwrap();
    assert_eq!(replacement.name.as_str(), "op.v0.9.2");

    assert!(matches!(
        engine
            .get_bundle_that_replaces(
                &BundleName::new("op.v0.9.4"),
                &PackageName::new("op"),
                &ChannelName::new("alpha"),
                &cancel,
            )
            .unwrap_err(),
        Error::NoReplacement { .. }
    ));
}

#[test]
fn test_get_channel_entries_that_replace() {
    let engine = engine();
    let cancel = CancellationToken::new();

    let entries = engine
        .get_channel_entries_that_replace(&BundleName::new("op.v0.9.2"), &cancel)
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].package.as_str(), "op");
    assert_eq!(entries[0].channel.as_str(), "alpha");
    assert_eq!(entries[0].bundle.as_str(), "op.v0.9.4");
    assert_eq!(entries[0].replaces.as_ref().unwrap().as_str(), "op.v0.9.2");
}

#[test]
fn test_gvk_provider_queries() {
    let engine = engine();
    let cancel = CancellationToken::new();

    let entries = engine
        .get_channel_entries_that_provide("etcd.database.coreos.com", "v1beta2", "EtcdBackup", &cancel)
        .unwrap();
    assert_eq!(
        entries.iter().map(|e| e.bundle.as_str()).collect::<Vec<_>>(),
        vec!["etcd.v0.9.0", "etcd.v0.9.4"],
    );

    let latest = engine
        .get_latest_channel_entries_that_provide(
            "etcd.database.coreos.com",
            "v1beta2",
            "EtcdBackup",
            &cancel,
        )
        .unwrap();
    assert_eq!(
        latest.iter().map(|e| e.bundle.as_str()).collect::<Vec<_>>(),
        vec!["etcd.v0.9.4"],
    );

    // The greatest-version bundle in a default channel provides the API.
    let provider = engine
        .get_bundle_that_provides("etcd.database.coreos.com", "v1beta2", "EtcdBackup", &cancel)
        .unwrap();
    assert_eq!(provider.name.as_str(), "etcd.v0.9.4");
    assert_eq!(provider.channel.as_str(), "singlenamespace-alpha");

    assert!(matches!(
        engine
            .get_bundle_that_provides("absent.example.com", "v1", "Nothing", &cancel)
            .unwrap_err(),
        Error::NoProvider { .. }
    ));
}

#[test]
fn test_list_bundles_is_flattened_and_deterministic() {
    let engine = engine();
    let cancel = CancellationToken::new();

    let first = engine.list_bundles(&cancel).unwrap();
    let second = engine.list_bundles(&cancel).unwrap();
    assert_eq!(first, second);

    assert_eq!(
        first
            .iter()
            .map(|b| (b.package.as_str(), b.channel.as_str(), b.name.as_str()))
            .collect::<Vec<_>>(),
        vec![
            ("etcd", "singlenamespace-alpha", "etcd.v0.9.0"),
            ("etcd", "singlenamespace-alpha", "etcd.v0.9.4"),
            ("op", "alpha", "op.v0.9.0"),
            ("op", "alpha", "op.v0.9.2"),
            ("op", "alpha", "op.v0.9.4"),
        ],
    );
}

#[test]
fn test_build_metadata_breaks_replacement_ties() {
    // vault.v1.0.0 replaces vault.v0.9.0; the hotfix rebuild carries
    // build metadata and also skips vault.v0.9.0. Both are candidates to
    // replace it, and the build-metadata tiebreak picks the rebuild.
    let mut hotfix = input(
        "vault",
        "vault.v1.0.0-hotfix",
        "1.0.0+hotfix",
        "stable",
        Some("vault.v1.0.0"),
    );
    hotfix.skips = vec![BundleName::new("vault.v0.9.0")];

    let draft = mutations::add(
        &Draft::default(),
        AddRequest {
            inputs: vec![
                input("vault", "vault.v0.9.0", "0.9.0", "stable", None),
                input("vault", "vault.v1.0.0", "1.0.0", "stable", Some("vault.v0.9.0")),
                hotfix,
            ],
            mode: Mode::Replaces,
            overwrite: false,
        },
        &PropertyRegistry::new(),
        &CancellationToken::new(),
    )
    .unwrap();
    let engine = Engine::new(draft.catalog, draft.built, PropertyRegistry::new());

    let replacement = engine
        .get_bundle_that_replaces(
            &BundleName::new("vault.v0.9.0"),
            &PackageName::new("vault"),
            &ChannelName::new("stable"),
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(replacement.name.as_str(), "vault.v1.0.0-hotfix");
}

#[test]
fn test_bundle_dependencies_are_split_out() {
    let mut dependent = input("dep", "dep.v1.0.0", "1.0.0", "stable", None);
    dependent.properties.push(Property::new(
        models::TYPE_PACKAGE_REQUIRED,
        serde_json::json!({"packageName": "etcd", "versionRange": ">=0.9.0 <1.0.0"}),
    ));
    dependent.properties.push(Property::new(
        models::TYPE_GVK_REQUIRED,
        serde_json::json!({"group": "etcd.database.coreos.com", "version": "v1beta2", "kind": "EtcdCluster"}),
    ));

    let draft = mutations::add(
        &Draft::default(),
        AddRequest {
            inputs: vec![dependent],
            mode: Mode::Replaces,
            overwrite: false,
        },
        &PropertyRegistry::new(),
        &CancellationToken::new(),
    )
    .unwrap();
    let engine = Engine::new(draft.catalog, draft.built, PropertyRegistry::new());

    let bundle = engine
        .get_bundle(
            &PackageName::new("dep"),
            &ChannelName::new("stable"),
            &BundleName::new("dep.v1.0.0"),
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(bundle.dependencies.len(), 2);
    assert!(bundle
        .dependencies
        .iter()
        .all(|d| d.r#type == models::TYPE_PACKAGE_REQUIRED
            || d.r#type == models::TYPE_GVK_REQUIRED));
    // Dependencies are a view of the property set, not a replacement.
    assert!(bundle.properties.len() > bundle.dependencies.len());
}

#[test]
fn test_cancelled_query() {
    let engine = engine();
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(engine.list_bundles(&cancel).unwrap_err(), Error::Cancelled);
}

#[tokio::test]
async fn test_service_trait_surface() {
    use queries::CatalogService;

    let engine = engine();
    let cancel = CancellationToken::new();

    let packages = CatalogService::list_packages(&engine, cancel.clone())
        .await
        .unwrap();
    assert_eq!(packages.len(), 2);

    let head = CatalogService::get_bundle_for_channel(
        &engine,
        PackageName::new("op"),
        ChannelName::new("alpha"),
        cancel,
    )
    .await
    .unwrap();
    assert_eq!(head.name.as_str(), "op.v0.9.4");
}
