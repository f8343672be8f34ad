use docstage_core::collector::{CollectPolicy, Collector};
use docstage_core::contract::RemoteObject;
use docstage_core::hash::ContentHasher;
use std::fs::{create_dir_all, write};
use std::path::Path;
use tempfile::tempdir;

fn etag(data: &[u8]) -> String {
    format!("\"{}\"", ContentHasher::default().hash_bytes(data))
}

fn staging_collector(namespace: &str) -> Collector {
    Collector::new(
        CollectPolicy::Staging,
        "master",
        false,
        namespace,
        ContentHasher::default(),
    )
}

fn build_tree(root: &Path) {
    write(root.join("x.html"), b"unchanged").unwrap();
    write(root.join("y.html"), b"modified locally").unwrap();
    create_dir_all(root.join("guide")).unwrap();
    write(root.join("guide/new.html"), b"brand new").unwrap();
    write(root.join(".hidden"), b"dotfile").unwrap();
}

#[test]
fn unchanged_files_are_skipped_and_changes_are_classified() {
    let dir = tempdir().unwrap();
    build_tree(dir.path());

    let remote = vec![
        RemoteObject::new("ns/x.html", 9, etag(b"unchanged")),
        RemoteObject::new("ns/y.html", 3, etag(b"old")),
    ];
    let collection = staging_collector("ns").collect(dir.path(), &remote).unwrap();

    let updates: Vec<(&str, bool)> = collection
        .updates
        .iter()
        .map(|u| (u.relative.as_str(), u.is_new))
        .collect();
    assert_eq!(updates, vec![("guide/new.html", true), ("y.html", false)]);
    assert!(collection.removed_files.is_empty());
}

#[test]
fn remote_objects_missing_locally_are_removed_and_never_uploaded() {
    let dir = tempdir().unwrap();
    build_tree(dir.path());

    let remote = vec![
        RemoteObject::new("ns/x.html", 9, etag(b"unchanged")),
        RemoteObject::new("ns/gone.html", 4, etag(b"gone")),
        RemoteObject::new("ns/guide/old.html", 4, etag(b"old!")),
    ];
    let collection = staging_collector("ns").collect(dir.path(), &remote).unwrap();

    assert_eq!(
        collection.removed_files,
        vec!["ns/gone.html".to_string(), "ns/guide/old.html".to_string()]
    );
    for update in &collection.updates {
        let key = format!("ns/{}", update.relative);
        assert!(!collection.removed_files.contains(&key), "{key} both uploaded and removed");
    }
}

#[test]
fn redirect_markers_and_foreign_namespaces_are_ignored() {
    let dir = tempdir().unwrap();
    build_tree(dir.path());

    let remote = vec![
        RemoteObject::new("ns/redirected", 0, etag(b"")),
        RemoteObject::new("ns2/other.html", 5, etag(b"other")),
    ];
    let collection = staging_collector("ns").collect(dir.path(), &remote).unwrap();
    assert!(collection.removed_files.is_empty());
}

#[test]
fn dotfiles_are_not_published() {
    let dir = tempdir().unwrap();
    build_tree(dir.path());

    let collection = staging_collector("ns").collect(dir.path(), &[]).unwrap();
    assert!(collection
        .updates
        .iter()
        .all(|u| !u.relative.starts_with('.')));
    assert_eq!(collection.updates.len(), 3);
}

#[test]
fn deploy_publishes_only_root_files_and_the_branch_directory() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root.join("index.html"), b"root").unwrap();
    create_dir_all(root.join("master")).unwrap();
    write(root.join("master/page.html"), b"master page").unwrap();
    create_dir_all(root.join("v1.0")).unwrap();
    write(root.join("v1.0/page.html"), b"old page").unwrap();

    let collector = Collector::new(CollectPolicy::Deploy, "master", false, "docs", ContentHasher::default());
    let collection = collector.collect(root, &[]).unwrap();
    let relative: Vec<&str> = collection.updates.iter().map(|u| u.relative.as_str()).collect();
    assert_eq!(relative, vec!["index.html", "master/page.html"]);

    let everything = Collector::new(CollectPolicy::Deploy, "master", true, "docs", ContentHasher::default());
    assert_eq!(everything.collect(root, &[]).unwrap().updates.len(), 3);
}

#[test]
fn deploy_keeps_remote_objects_of_unpublished_directories() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    create_dir_all(root.join("master")).unwrap();
    write(root.join("master/page.html"), b"master page").unwrap();

    let remote = vec![RemoteObject::new("docs/v1.0/page.html", 8, etag(b"old page"))];
    let collector = Collector::new(CollectPolicy::Deploy, "master", false, "docs", ContentHasher::default());
    let collection = collector.collect(root, &remote).unwrap();
    assert!(collection.removed_files.is_empty());
}

#[cfg(unix)]
#[test]
fn deploy_follows_links_to_the_branch_directory() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    create_dir_all(root.join("master")).unwrap();
    write(root.join("master/page.html"), b"master page").unwrap();
    std::os::unix::fs::symlink("master", root.join("current")).unwrap();

    let collector = Collector::new(CollectPolicy::Deploy, "master", false, "docs", ContentHasher::default());
    let upload = collector.upload_set(root).unwrap();
    assert!(upload.contains("current"));
    assert!(upload.contains("master"));

    let collection = collector.collect(root, &[]).unwrap();
    let relative: Vec<&str> = collection.updates.iter().map(|u| u.relative.as_str()).collect();
    assert_eq!(relative, vec!["current/page.html", "master/page.html"]);
}

#[cfg(unix)]
#[test]
fn broken_links_do_not_abort_the_walk() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    create_dir_all(root.join("guide")).unwrap();
    write(root.join("guide/page.html"), b"page").unwrap();
    std::os::unix::fs::symlink("missing.html", root.join("guide/dead.html")).unwrap();

    let remote = vec![RemoteObject::new("ns/guide/page.html", 4, etag(b"page"))];
    let collection = staging_collector("ns").collect(root, &remote).unwrap();

    assert!(collection.updates.iter().all(|u| u.relative != "guide/page.html"));
    assert!(collection.removed_files.is_empty());
}
