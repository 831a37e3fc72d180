// tests/template_workflow.rs

//! Template composition: staging, includes, clearing and documents.

mod common;

use common::{names, template};
use strata::{Object, Package, Repository, Template};

#[test]
fn test_new_template_to_kickstart_packages() {
    let mut t = Template::parse("alice:base", None).unwrap();
    assert!(t.add_package(Package::parse("nginx").unwrap()));
    assert!(t.add_package(Package::parse("~apache").unwrap()));

    let text = t.to_kickstart(false);
    let block = &text[text.find("%packages").unwrap()..];
    assert_eq!(block, "%packages\nnginx\n-apache\n%end\n");
    assert!(text.contains("# Author: alice"));
}

#[test]
fn test_repo_with_same_stub_is_not_staged_twice() {
    let mut t = Template::parse("alice:base", None).unwrap();
    let first = Repository::parse_kickstart_line("repo --name=updates --baseurl=http://u1").unwrap();
    let second =
        Repository::parse_kickstart_line("repo --name=updates --baseurl=http://u2").unwrap();

    assert!(t.add_repo(first));
    assert!(!t.add_repo(second));
    assert_eq!(t.repos().len(), 1);
    let kept = t.find_repo("updates").unwrap();
    assert_eq!(kept.baseurl, Some(vec!["http://u1".to_string()]));
}

#[test]
fn test_repo_already_owned_leaves_delta_empty() {
    let mut t = Template::from_json(
        r#"{"name": "base", "user": "alice",
            "repos": [{"s": "updates", "n": "updates", "bu": ["http://u1"]}]}"#,
    )
    .unwrap();

    let again = Repository::parse_kickstart_line("repo --name=updates --baseurl=http://u1").unwrap();
    assert!(!t.add_repo(again));
    assert!(t.delta().repos.is_empty());
    assert_eq!(t.own().repos.len(), 1);
}

#[test]
fn test_first_listed_include_takes_precedence() {
    let a = template("alice:a", &["~foo"]);
    let b = template("alice:b", &["foo", "bar"]);

    let mut t = template("alice:top", &[]);
    t.set_includes([a.clone(), b.clone()]);
    let foo = t.packages_all().get(&Package::named("foo").unwrap()).cloned().unwrap();
    assert!(foo.excluded());

    let mut swapped = template("alice:top", &[]);
    swapped.set_includes([b, a]);
    let foo = swapped
        .packages_all()
        .get(&Package::named("foo").unwrap())
        .cloned()
        .unwrap();
    assert!(foo.included());
}

#[test]
fn test_first_listed_include_wins_for_repos() {
    let updates = |url: &str| {
        Repository::parse_kickstart_line(&format!("repo --name=updates --baseurl={}", url)).unwrap()
    };
    let mut a = template("alice:a", &[]);
    a.add_repo(updates("http://a"));
    let mut b = template("alice:b", &[]);
    b.add_repo(updates("http://b"));

    let mut t = template("alice:top", &[]);
    t.set_includes([a.clone(), b.clone()]);
    assert_eq!(t.repos_all().len(), 1);
    let kept = t.repos_all().find(|r| r.stub == "updates").cloned().unwrap();
    assert_eq!(kept.baseurl, Some(vec!["http://a".to_string()]));

    t.set_includes([b, a]);
    let kept = t.repos_all().find(|r| r.stub == "updates").cloned().unwrap();
    assert_eq!(kept.baseurl, Some(vec!["http://b".to_string()]));
}

#[test]
fn test_included_objects_keep_include_order() {
    let mut a = template("alice:a", &["~foo"]);
    a.add_object(Object::from_data("first.sh", "echo a\n", vec![]).unwrap());
    let mut b = template("alice:b", &["foo"]);
    b.add_object(Object::from_data("second.sh", "echo b\n", vec![]).unwrap());

    let mut t = template("alice:top", &[]);
    t.set_includes([a, b]);

    let order: Vec<String> = t.objects_all().iter().map(|o| o.name().to_string()).collect();
    assert_eq!(order, vec!["first.sh", "second.sh"]);
    // packages are merged the other way round, so a still wins for foo
    let foo = t.packages_all().get(&Package::named("foo").unwrap()).cloned().unwrap();
    assert!(foo.excluded());
}

#[test]
fn test_own_members_come_before_included_ones() {
    let base = template("alice:base", &["bash", "~nginx"]);
    let mut t = template("alice:web", &["nginx"]);
    t.set_includes([base]);

    assert_eq!(names(&t.packages()), vec!["nginx"]);
    assert_eq!(names(&t.packages_all()), vec!["nginx", "bash"]);
    assert!(t.packages_all().iter().all(|p| !p.excluded()));
}

#[test]
fn test_clear_resets_everything() {
    let base = template("alice:base", &["bash"]);
    let mut t = template("alice:web", &["nginx"]);
    t.add_repo(Repository::parse_kickstart_line("repo --name=updates --baseurl=http://u1").unwrap());
    t.set_includes([base]);

    t.clear();
    assert!(t.packages_all().is_empty());
    assert!(t.repos_all().is_empty());
    assert!(t.objects_all().is_empty());
    assert!(t.includes().is_empty());
    assert_eq!(t.unv().as_deref(), Some("alice:web"));
}

#[test]
fn test_document_keeps_layers_apart() {
    let base = template("alice:base", &["bash"]);
    let mut t = template("alice:web", &["nginx"]);
    t.set_includes([base]);

    let own = t.to_document(false);
    assert_eq!(own.includes, Some(vec!["alice:base".to_string()]));
    assert_eq!(own.packages.len(), 1);

    let flat = t.to_document(true);
    let names: Vec<&str> = flat.packages.iter().map(|p| p.n.as_str()).collect();
    assert_eq!(names, vec!["bash", "nginx"]);

    let reloaded = Template::from_yaml(&t.to_yaml(false).unwrap()).unwrap();
    assert_eq!(reloaded.unv(), t.unv());
    assert_eq!(reloaded.includes(), t.includes());
    assert_eq!(reloaded.packages().len(), 1);
    assert!(!reloaded.is_resolved());
}
