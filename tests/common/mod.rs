// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use strata::{DirectoryService, Package, Template};
use tempfile::TempDir;

/// Kickstart covering repos, repeatable and single commands, scripts and
/// a `%packages` block with options.
pub const WEB_KICKSTART: &str = r#"#platform=x86, AMD64, or Intel EM64T
lang en_US.UTF-8
keyboard us
repo --name="Fedora Updates" --baseurl=http://mirror.example.com/updates --cost=10
repo --name=extras --mirrorlist=http://mirrors.example.com/extras --excludepkgs=foo,bar
part /boot --size 512 --fstype ext4
part / --size 8192 --fstype xfs
bootloader --location=mbr
timezone UTC

%pre
echo "starting"
%end

%post --nochroot --log=/root/post.log
cp /etc/resolv.conf /mnt/sysimage/etc/
%end

%packages --excludedocs --nocore
@core
@web-server --optional
nginx
vim-enhanced
-httpd
%end
"#;

/// A template with the given owner and packages, staged in delta
pub fn template(unv: &str, specs: &[&str]) -> Template {
    let mut t = Template::parse(unv, None).unwrap();
    for spec in specs {
        t.add_package(Package::parse(spec).unwrap());
    }
    t
}

/// A directory-backed store rooted in a fresh temp directory
///
/// Keep the TempDir alive for as long as the service is used.
pub fn store() -> (TempDir, DirectoryService) {
    let dir = tempfile::tempdir().unwrap();
    let service = DirectoryService::new(dir.path().join("store"));
    (dir, service)
}

/// Write `text` to `name` inside `dir`
pub fn write_file(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Package names with their exclusion marker, in set order
pub fn names(packages: &strata::PackageSet) -> Vec<String> {
    packages
        .iter()
        .map(|p| {
            let marker = if p.excluded() && !p.included() { "~" } else { "" };
            format!("{}{}", marker, p.name())
        })
        .collect()
}
