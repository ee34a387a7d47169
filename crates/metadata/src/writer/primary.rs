use super::{Xml, empty, end, start, text, version};
use crate::error::Result;
use repodata_rpm::{Dependency, FileKind, PackageFile, PackageRecord};

pub(super) fn write_package(xml: &mut Xml, record: &PackageRecord) -> Result<()> {
    start(xml, "package", &[("type", "rpm")])?;
    text(xml, "name", &[], &record.name)?;
    text(xml, "arch", &[], &record.arch)?;
    version(xml, &record.evr)?;
    text(xml, "checksum", &[("type", record.checksum.algorithm.as_str()), ("pkgid", "YES")], record.pkgid())?;
    text(xml, "summary", &[], &record.summary)?;
    text(xml, "description", &[], &record.description)?;
    text(xml, "packager", &[], &record.packager)?;
    text(xml, "url", &[], &record.url)?;
    let (file_time, build_time) = (record.file_time.to_string(), record.build_time.to_string());
    empty(xml, "time", &[("file", &file_time), ("build", &build_time)])?;
    let (package, installed, archive) =
        (record.size().to_string(), record.installed_size.to_string(), record.archive_size.to_string());
    empty(xml, "size", &[("package", &package), ("installed", &installed), ("archive", &archive)])?;
    empty(xml, "location", &[("href", &record.location)])?;

    start(xml, "format", &[])?;
    text(xml, "rpm:license", &[], &record.license)?;
    text(xml, "rpm:vendor", &[], &record.vendor)?;
    text(xml, "rpm:group", &[], &record.group)?;
    text(xml, "rpm:buildhost", &[], &record.build_host)?;
    text(xml, "rpm:sourcerpm", &[], &record.source_rpm)?;
    let (range_start, range_end) = (record.header_range.start.to_string(), record.header_range.end.to_string());
    empty(xml, "rpm:header-range", &[("start", &range_start), ("end", &range_end)])?;
    dependencies(xml, "rpm:provides", &record.provides, false)?;
    dependencies(xml, "rpm:requires", &record.requires, true)?;
    for file in record.files().filter(is_primary_file) {
        match file.kind {
            FileKind::File => text(xml, "file", &[], &file.path)?,
            FileKind::Dir => text(xml, "file", &[("type", "dir")], &file.path)?,
            FileKind::Ghost => text(xml, "file", &[("type", "ghost")], &file.path)?,
        }
    }
    end(xml, "format")?;
    end(xml, "package")
}

fn dependencies(xml: &mut Xml, name: &str, deps: &[Dependency], mark_pre: bool) -> Result<()> {
    if deps.is_empty() {
        return Ok(());
    }
    start(xml, name, &[])?;
    for dep in deps {
        let mut attrs = vec![("name", dep.name.clone())];
        if let (Some(flags), Some(evr)) = (dep.flags.comparison(), &dep.evr) {
            attrs.push(("flags", flags.to_string()));
            attrs.push(("epoch", evr.epoch.to_string()));
            attrs.push(("ver", evr.version.clone()));
            if !evr.release.is_empty() {
                attrs.push(("rel", evr.release.clone()));
            }
        }
        if mark_pre && dep.flags.is_pre() {
            attrs.push(("pre", "1".to_string()));
        }
        let attrs: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        empty(xml, "rpm:entry", &attrs)?;
    }
    end(xml, name)
}

/// Files clients commonly depend on by path; the rest only go to filelists.
fn is_primary_file(file: &PackageFile) -> bool {
    file.path.starts_with("/etc/") || file.path.contains("bin/") || file.path == "/usr/lib/sendmail"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::testing::record;
    use quick_xml::Writer;

    #[test]
    fn test_primary_package() {
        let mut xml = Writer::new_with_indent(Vec::new(), b' ', 2);
        write_package(&mut xml, &record("hello", "abc123")).unwrap();
        let expected = r#"<package type="rpm">
  <name>hello</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="1.0" rel="1"/>
  <checksum type="sha256" pkgid="YES">abc123</checksum>
  <summary>The hello package</summary>
  <description>Says hello &amp; waves.</description>
  <packager/>
  <url>https://example.com</url>
  <time file="1700000100" build="1700000000"/>
  <size package="4096" installed="2048" archive="1500"/>
  <location href="Packages/hello-1.0-1.x86_64.rpm"/>
  <format>
    <rpm:license>MIT</rpm:license>
    <rpm:vendor/>
    <rpm:group>Unspecified</rpm:group>
    <rpm:buildhost>builder</rpm:buildhost>
    <rpm:sourcerpm>hello-1.0-1.src.rpm</rpm:sourcerpm>
    <rpm:header-range start="4504" end="9000"/>
    <rpm:provides>
      <rpm:entry name="hello" flags="EQ" epoch="0" ver="1.0" rel="1"/>
    </rpm:provides>
    <rpm:requires>
      <rpm:entry name="libc.so.6"/>
    </rpm:requires>
    <file>/usr/bin/hello</file>
  </format>
</package>"#;
        assert_eq!(String::from_utf8(xml.into_inner()).unwrap(), expected);
    }

    #[test]
    fn test_primary_file_filter() {
        let file = |path: &str| PackageFile { path: path.to_string(), kind: FileKind::File };
        assert!(is_primary_file(&file("/etc/hello.conf")));
        assert!(is_primary_file(&file("/usr/sbin/helloctl")));
        assert!(is_primary_file(&file("/usr/lib/sendmail")));
        assert!(!is_primary_file(&file("/usr/share/doc/hello/README")));
    }
}
