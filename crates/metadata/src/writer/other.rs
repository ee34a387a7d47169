use super::{Xml, end, start, text, version};
use crate::error::Result;
use repodata_rpm::PackageRecord;

pub(super) fn write_package(xml: &mut Xml, record: &PackageRecord) -> Result<()> {
    start(xml, "package", &[("pkgid", record.pkgid()), ("name", &record.name), ("arch", &record.arch)])?;
    version(xml, &record.evr)?;
    for entry in &record.changelog {
        let date = entry.date.to_string();
        text(xml, "changelog", &[("author", &entry.author), ("date", &date)], &entry.text)?;
    }
    end(xml, "package")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::testing::record;
    use quick_xml::Writer;

    #[test]
    fn test_other_package() {
        let mut xml = Writer::new_with_indent(Vec::new(), b' ', 2);
        write_package(&mut xml, &record("hello", "abc123")).unwrap();
        let expected = r#"<package pkgid="abc123" name="hello" arch="x86_64">
  <version epoch="0" ver="1.0" rel="1"/>
  <changelog author="Dev &lt;dev@example.com&gt; - 1.0-1" date="1699999999">- Initial &lt;release&gt;</changelog>
</package>"#;
        assert_eq!(String::from_utf8(xml.into_inner()).unwrap(), expected);
    }
}
